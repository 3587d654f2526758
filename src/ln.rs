//! Data attribute queries and updates on logical nodes

use log::{debug, warn};

use crate::catalog::{attribute_refs, check_do_da, DataAttributeRef};
use crate::error::{Error, Result};
use crate::model::{LdId, LnId, LogicalNode, NodeId, Scl};
use crate::names::{is_blank, non_blank, xpath_attribute_filter};
use crate::tracker::{find_dai, validate_bounded_dai};

/// Get or create the DOI, then the SDI chain and the final DAI named by
/// `names`, resuming from the deepest existing node.
fn ensure_chain(
    ln: &mut LogicalNode,
    do_name: &str,
    names: &[String],
    val_import: Option<bool>,
) -> Result<NodeId> {
    let tree = &mut ln.data;
    let doi = match tree.doi(do_name) {
        Some(id) => id,
        None => tree.add_doi(do_name),
    };
    if names.is_empty() {
        return Ok(doi);
    }
    let found = tree.find_deepest_match(doi, names, 0, true);
    let last = names.len() - 1;
    if found.index == last as isize {
        return Ok(found.node);
    }
    let mut current = found.node;
    for (i, name) in names.iter().enumerate().skip((found.index + 1) as usize) {
        current = if i == last {
            tree.add_dai(current, name.as_str(), false, val_import)?
        } else {
            tree.add_sdi(current, name.as_str())?
        };
    }
    debug!(
        "created {} from index {} in {}",
        names.join("."),
        found.index + 1,
        ln.ref_name()
    );
    Ok(current)
}

/// Ensure the DOI/SDI/DAI chain designated by `data_type_ref` (`DO.sdi...DA`)
/// exists and return the DAI.
///
/// New DAIs get the given valImport flag.
pub fn create_chain_if_not_exists(
    ln: &mut LogicalNode,
    data_type_ref: &str,
    val_import: bool,
) -> Result<NodeId> {
    let names: Vec<String> = data_type_ref.split('.').map(str::to_string).collect();
    if names.len() < 2 || names.iter().any(|n| n.trim().is_empty()) {
        return Err(Error::scd(format!(
            "dataTypeRef must be valid with at least a DO and a DA, but got: {}",
            data_type_ref
        )));
    }
    ensure_chain(ln, &names[0], &names[1..], Some(val_import))
}

/// Write the values of `attr` into the matching DAI, creating the missing
/// part of its DOI/SDI/DAI chain.
///
/// The write is refused, and nothing is created, unless the DAI is
/// updatable: its explicit valImport flag when set, else the template
/// updatability of `attr`. `Mod.stVal` is always updatable.
///
/// `owner_xpath` locates the logical node in error messages.
pub fn update_dai(ln: &mut LogicalNode, owner_xpath: &str, attr: &DataAttributeRef) -> Result<()> {
    if !attr.do_name.is_defined() || !attr.da_name.is_defined() {
        return Err(Error::scd("Cannot update undefined DAI"));
    }
    if attr.values.is_empty() {
        return Ok(());
    }
    let mut names = attr.do_name.struct_names.clone();
    names.push(attr.da_name.name.clone());
    names.extend(attr.da_name.struct_names.iter().cloned());

    // An explicit DAI flag wins over the template one
    let updatable = attr.is_updatable();
    let explicit = find_dai(&ln.data, &attr.do_name, &attr.da_name)
        .and_then(|id| ln.data.dai(id))
        .and_then(|dai| dai.val_import);
    if !attr.is_mod_st_val() && !explicit.unwrap_or(updatable) {
        return Err(Error::scd(format!(
            "DAI({}) cannot be updated : valImport(false) {}/{}",
            names.last().map(String::as_str).unwrap_or_default(),
            owner_xpath,
            chain_xpath(&attr.do_name.name, &names)
        )));
    }

    let dai = ensure_chain(ln, &attr.do_name.name, &names, Some(updatable))?;
    ln.data.update_dai(dai, &attr.values, owner_xpath)
}

/// Relative locator of the DAI at the end of a DOI/SDI chain
fn chain_xpath(do_name: &str, names: &[String]) -> String {
    let mut segments = vec![format!("DOI[{}]", xpath_attribute_filter("name", Some(do_name)))];
    for (i, name) in names.iter().enumerate() {
        let tag = if i + 1 == names.len() { "DAI" } else { "SDI" };
        segments.push(format!("{}[{}]", tag, xpath_attribute_filter("name", Some(name))));
    }
    segments.join("/")
}

/// Catalog of `ln` merged with its DAI instances.
///
/// Values and valImport flags of fully matching DAIs override the template
/// ones. Setting group attributes (SG, SE) are importable only when their
/// values carry a setting group and the access point supports configurable
/// setting groups. With `updatable_only`, non updatable attributes are left
/// out.
pub fn resolve_attributes(
    scl: &Scl,
    ln_id: LnId,
    filter: &DataAttributeRef,
    updatable_only: bool,
) -> Result<Vec<DataAttributeRef>> {
    let ln = scl.ln(ln_id);
    let ln_type = if is_blank(Some(&filter.ln_type)) {
        ln.ln_type.clone()
    } else {
        filter.ln_type.clone()
    };
    if scl.templates.lnode_type(&ln_type).is_none() {
        return Err(Error::scd(format!(
            "Corrupted SCD : lnType missing for LN : {}{}",
            ln.ln_class, ln.ln_inst
        )));
    }

    let mut located = filter.clone();
    located.ln_class = ln.ln_class.clone();
    located.ln_inst = non_blank(Some(&ln.ln_inst));
    located.prefix = ln.prefix.clone();

    let conf_sg = scl.has_conf_sg(ln_id.ld);
    let device = scl.ld(ln_id.ld);
    let ied_name = &scl.ied_of(ln_id.ld).name;
    let mut refs = attribute_refs(&scl.templates, &ln_type, &located)?;
    for r in refs.iter_mut() {
        let Some(dai) = find_dai(&ln.data, &r.do_name, &r.da_name).and_then(|id| ln.data.dai(id))
        else {
            continue;
        };
        if !dai.values.is_empty() {
            r.values = dai.values_by_group();
        }
        match r.fc {
            Some(fc) if fc.is_setting_group() => {
                if dai.has_setting_group() {
                    r.val_import = dai.val_import != Some(false) && conf_sg;
                } else {
                    warn!(
                        "Inconsistency in the SCD file - DAI {} with fc={} must have a sGroup attribute",
                        r.obj_ref(ied_name, &device.inst),
                        fc
                    );
                    r.val_import = false;
                }
            }
            _ => {
                if let Some(flag) = dai.val_import {
                    r.val_import = flag;
                }
            }
        }
    }
    if updatable_only {
        refs.retain(DataAttributeRef::is_updatable);
    }
    Ok(refs)
}

/// Update one DAI of the logical node designated by `attr` in `ied_name`/`ld_inst`.
///
/// The DO/DA pair is checked against the templates first; values of bounded
/// data objects (ING, ASG) are validated against their minVal, maxVal and
/// stepSize.
pub fn update_device_dai(
    scl: &mut Scl,
    ied_name: &str,
    ld_inst: &str,
    attr: &DataAttributeRef,
) -> Result<()> {
    if scl.templates.lnode_type(&attr.ln_type).is_none() {
        return Err(Error::scd(format!("Unknown LNodeType : {}", attr.ln_type)));
    }
    let info = check_do_da(&scl.templates, &attr.ln_type, &attr.do_name, &attr.da_name)?;
    let mut checked = attr.clone();
    checked.cdc = Some(info.cdc);
    checked.fc = Some(info.fc);
    checked.b_type = Some(info.b_type);
    checked.val_import = checked.val_import || info.val_import;

    let ld: LdId = scl.find_ld(ied_name, ld_inst)?;
    let ln_id = scl.find_ln(
        ld,
        &attr.ln_class,
        attr.ln_inst.as_deref(),
        attr.prefix.as_deref(),
    )?;
    validate_bounded_dai(&scl.templates, scl.ln(ln_id), &checked)?;

    let owner_xpath = scl.ln_xpath(ln_id);
    update_dai(scl.ln_mut(ln_id), &owner_xpath, &checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AccessPoint, BasicType, DaDef, DataTypeTemplates, DoType, Fc, Ied, LDevice, LNodeType,
        Services, LLN0,
    };
    use crate::names::{DaTypeName, DoTypeName};
    use pretty_assertions::assert_eq;

    fn templates() -> DataTypeTemplates {
        let mut t = DataTypeTemplates::new();
        t.add_lnode_type(LNodeType::new("LN0T", "LLN0").with_do("Mod", "ModT"));
        t.add_lnode_type(
            LNodeType::new("PTOC_T", "PTOC")
                .with_do("StrVal", "ASG_T")
                .with_do("NamPlt", "LPL_T"),
        );
        t.add_do_type(
            DoType::new("ModT", "ENC")
                .with_da(DaDef::new("stVal", Fc::ST, BasicType::Enum).with_value(0, "on")),
        );
        t.add_do_type(
            DoType::new("ASG_T", "ASG")
                .with_da(
                    DaDef::new("setMag", Fc::SG, BasicType::Float32).with_val_import(true),
                )
                .with_da(DaDef::new("minVal", Fc::CF, BasicType::Float32).with_value(0, "10"))
                .with_da(DaDef::new("maxVal", Fc::CF, BasicType::Float32).with_value(0, "100"))
                .with_da(DaDef::new("stepSize", Fc::CF, BasicType::Float32).with_value(0, "5")),
        );
        t.add_do_type(
            DoType::new("LPL_T", "LPL")
                .with_da(DaDef::new("vendor", Fc::DC, BasicType::Other("VisString255".into())))
                .with_da(
                    DaDef::new("swRev", Fc::DC, BasicType::Other("VisString255".into()))
                        .with_val_import(true),
                ),
        );
        t
    }

    fn scl(conf_sg: bool) -> Scl {
        let services = Services {
            conf_sg,
            ..Default::default()
        };
        let ld = LDevice::new("LD1", "LN0T")
            .with_ln(LogicalNode::ln("PTOC", "1", None, "PTOC_T"));
        Scl::new()
            .with_ied(
                Ied::new("IED1").with_access_point(
                    AccessPoint::new("AP1")
                        .with_services(services)
                        .with_ldevice(ld),
                ),
            )
            .with_templates(templates())
    }

    fn ptoc(scl: &Scl) -> LnId {
        let ld = scl.find_ld("IED1", "LD1").unwrap();
        scl.find_ln(ld, "PTOC", Some("1"), None).unwrap()
    }

    fn set_mag(value: &str) -> DataAttributeRef {
        DataAttributeRef::new("StrVal", "setMag")
            .with_ln("PTOC", Some("1"), None)
            .with_ln_type("PTOC_T")
            .with_value(0, value)
    }

    #[test]
    fn test_create_chain() {
        let mut ln = LogicalNode::ln("PTOC", "1", None, "PTOC_T");
        let dai = create_chain_if_not_exists(&mut ln, "Do1.sdi1.da1", true).unwrap();
        assert_eq!(
            ln.data.xpath(dai),
            "DOI[@name=\"Do1\"]/SDI[@name=\"sdi1\"]/DAI[@name=\"da1\"]"
        );
        assert_eq!(ln.data.dai(dai).unwrap().val_import, Some(true));

        let again = create_chain_if_not_exists(&mut ln, "Do1.sdi1.da1", false).unwrap();
        assert_eq!(again, dai);
        assert_eq!(ln.data.len(), 3);

        let other = create_chain_if_not_exists(&mut ln, "Do1.sdi1.da2", false).unwrap();
        assert_ne!(other, dai);
        assert_eq!(ln.data.len(), 4);

        assert_eq!(
            create_chain_if_not_exists(&mut ln, "Do1", true)
                .unwrap_err()
                .to_string(),
            "dataTypeRef must be valid with at least a DO and a DA, but got: Do1"
        );
        assert!(create_chain_if_not_exists(&mut ln, "Do1..da", true).is_err());
    }

    #[test]
    fn test_update_dai_is_idempotent() {
        let mut ln = LogicalNode::ln("PTOC", "1", None, "PTOC_T");
        let mut attr = DataAttributeRef::new("Do1.sdo1", "da1.bda1");
        attr.fc = Some(Fc::DC);
        attr.val_import = true;
        attr.values.insert(0, "v".to_string());

        update_dai(&mut ln, "/SCL", &attr).unwrap();
        let snapshot = ln.clone();
        update_dai(&mut ln, "/SCL", &attr).unwrap();
        assert_eq!(ln, snapshot);

        let dai = find_dai(&ln.data, &attr.do_name, &attr.da_name).unwrap();
        assert_eq!(ln.data.dai(dai).unwrap().values[0].value, "v");
    }

    #[test]
    fn test_update_dai_respects_val_import() {
        let mut ln = LogicalNode::ln("PTOC", "1", None, "PTOC_T");
        let doi = ln.data.add_doi("NamPlt");
        ln.data.add_dai(doi, "vendor", false, Some(false)).unwrap();
        ln.data.add_dai(doi, "swRev", false, Some(true)).unwrap();

        let vendor = DataAttributeRef::new("NamPlt", "vendor").with_value(0, "X");
        assert_eq!(
            update_dai(&mut ln, "/SCL/LN", &vendor).unwrap_err().to_string(),
            "DAI(vendor) cannot be updated : valImport(false) /SCL/LN/DOI[@name=\"NamPlt\"]/DAI[@name=\"vendor\"]"
        );
        let sw_rev = DataAttributeRef::new("NamPlt", "swRev").with_value(0, "2");
        update_dai(&mut ln, "/SCL/LN", &sw_rev).unwrap();

        assert_eq!(
            update_dai(&mut ln, "/SCL", &DataAttributeRef::new("", "x"))
                .unwrap_err()
                .to_string(),
            "Cannot update undefined DAI"
        );
    }

    #[test]
    fn test_resolve_attributes() {
        let mut scl = scl(true);
        let id = ptoc(&scl);
        {
            let ln = scl.ln_mut(id);
            let doi = ln.data.add_doi("NamPlt");
            let vendor = ln.data.add_dai(doi, "vendor", false, Some(true)).unwrap();
            ln.data.update_dai_value(vendor, 0, "ACME", "/SCL").unwrap();
        }
        let all = resolve_attributes(&scl, id, &DataAttributeRef::default(), false).unwrap();
        assert_eq!(all.len(), 6);
        let vendor = all
            .iter()
            .find(|r| r.da_name == DaTypeName::new("vendor"))
            .unwrap();
        assert!(vendor.val_import);
        assert_eq!(vendor.values.get(&0).map(String::as_str), Some("ACME"));
        assert_eq!(vendor.obj_ref("IED1", "LD1"), "IED1LD1/PTOC1.NamPlt.vendor");

        let updatable = resolve_attributes(&scl, id, &DataAttributeRef::default(), true).unwrap();
        let names: Vec<String> = updatable.iter().map(|r| r.data_attributes()).collect();
        assert_eq!(names, vec!["StrVal.setMag", "NamPlt.vendor", "NamPlt.swRev"]);
    }

    #[test]
    fn test_setting_group_needs_conf_sg() {
        for conf_sg in [true, false] {
            let mut scl = scl(conf_sg);
            let id = ptoc(&scl);
            let ln = scl.ln_mut(id);
            let doi = ln.data.add_doi("StrVal");
            let dai = ln.data.add_dai(doi, "setMag", false, None).unwrap();
            ln.data.update_dai_value(dai, 1, "20", "/SCL").unwrap();
            ln.data.update_dai_value(dai, 2, "30", "/SCL").unwrap();

            let filter = DataAttributeRef::new("StrVal", "setMag");
            let refs = resolve_attributes(&scl, id, &filter, false).unwrap();
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].val_import, conf_sg);
            assert_eq!(refs[0].values.len(), 2);
        }
    }

    #[test]
    fn test_setting_group_without_group_is_not_importable() {
        let mut scl = scl(true);
        let id = ptoc(&scl);
        let ln = scl.ln_mut(id);
        let doi = ln.data.add_doi("StrVal");
        let dai = ln.data.add_dai(doi, "setMag", false, Some(true)).unwrap();
        ln.data.update_dai_value(dai, 0, "20", "/SCL").unwrap();

        let filter = DataAttributeRef::new("StrVal", "setMag");
        let refs = resolve_attributes(&scl, id, &filter, false).unwrap();
        assert!(!refs[0].val_import);
    }

    #[test]
    fn test_resolve_unknown_ln_type() {
        let mut scl = scl(true);
        let id = ptoc(&scl);
        scl.ln_mut(id).ln_type = "NOPE".to_string();
        assert_eq!(
            resolve_attributes(&scl, id, &DataAttributeRef::default(), false)
                .unwrap_err()
                .to_string(),
            "Corrupted SCD : lnType missing for LN : PTOC1"
        );
    }

    #[test]
    fn test_update_device_dai_bounds() {
        let mut scl = scl(true);
        update_device_dai(&mut scl, "IED1", "LD1", &set_mag("55")).unwrap();
        let id = ptoc(&scl);
        let dai = find_dai(
            &scl.ln(id).data,
            &DoTypeName::new("StrVal"),
            &DaTypeName::new("setMag"),
        )
        .unwrap();
        assert_eq!(scl.ln(id).data.dai(dai).unwrap().values[0].value, "55");

        assert_eq!(
            update_device_dai(&mut scl, "IED1", "LD1", &set_mag("105"))
                .unwrap_err()
                .to_string(),
            "The DA(setMag) value(105.000000) must be less than(100.000000)"
        );
        assert_eq!(
            update_device_dai(&mut scl, "IED1", "LD1", &set_mag("53"))
                .unwrap_err()
                .to_string(),
            "The DA(setMag) value(53.000000) divisible by (5.000000)"
        );
    }

    #[test]
    fn test_update_device_dai_lookup_errors() {
        let mut scl = scl(true);
        let mut attr = set_mag("55");
        attr.ln_type = "X".to_string();
        assert_eq!(
            update_device_dai(&mut scl, "IED1", "LD1", &attr)
                .unwrap_err()
                .to_string(),
            "Unknown LNodeType : X"
        );
        assert_eq!(
            update_device_dai(&mut scl, "IED1", "LD9", &set_mag("55"))
                .unwrap_err()
                .to_string(),
            "Unknown LDevice (LD9) in IED (IED1)"
        );

        let mod_st_val = DataAttributeRef::new("Mod", "stVal")
            .with_ln(LLN0, None, None)
            .with_ln_type("LN0T")
            .with_value(0, "off");
        update_device_dai(&mut scl, "IED1", "LD1", &mod_st_val).unwrap();
    }
}
