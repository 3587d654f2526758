//! Dataset and control block reconciliation
//!
//! Control blocks publish a dataset (`datSet`) to a list of targets. GOOSE
//! and SMV control blocks only live on LN0; report control blocks may live
//! on any logical node. Creation goes through the access point capabilities
//! declared in `Services`.

use log::{debug, error, warn};

use crate::catalog::DataAttributeRef;
use crate::error::{Error, Result};
use crate::ldevice::ld_name;
use crate::ln::resolve_attributes;
use crate::model::{
    ControlBlock, ControlBlockKind, DataSet, ExtRef, Fc, Fcda, LdId, LnId, LnSlot, LogicalNode,
    RptEnabled, Scl, ServiceType, Subscribers, TargetLn,
};
use crate::names::{is_blank, non_blank, xpath_attribute_filter};
use crate::report::ReportItem;
use crate::settings::AllowedFcdas;

const KINDS: [ControlBlockKind; 3] = [
    ControlBlockKind::Goose,
    ControlBlockKind::Smv,
    ControlBlockKind::Report,
];

/// Control block exposed by a logical node, with the identity of its owner
#[derive(Debug, Clone, Copy)]
pub struct LocatedControlBlock<'a> {
    /// Owning IED
    pub ied_name: &'a str,
    /// Owning logical device
    pub ld_inst: &'a str,
    /// Owning logical node
    pub ln: &'a LogicalNode,
    /// The control block itself
    pub control_block: &'a ControlBlock,
}

impl<'a> LocatedControlBlock<'a> {
    /// Fully qualified reference, `IedNameLdInst/LNref.cbName`
    pub fn reference(&self) -> String {
        format!(
            "{}{}/{}.{}",
            self.ied_name,
            self.ld_inst,
            self.ln.ref_name(),
            self.control_block.name
        )
    }
}

fn kind_allowed(kind: ControlBlockKind, service_type: Option<ServiceType>) -> bool {
    match service_type {
        None => true,
        Some(st) => st.control_block_kind() == Some(kind),
    }
}

/// Control blocks of `ln` publishing one of the named datasets.
///
/// Results are grouped by dataset, then GOOSE, SMV and Report. GOOSE and SMV
/// control blocks are only considered on LN0.
pub fn control_blocks_for<'a, S: AsRef<str>>(
    ln: &'a LogicalNode,
    data_set_names: &[S],
    service_type: Option<ServiceType>,
) -> Vec<&'a ControlBlock> {
    let mut out = Vec::new();
    for name in data_set_names {
        let name = name.as_ref();
        for kind in KINDS {
            if !kind_allowed(kind, service_type) {
                continue;
            }
            out.extend(
                ln.controls_of(kind)
                    .filter(|cb| cb.dat_set.as_deref() == Some(name)),
            );
        }
    }
    out
}

/// Same as [`control_blocks_for`], annotated with the owner identity
pub fn located_control_blocks_for<'a, S: AsRef<str>>(
    scl: &'a Scl,
    ln_id: LnId,
    data_set_names: &[S],
    service_type: Option<ServiceType>,
) -> Vec<LocatedControlBlock<'a>> {
    let ln = scl.ln(ln_id);
    let ied_name = scl.ied_of(ln_id.ld).name.as_str();
    let ld_inst = scl.ld(ln_id.ld).inst.as_str();
    control_blocks_for(ln, data_set_names, service_type)
        .into_iter()
        .map(|control_block| LocatedControlBlock {
            ied_name,
            ld_inst,
            ln,
            control_block,
        })
        .collect()
}

/// Whether `ln` holds a control block of this kind and name
pub fn has_control_block(ln: &LogicalNode, name: &str, kind: ControlBlockKind) -> bool {
    ln.control(kind, name).is_some()
}

/// Target entry designating a logical node as a subscriber
pub fn target_ln_of(scl: &Scl, ln_id: LnId) -> TargetLn {
    let ln = scl.ln(ln_id);
    TargetLn {
        ap_ref: Some(scl.access_point_of(ln_id.ld).name.clone()),
        ied_name: scl.ied_of(ln_id.ld).name.clone(),
        ld_inst: scl.ld(ln_id.ld).inst.clone(),
        ln_inst: non_blank(Some(&ln.ln_inst)),
        ln_class: ln.ln_class.clone(),
        prefix: ln.prefix.clone(),
    }
}

/// Register `target` on the control block unless an equal entry exists.
///
/// Report control blocks get an `RptEnabled` (max 1) when they have none.
/// Returns whether the target was added.
pub fn add_target_if_not_exists(cb: &mut ControlBlock, target: TargetLn) -> bool {
    let kind = cb.kind();
    let targets = match &mut cb.subscribers {
        Subscribers::Goose(t) | Subscribers::Smv(t) => t,
        Subscribers::Report(rpt) => &mut rpt.get_or_insert_with(RptEnabled::default).client_lns,
    };
    if targets.iter().any(|t| t.same_as(&target)) {
        return false;
    }
    debug!(
        "{} {} gets target {}/{}{}",
        kind,
        cb.name,
        target.ied_name,
        target.ld_inst,
        target.ln_class
    );
    targets.push(target);
    true
}

/// `ldName/prefix lnClass lnInst.cbName`, blank parts omitted
pub fn control_block_id(ld_name: &str, ln: &LogicalNode, cb_name: &str) -> String {
    format!(
        "{}/{}{}{}.{}",
        ld_name.trim(),
        ln.prefix.as_deref().unwrap_or("").trim(),
        ln.ln_class,
        ln.ln_inst.trim(),
        cb_name.trim()
    )
}

fn class_name(kind: ControlBlockKind) -> &'static str {
    match kind {
        ControlBlockKind::Goose => "GooseControlBlock",
        ControlBlockKind::Smv => "SMVControlBlock",
        ControlBlockKind::Report => "ReportControlBlock",
    }
}

fn can_create_data_set(scl: &Scl, ld: LdId, kind: ControlBlockKind) -> bool {
    scl.access_point_of(ld)
        .services
        .as_ref()
        .and_then(|s| s.settings_for(kind))
        .map(|s| s.can_create_data_set())
        .unwrap_or(false)
}

fn can_create_control_block(scl: &Scl, ld: LdId, kind: ControlBlockKind) -> bool {
    scl.access_point_of(ld)
        .services
        .as_ref()
        .and_then(|s| s.settings_for(kind))
        .map(|s| s.can_create_control_block())
        .unwrap_or(false)
}

/// Dataset `name` of the logical node, created when missing.
///
/// Creation requires the access point to allow dataset configuration for
/// this kind of control block.
pub fn create_data_set_if_not_exists<'a>(
    scl: &'a mut Scl,
    ln_id: LnId,
    name: &str,
    kind: ControlBlockKind,
) -> Result<&'a mut DataSet> {
    if let Some(pos) = scl.ln(ln_id).data_sets.iter().position(|ds| ds.name == name) {
        return Ok(&mut scl.ln_mut(ln_id).data_sets[pos]);
    }
    if !can_create_data_set(scl, ln_id.ld, kind) {
        return Err(Error::scd(format!(
            "IED/AccessPoint does not have capability to create DataSet of type {} in {}",
            kind,
            scl.ln_xpath(ln_id)
        )));
    }
    debug!("DataSet {} created in {}", name, scl.ln_xpath(ln_id));
    let data_sets = &mut scl.ln_mut(ln_id).data_sets;
    data_sets.push(DataSet::new(name));
    let last = data_sets.len() - 1;
    Ok(&mut data_sets[last])
}

fn validate_control_block(cb: &ControlBlock) -> Result<()> {
    if is_blank(cb.id.as_deref()) {
        return Err(Error::scd("A required field is missing: ID "));
    }
    if cb.name.trim().is_empty() {
        return Err(Error::scd("A required field is missing:  name"));
    }
    if cb
        .targets()
        .iter()
        .any(|t| t.ied_name.trim().is_empty() || t.ld_inst.trim().is_empty())
    {
        return Err(Error::scd(
            "Control block destination IEDs are not well defined",
        ));
    }
    Ok(())
}

/// Add a control block to a logical node.
///
/// Checks, in order: required fields, LN0 placement of GOOSE/SMV, the
/// access point capability, uniqueness of the name, and existence of the
/// published dataset.
pub fn add_control_block(scl: &mut Scl, ln_id: LnId, cb: ControlBlock) -> Result<&mut ControlBlock> {
    validate_control_block(&cb)?;
    let kind = cb.kind();
    let xpath = scl.ln_xpath(ln_id);
    let ln = scl.ln(ln_id);

    if kind.ln0_only() && !ln.is_ln0() {
        return Err(Error::unsupported(format!(
            "Cannot create ControlBlock {} {} because {} is only allowed in LN0, not in {}",
            class_name(kind),
            cb.name,
            kind.tag(),
            xpath
        )));
    }
    if !can_create_control_block(scl, ln_id.ld, kind) {
        return Err(Error::scd(format!(
            "Cannot create ControlBlock {} {} because IED/AccessPoint does not have capability to create ControlBlock of type {} in {}",
            class_name(kind),
            cb.name,
            kind,
            xpath
        )));
    }
    if has_control_block(ln, &cb.name, kind) {
        return Err(Error::scd(format!(
            "Cannot create ControlBlock {} {} because it already exists in {}",
            class_name(kind),
            cb.name,
            xpath
        )));
    }
    let dat_set = cb.dat_set.as_deref().unwrap_or("");
    if ln.data_set(dat_set).is_none() {
        return Err(Error::scd(format!(
            "Cannot create ControlBlock {} {} because target DataSet {} does not exists in {}",
            class_name(kind),
            cb.name,
            dat_set,
            xpath
        )));
    }

    debug!("{} {} created in {}", kind.tag(), cb.name, xpath);
    let controls = &mut scl.ln_mut(ln_id).controls;
    controls.push(cb);
    let last = controls.len() - 1;
    Ok(&mut controls[last])
}

/// Control block of this kind and name, created when missing.
///
/// An existing control block keeps its id and dataset.
pub fn create_control_block_if_not_exists<'a>(
    scl: &'a mut Scl,
    ln_id: LnId,
    cb_name: &str,
    id: &str,
    dat_set: &str,
    kind: ControlBlockKind,
) -> Result<&'a mut ControlBlock> {
    let allowed = scl.ln(ln_id).is_ln0() || !kind.ln0_only();
    let existing = scl
        .ln(ln_id)
        .controls
        .iter()
        .position(|cb| allowed && cb.kind() == kind && cb.name == cb_name);
    if let Some(pos) = existing {
        return Ok(&mut scl.ln_mut(ln_id).controls[pos]);
    }
    let mut cb = ControlBlock::new(kind, cb_name, Some(dat_set.to_string()));
    cb.id = Some(id.to_string());
    add_control_block(scl, ln_id, cb)
}

/// Clear datasets and control blocks of every LN0 and LN
pub fn remove_all_control_blocks_and_datasets(scl: &mut Scl) {
    for ld in scl.ld_ids() {
        for ln in scl.ln_ids(ld) {
            let ln = scl.ln_mut(ln);
            ln.data_sets.clear();
            ln.controls.clear();
        }
    }
}

/// Locator of an LN0 ExtRef, by description
pub fn ext_ref_xpath(scl: &Scl, ln_id: LnId, desc: Option<&str>) -> String {
    format!(
        "{}/Inputs/ExtRef[{}]",
        scl.ln_xpath(ln_id),
        xpath_attribute_filter("desc", desc)
    )
}

/// Publication a subscriber ExtRef needs on its source device
#[derive(Debug)]
struct Provision {
    locator: String,
    source: LdId,
    kind: ControlBlockKind,
    fcdas: Vec<Fcda>,
    subscriber: TargetLn,
}

fn binding_attributes_present(ext_ref: &ExtRef) -> bool {
    !is_blank(ext_ref.ied_name.as_deref())
        && !is_blank(ext_ref.desc.as_deref())
        && !is_blank(ext_ref.ld_inst.as_deref())
        && !is_blank(ext_ref.ln_class.as_deref())
        && !is_blank(ext_ref.do_name.as_deref())
}

fn source_attributes(
    scl: &Scl,
    ext_ref: &ExtRef,
    locator: &str,
) -> std::result::Result<(LdId, Vec<DataAttributeRef>), ReportItem> {
    let src_ied_name = ext_ref.ied_name.as_deref().unwrap_or("");
    let src_ied = scl
        .ied_index(src_ied_name)
        .map_err(|e| ReportItem::from_error(locator, &e))?;
    let ld_inst = ext_ref.ld_inst.as_deref().unwrap_or("");
    let source = scl.find_ld_in(src_ied, ld_inst).map_err(|_| {
        ReportItem::warning(
            locator,
            format!(
                "The signal ExtRef ExtRefldinst does not match any LDevice with same inst attribute in source IED {}",
                scl.ieds[src_ied].xpath()
            ),
        )
    })?;
    let not_found = || {
        ReportItem::warning(
            locator,
            format!(
                "The signal ExtRef lninst, doName or daName does not match any source in LDevice {}",
                scl.ld_xpath(source)
            ),
        )
    };
    let src_ln = scl
        .find_ln(
            source,
            ext_ref.ln_class.as_deref().unwrap_or(""),
            ext_ref.ln_inst.as_deref(),
            ext_ref.prefix.as_deref(),
        )
        .map_err(|_| not_found())?;
    let filter = DataAttributeRef::new(
        ext_ref.do_name.as_deref().unwrap_or(""),
        ext_ref.da_name.as_deref().unwrap_or(""),
    );
    let attrs = resolve_attributes(scl, src_ln, &filter, false)
        .map_err(|e| ReportItem::from_error(locator, &e))?;
    if attrs.is_empty() {
        return Err(not_found());
    }
    let attrs = attrs
        .into_iter()
        .filter(|a| matches!(a.fc, Some(Fc::ST) | Some(Fc::MX)))
        .collect();
    Ok((source, attrs))
}

fn plan_provision(
    scl: &Scl,
    holder: LnId,
    ext_ref: &ExtRef,
    allowed: &AllowedFcdas,
) -> std::result::Result<Option<Provision>, ReportItem> {
    let locator = ext_ref_xpath(scl, holder, ext_ref.desc.as_deref());
    let (source, attrs) = source_attributes(scl, ext_ref, &locator)?;
    let kind = match ext_ref.service_type {
        Some(ServiceType::Goose) => ControlBlockKind::Goose,
        Some(ServiceType::Smv) => ControlBlockKind::Smv,
        Some(ServiceType::Report) => return Ok(None),
        Some(other) => {
            return Err(ReportItem::fatal(
                locator,
                format!("The signal ExtRef ServiceType attribute is unexpected : {}", other),
            ))
        }
        None => {
            return Err(ReportItem::fatal(
                locator,
                "The signal ExtRef is missing ServiceType attribute",
            ))
        }
    };
    let src_ld_inst = scl.ld(source).inst.clone();
    let fcdas: Vec<Fcda> = attrs
        .iter()
        .filter_map(|a| {
            let fc = a.fc?;
            let (do_ref, da_ref) = (a.do_ref(), a.da_ref());
            if !allowed.is_allowed(&a.ln_class, &do_ref, &da_ref, fc) {
                return None;
            }
            Some(Fcda::new(
                &src_ld_inst,
                a.prefix.as_deref(),
                &a.ln_class,
                a.ln_inst.as_deref(),
                &do_ref,
                Some(&da_ref),
                fc,
            ))
        })
        .collect();
    if fcdas.is_empty() {
        debug!("{}: no allowed source attribute to publish", locator);
        return Ok(None);
    }
    Ok(Some(Provision {
        locator,
        source,
        kind,
        fcdas,
        subscriber: target_ln_of(scl, holder),
    }))
}

fn apply_provision(scl: &mut Scl, provision: Provision) -> Result<()> {
    let ln0 = LnId {
        ld: provision.source,
        slot: LnSlot::Zero,
    };
    let suffix = match provision.kind {
        ControlBlockKind::Smv => "S",
        _ => "G",
    };
    let src_ld_inst = scl.ld(provision.source).inst.clone();
    let ds_name = format!("DS_{}_{}", src_ld_inst, suffix);
    let cb_name = format!("CB_{}_{}", src_ld_inst, suffix);

    let data_set = create_data_set_if_not_exists(scl, ln0, &ds_name, provision.kind)?;
    for fcda in provision.fcdas {
        data_set.create_fcda_if_not_exists(fcda);
    }
    let id = control_block_id(&ld_name(scl, provision.source), scl.ln(ln0), &cb_name);
    let cb = create_control_block_if_not_exists(scl, ln0, &cb_name, &id, &ds_name, provision.kind)?;
    add_target_if_not_exists(cb, provision.subscriber);
    Ok(())
}

/// Create, on each source device, the datasets and control blocks feeding
/// the externally bound LN0 ExtRefs of the document.
///
/// Only ST and MX attributes listed in `allowed` are published; report
/// subscriptions are left untouched. Per ExtRef problems become report
/// items and do not stop the run.
pub fn create_data_sets_and_control_blocks(
    scl: &mut Scl,
    allowed: &AllowedFcdas,
) -> Result<Vec<ReportItem>> {
    allowed.ensure_not_empty()?;

    let mut report = Vec::new();
    let mut provisions = Vec::new();
    for ld in scl.ld_ids() {
        let holder = LnId {
            ld,
            slot: LnSlot::Zero,
        };
        let holder_ied = &scl.ied_of(ld).name;
        for ext_ref in &scl.ln(holder).inputs {
            if !binding_attributes_present(ext_ref)
                || ext_ref.ied_name.as_deref() == Some(holder_ied.as_str())
            {
                continue;
            }
            match plan_provision(scl, holder, ext_ref, allowed) {
                Ok(Some(p)) => provisions.push(p),
                Ok(None) => {}
                Err(item) => {
                    warn!("{}", item);
                    report.push(item);
                }
            }
        }
    }

    for provision in provisions {
        let locator = provision.locator.clone();
        if let Err(e) = apply_provision(scl, provision) {
            error!("{}: {}", locator, e);
            report.push(ReportItem::from_error(locator, &e));
        }
    }
    Ok(report)
}
