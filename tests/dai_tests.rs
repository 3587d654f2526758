//! Integration tests for DAI resolution and updates on loaded SCL documents
//!
//! Each test loads an inline SCL fixture through the XML boundary and
//! drives the path tracker, the template catalog and the DAI updater.

use pretty_assertions::assert_eq;
use sclkit::catalog::DataAttributeRef;
use sclkit::ln::{create_chain_if_not_exists, resolve_attributes, update_device_dai};
use sclkit::loader::{load_str, save};
use sclkit::model::{LnId, Scl};
use sclkit::names::{DaTypeName, DoTypeName};
use sclkit::tracker::{find_dai, DaiTracker, MatchResult};
use sclkit::Error;

const SCD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL" version="2007" revision="B">
  <IED name="IED1">
    <AccessPoint name="AP1">
      <Services>
        <SettingGroups><ConfSG/></SettingGroups>
      </Services>
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LN0T">
            <DOI name="Mod"><DAI name="stVal"><Val>on</Val></DAI></DOI>
          </LN0>
          <LN lnClass="PTOC" inst="1" lnType="PTOC_T">
            <DOI name="Do1">
              <DAI name="da1" valImport="true"><Val sGroup="1">20</Val></DAI>
            </DOI>
            <DOI name="Str">
              <SDI name="sdo1">
                <DAI name="stVal"><Val>false</Val></DAI>
              </SDI>
            </DOI>
          </LN>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <DataTypeTemplates>
    <LNodeType id="LN0T" lnClass="LLN0"><DO name="Mod" type="ModT"/></LNodeType>
    <LNodeType id="PTOC_T" lnClass="PTOC">
      <DO name="Do1" type="ASG_T"/>
      <DO name="Str" type="ACD_T"/>
      <DO name="NamPlt" type="LPL_T"/>
      <DO name="TotW" type="MV_T"/>
    </LNodeType>
    <DOType id="ModT" cdc="ENC">
      <DA name="stVal" fc="ST" bType="Enum" type="BehaviourModeKind"/>
    </DOType>
    <DOType id="ASG_T" cdc="ASG">
      <DA name="da1" fc="SG" bType="FLOAT32" valImport="true"/>
      <DA name="minVal" fc="CF" bType="FLOAT32"><Val>0</Val></DA>
      <DA name="maxVal" fc="CF" bType="FLOAT32"><Val>100</Val></DA>
      <DA name="stepSize" fc="CF" bType="FLOAT32"><Val>5</Val></DA>
    </DOType>
    <DOType id="ACD_T" cdc="ACD">
      <SDO name="sdo1" type="SPS_T"/>
    </DOType>
    <DOType id="SPS_T" cdc="SPS">
      <DA name="stVal" fc="ST" bType="BOOLEAN"/>
      <DA name="q" fc="ST" bType="Quality"/>
    </DOType>
    <DOType id="LPL_T" cdc="LPL">
      <DA name="vendor" fc="DC" bType="VisString255" valImport="false"/>
    </DOType>
    <DOType id="MV_T" cdc="MV">
      <DA name="mag" fc="MX" bType="FLOAT32" valImport="true"/>
    </DOType>
    <EnumType id="BehaviourModeKind">
      <EnumVal ord="1">on</EnumVal>
      <EnumVal ord="5">off</EnumVal>
    </EnumType>
  </DataTypeTemplates>
</SCL>"#;

fn ptoc(scl: &Scl) -> LnId {
    let ld = scl.find_ld("IED1", "LD1").unwrap();
    scl.find_ln(ld, "PTOC", Some("1"), None).unwrap()
}

fn da1(value: &str) -> DataAttributeRef {
    DataAttributeRef::new("Do1", "da1")
        .with_ln("PTOC", Some("1"), None)
        .with_ln_type("PTOC_T")
        .with_value(1, value)
}

fn da1_values(scl: &Scl) -> Vec<(u32, String)> {
    let ln = scl.ln(ptoc(scl));
    let dai = find_dai(&ln.data, &DoTypeName::new("Do1"), &DaTypeName::new("da1")).unwrap();
    ln.data
        .dai(dai)
        .unwrap()
        .values
        .iter()
        .map(|v| (v.s_group, v.value.clone()))
        .collect()
}

#[test]
fn test_bounded_setting_accepts_value_in_range() {
    let mut scl = load_str(SCD).unwrap();
    update_device_dai(&mut scl, "IED1", "LD1", &da1("55")).unwrap();
    assert_eq!(da1_values(&scl), vec![(1, "55".to_string())]);
}

#[test]
fn test_bounded_setting_rejects_value_above_max() {
    let mut scl = load_str(SCD).unwrap();
    let err = update_device_dai(&mut scl, "IED1", "LD1", &da1("105")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "The DA(da1) value(105.000000) must be less than(100.000000)"
    );
    assert_eq!(da1_values(&scl), vec![(1, "20".to_string())]);
}

#[test]
fn test_bounded_setting_rejects_value_off_step() {
    let mut scl = load_str(SCD).unwrap();
    let err = update_device_dai(&mut scl, "IED1", "LD1", &da1("53")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "The DA(da1) value(53.000000) divisible by (5.000000)"
    );
}

#[test]
fn test_partial_match_is_completed() {
    let mut scl = load_str(SCD).unwrap();
    let id = ptoc(&scl);
    let do_name = DoTypeName::new("Str.sdo1");
    let da_name = DaTypeName::new("q");
    {
        let ln = scl.ln(id);
        let mut tracker = DaiTracker::new(&ln.data, &do_name, &da_name);
        assert_eq!(tracker.search(), MatchResult::PartialMatch);
        assert_eq!(tracker.do_index(), 0);
    }

    let dai = create_chain_if_not_exists(scl.ln_mut(id), "Str.sdo1.q", false).unwrap();

    let ln = scl.ln(id);
    assert_eq!(ln.data.dai(dai).unwrap().val_import, Some(false));
    let mut tracker = DaiTracker::new(&ln.data, &do_name, &da_name);
    assert_eq!(tracker.search(), MatchResult::FullMatch);
    // The existing SDI was reused, only the DAI was added
    let doi = ln.data.doi("Str").unwrap();
    let sdi = ln.data.sdi(doi, "sdo1").unwrap();
    assert_eq!(ln.data.children(sdi).len(), 2);
}

fn non_updatable(do_ref: &str, da_ref: &str) -> DataAttributeRef {
    DataAttributeRef::new(do_ref, da_ref)
        .with_ln("PTOC", Some("1"), None)
        .with_ln_type("PTOC_T")
        .with_value(0, "x")
}

#[test]
fn test_non_updatable_attribute_is_rejected() {
    let mut scl = load_str(SCD).unwrap();
    let before = scl.clone();

    let err = update_device_dai(&mut scl, "IED1", "LD1", &non_updatable("NamPlt", "vendor"))
        .unwrap_err();
    assert!(matches!(err, Error::Scd(_)));
    assert_eq!(
        err.to_string(),
        "DAI(vendor) cannot be updated : valImport(false) /SCL/IED[@name=\"IED1\"]/AccessPoint/Server/LDevice[@inst=\"LD1\"]/LN[@lnClass=\"PTOC\" and @inst=\"1\" and not(@prefix)]/DOI[@name=\"NamPlt\"]/DAI[@name=\"vendor\"]"
    );

    // Measured values are never importable, whatever their valImport
    let err = update_device_dai(&mut scl, "IED1", "LD1", &non_updatable("TotW", "mag"))
        .unwrap_err();
    assert!(err.to_string().starts_with("DAI(mag) cannot be updated : valImport(false) "));

    // Nothing was created by the refused writes
    assert_eq!(scl, before);
}

#[test]
fn test_update_is_idempotent() {
    let mut scl = load_str(SCD).unwrap();
    update_device_dai(&mut scl, "IED1", "LD1", &da1("40")).unwrap();
    let snapshot = scl.clone();
    update_device_dai(&mut scl, "IED1", "LD1", &da1("40")).unwrap();
    assert_eq!(scl, snapshot);
}

#[test]
fn test_resolved_setting_group_attribute_is_importable() {
    let scl = load_str(SCD).unwrap();
    let filter = DataAttributeRef::new("Do1", "da1");
    let refs = resolve_attributes(&scl, ptoc(&scl), &filter, true).unwrap();
    assert_eq!(refs.len(), 1);
    assert!(refs[0].val_import);
    assert_eq!(refs[0].values.get(&1).map(String::as_str), Some("20"));
    assert_eq!(refs[0].obj_ref("IED1", "LD1"), "IED1LD1/PTOC1.Do1.da1");
}

#[test]
fn test_updated_document_survives_save() {
    let mut scl = load_str(SCD).unwrap();
    update_device_dai(&mut scl, "IED1", "LD1", &da1("70")).unwrap();
    let reloaded = load_str(&save(&scl).unwrap()).unwrap();
    assert_eq!(da1_values(&reloaded), vec![(1, "70".to_string())]);
}
