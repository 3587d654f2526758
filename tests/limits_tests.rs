//! Integration tests for the cardinality analyzer on loaded SCL documents

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sclkit::limits::{analyze_data_groups, exceeds, UNLIMITED};
use sclkit::loader::load_str;
use sclkit::report::{has_fatal, to_json};
use sclkit::Severity;

fn station(server_services: &str, client_services: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL" version="2007" revision="B">
  <IED name="IED_PUB">
    <AccessPoint name="AP1">
      <Services>{server_services}</Services>
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LN0T">
            <DataSet name="DS_G">
              <FCDA ldInst="LD1" lnClass="PTOC" lnInst="1" doName="Op" daName="general" fc="ST"/>
              <FCDA ldInst="LD1" lnClass="PTOC" lnInst="1" doName="Op" daName="q" fc="ST"/>
              <FCDA ldInst="LD1" lnClass="PTOC" lnInst="2" doName="Op" daName="general" fc="ST"/>
            </DataSet>
            <DataSet name="DS_S">
              <FCDA ldInst="LD1" lnClass="MMXU" lnInst="1" doName="TotW" daName="mag.f" fc="MX"/>
            </DataSet>
            <GSEControl name="CB_G" datSet="DS_G" appID="G1"/>
            <SampledValueControl name="CB_S" datSet="DS_S" smvID="S1"/>
          </LN0>
          <LN lnClass="PTOC" inst="1" lnType="PTOC_T">
            <DataSet name="DS_R">
              <FCDA ldInst="LD1" lnClass="PTOC" lnInst="1" doName="Op" daName="general" fc="ST"/>
            </DataSet>
            <ReportControl name="RCB1" datSet="DS_R" rptID="R1"/>
            <ReportControl name="RCB2" datSet="DS_R" rptID="R2"/>
          </LN>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <IED name="IED_SUB">
    <AccessPoint name="AP1">
      <Services>{client_services}</Services>
      <Server>
        <LDevice inst="LD1">
          <LN0 lnClass="LLN0" inst="" lnType="LN0T">
            <Inputs>
              <ExtRef desc="g1" iedName="IED_PUB" ldInst="LD1" lnClass="PTOC" lnInst="1" serviceType="GOOSE" srcLDInst="LD1" srcLNClass="LLN0" srcCBName="CB_G"/>
              <ExtRef desc="g2" iedName="IED_PUB" ldInst="LD1" lnClass="PTOC" lnInst="2" serviceType="GOOSE" srcLDInst="LD1" srcLNClass="LLN0" srcCBName="CB_G"/>
              <ExtRef desc="s1" iedName="IED_PUB" ldInst="LD1" lnClass="MMXU" lnInst="1" serviceType="SMV" srcLDInst="LD1" srcCBName="CB_S"/>
              <ExtRef desc="r1" iedName="IED_PUB" ldInst="LD1" lnClass="PTOC" lnInst="1" serviceType="Report" srcLDInst="LD1" srcLNClass="PTOC" srcLNInst="1" srcCBName="RCB1"/>
              <ExtRef desc="untyped" iedName="IED_PUB" ldInst="LD1" srcCBName="CB_G"/>
              <ExtRef desc="unbound" intAddr="X" pDO="Op"/>
            </Inputs>
          </LN0>
        </LDevice>
      </Server>
    </AccessPoint>
  </IED>
  <DataTypeTemplates>
    <LNodeType id="LN0T" lnClass="LLN0"/>
  </DataTypeTemplates>
</SCL>"#
    )
}

fn messages(server_services: &str, client_services: &str) -> Vec<(Severity, String)> {
    let scl = load_str(&station(server_services, client_services)).unwrap();
    analyze_data_groups(&scl)
        .into_iter()
        .map(|i| (i.severity, i.message))
        .collect()
}

#[test]
fn test_unlimited_station_only_warns_untyped_ext_ref() {
    let found = messages(
        r#"<ConfDataSet max="-1" maxAttributes="-1"/><GOOSE max="-1"/><SMVsc max="-1"/><ConfReportControl max="-1"/>"#,
        r#"<ClientServices maxAttributes="-1" maxGOOSE="-1" maxSMV="-1" maxReports="-1"/>"#,
    );
    assert_eq!(
        found,
        vec![(
            Severity::Warning,
            "ExtRef signal without ServiceType : untyped".to_string()
        )]
    );
}

#[test]
fn test_server_ceilings() {
    let found = messages(
        r#"<ConfDataSet max="2" maxAttributes="2"/><GOOSE max="1"/><SMVsc max="0"/><ConfReportControl max="1"/>"#,
        "",
    );
    let fatal: Vec<_> = found
        .iter()
        .filter(|(s, _)| *s == Severity::Fatal)
        .map(|(_, m)| m.as_str())
        .collect();
    assert_eq!(
        fatal,
        vec![
            "There are too much FCDA for the DataSet DS_G for the LDevice LD1 in IED IED_PUB: 3 > 2 max",
            "There are too much DataSets for the IED IED_PUB: 3 > 2 max",
            "There are too much Report Control Blocks for the IED IED_PUB: 2 > 1 max",
            "There are too much SMV Control Blocks for the IED IED_PUB: 1 > 0 max",
        ]
    );
}

#[test]
fn test_client_ceilings_count_each_source_once() {
    // g1 and g2 share their source control block: 3 FCDAs from CB_G,
    // 1 from CB_S and 1 from RCB1
    let found = messages(
        "",
        r#"<ClientServices maxAttributes="4" maxGOOSE="1" maxSMV="1" maxReports="0"/>"#,
    );
    let fatal: Vec<_> = found
        .iter()
        .filter(|(s, _)| *s == Severity::Fatal)
        .map(|(_, m)| m.as_str())
        .collect();
    assert_eq!(
        fatal,
        vec![
            "The Client IED IED_SUB subscribes to too much FCDA: 5 > 4 max",
            "The Client IED IED_SUB subscribes to too much Report Control Blocks: 1 > 0 max",
        ]
    );
}

#[test]
fn test_report_is_exportable() {
    let scl = load_str(&station(r#"<GOOSE max="0"/>"#, "")).unwrap();
    let items = analyze_data_groups(&scl);
    assert!(has_fatal(&items));
    let json = to_json(&items).unwrap();
    assert!(json.contains("There are too much GOOSE Control Blocks for the IED IED_PUB: 1 > 0 max"));
}

proptest! {
    #[test]
    fn prop_unlimited_never_exceeds(count in 0usize..100_000) {
        prop_assert!(!exceeds(count, Some(UNLIMITED)));
        prop_assert!(!exceeds(count, None));
    }

    #[test]
    fn prop_exceeds_iff_greater(count in 0usize..1000, max in 0i64..1000) {
        prop_assert_eq!(exceeds(count, Some(max)), count as i64 > max);
    }
}
