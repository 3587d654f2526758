//! Cardinality ceilings of access points
//!
//! Servers declare how many datasets, FCDAs per dataset and control blocks
//! they can host; clients declare how many FCDAs and control blocks they
//! can subscribe to. A ceiling of `-1`, or no ceiling at all, means
//! unlimited.

use log::{error, warn};

use crate::error::{Error, Result};
use crate::model::{
    AccessPoint, ControlBlockKind, ExtRef, LnId, LnSlot, Scl, ServiceType, Services, LLN0,
};
use crate::report::ReportItem;

/// Ceiling value meaning "no limit"
pub const UNLIMITED: i64 = -1;

/// Whether `count` exceeds `max`; negative or absent ceilings never do
pub fn exceeds(count: usize, max: Option<i64>) -> bool {
    match max {
        Some(max) if max >= 0 => count as u64 > max as u64,
        _ => false,
    }
}

fn check(count: usize, max: Option<i64>, locator: &str, subject: String) -> Option<ReportItem> {
    if !exceeds(count, max) {
        return None;
    }
    let max = max.unwrap_or(UNLIMITED);
    Some(ReportItem::fatal(
        locator,
        format!("{}: {} > {} max", subject, count, max),
    ))
}

/// Ceilings a server access point declares for itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerLimits {
    /// Maximum number of datasets
    pub max_data_sets: Option<i64>,
    /// Maximum number of FCDAs per dataset
    pub max_fcdas: Option<i64>,
    /// Maximum number of report control blocks
    pub max_reports: Option<i64>,
    /// Maximum number of GOOSE control blocks
    pub max_goose: Option<i64>,
    /// Maximum number of SMV control blocks
    pub max_smv: Option<i64>,
}

impl ServerLimits {
    /// Read the ceilings of a Services section
    pub fn from_services(services: Option<&Services>) -> Self {
        let Some(services) = services else {
            return Self::default();
        };
        Self {
            max_data_sets: services.conf_data_set.and_then(|c| c.max),
            max_fcdas: services.conf_data_set.and_then(|c| c.max_attributes),
            max_reports: services.conf_report_control,
            max_goose: services.goose,
            max_smv: services.smv_sc,
        }
    }

    /// Ceiling for a control block kind
    pub fn max_controls(&self, kind: ControlBlockKind) -> Option<i64> {
        match kind {
            ControlBlockKind::Report => self.max_reports,
            ControlBlockKind::Goose => self.max_goose,
            ControlBlockKind::Smv => self.max_smv,
        }
    }
}

/// Ceilings a client access point declares in ClientServices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientLimits {
    /// Maximum number of subscribed FCDAs
    pub max_fcdas: Option<i64>,
    /// Maximum number of subscribed report control blocks
    pub max_reports: Option<i64>,
    /// Maximum number of subscribed GOOSE control blocks
    pub max_goose: Option<i64>,
    /// Maximum number of subscribed SMV control blocks
    pub max_smv: Option<i64>,
}

impl ClientLimits {
    /// Read the ceilings of a Services section
    pub fn from_services(services: Option<&Services>) -> Self {
        let Some(client) = services.and_then(|s| s.client_services) else {
            return Self::default();
        };
        Self {
            max_fcdas: client.max_attributes,
            max_reports: client.max_reports,
            max_goose: client.max_goose,
            max_smv: client.max_smv,
        }
    }

    /// Ceiling for a control block kind
    pub fn max_controls(&self, kind: ControlBlockKind) -> Option<i64> {
        match kind {
            ControlBlockKind::Report => self.max_reports,
            ControlBlockKind::Goose => self.max_goose,
            ControlBlockKind::Smv => self.max_smv,
        }
    }
}

fn kind_label(kind: ControlBlockKind) -> &'static str {
    match kind {
        ControlBlockKind::Report => "Report",
        ControlBlockKind::Goose => "GOOSE",
        ControlBlockKind::Smv => "SMV",
    }
}

const KINDS: [ControlBlockKind; 3] = [
    ControlBlockKind::Report,
    ControlBlockKind::Goose,
    ControlBlockKind::Smv,
];

/// Check the server ceilings of an access point: FCDAs per dataset, then
/// datasets, then control blocks of each kind, all counted over LN0 and
/// every LN of the hosted devices.
pub fn check_server_limits(ied_name: &str, ied_xpath: &str, ap: &AccessPoint) -> Vec<ReportItem> {
    let limits = ServerLimits::from_services(ap.services.as_ref());
    let locator = ap.xpath(ied_xpath);
    let mut items = Vec::new();

    for ld in ap.ldevices() {
        for ds in ld.logical_nodes().flat_map(|ln| ln.data_sets.iter()) {
            items.extend(check(
                ds.fcdas.len(),
                limits.max_fcdas,
                &locator,
                format!(
                    "There are too much FCDA for the DataSet {} for the LDevice {} in IED {}",
                    ds.name, ld.inst, ied_name
                ),
            ));
        }
    }

    let lns = || ap.ldevices().iter().flat_map(|ld| ld.logical_nodes());
    let data_sets: usize = lns().map(|ln| ln.data_sets.len()).sum();
    items.extend(check(
        data_sets,
        limits.max_data_sets,
        &locator,
        format!("There are too much DataSets for the IED {}", ied_name),
    ));
    for kind in KINDS {
        let count: usize = lns().map(|ln| ln.controls_of(kind).count()).sum();
        items.extend(check(
            count,
            limits.max_controls(kind),
            &locator,
            format!(
                "There are too much {} Control Blocks for the IED {}",
                kind_label(kind),
                ied_name
            ),
        ));
    }
    items
}

/// ExtRefs of the access point LN0s sourced from a control block, with a
/// service type, deduplicated on the control block feeding them. ExtRefs
/// sourced without a service type are reported and left out.
pub fn subscribed_ext_refs<'a>(ap: &'a AccessPoint, locator: &str) -> (Vec<&'a ExtRef>, Vec<ReportItem>) {
    let mut items = Vec::new();
    let mut kept: Vec<&ExtRef> = Vec::new();
    for ext_ref in ap
        .ldevices()
        .iter()
        .flat_map(|ld| ld.ln0.inputs.iter())
        .filter(|e| e.src_cb_name.is_some())
    {
        if ext_ref.service_type.is_none() {
            let desc = ext_ref.desc.as_deref().unwrap_or("");
            warn!("ExtRef signal without ServiceType : {}", desc);
            items.push(ReportItem::warning(
                locator,
                format!("ExtRef signal without ServiceType : {}", desc),
            ));
            continue;
        }
        if !kept.iter().any(|k| k.fed_by_same_control_block(ext_ref)) {
            kept.push(ext_ref);
        }
    }
    (kept, items)
}

/// Number of FCDAs published by the control block sourcing an ExtRef
pub fn source_fcda_count(scl: &Scl, ext_ref: &ExtRef) -> Result<usize> {
    let ied = scl.ied_index(ext_ref.ied_name.as_deref().unwrap_or(""))?;
    let ld_inst = ext_ref
        .src_ld_inst
        .as_deref()
        .or(ext_ref.ld_inst.as_deref())
        .unwrap_or("");
    let ld = scl.find_ld_in(ied, ld_inst)?;
    let ln_id = match ext_ref.src_ln_class.as_deref() {
        None | Some(LLN0) => LnId {
            ld,
            slot: LnSlot::Zero,
        },
        Some(class) => scl.find_ln(
            ld,
            class,
            ext_ref.src_ln_inst.as_deref(),
            ext_ref.src_prefix.as_deref(),
        )?,
    };
    let ln = scl.ln(ln_id);
    let cb_name = ext_ref.src_cb_name.as_deref().unwrap_or("");
    let control = ext_ref
        .service_type
        .and_then(|st| st.control_block_kind())
        .and_then(|kind| ln.control(kind, cb_name))
        .ok_or_else(|| {
            Error::scd(format!(
                "Control Block {} not found in {}",
                cb_name,
                scl.ln_xpath(ln_id)
            ))
        })?;
    Ok(control
        .dat_set
        .as_deref()
        .and_then(|name| ln.data_set(name))
        .map(|ds| ds.fcdas.len())
        .unwrap_or(0))
}

/// Check the client ceilings of an access point against the control blocks
/// its LN0 ExtRefs subscribe to
pub fn check_client_limits(scl: &Scl, ied_name: &str, ied_xpath: &str, ap: &AccessPoint) -> Vec<ReportItem> {
    let limits = ClientLimits::from_services(ap.services.as_ref());
    let (ext_refs, mut items) = subscribed_ext_refs(ap, &ap.xpath(ied_xpath));

    let mut fcdas = 0;
    for ext_ref in &ext_refs {
        match source_fcda_count(scl, ext_ref) {
            Ok(n) => fcdas += n,
            Err(e) => {
                error!("{}", e);
                items.push(ReportItem::from_error(ied_xpath, &e));
            }
        }
    }
    items.extend(check(
        fcdas,
        limits.max_fcdas,
        ied_xpath,
        format!("The Client IED {} subscribes to too much FCDA", ied_name),
    ));

    for kind in KINDS {
        let service_type: ServiceType = kind.service_type();
        let count = ext_refs
            .iter()
            .filter(|e| e.service_type == Some(service_type))
            .count();
        items.extend(check(
            count,
            limits.max_controls(kind),
            ied_xpath,
            format!(
                "The Client IED {} subscribes to too much {} Control Blocks",
                ied_name,
                kind_label(kind)
            ),
        ));
    }
    items
}

/// Server then client ceilings of every access point of every IED
pub fn analyze_data_groups(scl: &Scl) -> Vec<ReportItem> {
    let mut items = Vec::new();
    for ied in &scl.ieds {
        let xpath = ied.xpath();
        for ap in &ied.access_points {
            items.extend(check_server_limits(&ied.name, &xpath, ap));
        }
        for ap in &ied.access_points {
            items.extend(check_client_limits(scl, &ied.name, &xpath, ap));
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ClientServices, ConfDataSet, ControlBlock, DataSet, Fc, Fcda, Ied, LDevice, LogicalNode,
    };
    use crate::report::Severity;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn data_set(name: &str, size: usize) -> DataSet {
        let mut ds = DataSet::new(name);
        for i in 0..size {
            ds.create_fcda_if_not_exists(Fcda::new(
                "LD1",
                None,
                "ANCR",
                Some("1"),
                &format!("Do{}", i + 1),
                Some("stVal"),
                Fc::ST,
            ));
        }
        ds
    }

    fn server(services: Services) -> AccessPoint {
        let mut ld = LDevice::new("LD1", "LN0T");
        ld.ln0.data_sets.push(data_set("DS1", 3));
        ld.ln0.data_sets.push(data_set("DS2", 1));
        ld.ln0.controls.push(ControlBlock::new(ControlBlockKind::Goose, "CB_G1", Some("DS1".into())));
        ld.ln0.controls.push(ControlBlock::new(ControlBlockKind::Goose, "CB_G2", Some("DS2".into())));
        ld.ln0.controls.push(ControlBlock::new(ControlBlockKind::Smv, "CB_S", Some("DS2".into())));
        let mut ln = LogicalNode::ln("ANCR", "1", None, "ANCRT");
        ln.data_sets.push(data_set("DS3", 2));
        ln.controls.push(ControlBlock::new(ControlBlockKind::Report, "RCB", Some("DS3".into())));
        AccessPoint::new("AP1")
            .with_services(services)
            .with_ldevice(ld.with_ln(ln))
    }

    fn sourced(desc: &str, src_cb: &str, st: Option<ServiceType>) -> ExtRef {
        ExtRef {
            desc: Some(desc.into()),
            ied_name: Some("IED_SRV".into()),
            ld_inst: Some("LD1".into()),
            service_type: st,
            src_cb_name: Some(src_cb.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_unlimited() {
        assert!(!exceeds(1000, None));
        assert!(!exceeds(1000, Some(UNLIMITED)));
        assert!(exceeds(3, Some(2)));
        assert!(!exceeds(2, Some(2)));
    }

    #[test]
    fn test_server_limits_within() {
        let ap = server(Services::default());
        assert!(check_server_limits("IED_SRV", "/SCL/IED", &ap).is_empty());
    }

    #[test]
    fn test_server_limits_exceeded() {
        let services = Services {
            conf_data_set: Some(ConfDataSet {
                max: Some(2),
                max_attributes: Some(2),
            }),
            goose: Some(1),
            smv_sc: Some(UNLIMITED),
            conf_report_control: Some(1),
            ..Default::default()
        };
        let ap = server(services);
        let items = check_server_limits("IED_SRV", "/SCL/IED", &ap);
        let messages: Vec<_> = items.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "There are too much FCDA for the DataSet DS1 for the LDevice LD1 in IED IED_SRV: 3 > 2 max",
                "There are too much DataSets for the IED IED_SRV: 3 > 2 max",
                "There are too much GOOSE Control Blocks for the IED IED_SRV: 2 > 1 max",
            ]
        );
        assert!(items.iter().all(|i| i.severity == Severity::Fatal));
        assert_eq!(items[0].locator, "/SCL/IED/AccessPoint[@name=\"AP1\"]");
    }

    fn client_scl(client_services: ClientServices, ext_refs: Vec<ExtRef>) -> Scl {
        let mut client_ld = LDevice::new("LD1", "LN0T");
        client_ld.ln0.inputs = ext_refs;
        Scl::new()
            .with_ied(Ied::new("IED_SRV").with_access_point(server(Services::default())))
            .with_ied(
                Ied::new("IED_CLI").with_access_point(
                    AccessPoint::new("AP1")
                        .with_services(Services {
                            client_services: Some(client_services),
                            ..Default::default()
                        })
                        .with_ldevice(client_ld),
                ),
            )
    }

    #[test]
    fn test_client_limits() {
        let scl = client_scl(
            ClientServices {
                max_attributes: Some(4),
                max_goose: Some(1),
                ..Default::default()
            },
            vec![
                sourced("a", "CB_G1", Some(ServiceType::Goose)),
                // same control block as "a": deduplicated
                sourced("b", "CB_G1", Some(ServiceType::Goose)),
                sourced("c", "CB_S", Some(ServiceType::Smv)),
                sourced("d", "CB_G1", None),
            ],
        );
        let ied = &scl.ieds[1];
        let items = check_client_limits(&scl, &ied.name, &ied.xpath(), &ied.access_points[0]);
        let messages: Vec<_> = items.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages, vec!["ExtRef signal without ServiceType : d"]);
        assert_eq!(items[0].severity, Severity::Warning);
    }

    #[test]
    fn test_client_limits_exceeded() {
        let mut other_goose = sourced("b", "CB_G2", Some(ServiceType::Goose));
        other_goose.src_ln_inst = Some("x".into());
        let scl = client_scl(
            ClientServices {
                max_attributes: Some(3),
                max_goose: Some(1),
                max_smv: Some(UNLIMITED),
                ..Default::default()
            },
            vec![
                sourced("a", "CB_G1", Some(ServiceType::Goose)),
                other_goose,
                sourced("c", "CB_S", Some(ServiceType::Smv)),
            ],
        );
        let ied = &scl.ieds[1];
        let items = check_client_limits(&scl, &ied.name, &ied.xpath(), &ied.access_points[0]);
        let messages: Vec<_> = items.iter().map(|i| i.message.as_str()).collect();
        // "b" differs from "a" by srcLNInst only, which makes it another source
        assert_eq!(
            messages,
            vec![
                "The Client IED IED_CLI subscribes to too much FCDA: 5 > 3 max",
                "The Client IED IED_CLI subscribes to too much GOOSE Control Blocks: 2 > 1 max",
            ]
        );
        assert_eq!(items[0].locator, "/SCL/IED[@name=\"IED_CLI\"]");
    }

    #[test]
    fn test_unknown_source_control_block() {
        let scl = client_scl(
            ClientServices::default(),
            vec![sourced("a", "CB_X", Some(ServiceType::Goose))],
        );
        let items = analyze_data_groups(&scl);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].severity, Severity::Error);
        assert_eq!(
            items[0].message,
            "Control Block CB_X not found in /SCL/IED[@name=\"IED_SRV\"]/AccessPoint/Server/LDevice[@inst=\"LD1\"]/LN0"
        );
    }

    proptest! {
        #[test]
        fn prop_violation_iff_count_exceeds(count in 0usize..500, max in -1i64..500) {
            let item = check(count, Some(max), "/SCL", "Subject".to_string());
            if max == UNLIMITED {
                prop_assert!(item.is_none());
            } else if count as i64 > max {
                let item = item.unwrap();
                prop_assert_eq!(item.message, format!("Subject: {} > {} max", count, max));
                prop_assert_eq!(item.severity, Severity::Fatal);
            } else {
                prop_assert!(item.is_none());
            }
        }
    }
}
