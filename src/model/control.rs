//! Datasets, control blocks and ExtRef inputs

use super::templates::Fc;
use crate::error::{Error, Result};
use crate::names::{blanks_first_cmp, equals_or_both_blank, non_blank};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Class of the root logical node of a logical device
pub const LLN0: &str = "LLN0";

/// Transport used by an ExtRef subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Polling
    Poll,
    /// Report
    Report,
    /// GOOSE
    #[serde(rename = "GOOSE")]
    Goose,
    /// Sampled values
    #[serde(rename = "SMV")]
    Smv,
}

impl ServiceType {
    /// SCL spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Poll => "Poll",
            ServiceType::Report => "Report",
            ServiceType::Goose => "GOOSE",
            ServiceType::Smv => "SMV",
        }
    }

    /// Control block kind publishing for this service, if any
    pub fn control_block_kind(&self) -> Option<ControlBlockKind> {
        match self {
            ServiceType::Report => Some(ControlBlockKind::Report),
            ServiceType::Goose => Some(ControlBlockKind::Goose),
            ServiceType::Smv => Some(ControlBlockKind::Smv),
            ServiceType::Poll => None,
        }
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Poll" => Ok(ServiceType::Poll),
            "Report" => Ok(ServiceType::Report),
            "GOOSE" => Ok(ServiceType::Goose),
            "SMV" => Ok(ServiceType::Smv),
            other => Err(Error::scd(format!("Unknown service type: {}", other))),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External reference (LN input)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtRef {
    /// Signal description
    pub desc: Option<String>,
    /// Internal address
    pub int_addr: Option<String>,
    /// Expected source DO
    pub p_do: Option<String>,
    /// Expected source DA
    pub p_da: Option<String>,
    /// Expected source LN class
    pub p_ln: Option<String>,
    /// Expected service type
    pub p_serv_t: Option<ServiceType>,
    /// Bound IED
    pub ied_name: Option<String>,
    /// Bound logical device
    pub ld_inst: Option<String>,
    /// Bound LN prefix
    pub prefix: Option<String>,
    /// Bound LN class
    pub ln_class: Option<String>,
    /// Bound LN instance
    pub ln_inst: Option<String>,
    /// Bound DO
    pub do_name: Option<String>,
    /// Bound DA
    pub da_name: Option<String>,
    /// Bound service type
    pub service_type: Option<ServiceType>,
    /// Source control block logical device
    pub src_ld_inst: Option<String>,
    /// Source control block LN prefix
    pub src_prefix: Option<String>,
    /// Source control block LN class
    pub src_ln_class: Option<String>,
    /// Source control block LN instance
    pub src_ln_inst: Option<String>,
    /// Source control block name
    pub src_cb_name: Option<String>,
}

impl ExtRef {
    /// Clear all source fields
    pub fn clear_source(&mut self) {
        self.src_ld_inst = None;
        self.src_prefix = None;
        self.src_ln_class = None;
        self.src_ln_inst = None;
        self.src_cb_name = None;
    }

    /// Clear binding and source fields
    pub fn clear_binding(&mut self) {
        self.ied_name = None;
        self.ld_inst = None;
        self.prefix = None;
        self.ln_class = None;
        self.ln_inst = None;
        self.do_name = None;
        self.da_name = None;
        self.service_type = None;
        self.clear_source();
    }

    /// Source LN class, LLN0 when unset
    pub fn src_ln_class_or_lln0(&self) -> &str {
        self.src_ln_class.as_deref().unwrap_or(LLN0)
    }

    /// Whether both ExtRefs are fed by the same control block
    pub fn fed_by_same_control_block(&self, other: &ExtRef) -> bool {
        equals_or_both_blank(self.ied_name.as_deref(), other.ied_name.as_deref())
            && equals_or_both_blank(self.src_ld_inst.as_deref(), other.src_ld_inst.as_deref())
            && self.src_ln_class_or_lln0() == other.src_ln_class_or_lln0()
            && equals_or_both_blank(self.src_ln_inst.as_deref(), other.src_ln_inst.as_deref())
            && equals_or_both_blank(self.src_prefix.as_deref(), other.src_prefix.as_deref())
            && self.service_type == other.service_type
    }
}

/// Dataset member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fcda {
    /// Logical device instance
    pub ld_inst: Option<String>,
    /// LN prefix
    pub prefix: Option<String>,
    /// LN class
    pub ln_class: Option<String>,
    /// LN instance
    pub ln_inst: Option<String>,
    /// DO reference
    pub do_name: Option<String>,
    /// DA reference
    pub da_name: Option<String>,
    /// Functional constraint
    pub fc: Fc,
}

impl Fcda {
    /// Create an FCDA, blank fields become unset
    pub fn new(
        ld_inst: &str,
        prefix: Option<&str>,
        ln_class: &str,
        ln_inst: Option<&str>,
        do_name: &str,
        da_name: Option<&str>,
        fc: Fc,
    ) -> Self {
        Self {
            ld_inst: non_blank(Some(ld_inst)),
            prefix: non_blank(prefix),
            ln_class: non_blank(Some(ln_class)),
            ln_inst: non_blank(ln_inst),
            do_name: non_blank(Some(do_name)),
            da_name: non_blank(da_name),
            fc,
        }
    }

    /// Whether both FCDAs designate the same attribute
    pub fn same_as(&self, other: &Fcda) -> bool {
        self.ld_inst == other.ld_inst
            && equals_or_both_blank(self.prefix.as_deref(), other.prefix.as_deref())
            && self.ln_class == other.ln_class
            && equals_or_both_blank(self.ln_inst.as_deref(), other.ln_inst.as_deref())
            && self.do_name == other.do_name
            && equals_or_both_blank(self.da_name.as_deref(), other.da_name.as_deref())
            && self.fc == other.fc
    }
}

/// Blank instances first, then numeric ones by value, then the others
/// lexically
fn ln_inst_cmp(a: Option<&str>, b: Option<&str>) -> Ordering {
    fn rank(s: Option<&str>) -> (u8, Option<i64>, &str) {
        match s.map(str::trim).filter(|v| !v.is_empty()) {
            None => (0, None, ""),
            Some(v) => match v.parse::<i64>() {
                Ok(n) => (1, Some(n), v),
                Err(_) => (2, None, v),
            },
        }
    }
    rank(a).cmp(&rank(b))
}

/// Canonical FCDA ordering: blanks first on ldInst, prefix and lnClass,
/// numeric lnInst, then doName and daName
pub fn fcda_cmp(a: &Fcda, b: &Fcda) -> Ordering {
    blanks_first_cmp(a.ld_inst.as_deref(), b.ld_inst.as_deref())
        .then_with(|| blanks_first_cmp(a.prefix.as_deref(), b.prefix.as_deref()))
        .then_with(|| blanks_first_cmp(a.ln_class.as_deref(), b.ln_class.as_deref()))
        .then_with(|| ln_inst_cmp(a.ln_inst.as_deref(), b.ln_inst.as_deref()))
        .then_with(|| blanks_first_cmp(a.do_name.as_deref(), b.do_name.as_deref()))
        .then_with(|| blanks_first_cmp(a.da_name.as_deref(), b.da_name.as_deref()))
}

/// Named, ordered list of FCDAs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    /// Dataset name
    pub name: String,
    /// Members, kept in canonical order when added through the API
    pub fcdas: Vec<Fcda>,
}

impl DataSet {
    /// Create an empty dataset
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fcdas: Vec::new(),
        }
    }

    /// Add an FCDA unless an identical one exists; keeps the list sorted.
    /// Returns whether a member was added.
    pub fn create_fcda_if_not_exists(&mut self, fcda: Fcda) -> bool {
        if self.fcdas.iter().any(|f| f.same_as(&fcda)) {
            return false;
        }
        self.fcdas.push(fcda);
        self.fcdas.sort_by(fcda_cmp);
        true
    }
}

/// Kind of control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlBlockKind {
    /// GSEControl
    Goose,
    /// SampledValueControl
    Smv,
    /// ReportControl
    Report,
}

impl ControlBlockKind {
    /// SCL element name
    pub fn tag(&self) -> &'static str {
        match self {
            ControlBlockKind::Goose => "GSEControl",
            ControlBlockKind::Smv => "SampledValueControl",
            ControlBlockKind::Report => "ReportControl",
        }
    }

    /// Service type carried by subscribers of this kind
    pub fn service_type(&self) -> ServiceType {
        match self {
            ControlBlockKind::Goose => ServiceType::Goose,
            ControlBlockKind::Smv => ServiceType::Smv,
            ControlBlockKind::Report => ServiceType::Report,
        }
    }

    /// Whether this kind may only live on LN0
    pub fn ln0_only(&self) -> bool {
        matches!(self, ControlBlockKind::Goose | ControlBlockKind::Smv)
    }
}

impl fmt::Display for ControlBlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlBlockKind::Goose => "GSE",
            ControlBlockKind::Smv => "SAMPLED_VALUE",
            ControlBlockKind::Report => "REPORT",
        };
        f.write_str(s)
    }
}

/// Subscriber of a logical node, as registered on a control block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetLn {
    /// Access point of the subscriber
    pub ap_ref: Option<String>,
    /// Subscriber IED
    pub ied_name: String,
    /// Subscriber logical device
    pub ld_inst: String,
    /// Subscriber LN instance
    pub ln_inst: Option<String>,
    /// Subscriber LN class
    pub ln_class: String,
    /// Subscriber LN prefix
    pub prefix: Option<String>,
}

impl TargetLn {
    /// Whether both targets designate the same logical node
    pub fn same_as(&self, other: &TargetLn) -> bool {
        self.ap_ref == other.ap_ref
            && self.ied_name == other.ied_name
            && self.ld_inst == other.ld_inst
            && equals_or_both_blank(self.ln_inst.as_deref(), other.ln_inst.as_deref())
            && self.ln_class == other.ln_class
            && equals_or_both_blank(self.prefix.as_deref(), other.prefix.as_deref())
    }
}

/// Report subscription list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RptEnabled {
    /// Maximum number of clients
    pub max: u32,
    /// Registered clients
    pub client_lns: Vec<TargetLn>,
}

impl Default for RptEnabled {
    fn default() -> Self {
        Self {
            max: 1,
            client_lns: Vec::new(),
        }
    }
}

/// Subscribers of a control block; the variant gives the control block kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscribers {
    /// GOOSE subscribers (IEDName entries)
    Goose(Vec<TargetLn>),
    /// Sampled value subscribers (IEDName entries)
    Smv(Vec<TargetLn>),
    /// Report clients
    Report(Option<RptEnabled>),
}

/// GOOSE, SMV or Report control block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    /// Control block name
    pub name: String,
    /// Published dataset
    pub dat_set: Option<String>,
    /// appID, smvID or rptID
    pub id: Option<String>,
    /// Configuration revision
    pub conf_rev: u32,
    /// Kind-specific subscribers
    pub subscribers: Subscribers,
}

impl ControlBlock {
    /// Create a control block without subscribers
    pub fn new(kind: ControlBlockKind, name: impl Into<String>, dat_set: Option<String>) -> Self {
        let subscribers = match kind {
            ControlBlockKind::Goose => Subscribers::Goose(Vec::new()),
            ControlBlockKind::Smv => Subscribers::Smv(Vec::new()),
            ControlBlockKind::Report => Subscribers::Report(None),
        };
        Self {
            name: name.into(),
            dat_set,
            id: None,
            conf_rev: 0,
            subscribers,
        }
    }

    /// Kind of this control block
    pub fn kind(&self) -> ControlBlockKind {
        match self.subscribers {
            Subscribers::Goose(_) => ControlBlockKind::Goose,
            Subscribers::Smv(_) => ControlBlockKind::Smv,
            Subscribers::Report(_) => ControlBlockKind::Report,
        }
    }

    /// All registered targets, whatever the kind
    pub fn targets(&self) -> &[TargetLn] {
        match &self.subscribers {
            Subscribers::Goose(t) | Subscribers::Smv(t) => t,
            Subscribers::Report(Some(rpt)) => &rpt.client_lns,
            Subscribers::Report(None) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fcda(ld: &str, ln_class: &str, ln_inst: Option<&str>, do_name: &str) -> Fcda {
        Fcda::new(ld, None, ln_class, ln_inst, do_name, Some("stVal"), Fc::ST)
    }

    #[test]
    fn test_fcda_sorted_and_unique() {
        let mut ds = DataSet::new("DS1");
        assert!(ds.create_fcda_if_not_exists(fcda("LD1", "PTOC", Some("10"), "Op")));
        assert!(ds.create_fcda_if_not_exists(fcda("LD1", "PTOC", Some("2"), "Op")));
        assert!(ds.create_fcda_if_not_exists(fcda("LD1", "LLN0", None, "Beh")));
        assert!(!ds.create_fcda_if_not_exists(fcda("LD1", "PTOC", Some("2"), "Op")));

        let insts: Vec<_> = ds.fcdas.iter().map(|f| f.ln_inst.clone()).collect();
        assert_eq!(insts, vec![None, Some("2".into()), Some("10".into())]);
    }

    #[test]
    fn test_mixed_ln_inst_order() {
        let mut ds = DataSet::new("DS1");
        for inst in ["x", "3b", "11", "2", "1a", "10", "9", ""] {
            ds.create_fcda_if_not_exists(fcda("LD1", "PTOC", Some(inst), "Op"));
        }
        let insts: Vec<_> = ds
            .fcdas
            .iter()
            .map(|f| f.ln_inst.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(insts, vec!["", "2", "9", "10", "11", "1a", "3b", "x"]);
        for pair in ds.fcdas.windows(2) {
            assert_eq!(fcda_cmp(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_blank_fields_become_unset() {
        let f = Fcda::new("LD1", Some(" "), "PTOC", Some(""), "Op", Some(""), Fc::ST);
        assert_eq!(f.prefix, None);
        assert_eq!(f.ln_inst, None);
        assert_eq!(f.da_name, None);
    }

    #[test]
    fn test_fed_by_same_control_block() {
        let a = ExtRef {
            ied_name: Some("IED1".into()),
            src_ld_inst: Some("LD1".into()),
            src_cb_name: Some("CB1".into()),
            service_type: Some(ServiceType::Goose),
            ..Default::default()
        };
        let mut b = a.clone();
        b.src_ln_class = Some(LLN0.into());
        b.src_prefix = Some("".into());
        assert!(a.fed_by_same_control_block(&b));
        b.service_type = Some(ServiceType::Smv);
        assert!(!a.fed_by_same_control_block(&b));
    }

    #[test]
    fn test_control_block_kind_from_subscribers() {
        let cb = ControlBlock::new(ControlBlockKind::Report, "RCB", Some("DS".into()));
        assert_eq!(cb.kind(), ControlBlockKind::Report);
        assert!(cb.targets().is_empty());
        assert_eq!(RptEnabled::default().max, 1);
    }

    #[test]
    fn test_service_type_round_trip() {
        for s in ["Poll", "Report", "GOOSE", "SMV"] {
            assert_eq!(s.parse::<ServiceType>().unwrap().as_str(), s);
        }
        assert!("SV".parse::<ServiceType>().is_err());
    }
}
