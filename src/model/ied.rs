//! IEDs, access points, services, logical devices and logical nodes

use super::control::{ControlBlock, ControlBlockKind, DataSet, ExtRef, LLN0};
use super::data::DataTree;
use super::private::{PrivateStore, Privates};
use crate::names::{equals_or_both_blank, xpath_attribute_filter};
use serde::{Deserialize, Serialize};

/// Configurable capability of a service setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingMode {
    /// Fixed by the device
    Fix,
    /// Configurable offline
    Conf,
    /// Dynamically configurable
    Dyn,
}

impl SettingMode {
    /// Parse the SCL spelling
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Fix" => Some(SettingMode::Fix),
            "Conf" => Some(SettingMode::Conf),
            "Dyn" => Some(SettingMode::Dyn),
            _ => None,
        }
    }

    /// SCL spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingMode::Fix => "Fix",
            SettingMode::Conf => "Conf",
            SettingMode::Dyn => "Dyn",
        }
    }
}

/// ReportSettings, GSESettings or SMVSettings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// How control block names may be set
    pub cb_name: Option<SettingMode>,
    /// How dataset references may be set
    pub dat_set: Option<SettingMode>,
}

impl ServiceSettings {
    /// Datasets may be created (Conf or Dyn)
    pub fn can_create_data_set(&self) -> bool {
        matches!(self.dat_set, Some(SettingMode::Conf) | Some(SettingMode::Dyn))
    }

    /// Control blocks may be created (Conf)
    pub fn can_create_control_block(&self) -> bool {
        self.cb_name == Some(SettingMode::Conf)
    }
}

/// ConfDataSet ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfDataSet {
    /// Maximum number of datasets
    pub max: Option<i64>,
    /// Maximum number of FCDAs per dataset
    pub max_attributes: Option<i64>,
}

/// ClientServices ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientServices {
    /// Maximum number of subscribed FCDAs
    pub max_attributes: Option<i64>,
    /// Maximum number of subscribed report control blocks
    pub max_reports: Option<i64>,
    /// Maximum number of subscribed GOOSE control blocks
    pub max_goose: Option<i64>,
    /// Maximum number of subscribed SMV control blocks
    pub max_smv: Option<i64>,
}

/// Capabilities and ceilings of an access point.
///
/// An absent ceiling, or `-1`, means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Services {
    /// ConfDataSet
    pub conf_data_set: Option<ConfDataSet>,
    /// ConfReportControl max
    pub conf_report_control: Option<i64>,
    /// GOOSE max
    pub goose: Option<i64>,
    /// SMVsc max
    pub smv_sc: Option<i64>,
    /// ClientServices
    pub client_services: Option<ClientServices>,
    /// ReportSettings
    pub report_settings: Option<ServiceSettings>,
    /// GSESettings
    pub gse_settings: Option<ServiceSettings>,
    /// SMVSettings
    pub smv_settings: Option<ServiceSettings>,
    /// SettingGroups/ConfSG present
    pub conf_sg: bool,
}

impl Services {
    /// Settings governing a control block kind
    pub fn settings_for(&self, kind: ControlBlockKind) -> Option<&ServiceSettings> {
        match kind {
            ControlBlockKind::Report => self.report_settings.as_ref(),
            ControlBlockKind::Goose => self.gse_settings.as_ref(),
            ControlBlockKind::Smv => self.smv_settings.as_ref(),
        }
    }
}

/// Root logical node or ordinary logical node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LnKind {
    /// LN0
    Zero,
    /// LN
    Normal,
}

/// LN0 or LN with its instance data, datasets, inputs and control blocks
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalNode {
    /// LN0 or LN
    pub kind: LnKind,
    /// Logical node class
    pub ln_class: String,
    /// Instance number, empty for LN0
    pub ln_inst: String,
    /// Optional prefix
    pub prefix: Option<String>,
    /// Referenced LNodeType id
    pub ln_type: String,
    /// DOI/SDI/DAI tree
    pub data: DataTree,
    /// Datasets
    pub data_sets: Vec<DataSet>,
    /// Inputs/ExtRef entries
    pub inputs: Vec<ExtRef>,
    /// Control blocks; GOOSE and SMV ones only on LN0
    pub controls: Vec<ControlBlock>,
    /// Private metadata
    pub privates: Privates,
}

impl LogicalNode {
    /// Create an LN0
    pub fn ln0(ln_type: impl Into<String>) -> Self {
        Self::with_kind(LnKind::Zero, LLN0, "", None, ln_type)
    }

    /// Create an LN
    pub fn ln(
        ln_class: impl Into<String>,
        ln_inst: impl Into<String>,
        prefix: Option<&str>,
        ln_type: impl Into<String>,
    ) -> Self {
        Self::with_kind(LnKind::Normal, ln_class, ln_inst, prefix, ln_type)
    }

    fn with_kind(
        kind: LnKind,
        ln_class: impl Into<String>,
        ln_inst: impl Into<String>,
        prefix: Option<&str>,
        ln_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            ln_class: ln_class.into(),
            ln_inst: ln_inst.into(),
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            ln_type: ln_type.into(),
            data: DataTree::new(),
            data_sets: Vec::new(),
            inputs: Vec::new(),
            controls: Vec::new(),
            privates: Privates::new(),
        }
    }

    /// Whether this is LN0
    pub fn is_ln0(&self) -> bool {
        self.kind == LnKind::Zero
    }

    /// Whether this node has the given class, instance and prefix
    pub fn matches(&self, ln_class: &str, ln_inst: Option<&str>, prefix: Option<&str>) -> bool {
        self.ln_class == ln_class
            && equals_or_both_blank(Some(&self.ln_inst), ln_inst)
            && equals_or_both_blank(self.prefix.as_deref(), prefix)
    }

    /// `LLN0` for LN0, else prefix + lnClass + lnInst
    pub fn ref_name(&self) -> String {
        match self.kind {
            LnKind::Zero => LLN0.to_string(),
            LnKind::Normal => format!(
                "{}{}{}",
                self.prefix.as_deref().unwrap_or(""),
                self.ln_class,
                self.ln_inst
            ),
        }
    }

    /// Locator segment relative to the logical device
    pub fn xpath_segment(&self) -> String {
        match self.kind {
            LnKind::Zero => "LN0".to_string(),
            LnKind::Normal => format!(
                "LN[{} and {} and {}]",
                xpath_attribute_filter("lnClass", Some(&self.ln_class)),
                xpath_attribute_filter("inst", Some(&self.ln_inst)),
                xpath_attribute_filter("prefix", self.prefix.as_deref())
            ),
        }
    }

    /// Dataset by name
    pub fn data_set(&self, name: &str) -> Option<&DataSet> {
        self.data_sets.iter().find(|ds| ds.name == name)
    }

    /// Mutable dataset by name
    pub fn data_set_mut(&mut self, name: &str) -> Option<&mut DataSet> {
        self.data_sets.iter_mut().find(|ds| ds.name == name)
    }

    /// Control blocks of one kind; GOOSE and SMV are only ever read on LN0
    pub fn controls_of(&self, kind: ControlBlockKind) -> impl Iterator<Item = &ControlBlock> {
        let allowed = self.is_ln0() || !kind.ln0_only();
        self.controls
            .iter()
            .filter(move |cb| allowed && cb.kind() == kind)
    }

    /// Control block by kind and name
    pub fn control(&self, kind: ControlBlockKind, name: &str) -> Option<&ControlBlock> {
        self.controls_of(kind).find(|cb| cb.name == name)
    }

    /// Mutable control block by kind and name
    pub fn control_mut(&mut self, kind: ControlBlockKind, name: &str) -> Option<&mut ControlBlock> {
        let allowed = self.is_ln0() || !kind.ln0_only();
        self.controls
            .iter_mut()
            .find(|cb| allowed && cb.kind() == kind && cb.name == name)
    }
}

impl PrivateStore for LogicalNode {
    fn privates(&self) -> &Privates {
        &self.privates
    }

    fn privates_mut(&mut self) -> &mut Privates {
        &mut self.privates
    }
}

/// Logical device
#[derive(Debug, Clone, PartialEq)]
pub struct LDevice {
    /// Instance name
    pub inst: String,
    /// Optional functional name
    pub ld_name: Option<String>,
    /// Root logical node
    pub ln0: LogicalNode,
    /// Other logical nodes
    pub lns: Vec<LogicalNode>,
    /// Private metadata
    pub privates: Privates,
}

impl LDevice {
    /// Create a logical device with an LN0 of the given type
    pub fn new(inst: impl Into<String>, ln0_type: impl Into<String>) -> Self {
        Self {
            inst: inst.into(),
            ld_name: None,
            ln0: LogicalNode::ln0(ln0_type),
            lns: Vec::new(),
            privates: Privates::new(),
        }
    }

    /// Append an LN and return self
    pub fn with_ln(mut self, ln: LogicalNode) -> Self {
        self.lns.push(ln);
        self
    }

    /// LN0 followed by the other logical nodes
    pub fn logical_nodes(&self) -> impl Iterator<Item = &LogicalNode> {
        std::iter::once(&self.ln0).chain(self.lns.iter())
    }
}

impl PrivateStore for LDevice {
    fn privates(&self) -> &Privates {
        &self.privates
    }

    fn privates_mut(&mut self) -> &mut Privates {
        &mut self.privates
    }
}

/// Server of an access point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Server {
    /// Logical devices
    pub ldevices: Vec<LDevice>,
}

/// Access point of an IED
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessPoint {
    /// Access point name
    pub name: String,
    /// Declared services
    pub services: Option<Services>,
    /// Hosted server, empty for client-only access points
    pub server: Server,
}

impl AccessPoint {
    /// Create an access point hosting a server
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: None,
            server: Server::default(),
        }
    }

    /// Set services and return self
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    /// Add a logical device and return self
    pub fn with_ldevice(mut self, ld: LDevice) -> Self {
        self.server.ldevices.push(ld);
        self
    }

    /// Logical devices of the hosted server
    pub fn ldevices(&self) -> &[LDevice] {
        &self.server.ldevices
    }

    /// XPath-like locator below the IED
    pub fn xpath(&self, ied_xpath: &str) -> String {
        format!(
            "{}/AccessPoint[{}]",
            ied_xpath,
            xpath_attribute_filter("name", Some(&self.name))
        )
    }
}

/// Intelligent electronic device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ied {
    /// IED name
    pub name: String,
    /// Access points
    pub access_points: Vec<AccessPoint>,
    /// Private metadata
    pub privates: Privates,
}

impl Ied {
    /// Create an IED
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_points: Vec::new(),
            privates: Privates::new(),
        }
    }

    /// Add an access point and return self
    pub fn with_access_point(mut self, ap: AccessPoint) -> Self {
        self.access_points.push(ap);
        self
    }

    /// Logical device by instance, searched across access points
    pub fn ldevice(&self, inst: &str) -> Option<&LDevice> {
        self.access_points
            .iter()
            .flat_map(|ap| ap.ldevices())
            .find(|ld| ld.inst == inst)
    }

    /// XPath-like locator
    pub fn xpath(&self) -> String {
        format!(
            "/SCL/IED[{}]",
            xpath_attribute_filter("name", Some(&self.name))
        )
    }
}

impl PrivateStore for Ied {
    fn privates(&self) -> &Privates {
        &self.privates
    }

    fn privates_mut(&mut self) -> &mut Privates {
        &mut self.privates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_ref_name_and_xpath() {
        let ln = LogicalNode::ln("PTOC", "1", Some("P"), "T1");
        assert_eq!(ln.ref_name(), "PPTOC1");
        assert_eq!(
            ln.xpath_segment(),
            "LN[@lnClass=\"PTOC\" and @inst=\"1\" and @prefix=\"P\"]"
        );
        let ln0 = LogicalNode::ln0("T0");
        assert_eq!(ln0.ref_name(), "LLN0");
        assert_eq!(ln0.xpath_segment(), "LN0");
        let bare = LogicalNode::ln("ANCR", "1", None, "T1");
        assert!(bare.xpath_segment().ends_with("not(@prefix)]"));
    }

    #[test]
    fn test_goose_hidden_on_normal_ln() {
        let mut ln = LogicalNode::ln("PTOC", "1", None, "T1");
        ln.controls
            .push(ControlBlock::new(ControlBlockKind::Goose, "CB", None));
        assert_eq!(ln.controls_of(ControlBlockKind::Goose).count(), 0);
        assert!(ln.control(ControlBlockKind::Goose, "CB").is_none());
    }

    #[test]
    fn test_ln_matches_blank_prefix() {
        let ln = LogicalNode::ln("ANCR", "1", None, "T1");
        assert!(ln.matches("ANCR", Some("1"), Some("")));
        assert!(!ln.matches("ANCR", Some("2"), None));
    }

    #[test]
    fn test_service_capabilities() {
        let settings = ServiceSettings {
            cb_name: Some(SettingMode::Conf),
            dat_set: Some(SettingMode::Dyn),
        };
        assert!(settings.can_create_data_set());
        assert!(settings.can_create_control_block());
        assert!(!ServiceSettings::default().can_create_data_set());
    }

    #[test]
    fn test_ied_ldevice_lookup() {
        let ied = Ied::new("IED1")
            .with_access_point(AccessPoint::new("AP1").with_ldevice(LDevice::new("LD1", "T0")));
        assert!(ied.ldevice("LD1").is_some());
        assert!(ied.ldevice("LD2").is_none());
        assert_eq!(ied.xpath(), "/SCL/IED[@name=\"IED1\"]");
    }
}
