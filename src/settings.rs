//! Settings tables supplied by the caller
//!
//! The allowed-FCDA catalog lists which `(lnClass, doName, daName, fc)`
//! attributes may be published in datasets created for GOOSE and SMV
//! subscriptions. It is read from JSON:
//!
//! ```json
//! [{"lnClass": "PTOC", "doName": "Op", "daName": "general", "fc": "ST"}]
//! ```
//!
//! The control block communication table ([`CbCom`]) gives, per control
//! block kind, the APPID and MAC-Address ranges to allocate from and the
//! VLAN settings of each IED profile.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ControlBlockKind, Fc};

/// One allowed dataset member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedFcda {
    /// LN class
    pub ln_class: String,
    /// Dotted DO reference
    pub do_name: String,
    /// Dotted DA reference
    pub da_name: String,
    /// Functional constraint
    pub fc: Fc,
}

impl AllowedFcda {
    /// Create an entry
    pub fn new(
        ln_class: impl Into<String>,
        do_name: impl Into<String>,
        da_name: impl Into<String>,
        fc: Fc,
    ) -> Self {
        Self {
            ln_class: ln_class.into(),
            do_name: do_name.into(),
            da_name: da_name.into(),
            fc,
        }
    }
}

/// Catalog of attributes allowed in source datasets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedFcdas {
    entries: Vec<AllowedFcda>,
}

impl AllowedFcdas {
    /// Build a catalog from entries
    pub fn new(entries: Vec<AllowedFcda>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of entries
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Entries, in insertion order
    pub fn entries(&self) -> &[AllowedFcda] {
        &self.entries
    }

    /// Whether the catalog has no entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail when the catalog has no entry
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::Settings(
                "Accepted FCDAs list is empty, you should initialize allowed FCDA lists before"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the attribute is listed
    pub fn is_allowed(&self, ln_class: &str, do_name: &str, da_name: &str, fc: Fc) -> bool {
        self.entries.iter().any(|e| {
            e.ln_class == ln_class && e.do_name == do_name && e.da_name == da_name && e.fc == fc
        })
    }
}

/// Identity of an IED used to select its VLAN settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IedProfile {
    /// System version without its patch level, `XY.ZW`
    pub system_version: String,
    /// IED type (`BCU`, `SAMU`...)
    pub ied_type: String,
    /// IED redundancy (`None`, `A`, `B`)
    pub ied_redundancy: String,
    /// IED system version instance
    pub ied_system_version_instance: u32,
}

/// Key of a VLAN setting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCriteria {
    /// Control block kind
    pub cb_type: ControlBlockKind,
    /// IED identity
    #[serde(flatten)]
    pub profile: IedProfile,
    /// Whether the control block is bay internal (its name ends with `I`)
    pub bay_internal: bool,
}

impl NetworkCriteria {
    /// Criteria of a control block published by an IED of this profile
    pub fn new(cb_type: ControlBlockKind, profile: IedProfile, cb_name: &str) -> Self {
        Self {
            cb_type,
            profile,
            bay_internal: cb_name.ends_with('I'),
        }
    }
}

impl fmt::Display for NetworkCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Criteria[cbType={}, systemVersion={}, iedType={}, iedRedundancy={}, iedSystemVersionInstance={}, bayIntOrExt={}]",
            cb_type_name(self.cb_type),
            self.profile.system_version,
            self.profile.ied_type,
            self.profile.ied_redundancy,
            self.profile.ied_system_version_instance,
            if self.bay_internal { "BAY_INTERNAL" } else { "BAY_EXTERNAL" }
        )
    }
}

/// Name of a control block kind in the communication table
pub fn cb_type_name(kind: ControlBlockKind) -> &'static str {
    match kind {
        ControlBlockKind::Goose => "GOOSE",
        ControlBlockKind::Smv => "SV",
        ControlBlockKind::Report => "REPORT",
    }
}

/// Inclusive range of APPIDs (hexadecimal) or MAC-Addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRange {
    /// Control block kind
    pub cb_type: ControlBlockKind,
    /// First value
    pub start: String,
    /// Last value
    pub end: String,
}

/// VLAN and timing settings of a control block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VlanSetting {
    /// Selection key
    #[serde(flatten)]
    pub criteria: NetworkCriteria,
    /// VLAN identifier, up to 0xFFF
    #[serde(default)]
    pub vlan_id: Option<u16>,
    /// VLAN priority, up to 7
    #[serde(default)]
    pub vlan_priority: Option<u8>,
    /// GSE MinTime in milliseconds
    #[serde(default)]
    pub min_time: Option<u64>,
    /// GSE MaxTime in milliseconds
    #[serde(default)]
    pub max_time: Option<u64>,
}

/// Largest VLAN identifier
pub const MAX_VLAN_ID: u16 = 0x0FFF;
/// Largest VLAN priority
pub const MAX_VLAN_PRIORITY: u8 = 7;

impl VlanSetting {
    /// Fail on out-of-range VLAN values
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = self.vlan_id.filter(|id| *id > MAX_VLAN_ID) {
            return Err(Error::Settings(format!(
                "Error in Control Block communication setting file: VLAN ID must be between 0 and {}, but got : {}",
                MAX_VLAN_ID, id
            )));
        }
        if let Some(p) = self.vlan_priority.filter(|p| *p > MAX_VLAN_PRIORITY) {
            return Err(Error::Settings(format!(
                "Error in Control Block communication setting file: VLAN PRIORITY must be between 0 and {}, but got : {}",
                MAX_VLAN_PRIORITY, p
            )));
        }
        Ok(())
    }
}

/// Control block communication table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CbCom {
    /// APPID ranges, one per control block kind
    #[serde(default)]
    pub app_id_ranges: Vec<NetworkRange>,
    /// MAC-Address ranges, one per control block kind
    #[serde(default)]
    pub mac_ranges: Vec<NetworkRange>,
    /// VLAN settings
    #[serde(default)]
    pub vlans: Vec<VlanSetting>,
}

impl CbCom {
    /// Parse the JSON form of the table
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// APPID range of a control block kind
    pub fn app_id_range(&self, kind: ControlBlockKind) -> Result<&NetworkRange> {
        self.app_id_ranges
            .iter()
            .find(|r| r.cb_type == kind)
            .ok_or_else(|| {
                Error::Settings(format!(
                    "Control Block Communication setting files does not contain AppIdRange for cbType {}",
                    cb_type_name(kind)
                ))
            })
    }

    /// MAC-Address range of a control block kind
    pub fn mac_range(&self, kind: ControlBlockKind) -> Result<&NetworkRange> {
        self.mac_ranges
            .iter()
            .find(|r| r.cb_type == kind)
            .ok_or_else(|| {
                Error::Settings(format!(
                    "Control Block Communication setting files does not contain MacRange for cbType {}",
                    cb_type_name(kind)
                ))
            })
    }

    /// VLAN settings of a control block kind; the first row wins on
    /// duplicate criteria
    pub fn vlans_of(&self, kind: ControlBlockKind) -> Result<Vec<&VlanSetting>> {
        let mut out: Vec<&VlanSetting> = Vec::new();
        for vlan in self.vlans.iter().filter(|v| v.criteria.cb_type == kind) {
            vlan.validate()?;
            if !out.iter().any(|v| v.criteria == vlan.criteria) {
                out.push(vlan);
            }
        }
        Ok(out)
    }
}
