//! Typed SCL object model
//!
//! The document is an owned tree rooted at [`Scl`]. Logical devices and
//! logical nodes are addressed from the root through small copyable handles
//! ([`LdId`], [`LnId`]) so that operations can hop between IEDs without
//! holding borrows across the tree.

pub mod communication;
pub mod control;
pub mod data;
pub mod ied;
pub mod private;
pub mod templates;

pub use communication::{
    Address, Communication, ConnectedAp, ControlBlockAddress, SubNetwork,
};
pub use control::{
    fcda_cmp, ControlBlock, ControlBlockKind, DataSet, ExtRef, Fcda, RptEnabled, ServiceType,
    Subscribers, TargetLn, LLN0,
};
pub use data::{DataNode, DataTree, Dai, DeepestMatch, NodeId, NodeKind, Val, MOD_DO, ST_VAL_DA};
pub use ied::{
    AccessPoint, ClientServices, ConfDataSet, Ied, LDevice, LnKind, LogicalNode, Server,
    ServiceSettings, Services, SettingMode,
};
pub use private::{PrivateStore, Privates};
pub use templates::{
    BasicType, BdaDef, DaDef, DaType, DataTypeTemplates, DoDef, DoType, DoTypeEntry, EnumType, Fc,
    LNodeType, BOUNDED_CDCS,
};

use crate::error::{Error, Result};
use crate::names::xpath_attribute_filter;

/// Handle of a logical device: IED, access point and device positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LdId {
    /// IED position
    pub ied: usize,
    /// Access point position
    pub ap: usize,
    /// Logical device position in the server
    pub ld: usize,
}

/// Slot of a logical node inside its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LnSlot {
    /// LN0
    Zero,
    /// Position in the LN list
    Normal(usize),
}

/// Handle of a logical node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LnId {
    /// Owning logical device
    pub ld: LdId,
    /// Slot inside the device
    pub slot: LnSlot,
}

/// Root of an SCL document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scl {
    /// IEDs, in document order
    pub ieds: Vec<Ied>,
    /// Communication section
    pub communication: Communication,
    /// DataTypeTemplates section
    pub templates: DataTypeTemplates,
}

impl Scl {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an IED and return self
    pub fn with_ied(mut self, ied: Ied) -> Self {
        self.ieds.push(ied);
        self
    }

    /// Set the templates and return self
    pub fn with_templates(mut self, templates: DataTypeTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Position of an IED by name
    pub fn ied_index(&self, name: &str) -> Result<usize> {
        self.ieds
            .iter()
            .position(|ied| ied.name == name)
            .ok_or_else(|| Error::scd(format!("Unknown IED name :{}", name)))
    }

    /// IED by name
    pub fn ied(&self, name: &str) -> Result<&Ied> {
        Ok(&self.ieds[self.ied_index(name)?])
    }

    /// Handles of every logical device of an IED
    pub fn ld_ids_of(&self, ied: usize) -> Vec<LdId> {
        let mut out = Vec::new();
        for (ap_idx, ap) in self.ieds[ied].access_points.iter().enumerate() {
            for ld_idx in 0..ap.ldevices().len() {
                out.push(LdId {
                    ied,
                    ap: ap_idx,
                    ld: ld_idx,
                });
            }
        }
        out
    }

    /// Handles of every logical device of the document
    pub fn ld_ids(&self) -> Vec<LdId> {
        (0..self.ieds.len()).flat_map(|i| self.ld_ids_of(i)).collect()
    }

    /// Logical device handle by IED name and instance
    pub fn find_ld(&self, ied_name: &str, ld_inst: &str) -> Result<LdId> {
        let ied = self.ied_index(ied_name)?;
        self.find_ld_in(ied, ld_inst)
    }

    /// Logical device handle by instance inside a known IED
    pub fn find_ld_in(&self, ied: usize, ld_inst: &str) -> Result<LdId> {
        self.ld_ids_of(ied)
            .into_iter()
            .find(|id| self.ld(*id).inst == ld_inst)
            .ok_or_else(|| {
                Error::scd(format!(
                    "Unknown LDevice ({}) in IED ({})",
                    ld_inst, self.ieds[ied].name
                ))
            })
    }

    /// Owning IED of a logical device
    pub fn ied_of(&self, id: LdId) -> &Ied {
        &self.ieds[id.ied]
    }

    /// Owning access point of a logical device
    pub fn access_point_of(&self, id: LdId) -> &AccessPoint {
        &self.ieds[id.ied].access_points[id.ap]
    }

    /// Logical device by handle
    pub fn ld(&self, id: LdId) -> &LDevice {
        &self.access_point_of(id).ldevices()[id.ld]
    }

    /// Mutable logical device by handle
    pub fn ld_mut(&mut self, id: LdId) -> &mut LDevice {
        &mut self.ieds[id.ied].access_points[id.ap].server.ldevices[id.ld]
    }

    /// Locator of a logical device
    pub fn ld_xpath(&self, id: LdId) -> String {
        format!(
            "{}/AccessPoint/Server/LDevice[{}]",
            self.ied_of(id).xpath(),
            xpath_attribute_filter("inst", Some(&self.ld(id).inst))
        )
    }

    /// Handles of LN0 and every LN of a logical device
    pub fn ln_ids(&self, ld: LdId) -> Vec<LnId> {
        let count = self.ld(ld).lns.len();
        std::iter::once(LnSlot::Zero)
            .chain((0..count).map(LnSlot::Normal))
            .map(|slot| LnId { ld, slot })
            .collect()
    }

    /// Logical node handle; `LLN0` designates LN0 whatever the instance and prefix
    pub fn find_ln(
        &self,
        ld: LdId,
        ln_class: &str,
        ln_inst: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<LnId> {
        if ln_class == LLN0 {
            return Ok(LnId {
                ld,
                slot: LnSlot::Zero,
            });
        }
        let device = self.ld(ld);
        device
            .lns
            .iter()
            .position(|ln| ln.matches(ln_class, ln_inst, prefix))
            .map(|idx| LnId {
                ld,
                slot: LnSlot::Normal(idx),
            })
            .ok_or_else(|| {
                Error::scd(format!(
                    "LDevice [{}] has no LN [{},{},{}]",
                    device.inst,
                    ln_class,
                    ln_inst.unwrap_or(""),
                    prefix.unwrap_or("")
                ))
            })
    }

    /// Logical node by handle
    pub fn ln(&self, id: LnId) -> &LogicalNode {
        let ld = self.ld(id.ld);
        match id.slot {
            LnSlot::Zero => &ld.ln0,
            LnSlot::Normal(idx) => &ld.lns[idx],
        }
    }

    /// Mutable logical node by handle
    pub fn ln_mut(&mut self, id: LnId) -> &mut LogicalNode {
        let ld = self.ld_mut(id.ld);
        match id.slot {
            LnSlot::Zero => &mut ld.ln0,
            LnSlot::Normal(idx) => &mut ld.lns[idx],
        }
    }

    /// Locator of a logical node
    pub fn ln_xpath(&self, id: LnId) -> String {
        format!("{}/{}", self.ld_xpath(id.ld), self.ln(id).xpath_segment())
    }

    /// Whether the access point owning the device supports configurable setting groups
    pub fn has_conf_sg(&self, ld: LdId) -> bool {
        self.access_point_of(ld)
            .services
            .as_ref()
            .map(|s| s.conf_sg)
            .unwrap_or(false)
    }

    /// Every ExtRef of the document, with the logical node holding it
    pub fn ext_refs(&self) -> Vec<(LnId, &ExtRef)> {
        let mut out = Vec::new();
        for ld in self.ld_ids() {
            for ln in self.ln_ids(ld) {
                out.extend(self.ln(ln).inputs.iter().map(|e| (ln, e)));
            }
        }
        out
    }
}
