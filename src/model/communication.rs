//! Communication section: subnetworks, connected access points and the
//! network addresses of published GOOSE and SMV control blocks

use indexmap::IndexMap;

/// `P` entries of an `Address`, keyed by their `type`
pub type Address = IndexMap<String, String>;

/// `GSE` or `SMV` entry of a connected access point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlBlockAddress {
    /// Instance of the device holding the control block
    pub ld_inst: String,
    /// Control block name
    pub cb_name: String,
    /// Address parameters
    pub address: Address,
    /// MinTime in milliseconds (GSE only)
    pub min_time: Option<u64>,
    /// MaxTime in milliseconds (GSE only)
    pub max_time: Option<u64>,
}

impl ControlBlockAddress {
    /// Create an entry without address
    pub fn new(ld_inst: impl Into<String>, cb_name: impl Into<String>) -> Self {
        Self {
            ld_inst: ld_inst.into(),
            cb_name: cb_name.into(),
            ..Default::default()
        }
    }

    fn is(&self, ld_inst: &str, cb_name: &str) -> bool {
        self.ld_inst == ld_inst && self.cb_name == cb_name
    }
}

fn update_or_create<'a>(
    entries: &'a mut Vec<ControlBlockAddress>,
    ld_inst: &str,
    cb_name: &str,
) -> &'a mut ControlBlockAddress {
    match entries.iter().position(|e| e.is(ld_inst, cb_name)) {
        Some(idx) => &mut entries[idx],
        None => {
            entries.push(ControlBlockAddress::new(ld_inst, cb_name));
            let last = entries.len() - 1;
            &mut entries[last]
        }
    }
}

/// Access point attached to a subnetwork
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedAp {
    /// Owning IED
    pub ied_name: String,
    /// Access point name
    pub ap_name: String,
    /// Address of the access point itself
    pub address: Address,
    /// GOOSE addresses
    pub gse: Vec<ControlBlockAddress>,
    /// Sampled value addresses
    pub smv: Vec<ControlBlockAddress>,
}

impl ConnectedAp {
    /// Create a connected access point without address
    pub fn new(ied_name: impl Into<String>, ap_name: impl Into<String>) -> Self {
        Self {
            ied_name: ied_name.into(),
            ap_name: ap_name.into(),
            ..Default::default()
        }
    }

    /// GSE entry of a control block
    pub fn gse(&self, ld_inst: &str, cb_name: &str) -> Option<&ControlBlockAddress> {
        self.gse.iter().find(|e| e.is(ld_inst, cb_name))
    }

    /// SMV entry of a control block
    pub fn smv(&self, ld_inst: &str, cb_name: &str) -> Option<&ControlBlockAddress> {
        self.smv.iter().find(|e| e.is(ld_inst, cb_name))
    }

    /// Replace the address and timings of a GSE entry, creating it if needed
    pub fn update_gse_or_create_if_not_exists(
        &mut self,
        ld_inst: &str,
        cb_name: &str,
        address: Address,
        min_time: Option<u64>,
        max_time: Option<u64>,
    ) {
        let gse = update_or_create(&mut self.gse, ld_inst, cb_name);
        gse.address = address;
        gse.min_time = min_time;
        gse.max_time = max_time;
    }

    /// Replace the address of an SMV entry, creating it if needed
    pub fn update_smv_or_create_if_not_exists(
        &mut self,
        ld_inst: &str,
        cb_name: &str,
        address: Address,
    ) {
        update_or_create(&mut self.smv, ld_inst, cb_name).address = address;
    }
}

/// SubNetwork element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubNetwork {
    /// Subnetwork name
    pub name: String,
    /// Protocol type (`8-MMS`, `IP`...)
    pub kind: Option<String>,
    /// Attached access points
    pub connected_aps: Vec<ConnectedAp>,
}

impl SubNetwork {
    /// Create an empty subnetwork
    pub fn new(name: impl Into<String>, kind: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: kind.map(str::to_string),
            connected_aps: Vec::new(),
        }
    }

    /// Attach an access point and return self
    pub fn with_connected_ap(mut self, connected_ap: ConnectedAp) -> Self {
        self.connected_aps.push(connected_ap);
        self
    }
}

/// Communication section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Communication {
    /// Subnetworks, in document order
    pub sub_networks: Vec<SubNetwork>,
}

impl Communication {
    /// Whether the section holds no subnetwork
    pub fn is_empty(&self) -> bool {
        self.sub_networks.is_empty()
    }

    /// First connected access point matching the IED and access point names
    pub fn connected_ap(&self, ied_name: &str, ap_name: &str) -> Option<&ConnectedAp> {
        self.sub_networks
            .iter()
            .flat_map(|s| s.connected_aps.iter())
            .find(|c| c.ied_name == ied_name && c.ap_name == ap_name)
    }

    /// Mutable variant of [`Communication::connected_ap`]
    pub fn connected_ap_mut(&mut self, ied_name: &str, ap_name: &str) -> Option<&mut ConnectedAp> {
        self.sub_networks
            .iter_mut()
            .flat_map(|s| s.connected_aps.iter_mut())
            .find(|c| c.ied_name == ied_name && c.ap_name == ap_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_or_create_gse() {
        let mut cap = ConnectedAp::new("IED1", "AP1");
        let mut address = Address::new();
        address.insert("APPID".into(), "0001".into());
        cap.update_gse_or_create_if_not_exists("LD1", "CB1", address.clone(), Some(10), None);
        assert_eq!(cap.gse.len(), 1);

        address.insert("APPID".into(), "0002".into());
        cap.update_gse_or_create_if_not_exists("LD1", "CB1", address, None, Some(2000));
        assert_eq!(cap.gse.len(), 1);
        let gse = cap.gse("LD1", "CB1").unwrap();
        assert_eq!(gse.address["APPID"], "0002");
        assert_eq!(gse.min_time, None);
        assert_eq!(gse.max_time, Some(2000));
        assert!(cap.smv("LD1", "CB1").is_none());
    }

    #[test]
    fn test_find_connected_ap() {
        let mut com = Communication::default();
        assert!(com.is_empty());
        com.sub_networks.push(
            SubNetwork::new("RSPACE_PROCESS", Some("8-MMS"))
                .with_connected_ap(ConnectedAp::new("IED1", "AP1")),
        );
        assert!(com.connected_ap("IED1", "AP1").is_some());
        assert!(com.connected_ap("IED1", "AP2").is_none());
        com.connected_ap_mut("IED1", "AP1")
            .unwrap()
            .update_smv_or_create_if_not_exists("LD1", "SV1", Address::new());
        assert_eq!(com.connected_ap("IED1", "AP1").unwrap().smv.len(), 1);
    }
}
