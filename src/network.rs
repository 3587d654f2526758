//! Network configuration of GOOSE and SMV control blocks
//!
//! Every GOOSE and SMV control block of an LN0 gets a `GSE` or `SMV` entry
//! under the `ConnectedAP` of its access point, with an APPID and a
//! MAC-Address allocated from the [`CbCom`] ranges and the VLAN settings
//! matching the publishing IED profile. Addresses already assigned in
//! subnetworks to reuse are kept for the same control blocks and excluded
//! from allocation.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use indexmap::IndexMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::model::{Address, ControlBlockKind, Ied, LdId, Scl, SubNetwork};
use crate::names::xpath_attribute_filter;
use crate::report::ReportItem;
use crate::settings::{CbCom, IedProfile, NetworkCriteria, NetworkRange, VlanSetting};

/// `P` type of the APPID
pub const APPID_P_TYPE: &str = "APPID";
/// `P` type of the MAC-Address
pub const MAC_ADDRESS_P_TYPE: &str = "MAC-Address";
/// `P` type of the VLAN identifier
pub const VLAN_ID_P_TYPE: &str = "VLAN-ID";
/// `P` type of the VLAN priority
pub const VLAN_PRIORITY_P_TYPE: &str = "VLAN-PRIORITY";

const SETTINGS_LOCATOR: &str = "Control Block Communication setting files";
const MAX_MAC_ADDRESS: u64 = 0xFFFF_FFFF_FFFF;

static MAC_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}([-:][0-9A-Fa-f]{2}){5}$").unwrap());

/// Source of the profile of each IED
pub trait IedProfiles {
    /// Profile of `ied`; the error message is reported against its devices
    fn profile(&self, ied: &Ied) -> Result<IedProfile>;
}

impl IedProfiles for IndexMap<String, IedProfile> {
    fn profile(&self, ied: &Ied) -> Result<IedProfile> {
        self.get(&ied.name)
            .cloned()
            .ok_or_else(|| Error::not_found("No IED profile found for this IED"))
    }
}

/// Parse `01-0C-CD-01-00-00` (or colon separated) as a 48 bit integer
pub fn mac_address_to_u64(mac: &str) -> Result<u64> {
    if !MAC_ADDRESS.is_match(mac) {
        return Err(Error::Settings(format!(
            "macAddress should be 6 groups of 2 hexadecimal digits (0 to 9 and A to F) separated by hyphens(-) or colons(:), but got : {}",
            mac
        )));
    }
    let digits: String = mac.chars().filter(char::is_ascii_hexdigit).collect();
    u64::from_str_radix(&digits, 16).map_err(|e| Error::Settings(e.to_string()))
}

/// Format a 48 bit integer as an uppercase, hyphen separated MAC-Address
pub fn u64_to_mac_address(mac: u64) -> Result<String> {
    if mac > MAX_MAC_ADDRESS {
        return Err(Error::Settings(format!(
            "macAddress cannot exceed {} but got : {}",
            MAX_MAC_ADDRESS, mac
        )));
    }
    let groups: Vec<String> = (0..6)
        .rev()
        .map(|i| format!("{:02X}", (mac >> (8 * i)) & 0xFF))
        .collect();
    Ok(groups.join("-"))
}

fn app_id_to_u64(app_id: &str) -> Result<u64> {
    u64::from_str_radix(app_id.trim(), 16).map_err(|_| {
        Error::Settings(format!(
            "Error in Control Block communication setting file: APPID must be hexadecimal, but got : {}",
            app_id
        ))
    })
}

/// APPID and MAC-Address pair assigned to a control block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppIdAndMac {
    /// APPID
    pub app_id: u64,
    /// MAC-Address
    pub mac: u64,
}

impl AppIdAndMac {
    /// Pair read from an address; both entries must be present and valid
    pub fn from_address(address: &Address) -> Option<Self> {
        let app_id = app_id_to_u64(address.get(APPID_P_TYPE)?).ok()?;
        let mac = mac_address_to_u64(address.get(MAC_ADDRESS_P_TYPE)?).ok()?;
        Some(Self { app_id, mac })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CbKey {
    ied_name: String,
    ld_inst: String,
    cb_name: String,
}

/// GOOSE or SMV control block of an LN0, with the identity of its owner
#[derive(Debug, Clone)]
struct Published {
    ld: LdId,
    ap_name: String,
    key: CbKey,
}

fn published(scl: &Scl, kind: ControlBlockKind) -> Vec<Published> {
    let mut out = Vec::new();
    for ld in scl.ld_ids() {
        let ied_name = &scl.ied_of(ld).name;
        let device = scl.ld(ld);
        for cb in device.ln0.controls_of(kind) {
            out.push(Published {
                ld,
                ap_name: scl.access_point_of(ld).name.clone(),
                key: CbKey {
                    ied_name: ied_name.clone(),
                    ld_inst: device.inst.clone(),
                    cb_name: cb.name.clone(),
                },
            });
        }
    }
    out
}

fn app_ids_and_macs_to_reuse(
    scl: &Scl,
    sub_networks: &[SubNetwork],
) -> HashMap<CbKey, AppIdAndMac> {
    let existing: Vec<CbKey> = published(scl, ControlBlockKind::Goose)
        .into_iter()
        .chain(published(scl, ControlBlockKind::Smv))
        .map(|p| p.key)
        .collect();
    let mut out = HashMap::new();
    for connected_ap in sub_networks.iter().flat_map(|s| s.connected_aps.iter()) {
        for entry in connected_ap.gse.iter().chain(connected_ap.smv.iter()) {
            let key = CbKey {
                ied_name: connected_ap.ied_name.clone(),
                ld_inst: entry.ld_inst.clone(),
                cb_name: entry.cb_name.clone(),
            };
            if !existing.contains(&key) {
                continue;
            }
            if let Some(pair) = AppIdAndMac::from_address(&entry.address) {
                out.insert(key, pair);
            }
        }
    }
    out
}

struct KindSettings<'a> {
    app_ids: RangeInclusive<u64>,
    macs: RangeInclusive<u64>,
    vlans: Vec<&'a VlanSetting>,
}

fn kind_settings(cb_com: &CbCom, kind: ControlBlockKind) -> Result<KindSettings<'_>> {
    let range = |r: &NetworkRange, parse: fn(&str) -> Result<u64>| -> Result<RangeInclusive<u64>> {
        Ok(parse(&r.start)?..=parse(&r.end)?)
    };
    Ok(KindSettings {
        app_ids: range(cb_com.app_id_range(kind)?, app_id_to_u64)?,
        macs: range(cb_com.mac_range(kind)?, mac_address_to_u64)?,
        vlans: cb_com.vlans_of(kind)?,
    })
}

fn control_block_xpath(scl: &Scl, ld: LdId, kind: ControlBlockKind, cb_name: &str) -> String {
    format!(
        "{}/LN0/{}[{}]",
        scl.ld_xpath(ld),
        kind.tag(),
        xpath_attribute_filter("name", Some(cb_name))
    )
}

fn network_address(pair: AppIdAndMac, vlan: &VlanSetting) -> Result<Address> {
    let mut address = Address::new();
    address.insert(APPID_P_TYPE.to_string(), format!("{:04X}", pair.app_id));
    address.insert(MAC_ADDRESS_P_TYPE.to_string(), u64_to_mac_address(pair.mac)?);
    if let Some(id) = vlan.vlan_id {
        address.insert(VLAN_ID_P_TYPE.to_string(), format!("{:03X}", id));
    }
    if let Some(priority) = vlan.vlan_priority {
        address.insert(VLAN_PRIORITY_P_TYPE.to_string(), priority.to_string());
    }
    Ok(address)
}

fn configure_kind(
    scl: &mut Scl,
    cb_com: &CbCom,
    profiles: &impl IedProfiles,
    reuse: &HashMap<CbKey, AppIdAndMac>,
    kind: ControlBlockKind,
) -> Vec<ReportItem> {
    let settings = match kind_settings(cb_com, kind) {
        Ok(s) => s,
        Err(e) => return vec![ReportItem::error(SETTINGS_LOCATOR, e.to_string())],
    };
    let reused_app_ids: Vec<u64> = reuse.values().map(|p| p.app_id).collect();
    let reused_macs: Vec<u64> = reuse.values().map(|p| p.mac).collect();
    let mut app_ids = settings
        .app_ids
        .clone()
        .filter(|id| !reused_app_ids.contains(id))
        .peekable();
    let mut macs = settings
        .macs
        .clone()
        .filter(|mac| !reused_macs.contains(mac))
        .peekable();

    let mut items = Vec::new();
    for cb in published(scl, kind) {
        let xpath = control_block_xpath(scl, cb.ld, kind, &cb.key.cb_name);
        let fail = |message: &str| {
            ReportItem::error(
                xpath.clone(),
                format!("Cannot configure communication for {}", message),
            )
        };

        let profile = match profiles.profile(scl.ied_of(cb.ld)) {
            Ok(p) => p,
            Err(e) => {
                items.push(ReportItem::error(scl.ld_xpath(cb.ld), e.to_string()));
                continue;
            }
        };
        let criteria = NetworkCriteria::new(kind, profile, &cb.key.cb_name);
        let Some(vlan) = settings.vlans.iter().find(|v| v.criteria == criteria) else {
            items.push(fail(&format!(
                "this ControlBlock because: No controlBlock communication settings found with these {}",
                criteria
            )));
            continue;
        };
        if scl
            .communication
            .connected_ap(&cb.key.ied_name, &cb.ap_name)
            .is_none()
        {
            items.push(fail(
                "ControlBlock because no ConnectedAP found for AccessPoint",
            ));
            continue;
        }
        if vlan.vlan_id.is_none() {
            items.push(fail(
                "this ControlBlock because no Vlan Id was provided in the settings",
            ));
            continue;
        }

        let pair = match reuse.get(&cb.key) {
            Some(pair) => *pair,
            None => {
                if app_ids.peek().is_none() {
                    items.push(fail("this ControlBlock because range of appId is exhausted"));
                    continue;
                }
                if macs.peek().is_none() {
                    items.push(fail(
                        "this ControlBlock because range of MAC Address is exhausted",
                    ));
                    continue;
                }
                match (app_ids.next(), macs.next()) {
                    (Some(app_id), Some(mac)) => AppIdAndMac { app_id, mac },
                    _ => continue,
                }
            }
        };
        let address = match network_address(pair, vlan) {
            Ok(a) => a,
            Err(e) => {
                items.push(ReportItem::error(xpath.clone(), e.to_string()));
                continue;
            }
        };

        let Some(connected_ap) = scl
            .communication
            .connected_ap_mut(&cb.key.ied_name, &cb.ap_name)
        else {
            continue;
        };
        debug!(
            "{} {}/{} gets APPID {:04X}",
            kind.tag(),
            cb.key.ied_name,
            cb.key.cb_name,
            pair.app_id
        );
        match kind {
            ControlBlockKind::Goose => connected_ap.update_gse_or_create_if_not_exists(
                &cb.key.ld_inst,
                &cb.key.cb_name,
                address,
                vlan.min_time,
                vlan.max_time,
            ),
            ControlBlockKind::Smv => connected_ap.update_smv_or_create_if_not_exists(
                &cb.key.ld_inst,
                &cb.key.cb_name,
                address,
            ),
            ControlBlockKind::Report => {}
        }
    }
    items
}

/// Assign network addresses to every GOOSE then every SMV control block.
///
/// Control blocks found in `sub_networks_to_reuse` keep their APPID and
/// MAC-Address; those values are not allocated to other control blocks.
/// Missing settings, missing `ConnectedAP` and exhausted ranges are
/// reported per control block and leave it unconfigured.
pub fn configure_network_for_all_control_blocks(
    scl: &mut Scl,
    cb_com: &CbCom,
    profiles: &impl IedProfiles,
    sub_networks_to_reuse: &[SubNetwork],
) -> Vec<ReportItem> {
    let reuse = app_ids_and_macs_to_reuse(scl, sub_networks_to_reuse);
    let mut items = configure_kind(scl, cb_com, profiles, &reuse, ControlBlockKind::Goose);
    items.extend(configure_kind(scl, cb_com, profiles, &reuse, ControlBlockKind::Smv));
    if !items.is_empty() {
        warn!(
            "network configuration left {} control block(s) or setting(s) unresolved",
            items.len()
        );
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_conversions() {
        assert_eq!(mac_address_to_u64("01-0C-CD-01-00-00").unwrap(), 0x010C_CD01_0000);
        assert_eq!(mac_address_to_u64("01:0c:cd:01:01:ff").unwrap(), 0x010C_CD01_01FF);
        assert_eq!(u64_to_mac_address(0x010C_CD01_01FF).unwrap(), "01-0C-CD-01-01-FF");
        assert!(matches!(
            mac_address_to_u64("01-0C-CD-01-00"),
            Err(Error::Settings(_))
        ));
        assert!(u64_to_mac_address(MAX_MAC_ADDRESS + 1).is_err());
    }

    #[test]
    fn test_app_id_and_mac_from_address() {
        let mut address = Address::new();
        address.insert(APPID_P_TYPE.into(), "000A".into());
        assert_eq!(AppIdAndMac::from_address(&address), None);
        address.insert(MAC_ADDRESS_P_TYPE.into(), "01-0C-CD-04-00-02".into());
        assert_eq!(
            AppIdAndMac::from_address(&address),
            Some(AppIdAndMac {
                app_id: 10,
                mac: 0x010C_CD04_0002
            })
        );
    }

    #[test]
    fn test_network_address_layout() {
        let vlan: VlanSetting = serde_json::from_str(
            r#"{"cbType": "Goose", "systemVersion": "01.00", "iedType": "BCU",
                "iedRedundancy": "None", "iedSystemVersionInstance": 1,
                "bayInternal": false, "vlanId": 300, "vlanPriority": 5}"#,
        )
        .unwrap();
        let address = network_address(
            AppIdAndMac {
                app_id: 0x1F,
                mac: 0x010C_CD01_0003,
            },
            &vlan,
        )
        .unwrap();
        let entries: Vec<_> = address.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                ("APPID", "001F"),
                ("MAC-Address", "01-0C-CD-01-00-03"),
                ("VLAN-ID", "12C"),
                ("VLAN-PRIORITY", "5"),
            ]
        );
    }
}
