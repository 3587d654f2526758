//! Logical device naming and activity status

use std::fmt;

use log::debug;

use crate::error::{Error, Result};
use crate::model::{LdId, LDevice, Scl, MOD_DO, ST_VAL_DA};

/// Longest accepted ldName
pub const LD_NAME_MAX_LEN: usize = 33;

/// Activity of a logical device, read from LN0 `Mod.stVal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdStatus {
    /// `on`
    On,
    /// `off`
    Off,
    /// Any other mode value
    Other(String),
    /// No `Mod.stVal` value
    Undefined,
}

impl fmt::Display for LdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdStatus::On => f.write_str("on"),
            LdStatus::Off => f.write_str("off"),
            LdStatus::Other(s) => f.write_str(s),
            LdStatus::Undefined => f.write_str("undefined"),
        }
    }
}

/// Status of a logical device
pub fn status(ld: &LDevice) -> LdStatus {
    let data = &ld.ln0.data;
    let value = data
        .doi(MOD_DO)
        .and_then(|doi| data.dai_child(doi, ST_VAL_DA).ok())
        .and_then(|id| data.dai(id))
        .and_then(|dai| dai.values.first());
    match value.map(|v| v.value.as_str()) {
        Some("on") => LdStatus::On,
        Some("off") => LdStatus::Off,
        Some(other) => LdStatus::Other(other.to_string()),
        None => LdStatus::Undefined,
    }
}

/// Set the ldName of a device to its IED name followed by its instance
pub fn update_ld_name(scl: &mut Scl, id: LdId) -> Result<String> {
    let name = format!("{}{}", scl.ied_of(id).name, scl.ld(id).inst);
    if name.chars().count() > LD_NAME_MAX_LEN {
        return Err(Error::scd(format!(
            "{}(IED.name + LDevice.inst) has more than {} characters",
            name, LD_NAME_MAX_LEN
        )));
    }
    debug!("ldName of {} set to {}", scl.ld_xpath(id), name);
    scl.ld_mut(id).ld_name = Some(name.clone());
    Ok(name)
}

/// Name used to address a device in control block ids: ldName, else IED name + instance
pub fn ld_name(scl: &Scl, id: LdId) -> String {
    scl.ld(id)
        .ld_name
        .clone()
        .unwrap_or_else(|| format!("{}{}", scl.ied_of(id).name, scl.ld(id).inst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessPoint, Ied};

    fn scl(ied_name: &str) -> (Scl, LdId) {
        let scl = Scl::new().with_ied(
            Ied::new(ied_name)
                .with_access_point(AccessPoint::new("AP1").with_ldevice(LDevice::new("LD1", "T"))),
        );
        let id = scl.find_ld(ied_name, "LD1").unwrap();
        (scl, id)
    }

    #[test]
    fn test_update_ld_name() {
        let (mut scl, id) = scl("IED1");
        assert_eq!(update_ld_name(&mut scl, id).unwrap(), "IED1LD1");
        assert_eq!(scl.ld(id).ld_name.as_deref(), Some("IED1LD1"));
        assert_eq!(ld_name(&scl, id), "IED1LD1");
    }

    #[test]
    fn test_ld_name_too_long() {
        let long = "I".repeat(31);
        let (mut scl, id) = scl(&long);
        let err = update_ld_name(&mut scl, id).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}LD1(IED.name + LDevice.inst) has more than 33 characters", long)
        );
        assert!(scl.ld(id).ld_name.is_none());
    }

    #[test]
    fn test_status() {
        let mut ld = LDevice::new("LD1", "T");
        assert_eq!(status(&ld), LdStatus::Undefined);
        let doi = ld.ln0.data.add_doi(MOD_DO);
        let dai = ld.ln0.data.add_dai(doi, ST_VAL_DA, false, None).unwrap();
        ld.ln0.data.update_dai_value(dai, 0, "off", "/SCL").unwrap();
        assert_eq!(status(&ld), LdStatus::Off);
        ld.ln0.data.update_dai_value(dai, 0, "test", "/SCL").unwrap();
        assert_eq!(status(&ld).to_string(), "test");
    }
}
