//! Data type templates: LNodeType, DOType, DAType and EnumType definitions

use super::data::Val;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Common data classes whose attributes are bounded by minVal/maxVal/stepSize
pub const BOUNDED_CDCS: [&str; 2] = ["ING", "ASG"];

/// Functional constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fc {
    /// Status information
    ST,
    /// Measurands
    MX,
    /// Control
    CO,
    /// Setting (outside setting group)
    SP,
    /// Substitution
    SV,
    /// Configuration
    CF,
    /// Description
    DC,
    /// Setting group
    SG,
    /// Setting group editable
    SE,
    /// Service response
    SR,
    /// Operate received
    OR,
    /// Blocking
    BL,
    /// Extended definition
    EX,
}

impl Fc {
    /// SCL spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Fc::ST => "ST",
            Fc::MX => "MX",
            Fc::CO => "CO",
            Fc::SP => "SP",
            Fc::SV => "SV",
            Fc::CF => "CF",
            Fc::DC => "DC",
            Fc::SG => "SG",
            Fc::SE => "SE",
            Fc::SR => "SR",
            Fc::OR => "OR",
            Fc::BL => "BL",
            Fc::EX => "EX",
        }
    }

    /// Setting group constraints (SG, SE)
    pub fn is_setting_group(&self) -> bool {
        matches!(self, Fc::SG | Fc::SE)
    }

    /// Constraints under which an imported value may be updated
    pub fn allows_val_import(&self) -> bool {
        matches!(self, Fc::CF | Fc::DC | Fc::SG | Fc::SP | Fc::ST | Fc::SE)
    }
}

impl FromStr for Fc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fc = match s {
            "ST" => Fc::ST,
            "MX" => Fc::MX,
            "CO" => Fc::CO,
            "SP" => Fc::SP,
            "SV" => Fc::SV,
            "CF" => Fc::CF,
            "DC" => Fc::DC,
            "SG" => Fc::SG,
            "SE" => Fc::SE,
            "SR" => Fc::SR,
            "OR" => Fc::OR,
            "BL" => Fc::BL,
            "EX" => Fc::EX,
            other => return Err(Error::scd(format!("Unknown functional constraint: {}", other))),
        };
        Ok(fc)
    }
}

impl fmt::Display for Fc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic type of a DA or BDA
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BasicType {
    /// BOOLEAN
    Boolean,
    /// INT8
    Int8,
    /// INT8U
    Int8U,
    /// INT16
    Int16,
    /// INT16U
    Int16U,
    /// INT32
    Int32,
    /// INT32U
    Int32U,
    /// INT64
    Int64,
    /// FLOAT32
    Float32,
    /// FLOAT64
    Float64,
    /// Enum
    Enum,
    /// Struct
    Struct,
    /// ObjRef
    ObjRef,
    /// Any other basic type, kept verbatim
    Other(String),
}

impl BasicType {
    /// Parse the SCL spelling; unknown types are kept verbatim
    pub fn parse(s: &str) -> Self {
        match s {
            "BOOLEAN" => BasicType::Boolean,
            "INT8" => BasicType::Int8,
            "INT8U" => BasicType::Int8U,
            "INT16" => BasicType::Int16,
            "INT16U" => BasicType::Int16U,
            "INT32" => BasicType::Int32,
            "INT32U" => BasicType::Int32U,
            "INT64" => BasicType::Int64,
            "FLOAT32" => BasicType::Float32,
            "FLOAT64" => BasicType::Float64,
            "Enum" => BasicType::Enum,
            "Struct" => BasicType::Struct,
            "ObjRef" => BasicType::ObjRef,
            other => BasicType::Other(other.to_string()),
        }
    }

    /// SCL spelling
    pub fn as_str(&self) -> &str {
        match self {
            BasicType::Boolean => "BOOLEAN",
            BasicType::Int8 => "INT8",
            BasicType::Int8U => "INT8U",
            BasicType::Int16 => "INT16",
            BasicType::Int16U => "INT16U",
            BasicType::Int32 => "INT32",
            BasicType::Int32U => "INT32U",
            BasicType::Int64 => "INT64",
            BasicType::Float32 => "FLOAT32",
            BasicType::Float64 => "FLOAT64",
            BasicType::Enum => "Enum",
            BasicType::Struct => "Struct",
            BasicType::ObjRef => "ObjRef",
            BasicType::Other(s) => s,
        }
    }

    /// Types compared numerically when checking bounds
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            BasicType::Int8
                | BasicType::Int8U
                | BasicType::Int16
                | BasicType::Int16U
                | BasicType::Int32
                | BasicType::Int32U
                | BasicType::Int64
                | BasicType::Float32
                | BasicType::Float64
        )
    }

    /// Whether the attribute is a structure of BDAs
    pub fn is_struct(&self) -> bool {
        matches!(self, BasicType::Struct)
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DO entry of an LNodeType
#[derive(Debug, Clone, PartialEq)]
pub struct DoDef {
    /// DO name
    pub name: String,
    /// Referenced DOType id
    pub type_id: String,
}

/// LNodeType definition
#[derive(Debug, Clone, PartialEq)]
pub struct LNodeType {
    /// Type id
    pub id: String,
    /// Logical node class
    pub ln_class: String,
    /// Data objects, in document order
    pub dos: Vec<DoDef>,
}

impl LNodeType {
    /// Create an empty LNodeType
    pub fn new(id: impl Into<String>, ln_class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ln_class: ln_class.into(),
            dos: Vec::new(),
        }
    }

    /// Append a DO and return self
    pub fn with_do(mut self, name: impl Into<String>, type_id: impl Into<String>) -> Self {
        self.dos.push(DoDef {
            name: name.into(),
            type_id: type_id.into(),
        });
        self
    }

    /// DO entry by name
    pub fn do_def(&self, name: &str) -> Option<&DoDef> {
        self.dos.iter().find(|d| d.name == name)
    }
}

/// DA definition inside a DOType
#[derive(Debug, Clone, PartialEq)]
pub struct DaDef {
    /// DA name
    pub name: String,
    /// Functional constraint
    pub fc: Fc,
    /// Basic type
    pub b_type: BasicType,
    /// Referenced DAType or EnumType id
    pub type_id: Option<String>,
    /// Whether an imported value may overwrite this attribute
    pub val_import: bool,
    /// Default values
    pub values: Vec<Val>,
}

impl DaDef {
    /// Create a DA definition
    pub fn new(name: impl Into<String>, fc: Fc, b_type: BasicType) -> Self {
        Self {
            name: name.into(),
            fc,
            b_type,
            type_id: None,
            val_import: false,
            values: Vec::new(),
        }
    }

    /// Set the referenced type id
    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    /// Set the valImport flag
    pub fn with_val_import(mut self, val_import: bool) -> Self {
        self.val_import = val_import;
        self
    }

    /// Add a default value
    pub fn with_value(mut self, s_group: u32, value: impl Into<String>) -> Self {
        self.values.push(Val::new(s_group, value));
        self
    }
}

/// Entry of a DOType: either a sub data object or a data attribute
#[derive(Debug, Clone, PartialEq)]
pub enum DoTypeEntry {
    /// Sub data object referencing another DOType
    Sdo {
        /// SDO name
        name: String,
        /// Referenced DOType id
        type_id: String,
    },
    /// Data attribute
    Da(DaDef),
}

impl DoTypeEntry {
    /// Entry name
    pub fn name(&self) -> &str {
        match self {
            DoTypeEntry::Sdo { name, .. } => name,
            DoTypeEntry::Da(da) => &da.name,
        }
    }
}

/// DOType definition
#[derive(Debug, Clone, PartialEq)]
pub struct DoType {
    /// Type id
    pub id: String,
    /// Common data class
    pub cdc: String,
    /// SDOs and DAs, in document order
    pub entries: Vec<DoTypeEntry>,
}

impl DoType {
    /// Create an empty DOType
    pub fn new(id: impl Into<String>, cdc: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cdc: cdc.into(),
            entries: Vec::new(),
        }
    }

    /// Append an SDO and return self
    pub fn with_sdo(mut self, name: impl Into<String>, type_id: impl Into<String>) -> Self {
        self.entries.push(DoTypeEntry::Sdo {
            name: name.into(),
            type_id: type_id.into(),
        });
        self
    }

    /// Append a DA and return self
    pub fn with_da(mut self, da: DaDef) -> Self {
        self.entries.push(DoTypeEntry::Da(da));
        self
    }

    /// DA by name
    pub fn da(&self, name: &str) -> Option<&DaDef> {
        self.entries.iter().find_map(|e| match e {
            DoTypeEntry::Da(da) if da.name == name => Some(da),
            _ => None,
        })
    }

    /// Referenced DOType id of an SDO
    pub fn sdo_type(&self, name: &str) -> Option<&str> {
        self.entries.iter().find_map(|e| match e {
            DoTypeEntry::Sdo { name: n, type_id } if n == name => Some(type_id.as_str()),
            _ => None,
        })
    }

    /// Whether values of this data object are bounded
    pub fn is_bounded(&self) -> bool {
        BOUNDED_CDCS.contains(&self.cdc.as_str())
    }
}

/// BDA definition inside a DAType
#[derive(Debug, Clone, PartialEq)]
pub struct BdaDef {
    /// BDA name
    pub name: String,
    /// Basic type
    pub b_type: BasicType,
    /// Referenced DAType or EnumType id
    pub type_id: Option<String>,
    /// Default values
    pub values: Vec<Val>,
}

impl BdaDef {
    /// Create a BDA definition
    pub fn new(name: impl Into<String>, b_type: BasicType) -> Self {
        Self {
            name: name.into(),
            b_type,
            type_id: None,
            values: Vec::new(),
        }
    }

    /// Set the referenced type id
    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }
}

/// DAType definition
#[derive(Debug, Clone, PartialEq)]
pub struct DaType {
    /// Type id
    pub id: String,
    /// Components, in document order
    pub bdas: Vec<BdaDef>,
}

impl DaType {
    /// Create an empty DAType
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bdas: Vec::new(),
        }
    }

    /// Append a BDA and return self
    pub fn with_bda(mut self, bda: BdaDef) -> Self {
        self.bdas.push(bda);
        self
    }

    /// BDA by name
    pub fn bda(&self, name: &str) -> Option<&BdaDef> {
        self.bdas.iter().find(|b| b.name == name)
    }
}

/// EnumType definition
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    /// Type id
    pub id: String,
    /// (ord, literal) pairs
    pub values: Vec<(i32, String)>,
}

/// All type definitions of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTypeTemplates {
    /// LNodeTypes by id
    pub lnode_types: IndexMap<String, LNodeType>,
    /// DOTypes by id
    pub do_types: IndexMap<String, DoType>,
    /// DATypes by id
    pub da_types: IndexMap<String, DaType>,
    /// EnumTypes by id
    pub enum_types: IndexMap<String, EnumType>,
}

impl DataTypeTemplates {
    /// Create empty templates
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an LNodeType
    pub fn add_lnode_type(&mut self, t: LNodeType) {
        self.lnode_types.insert(t.id.clone(), t);
    }

    /// Register a DOType
    pub fn add_do_type(&mut self, t: DoType) {
        self.do_types.insert(t.id.clone(), t);
    }

    /// Register a DAType
    pub fn add_da_type(&mut self, t: DaType) {
        self.da_types.insert(t.id.clone(), t);
    }

    /// Register an EnumType
    pub fn add_enum_type(&mut self, t: EnumType) {
        self.enum_types.insert(t.id.clone(), t);
    }

    /// LNodeType by id
    pub fn lnode_type(&self, id: &str) -> Option<&LNodeType> {
        self.lnode_types.get(id)
    }

    /// DOType by id
    pub fn do_type(&self, id: &str) -> Option<&DoType> {
        self.do_types.get(id)
    }

    /// DAType by id
    pub fn da_type(&self, id: &str) -> Option<&DaType> {
        self.da_types.get(id)
    }

    /// EnumType by id
    pub fn enum_type(&self, id: &str) -> Option<&EnumType> {
        self.enum_types.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fc_parsing() {
        assert_eq!("SG".parse::<Fc>().unwrap(), Fc::SG);
        assert!("XX".parse::<Fc>().is_err());
        assert!(Fc::SE.is_setting_group());
        assert!(Fc::ST.allows_val_import());
        assert!(!Fc::MX.allows_val_import());
    }

    #[test]
    fn test_basic_type() {
        assert!(BasicType::parse("INT32").is_numeric());
        assert!(!BasicType::parse("VisString255").is_numeric());
        assert_eq!(BasicType::parse("VisString255").as_str(), "VisString255");
        assert!(BasicType::parse("Struct").is_struct());
    }

    #[test]
    fn test_do_type_lookup() {
        let do_type = DoType::new("DO1", "ASG")
            .with_sdo("sdo1", "DO2")
            .with_da(DaDef::new("setMag", Fc::SG, BasicType::Float32));
        assert!(do_type.is_bounded());
        assert_eq!(do_type.sdo_type("sdo1"), Some("DO2"));
        assert!(do_type.da("setMag").is_some());
        assert!(do_type.da("sdo1").is_none());
    }
}
