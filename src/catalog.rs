//! Data attribute catalog built from the DataTypeTemplates section
//!
//! Walking an LNodeType down through its DOTypes, SDOs, DAs and BDAs yields
//! one [`DataAttributeRef`] per leaf attribute. Each reference carries the
//! dotted DO and DA paths together with the functional constraint, basic
//! type, valImport flag and default values declared by the templates.
//!
//! # Filtering
//!
//! A filter reference restricts the walk:
//!
//! - a defined DO name keeps only that DO, and its SDO names keep only those SDOs
//! - a defined DA name keeps only that DA, and its BDA names keep only those BDAs

use std::collections::HashSet;

use indexmap::IndexMap;
use log::error;

use crate::error::{Error, Result};
use crate::model::{
    BasicType, BdaDef, DaDef, DataTypeTemplates, DoType, DoTypeEntry, Fc, Val, LLN0, MOD_DO,
    ST_VAL_DA,
};
use crate::names::{DaTypeName, DoTypeName};

/// A leaf data attribute of a logical node type, with its template facts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataAttributeRef {
    /// LN prefix
    pub prefix: Option<String>,
    /// LN class
    pub ln_class: String,
    /// LN instance
    pub ln_inst: Option<String>,
    /// LNodeType id
    pub ln_type: String,
    /// DO path
    pub do_name: DoTypeName,
    /// Common data class of the DOType holding the attribute
    pub cdc: Option<String>,
    /// DA path
    pub da_name: DaTypeName,
    /// Functional constraint of the top DA
    pub fc: Option<Fc>,
    /// Basic type of the leaf
    pub b_type: Option<BasicType>,
    /// Referenced EnumType or DAType id of the leaf
    pub type_id: Option<String>,
    /// Effective valImport flag
    pub val_import: bool,
    /// Values keyed by setting group
    pub values: IndexMap<u32, String>,
}

impl DataAttributeRef {
    /// Reference to `do_ref` / `da_ref`, both dotted
    pub fn new(do_ref: &str, da_ref: &str) -> Self {
        Self {
            do_name: DoTypeName::new(do_ref),
            da_name: DaTypeName::new(da_ref),
            ..Default::default()
        }
    }

    /// Set the logical node coordinates and return self
    pub fn with_ln(
        mut self,
        ln_class: impl Into<String>,
        ln_inst: Option<&str>,
        prefix: Option<&str>,
    ) -> Self {
        self.ln_class = ln_class.into();
        self.ln_inst = ln_inst.map(str::to_string);
        self.prefix = prefix.map(str::to_string);
        self
    }

    /// Set the LNodeType and return self
    pub fn with_ln_type(mut self, ln_type: impl Into<String>) -> Self {
        self.ln_type = ln_type.into();
        self
    }

    /// Add a value and return self
    pub fn with_value(mut self, s_group: u32, value: impl Into<String>) -> Self {
        self.values.insert(s_group, value.into());
        self
    }

    /// Dotted DO path
    pub fn do_ref(&self) -> String {
        self.do_name.to_string()
    }

    /// Dotted DA path
    pub fn da_ref(&self) -> String {
        self.da_name.to_string()
    }

    /// `DO.sdo.DA.bda`
    pub fn data_attributes(&self) -> String {
        format!("{}.{}", self.do_name, self.da_name)
    }

    /// `LLN0` for LN0, else prefix + class + instance
    pub fn ln_ref(&self) -> String {
        if self.ln_class == LLN0 {
            return LLN0.to_string();
        }
        format!(
            "{}{}{}",
            self.prefix.as_deref().unwrap_or(""),
            self.ln_class,
            self.ln_inst.as_deref().unwrap_or("")
        )
    }

    /// Object reference such as `IED1LD1/LLN0.Mod.stVal`
    pub fn obj_ref(&self, ied_name: &str, ld_inst: &str) -> String {
        format!(
            "{}{}/{}.{}",
            ied_name,
            ld_inst,
            self.ln_ref(),
            self.data_attributes()
        )
    }

    /// `Mod.stVal`, or an importable attribute under a constraint allowing it
    pub fn is_updatable(&self) -> bool {
        self.is_mod_st_val()
            || (self.val_import && self.fc.map(|fc| fc.allows_val_import()).unwrap_or(false))
    }

    /// Whether this designates `Mod.stVal`
    pub fn is_mod_st_val(&self) -> bool {
        self.do_name.name == MOD_DO
            && self.do_name.struct_names.is_empty()
            && self.da_name.name == ST_VAL_DA
            && self.da_name.struct_names.is_empty()
    }
}

/// Template facts of the attribute designated by a DO/DA path
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    /// Common data class of the DOType holding the DA
    pub cdc: String,
    /// Functional constraint of the top DA
    pub fc: Fc,
    /// Basic type of the leaf
    pub b_type: BasicType,
    /// valImport flag of the top DA
    pub val_import: bool,
}

fn values_of(vals: &[Val]) -> IndexMap<u32, String> {
    vals.iter().map(|v| (v.s_group, v.value.clone())).collect()
}

fn unknown_do_type(id: &str) -> Error {
    Error::scd(format!(
        "Corrupted SCL DataTypeTemplate, Unknown DOType id: {}",
        id
    ))
}

/// Check that `do_name`/`da_name` designates an attribute of `ln_type`
pub fn check_do_da(
    templates: &DataTypeTemplates,
    ln_type: &str,
    do_name: &DoTypeName,
    da_name: &DaTypeName,
) -> Result<AttributeInfo> {
    if !do_name.is_defined() || !da_name.is_defined() {
        return Err(Error::scd(
            "Invalid Data: data attributes information are missing",
        ));
    }
    let lnode_type = templates
        .lnode_type(ln_type)
        .ok_or_else(|| Error::scd(format!("Unknown LNodeType : {}", ln_type)))?;
    let do_def = lnode_type.do_def(&do_name.name).ok_or_else(|| {
        Error::scd(format!(
            "Unknown DO({}) in LNodeType({})",
            do_name.name, ln_type
        ))
    })?;
    let mut do_type = templates
        .do_type(&do_def.type_id)
        .ok_or_else(|| unknown_do_type(&do_def.type_id))?;
    for sdo in &do_name.struct_names {
        let type_id = do_type.sdo_type(sdo).ok_or_else(|| {
            Error::scd(format!("Unknown SDO ({}) in DOType ({})", sdo, do_type.id))
        })?;
        do_type = templates
            .do_type(type_id)
            .ok_or_else(|| unknown_do_type(type_id))?;
    }

    let da = do_type.da(&da_name.name).ok_or_else(|| {
        Error::scd(format!(
            "Unknown DA ({}) in DOType ({}) ",
            da_name.name, do_type.id
        ))
    })?;
    if da_name.is_struct() && !da.b_type.is_struct() {
        return Err(Error::scd(format!("Invalid DA chain{}", da_name)));
    }

    let mut b_type = da.b_type.clone();
    let mut type_id = da.type_id.clone();
    for bda_name in &da_name.struct_names {
        let id = type_id.unwrap_or_default();
        let da_type = templates.da_type(&id).ok_or_else(|| {
            Error::scd(format!(
                "Unknown DAType ({}) referenced by DA({})",
                id, da.name
            ))
        })?;
        let bda = da_type.bda(bda_name).ok_or_else(|| {
            Error::scd(format!("Unknown BDA ({}) in DAType ({})", bda_name, da_type.id))
        })?;
        b_type = bda.b_type.clone();
        type_id = bda.type_id.clone();
    }

    Ok(AttributeInfo {
        cdc: do_type.cdc.clone(),
        fc: da.fc,
        b_type,
        val_import: da.val_import,
    })
}

/// Walk state shared by one catalog query
struct Walk<'a> {
    templates: &'a DataTypeTemplates,
    filter: &'a DataAttributeRef,
    out: Vec<DataAttributeRef>,
}

impl<'a> Walk<'a> {
    fn do_type(&mut self, do_type: &DoType, base: &DataAttributeRef) {
        for entry in &do_type.entries {
            match entry {
                DoTypeEntry::Sdo { name, type_id } => {
                    let sdo_filter = &self.filter.do_name.struct_names;
                    if !sdo_filter.is_empty() && !sdo_filter.contains(name) {
                        continue;
                    }
                    let Some(sdo_type) = self.templates.do_type(type_id) else {
                        continue;
                    };
                    let mut next = base.clone();
                    next.do_name.struct_names.push(name.clone());
                    self.do_type(sdo_type, &next);
                }
                DoTypeEntry::Da(da) => {
                    if self.filter.da_name.is_defined() && self.filter.da_name.name != da.name {
                        continue;
                    }
                    let mut next = base.clone();
                    next.cdc = Some(do_type.cdc.clone());
                    self.da(da, next);
                }
            }
        }
    }

    fn da(&mut self, da: &DaDef, mut current: DataAttributeRef) {
        current.da_name = DaTypeName::from_parts(da.name.clone(), Vec::new());
        current.fc = Some(da.fc);
        current.val_import = da.val_import;
        if da.b_type.is_struct() {
            let mut visited = HashSet::new();
            if let Some(type_id) = &da.type_id {
                self.da_type(type_id, &current, &mut visited);
            }
            return;
        }
        current.b_type = Some(da.b_type.clone());
        current.type_id = da.type_id.clone();
        current.values = values_of(&da.values);
        self.push(current);
    }

    fn da_type(&mut self, type_id: &str, base: &DataAttributeRef, visited: &mut HashSet<String>) {
        if !visited.insert(type_id.to_string()) {
            return;
        }
        let Some(da_type) = self.templates.da_type(type_id) else {
            return;
        };
        for bda in &da_type.bdas {
            let bda_filter = &self.filter.da_name.struct_names;
            if !bda_filter.is_empty() && !bda_filter.contains(&bda.name) {
                continue;
            }
            let mut next = base.clone();
            next.da_name.struct_names.push(bda.name.clone());
            self.bda(bda, next, visited);
        }
        visited.remove(type_id);
    }

    fn bda(&mut self, bda: &BdaDef, mut current: DataAttributeRef, visited: &mut HashSet<String>) {
        if bda.b_type.is_struct() {
            if let Some(type_id) = &bda.type_id {
                self.da_type(type_id, &current, visited);
            }
            return;
        }
        current.b_type = Some(bda.b_type.clone());
        current.type_id = bda.type_id.clone();
        current.values = values_of(&bda.values);
        self.push(current);
    }

    fn push(&mut self, item: DataAttributeRef) {
        self.out.push(item);
    }
}

/// Leaf attributes of `ln_type` selected by `filter`.
///
/// When the filter designates a DA, the DO/DA pair is checked first; an
/// inconsistent pair yields no attribute at all. An unknown LNodeType is an
/// error.
pub fn attribute_refs(
    templates: &DataTypeTemplates,
    ln_type: &str,
    filter: &DataAttributeRef,
) -> Result<Vec<DataAttributeRef>> {
    let lnode_type = templates
        .lnode_type(ln_type)
        .ok_or_else(|| Error::scd(format!("Unknown LNodeType : {}", ln_type)))?;

    if filter.da_name.is_defined() {
        if let Err(e) = check_do_da(templates, ln_type, &filter.do_name, &filter.da_name) {
            error!("{}", e);
            return Ok(Vec::new());
        }
    }

    let mut walk = Walk {
        templates,
        filter,
        out: Vec::new(),
    };
    for do_def in &lnode_type.dos {
        if filter.do_name.is_defined() && filter.do_name.name != do_def.name {
            continue;
        }
        let Some(do_type) = templates.do_type(&do_def.type_id) else {
            continue;
        };
        let base = DataAttributeRef {
            prefix: filter.prefix.clone(),
            ln_class: filter.ln_class.clone(),
            ln_inst: filter.ln_inst.clone(),
            ln_type: ln_type.to_string(),
            do_name: DoTypeName::from_parts(do_def.name.clone(), Vec::new()),
            ..Default::default()
        };
        walk.do_type(do_type, &base);
    }
    Ok(walk.out)
}

/// Leaf attributes directly under the DO path `do_name`, SDOs excluded
pub fn attributes_of_do(
    templates: &DataTypeTemplates,
    ln_type: &str,
    do_name: &DoTypeName,
) -> Result<Vec<DataAttributeRef>> {
    let filter = DataAttributeRef {
        do_name: do_name.clone(),
        ..Default::default()
    };
    Ok(attribute_refs(templates, ln_type, &filter)?
        .into_iter()
        .filter(|r| r.do_name == *do_name)
        .collect())
}
