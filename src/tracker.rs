//! Tracking of a dotted DO/DA path through a logical node's instance tree
//!
//! [`DaiTracker::search`] walks `DO.sdo1...` then `DA.bda1...` down the
//! DOI/SDI/DAI tree and reports how far it got. Indices start at -2 (not
//! searched), become -1 once the head of a path is found and then hold the
//! position of the last structure name consumed.

use std::fmt;

use log::trace;

use crate::catalog::{attributes_of_do, DataAttributeRef};
use crate::error::{Error, Result};
use crate::model::{DataTree, DataTypeTemplates, LogicalNode, NodeId, BOUNDED_CDCS};
use crate::names::{DaTypeName, DoTypeName};

const MIN_VAL: &str = "minVal";
const MAX_VAL: &str = "maxVal";
const STEP_SIZE: &str = "stepSize";

/// Outcome of a path search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The DOI itself is missing
    Failed,
    /// Some prefix of the path exists
    PartialMatch,
    /// The whole path resolves to a DAI
    FullMatch,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchResult::Failed => "FAILED",
            MatchResult::PartialMatch => "PARTIAL_MATCH",
            MatchResult::FullMatch => "FULL_MATCH",
        };
        f.write_str(s)
    }
}

/// Path search state over one [`DataTree`]
#[derive(Debug)]
pub struct DaiTracker<'a> {
    tree: &'a DataTree,
    do_name: &'a DoTypeName,
    da_name: &'a DaTypeName,
    do_node: Option<NodeId>,
    do_index: isize,
    da_node: Option<NodeId>,
    da_index: isize,
}

impl<'a> DaiTracker<'a> {
    /// Create a tracker for `do_name` / `da_name`
    pub fn new(tree: &'a DataTree, do_name: &'a DoTypeName, da_name: &'a DaTypeName) -> Self {
        Self {
            tree,
            do_name,
            da_name,
            do_node: None,
            do_index: -2,
            da_node: None,
            da_index: -2,
        }
    }

    /// Deepest DOI/SDI reached on the DO path
    pub fn do_node(&self) -> Option<NodeId> {
        self.do_node
    }

    /// Index of the last SDO name consumed
    pub fn do_index(&self) -> isize {
        self.do_index
    }

    /// Deepest node reached on the DA path
    pub fn da_node(&self) -> Option<NodeId> {
        self.da_node
    }

    /// Index of the last BDA name consumed
    pub fn da_index(&self) -> isize {
        self.da_index
    }

    /// Walk the tree
    pub fn search(&mut self) -> MatchResult {
        let result = self.walk();
        trace!(
            "{}.{} -> {} ({}, {})",
            self.do_name,
            self.da_name,
            result,
            self.do_index,
            self.da_index
        );
        result
    }

    fn walk(&mut self) -> MatchResult {
        let Some(doi) = self.tree.doi(&self.do_name.name) else {
            self.do_node = None;
            return MatchResult::Failed;
        };
        self.do_node = Some(doi);
        self.do_index = -1;

        let sdo_names = &self.do_name.struct_names;
        if !sdo_names.is_empty() {
            let m = self.tree.find_deepest_match(doi, sdo_names, 0, false);
            self.do_node = Some(m.node);
            self.do_index = m.index;
            if m.index < sdo_names.len() as isize - 1 {
                return MatchResult::PartialMatch;
            }
        }
        let parent = self.do_node.unwrap_or(doi);

        let bda_names = &self.da_name.struct_names;
        if !bda_names.is_empty() {
            let Ok(first) = self.tree.sdi(parent, &self.da_name.name) else {
                return MatchResult::PartialMatch;
            };
            self.da_index = -1;
            let m = self.tree.find_deepest_match(first, bda_names, 0, true);
            self.da_node = Some(m.node);
            self.da_index = m.index;
            if m.index < bda_names.len() as isize - 1 {
                return MatchResult::PartialMatch;
            }
        } else {
            let Ok(dai) = self.tree.dai_child(parent, &self.da_name.name) else {
                return MatchResult::PartialMatch;
            };
            self.da_node = Some(dai);
            self.da_index = -1;
        }
        MatchResult::FullMatch
    }
}

/// DAI fully matching `do_name` / `da_name`, if any
pub fn find_dai(tree: &DataTree, do_name: &DoTypeName, da_name: &DaTypeName) -> Option<NodeId> {
    let mut tracker = DaiTracker::new(tree, do_name, da_name);
    match tracker.search() {
        MatchResult::FullMatch => tracker.da_node(),
        _ => None,
    }
}

/// Numeric value of a bound attribute, falling back to `default`
fn bound_value(bound: &DataAttributeRef, default: f64) -> std::result::Result<f64, String> {
    let Some(value) = bound.values.values().next() else {
        return Ok(default);
    };
    let b_type = bound
        .b_type
        .as_ref()
        .ok_or_else(|| format!("Undefined DAI({}) basic Type", bound.da_name))?;
    if !b_type.is_numeric() {
        return Err("Unknown numeric format".to_string());
    }
    value.trim().parse::<f64>().map_err(|e| e.to_string())
}

/// Template bound `name` of the DO, overridden by the live DAI values
fn bound_ref(
    bounds: &[DataAttributeRef],
    tree: &DataTree,
    name: &str,
) -> Option<DataAttributeRef> {
    let mut bound = bounds
        .iter()
        .find(|r| r.da_name.name == name && !r.da_name.is_struct())?
        .clone();
    if let Some(dai) = find_dai(tree, &bound.do_name, &bound.da_name).and_then(|id| tree.dai(id)) {
        if !dai.values.is_empty() {
            bound.values = dai.values_by_group();
        }
    }
    Some(bound)
}

/// Check the first value of `attr` against the minVal/maxVal/stepSize of its DO.
///
/// Only data objects of a bounded common data class (ING, ASG) are checked.
pub fn validate_bounded_dai(
    templates: &DataTypeTemplates,
    ln: &LogicalNode,
    attr: &DataAttributeRef,
) -> Result<()> {
    let bounded = attr
        .cdc
        .as_deref()
        .map(|cdc| BOUNDED_CDCS.contains(&cdc))
        .unwrap_or(false);
    if !bounded {
        return Ok(());
    }

    let val: f64 = match attr.values.values().next() {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| Error::scd(format!("Invalid DAI value :{}", e)))?,
        None => return Err(Error::scd("Invalid DAI value :no value")),
    };
    if templates.lnode_type(&ln.ln_type).is_none() {
        return Err(Error::scd(format!("Unknown LNodeType : {}", ln.ln_type)));
    }
    let bounds = attributes_of_do(templates, &ln.ln_type, &attr.do_name)?;
    let invalid = |msg: String| Error::scd(format!("Invalid DO(minVal or maxVal or stepSize) :{}", msg));

    if let Some(bound) = bound_ref(&bounds, &ln.data, MIN_VAL) {
        let min = bound_value(&bound, f64::MIN).map_err(invalid)?;
        if val < min {
            return Err(Error::scd(format!(
                "The DA({}) value({:.6}) must be greater than({:.6})",
                attr.da_name, val, min
            )));
        }
    }
    if let Some(bound) = bound_ref(&bounds, &ln.data, MAX_VAL) {
        let max = bound_value(&bound, f64::MAX).map_err(invalid)?;
        if val > max {
            return Err(Error::scd(format!(
                "The DA({}) value({:.6}) must be less than({:.6})",
                attr.da_name, val, max
            )));
        }
    }
    if let Some(bound) = bound_ref(&bounds, &ln.data, STEP_SIZE) {
        let step = bound_value(&bound, val).map_err(invalid)?;
        // Both operands are truncated before the remainder
        let rem = (val as i64).abs().checked_rem((step as i64).abs()).unwrap_or(0);
        if rem as f64 > 1e-9 {
            return Err(Error::scd(format!(
                "The DA({}) value({:.6}) divisible by ({:.6})",
                attr.da_name, val, step
            )));
        }
    }
    Ok(())
}
