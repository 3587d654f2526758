//! Instance data tree of a logical node (DOI / SDI / DAI)
//!
//! Nodes live in an arena owned by the logical node. Children and parents
//! are addressed by [`NodeId`]; nodes are never removed individually, so ids
//! stay valid for the lifetime of the tree.

use crate::error::{Error, Result};
use crate::names::xpath_attribute_filter;
use indexmap::IndexMap;
use log::debug;

/// Name of the data object holding the logical device mode
pub const MOD_DO: &str = "Mod";
/// Name of the attribute holding a status value
pub const ST_VAL_DA: &str = "stVal";

/// Stable index of a node inside a [`DataTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A value, possibly attached to a setting group (0 means no group)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Val {
    /// Setting group, 0 when the value is not grouped
    pub s_group: u32,
    /// Textual value
    pub value: String,
}

impl Val {
    /// Create a value
    pub fn new(s_group: u32, value: impl Into<String>) -> Self {
        Self {
            s_group,
            value: value.into(),
        }
    }
}

/// Attribute instance payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dai {
    /// Whether the attribute type is a structure (so the DAI may hold children)
    pub structured: bool,
    /// Explicit valImport flag, `None` when unset
    pub val_import: Option<bool>,
    /// Values, in document order
    pub values: Vec<Val>,
}

impl Dai {
    /// Values keyed by setting group; a single value is keyed by 0
    pub fn values_by_group(&self) -> IndexMap<u32, String> {
        if self.values.len() == 1 {
            let mut map = IndexMap::new();
            map.insert(0, self.values[0].value.clone());
            return map;
        }
        self.values
            .iter()
            .map(|v| (v.s_group, v.value.clone()))
            .collect()
    }

    /// Whether some value belongs to an actual setting group
    pub fn has_setting_group(&self) -> bool {
        self.values.iter().any(|v| v.s_group > 0)
    }

    fn set_value(&mut self, s_group: u32, value: &str) {
        if s_group != 0 {
            match self.values.iter_mut().find(|v| v.s_group == s_group) {
                Some(v) => v.value = value.to_string(),
                None => self.values.push(Val::new(s_group, value)),
            }
        } else {
            match self.values.first_mut() {
                Some(v) => v.value = value.to_string(),
                None => self.values.push(Val::new(0, value)),
            }
        }
    }
}

/// Kind of a node, with capability-dependent payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Data object instance
    Doi,
    /// Structured data instance
    Sdi,
    /// Data attribute instance
    Dai(Dai),
}

impl NodeKind {
    /// SCL element name
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Doi => "DOI",
            NodeKind::Sdi => "SDI",
            NodeKind::Dai(_) => "DAI",
        }
    }
}

/// One DOI, SDI or DAI
#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    /// Instance name
    pub name: String,
    /// Enclosing node, `None` for a DOI
    pub parent: Option<NodeId>,
    /// Children, in document order
    pub children: Vec<NodeId>,
    /// Kind and payload
    pub kind: NodeKind,
}

impl DataNode {
    /// Whether SDI/DAI children may be added under this node
    pub fn is_data_parent(&self) -> bool {
        match &self.kind {
            NodeKind::Doi | NodeKind::Sdi => true,
            NodeKind::Dai(dai) => dai.structured,
        }
    }

    /// DAI payload, if any
    pub fn dai(&self) -> Option<&Dai> {
        match &self.kind {
            NodeKind::Dai(dai) => Some(dai),
            _ => None,
        }
    }

    fn is_structured(&self) -> bool {
        match &self.kind {
            NodeKind::Sdi => true,
            NodeKind::Dai(dai) => dai.structured,
            NodeKind::Doi => false,
        }
    }
}

/// Result of walking a list of names down the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepestMatch {
    /// Last resolved node, or the starting node when nothing matched
    pub node: NodeId,
    /// Index of the last consumed name, -1 when nothing matched
    pub index: isize,
}

/// Arena of DOI/SDI/DAI nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    nodes: Vec<DataNode>,
    roots: Vec<NodeId>,
}

impl DataTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top level DOIs
    pub fn dois(&self) -> &[NodeId] {
        &self.roots
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> &DataNode {
        &self.nodes[id.0]
    }

    /// Enclosing node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children of a node
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// DAI payload of a node
    pub fn dai(&self, id: NodeId) -> Option<&Dai> {
        self.nodes[id.0].dai()
    }

    /// Mutable DAI payload of a node
    pub fn dai_mut(&mut self, id: NodeId) -> Option<&mut Dai> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Dai(dai) => Some(dai),
            _ => None,
        }
    }

    fn push(&mut self, node: DataNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = node.parent {
            self.nodes[parent.0].children.push(id);
        } else {
            self.roots.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// DOI by name
    pub fn doi(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name == name)
    }

    /// DOI by name, failing with the owner's locator
    pub fn require_doi(&self, name: &str, owner_xpath: &str) -> Result<NodeId> {
        self.doi(name)
            .ok_or_else(|| Error::not_found(format!("Unknown DOI({}) in {}", name, owner_xpath)))
    }

    /// Add a DOI
    pub fn add_doi(&mut self, name: impl Into<String>) -> NodeId {
        let name = name.into();
        debug!("adding DOI {}", name);
        self.push(DataNode {
            name,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Doi,
        })
    }

    /// Structured child (SDI, or a struct-typed DAI) by name
    pub fn sdi(&self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| {
                let n = &self.nodes[id.0];
                n.name == name && n.is_structured()
            })
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Unknown SDI ({}) in this DOI or SDI ({})",
                    name,
                    self.nodes[parent.0].name
                ))
            })
    }

    /// DAI child by name
    pub fn dai_child(&self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| {
                let n = &self.nodes[id.0];
                n.name == name && matches!(n.kind, NodeKind::Dai(_))
            })
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Unknown DAI ({}) in this SDI ({})",
                    name,
                    self.nodes[parent.0].name
                ))
            })
    }

    fn require_data_parent(&self, parent: NodeId) -> Result<()> {
        if self.nodes[parent.0].is_data_parent() {
            Ok(())
        } else {
            Err(Error::unsupported("DAI cannot contain a further DAI"))
        }
    }

    /// Add an SDI under a DOI, SDI or structured DAI
    pub fn add_sdi(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        self.require_data_parent(parent)?;
        Ok(self.push(DataNode {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Sdi,
        }))
    }

    /// Add a DAI under a DOI, SDI or structured DAI
    pub fn add_dai(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        structured: bool,
        val_import: Option<bool>,
    ) -> Result<NodeId> {
        self.require_data_parent(parent)?;
        Ok(self.push(DataNode {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Dai(Dai {
                structured,
                val_import,
                values: Vec::new(),
            }),
        }))
    }

    /// Walk `names[from..]` below `start`, stopping at the first miss.
    ///
    /// Every name is looked up as a structured child, except the last one
    /// when `last_is_dai` is set, which is looked up as a DAI.
    pub fn find_deepest_match(
        &self,
        start: NodeId,
        names: &[String],
        from: usize,
        last_is_dai: bool,
    ) -> DeepestMatch {
        let mut current = start;
        let mut index: isize = -1;
        for (i, name) in names.iter().enumerate().skip(from) {
            let found = if last_is_dai && i == names.len() - 1 {
                self.dai_child(current, name)
            } else {
                self.sdi(current, name)
            };
            match found {
                Ok(id) => {
                    current = id;
                    index = i as isize;
                }
                Err(_) => break,
            }
        }
        DeepestMatch {
            node: current,
            index,
        }
    }

    /// Root DOI of a node
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Whether the node is the `Mod.stVal` attribute
    pub fn is_mod_st_val(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        matches!(node.kind, NodeKind::Dai(_))
            && node.name == ST_VAL_DA
            && node.parent.map(|p| self.nodes[p.0].name == MOD_DO && self.parent(p).is_none())
                == Some(true)
    }

    /// Relative locator such as `DOI[@name="Mod"]/DAI[@name="stVal"]`
    pub fn xpath(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            let node = &self.nodes[c.0];
            segments.push(format!(
                "{}[{}]",
                node.kind.tag(),
                xpath_attribute_filter("name", Some(&node.name))
            ));
            current = node.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Update a DAI from values keyed by setting group.
    ///
    /// When several values are given and group 0 is among them, only group 0
    /// is applied. `owner_xpath` locates the owning logical node.
    pub fn update_dai(
        &mut self,
        id: NodeId,
        values: &IndexMap<u32, String>,
        owner_xpath: &str,
    ) -> Result<()> {
        if values.len() > 1 {
            if let Some(v) = values.get(&0) {
                return self.update_dai_value(id, 0, v, owner_xpath);
            }
        }
        for (s_group, v) in values {
            self.update_dai_value(id, *s_group, v, owner_xpath)?;
        }
        Ok(())
    }

    /// Update one value of a DAI
    pub fn update_dai_value(
        &mut self,
        id: NodeId,
        s_group: u32,
        value: &str,
        owner_xpath: &str,
    ) -> Result<()> {
        let mod_st_val = self.is_mod_st_val(id);
        let name = self.nodes[id.0].name.clone();
        let xpath = format!("{}/{}", owner_xpath, self.xpath(id));
        let dai = self
            .dai_mut(id)
            .ok_or_else(|| Error::unsupported(format!("{} is not a DAI", xpath)))?;
        if !mod_st_val && dai.val_import == Some(false) {
            return Err(Error::scd(format!(
                "DAI({}) cannot be updated : valImport(false) {}",
                name, xpath
            )));
        }
        dai.set_value(s_group, value);
        Ok(())
    }
}
