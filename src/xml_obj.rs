//! Generic tagged-tree object model over the project XML (spec §4.A, §9).
//!
//! Construction walks the source document once with `roxmltree`, the same
//! library the teacher uses for its Simulink system XML, and rebuilds it into
//! an arena of [`TwincatItem`] nodes. Parent links are indices into the arena
//! rather than owning references, so there's no cycle to worry about (spec
//! §9, "Parent back-references").

use crate::error::{CompileError, Result};
use indexmap::IndexMap;
use roxmltree::Document;
use std::collections::HashMap;

/// Index into [`XmlTree::nodes`]. `0` is always the root.
pub type NodeId = usize;

/// Static tag classification used for dispatch (spec §9: "static dispatch
/// table, unknown tags fall back to a generic node").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Symbol,
    DataType,
    SubItem,
    ArrayInfo,
    EnumInfo,
    ExtendsType,
    BitOffs,
    BitSize,
    Box,
    Axis,
    Link,
    Generic,
}

impl TagKind {
    fn from_tag(tag: &str) -> TagKind {
        match tag {
            "Symbol" => TagKind::Symbol,
            "DataType" => TagKind::DataType,
            "SubItem" => TagKind::SubItem,
            "ArrayInfo" => TagKind::ArrayInfo,
            "EnumInfo" => TagKind::EnumInfo,
            "ExtendsType" => TagKind::ExtendsType,
            "BitOffs" => TagKind::BitOffs,
            "BitSize" => TagKind::BitSize,
            "Box" => TagKind::Box,
            "Axis" => TagKind::Axis,
            "Link" => TagKind::Link,
            _ => TagKind::Generic,
        }
    }
}

/// A single node of the parsed XML tree.
///
/// Subclassing by tag name (spec §3) is represented by `kind`; callers that
/// need a typed view (`Symbol`, `DataType`, ...) build it from `attributes`
/// and `children` on demand rather than through inheritance.
#[derive(Debug, Clone)]
pub struct TwincatItem {
    pub tag: String,
    pub kind: TagKind,
    pub attributes: IndexMap<String, String>,
    pub text: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    children_by_tag: HashMap<String, Vec<NodeId>>,
}

impl TwincatItem {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn children_by_tag(&self, tag: &str) -> &[NodeId] {
        self.children_by_tag
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Owns the whole parsed tree. Nodes never outlive the tree and are looked
/// up by [`NodeId`], never held by direct reference across mutations.
#[derive(Debug, Default)]
pub struct XmlTree {
    nodes: Vec<TwincatItem>,
}

impl XmlTree {
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn get(&self, id: NodeId) -> &TwincatItem {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fully-qualified dotted path from the root down to `id`, joining each
    /// ancestor's `Name` attribute (falls back to its tag when unnamed).
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let item = self.get(n);
            let label = item.attribute("Name").unwrap_or(item.tag.as_str());
            parts.push(label.to_string());
            cur = item.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Parse an XML document into a tagged tree rooted at its outermost element.
    pub fn parse(source: &str) -> Result<Self> {
        let doc = Document::parse(source)
            .map_err(|e| CompileError::MalformedXml(e.to_string()))?;
        let root_elem = doc
            .root()
            .children()
            .find(|n| n.is_element())
            .ok_or_else(|| CompileError::MalformedXml("no root element".to_string()))?;

        let mut nodes = Vec::new();
        build_node(root_elem, None, &mut nodes);
        Ok(XmlTree { nodes })
    }
}

/// Strip a `{uri}` namespace prefix from a roxmltree tag name (spec §4.A:
/// "cope with ... namespace prefixes; strip any `{...}` prefix").
fn local_tag_name(node: roxmltree::Node) -> String {
    node.tag_name().name().to_string()
}

fn build_node(node: roxmltree::Node, parent: Option<NodeId>, nodes: &mut Vec<TwincatItem>) -> NodeId {
    let tag = local_tag_name(node);
    let kind = TagKind::from_tag(&tag);
    let mut attributes = IndexMap::new();
    for attr in node.attributes() {
        // Attribute names are matched case-exactly (spec §4.A); no normalization here.
        attributes.insert(attr.name().to_string(), attr.value().to_string());
    }
    let text = node
        .children()
        .find(|c| c.is_text())
        .and_then(|c| c.text())
        .map(|s| s.to_string());

    let my_id = nodes.len();
    nodes.push(TwincatItem {
        tag,
        kind,
        attributes,
        text,
        parent,
        children: Vec::new(),
        children_by_tag: HashMap::new(),
    });

    let mut children = Vec::new();
    let mut children_by_tag: HashMap<String, Vec<NodeId>> = HashMap::new();
    for child in node.children().filter(|c| c.is_element()) {
        let child_id = build_node(child, Some(my_id), nodes);
        let child_tag = nodes[child_id].tag.clone();
        children.push(child_id);
        children_by_tag.entry(child_tag).or_default().push(child_id);
    }
    nodes[my_id].children = children;
    nodes[my_id].children_by_tag = children_by_tag;
    my_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_namespace_prefix_and_indexes_children_by_tag() {
        let xml = r#"<Root xmlns:x="urn:x"><x:Symbol Name="A"/><Symbol Name="B"/></Root>"#;
        let tree = XmlTree::parse(xml).unwrap();
        let root = tree.get(tree.root());
        assert_eq!(root.children_by_tag("Symbol").len(), 2);
    }

    #[test]
    fn path_of_joins_name_attributes_dotted() {
        let xml = r#"<Symbols><Symbol Name="Main"><SubItem Name="scale"/></Symbol></Symbols>"#;
        let tree = XmlTree::parse(xml).unwrap();
        let root = tree.root();
        let symbol = tree.get(root).children_by_tag("Symbol")[0];
        let subitem = tree.get(symbol).children_by_tag("SubItem")[0];
        assert_eq!(tree.path_of(subitem), "Symbols.Main.scale");
    }

    #[test]
    fn rejects_xml_with_no_root_element() {
        let err = XmlTree::parse("   ").unwrap_err();
        assert!(matches!(err, CompileError::MalformedXml(_)));
    }
}
