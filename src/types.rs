//! Type resolver (spec §4.B): reconstructs [`Symbol`], [`DataType`], [`SubItem`],
//! [`ArrayInfo`], [`EnumInfo`] and extension chains from the raw XML tree, and
//! maps built-in PLC type names to the record-kind table in spec §4.B.

use crate::error::{CompileError, Result};
use crate::xml_obj::{NodeId, XmlTree};
use std::collections::{HashMap, HashSet};

/// A PLC built-in scalar type, per the table in spec §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlcPrimitive {
    Bool,
    Byte,
    Sint,
    Usint,
    Word,
    Int,
    Uint,
    Enum,
    Dword,
    Dint,
    Udint,
    Lword,
    Lint,
    Ulint,
    Real,
    Lreal,
    /// `STRING(n)`, n = declared character length.
    StringN(u32),
}

impl PlcPrimitive {
    /// Parse a bare (non-array, non-pointer) PLC type name into a primitive,
    /// if it names one of the built-ins in spec §4.B.
    pub fn from_type_name(name: &str) -> Option<PlcPrimitive> {
        let trimmed = name.trim();
        if let Some(rest) = trimmed.strip_prefix("STRING") {
            let rest = rest.trim();
            let n = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .and_then(|inner| inner.trim().parse::<u32>().ok())
                .unwrap_or(80);
            return Some(PlcPrimitive::StringN(n));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "BOOL" => Some(PlcPrimitive::Bool),
            "BYTE" => Some(PlcPrimitive::Byte),
            "SINT" => Some(PlcPrimitive::Sint),
            "USINT" => Some(PlcPrimitive::Usint),
            "WORD" => Some(PlcPrimitive::Word),
            "INT" => Some(PlcPrimitive::Int),
            "UINT" => Some(PlcPrimitive::Uint),
            "ENUM" => Some(PlcPrimitive::Enum),
            "DWORD" => Some(PlcPrimitive::Dword),
            "DINT" => Some(PlcPrimitive::Dint),
            "UDINT" => Some(PlcPrimitive::Udint),
            "LWORD" => Some(PlcPrimitive::Lword),
            "LINT" => Some(PlcPrimitive::Lint),
            "ULINT" => Some(PlcPrimitive::Ulint),
            "REAL" => Some(PlcPrimitive::Real),
            "LREAL" => Some(PlcPrimitive::Lreal),
            _ => None,
        }
    }

    /// Whether this primitive is explicitly unsupported (spec §4.B: "LWORD/LINT/ULINT
    /// — unsupported; emit diagnostic").
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PlcPrimitive::Lword | PlcPrimitive::Lint | PlcPrimitive::Ulint)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, PlcPrimitive::StringN(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PlcPrimitive::Real | PlcPrimitive::Lreal)
    }
}

/// A pointer/reference of positive depth is treated as an integer of the
/// platform word size for record-emission purposes (spec §4.B) — modeled as
/// a `Dint` so it flows through the same scalar-integer record path.
pub const POINTER_PRIMITIVE: PlcPrimitive = PlcPrimitive::Dint;

/// Ordered list of `(lower_bound, upper_bound)` pairs, inclusive (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub dims: Vec<(i64, i64)>,
}

impl ArrayInfo {
    /// `element_count = ∏ (upper − lower + 1)` across all dimensions.
    pub fn element_count(&self) -> u64 {
        self.dims
            .iter()
            .map(|(lo, hi)| (hi - lo + 1).max(0) as u64)
            .product()
    }

    /// Flat zero-based indices in row-major order, one per element — used by
    /// the chain walker to expand a multidimensional array into its
    /// cross-product of selected indices (spec §3: "nested/multidimensional
    /// arrays produce the full cross-product").
    pub fn flat_indices(&self) -> Vec<Vec<i64>> {
        let mut out: Vec<Vec<i64>> = vec![Vec::new()];
        for &(lo, hi) in &self.dims {
            let mut next = Vec::new();
            for prefix in &out {
                for v in lo..=hi {
                    let mut p = prefix.clone();
                    p.push(v);
                    next.push(p);
                }
            }
            out = next;
        }
        out
    }
}

/// Ordered list of `(integer_value, text)` pairs (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub values: Vec<(i64, String)>,
}

#[derive(Debug, Clone)]
pub struct SubItem {
    pub node: NodeId,
    pub name: String,
    pub type_name: String,
    pub bit_offset: u64,
    pub bit_size: u64,
    pub array: Option<ArrayInfo>,
    pub pointer_depth: u32,
    pub pragma: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DataType {
    pub node: NodeId,
    pub name: String,
    pub namespace: Option<String>,
    pub guid: Option<String>,
    pub bit_size: u64,
    pub subitems: Vec<SubItem>,
    pub extends: Option<String>,
    pub enum_info: Option<EnumInfo>,
}

impl DataType {
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{}", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub node: NodeId,
    pub name: String,
    pub type_name: String,
    pub module_index: Option<u32>,
    pub byte_offset: Option<u64>,
    pub bit_size: Option<u64>,
    pub array: Option<ArrayInfo>,
    pub pointer_depth: u32,
    pub pragma: Option<String>,
}

/// What a type name resolves to: a built-in scalar, or a composite
/// [`DataType`] (looked up by reference into the [`TypeTable`]).
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Primitive(PlcPrimitive),
    Composite(&'a DataType),
}

/// Read-only, fully-loaded type universe for one project (spec §5: "read-only
/// once loaded"). Built once from the XML tree, then consulted by the chain
/// walker and record builder.
#[derive(Debug, Default)]
pub struct TypeTable {
    by_name: HashMap<String, DataType>,
    by_guid: HashMap<String, String>,
    pub symbols: Vec<Symbol>,
}

impl TypeTable {
    /// Walk the whole tree collecting every `<DataType>` and top-level
    /// `<Symbol>` node into the table.
    pub fn build(tree: &XmlTree) -> Result<TypeTable> {
        Self::build_many(std::slice::from_ref(tree))
    }

    /// Build one table spanning every tree — a solution's worth of project
    /// files resolve types and symbols against each other as if they were
    /// one document (spec §4.B).
    pub fn build_many(trees: &[XmlTree]) -> Result<TypeTable> {
        let mut table = TypeTable::default();
        for tree in trees {
            collect(tree, tree.root(), &mut table)?;
        }
        Ok(table)
    }

    pub fn data_type_by_name(&self, name: &str) -> Option<&DataType> {
        self.by_name.get(name)
    }

    pub fn data_type_by_guid(&self, guid: &str) -> Option<&DataType> {
        self.by_guid.get(guid).and_then(|n| self.by_name.get(n))
    }

    /// Resolve a qualified type name (optionally disambiguated by GUID) to a
    /// built-in or a composite. Resolution prefers GUID, then fully-qualified
    /// name, then bare name as a last resort with a warning (spec §4.B).
    pub fn resolve(&self, type_name: &str, guid: Option<&str>) -> Result<Resolved<'_>> {
        if let Some(prim) = PlcPrimitive::from_type_name(type_name) {
            return Ok(Resolved::Primitive(prim));
        }
        if let Some(g) = guid {
            if let Some(dt) = self.data_type_by_guid(g) {
                return Ok(Resolved::Composite(dt));
            }
        }
        if let Some(dt) = self.data_type_by_name(type_name) {
            return Ok(Resolved::Composite(dt));
        }
        // Last resort: bare name (strip any leading namespace segment).
        if let Some((_, bare)) = type_name.rsplit_once('.') {
            if let Some(dt) = self.data_type_by_name(bare) {
                return Ok(Resolved::Composite(dt));
            }
        }
        Err(CompileError::UnresolvedType {
            path: type_name.to_string(),
            type_name: type_name.to_string(),
        })
    }

    /// Walk the single-inheritance `ExtendsType` chain from `dt` to its root
    /// base, with a cycle guard (spec §4.B).
    pub fn extends_chain<'a>(&'a self, dt: &'a DataType) -> Result<Vec<&'a DataType>> {
        let mut chain = vec![dt];
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(dt.qualified_name());
        let mut cur = dt;
        while let Some(base_name) = &cur.extends {
            if !visited.insert(base_name.clone()) {
                return Err(CompileError::InternalInvariantViolated(format!(
                    "extends cycle detected at {base_name}"
                )));
            }
            let base = self.data_type_by_name(base_name).ok_or_else(|| {
                CompileError::UnresolvedType {
                    path: dt.qualified_name(),
                    type_name: base_name.clone(),
                }
            })?;
            chain.push(base);
            cur = base;
        }
        Ok(chain)
    }

    /// All subitems of `dt` plus every subitem inherited through its
    /// `ExtendsType` chain, base-first so that overriding order matches
    /// declaration order.
    pub fn all_subitems<'a>(&'a self, dt: &'a DataType) -> Result<Vec<&'a SubItem>> {
        let chain = self.extends_chain(dt)?;
        let mut items = Vec::new();
        for level in chain.into_iter().rev() {
            items.extend(level.subitems.iter());
        }
        Ok(items)
    }
}

fn collect(tree: &XmlTree, node: NodeId, table: &mut TypeTable) -> Result<()> {
    let item = tree.get(node);
    match item.tag.as_str() {
        "DataType" => {
            let dt = parse_data_type(tree, node)?;
            if let Some(guid) = &dt.guid {
                table.by_guid.insert(guid.clone(), dt.qualified_name());
            }
            table.by_name.insert(dt.qualified_name(), dt);
        }
        "Symbol" => {
            table.symbols.push(parse_symbol(tree, node));
        }
        _ => {}
    }
    for &child in &item.children {
        collect(tree, child, table)?;
    }
    Ok(())
}

fn parse_array_info(tree: &XmlTree, node: NodeId) -> Option<ArrayInfo> {
    let item = tree.get(node);
    let array_nodes = item.children_by_tag("ArrayInfo");
    let array_node = *array_nodes.first()?;
    let mut dims = Vec::new();
    for &dim_id in &tree.get(array_node).children {
        let dim = tree.get(dim_id);
        if dim.tag != "Elements" {
            continue;
        }
        let lo = dim
            .children_by_tag("LBound")
            .first()
            .and_then(|&n| tree.get(n).text.as_deref())
            .and_then(|t| t.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let count = dim
            .children_by_tag("Elements")
            .first()
            .and_then(|&n| tree.get(n).text.as_deref())
            .and_then(|t| t.trim().parse::<i64>().ok());
        let hi = count.map(|c| lo + c - 1).unwrap_or(lo);
        dims.push((lo, hi));
    }
    if dims.is_empty() {
        None
    } else {
        Some(ArrayInfo { dims })
    }
}

fn parse_enum_info(tree: &XmlTree, node: NodeId) -> Option<EnumInfo> {
    let item = tree.get(node);
    let nodes = item.children_by_tag("EnumInfo");
    if nodes.is_empty() {
        return None;
    }
    let mut values = Vec::new();
    for &enum_node in nodes {
        let en = tree.get(enum_node);
        let text = en
            .children_by_tag("Text")
            .first()
            .and_then(|&n| tree.get(n).text.clone())
            .unwrap_or_default();
        let value = en
            .children_by_tag("Enum")
            .first()
            .and_then(|&n| tree.get(n).text.as_deref())
            .and_then(|t| t.trim().parse::<i64>().ok())
            .unwrap_or(0);
        values.push((value, text));
    }
    Some(EnumInfo { values })
}

fn pointer_depth_of(item: &crate::xml_obj::TwincatItem) -> u32 {
    item.attribute("PointerTo")
        .or_else(|| item.attribute("ReferenceTo"))
        .map(|_| 1)
        .unwrap_or(0)
}

fn parse_sub_item(tree: &XmlTree, node: NodeId) -> SubItem {
    let item = tree.get(node);
    let name = item.attribute("Name").unwrap_or_default().to_string();
    let type_name = item
        .children_by_tag("Type")
        .first()
        .and_then(|&n| tree.get(n).text.clone())
        .unwrap_or_default();
    let bit_offset = item
        .children_by_tag("BitOffs")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let bit_size = item
        .children_by_tag("BitSize")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let pragma = item
        .attribute("pytmc")
        .map(str::to_string)
        .or_else(|| {
            item.children_by_tag("Properties")
                .first()
                .and_then(|&props| find_pragma_property(tree, props))
        });
    SubItem {
        node,
        name,
        type_name,
        bit_offset,
        bit_size,
        array: parse_array_info(tree, node),
        pointer_depth: pointer_depth_of(item),
        pragma,
    }
}

/// The pragma text lives either directly as an attribute on the declaration,
/// or as a `<Properties><Property><Name>pytmc</Name><Value>...</Value>` pair
/// — TwinCAT emits the latter for longer annotations. Both forms are
/// supported so a malformed/missing pragma never silently looks present.
fn find_pragma_property(tree: &XmlTree, properties_node: NodeId) -> Option<String> {
    for &prop in &tree.get(properties_node).children {
        let p = tree.get(prop);
        if p.tag != "Property" {
            continue;
        }
        let name = p
            .children_by_tag("Name")
            .first()
            .and_then(|&n| tree.get(n).text.as_deref());
        if name == Some("pytmc") {
            return p
                .children_by_tag("Value")
                .first()
                .and_then(|&n| tree.get(n).text.clone());
        }
    }
    None
}

fn parse_data_type(tree: &XmlTree, node: NodeId) -> Result<DataType> {
    let item = tree.get(node);
    let name = item.attribute("Name").unwrap_or_default().to_string();
    let namespace = item.attribute("Namespace").map(str::to_string);
    let guid = item.attribute("Id").map(str::to_string);
    let bit_size = item
        .children_by_tag("BitSize")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let extends = item
        .children_by_tag("ExtendsType")
        .first()
        .and_then(|&n| tree.get(n).text.clone());
    let subitems = item
        .children_by_tag("SubItem")
        .iter()
        .map(|&n| parse_sub_item(tree, n))
        .collect();
    Ok(DataType {
        node,
        name,
        namespace,
        guid,
        bit_size,
        subitems,
        extends,
        enum_info: parse_enum_info(tree, node),
    })
}

fn parse_symbol(tree: &XmlTree, node: NodeId) -> Symbol {
    let item = tree.get(node);
    let name = item.attribute("Name").unwrap_or_default().to_string();
    let type_name = item
        .children_by_tag("Type")
        .first()
        .and_then(|&n| tree.get(n).text.clone())
        .unwrap_or_default();
    let module_index = item
        .children_by_tag("IGroup")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u32>().ok());
    let byte_offset = item
        .children_by_tag("IOffs")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u64>().ok());
    let bit_size = item
        .children_by_tag("BitSize")
        .first()
        .and_then(|&n| tree.get(n).text.as_deref())
        .and_then(|t| t.trim().parse::<u64>().ok());
    let pragma = item
        .attribute("pytmc")
        .map(str::to_string)
        .or_else(|| {
            item.children_by_tag("Properties")
                .first()
                .and_then(|&props| find_pragma_property(tree, props))
        });
    Symbol {
        node,
        name,
        type_name,
        module_index,
        byte_offset,
        bit_size,
        array: parse_array_info(tree, node),
        pointer_depth: pointer_depth_of(item),
        pragma,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_primitives_parse_case_insensitively() {
        assert_eq!(PlcPrimitive::from_type_name("lreal"), Some(PlcPrimitive::Lreal));
        assert_eq!(PlcPrimitive::from_type_name("DINT"), Some(PlcPrimitive::Dint));
        assert_eq!(PlcPrimitive::from_type_name("WORD"), Some(PlcPrimitive::Word));
        assert_eq!(PlcPrimitive::from_type_name("INT"), Some(PlcPrimitive::Int));
        assert_eq!(PlcPrimitive::from_type_name("STRING(40)"), Some(PlcPrimitive::StringN(40)));
        assert_eq!(PlcPrimitive::from_type_name("STRING"), Some(PlcPrimitive::StringN(80)));
        assert!(PlcPrimitive::from_type_name("DUT_Foo").is_none());
    }

    #[test]
    fn lword_family_is_unsupported() {
        assert!(PlcPrimitive::Lword.is_unsupported());
        assert!(PlcPrimitive::Lint.is_unsupported());
        assert!(!PlcPrimitive::Dint.is_unsupported());
    }

    #[test]
    fn array_info_element_count_is_product_of_dims() {
        let a = ArrayInfo { dims: vec![(0, 5), (1, 2)] };
        assert_eq!(a.element_count(), 6 * 2);
        assert_eq!(a.flat_indices().len(), 12);
    }

    const PROJECT_XML: &str = r#"
    <Project>
      <DataType Name="DUT_Base" Id="guid-base">
        <BitSize>32</BitSize>
        <SubItem Name="value_d"><Type>DINT</Type><BitOffs>0</BitOffs><BitSize>32</BitSize></SubItem>
      </DataType>
      <DataType Name="DUT_X" Id="guid-x">
        <BitSize>64</BitSize>
        <ExtendsType>DUT_Base</ExtendsType>
        <SubItem Name="flag"><Type>BOOL</Type><BitOffs>32</BitOffs><BitSize>1</BitSize></SubItem>
      </DataType>
      <Symbol Name="Main.counter">
        <Type>DUT_X</Type>
        <BitSize>64</BitSize>
      </Symbol>
    </Project>
    "#;

    #[test]
    fn resolves_composite_by_name_and_walks_extends_chain() {
        let tree = XmlTree::parse(PROJECT_XML).unwrap();
        let table = TypeTable::build(&tree).unwrap();
        let dt = table.data_type_by_name("DUT_X").unwrap();
        let chain = table.extends_chain(dt).unwrap();
        assert_eq!(chain.len(), 2);
        let subitems = table.all_subitems(dt).unwrap();
        let names: Vec<&str> = subitems.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["value_d", "flag"]);
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let xml = r#"<Project>
          <DataType Name="A"><ExtendsType>B</ExtendsType></DataType>
          <DataType Name="B"><ExtendsType>A</ExtendsType></DataType>
        </Project>"#;
        let tree = XmlTree::parse(xml).unwrap();
        let table = TypeTable::build(&tree).unwrap();
        let dt = table.data_type_by_name("A").unwrap();
        assert!(table.extends_chain(dt).is_err());
    }

    #[test]
    fn unresolved_type_name_errors() {
        let tree = XmlTree::parse(PROJECT_XML).unwrap();
        let table = TypeTable::build(&tree).unwrap();
        assert!(table.resolve("DUT_Nonexistent", None).is_err());
    }
}
