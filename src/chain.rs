//! Chain walker (spec §4.D): depth-first walk from every top-level `Symbol`
//! down through composite subitems, annotating each pragma-bearing node along
//! the way and yielding one [`Chain`] per leaf that has at least one pragma
//! somewhere on its root-to-leaf path.
//!
//! Array handling follows spec §3: an array of a composite type always
//! expands per-element (a waveform record can't hold struct elements); an
//! array of a primitive only expands per-element when its pragma carries an
//! `array` or `expand` key, otherwise it surfaces as a single `NELM`-sized
//! leaf for [`crate::record`] to turn into a waveform record.

use crate::diag::Diagnostics;
use crate::error::{CompileError, Result};
use crate::pragma::{self, Directive, Pragma};
use crate::types::{ArrayInfo, EnumInfo, PlcPrimitive, Resolved, SubItem, Symbol, TypeTable, POINTER_PRIMITIVE};

/// What a chain terminates in.
#[derive(Debug, Clone)]
pub enum LeafKind {
    Primitive(PlcPrimitive),
    PrimitiveArray { prim: PlcPrimitive, array: ArrayInfo },
    Enum(EnumInfo),
}

/// One root-to-leaf annotated path (spec §3: "Chain").
#[derive(Debug, Clone)]
pub struct Chain {
    /// Dotted path from the root symbol to this leaf, including any array
    /// index suffixes (e.g. `Main.axes[3].position`).
    pub tcname: String,
    /// Every pragma-bearing node's parsed pragma, root first, plus any
    /// synthetic single-`pv` levels contributed by array index expansion.
    /// [`crate::merge`] folds these into one [`crate::merge::Configuration`].
    pub levels: Vec<Pragma>,
    pub leaf: LeafKind,
}

/// Lazily yields the [`Chain`]s already discovered by [`walk`].
///
/// The walk itself is eager (a DFS over a tree that's fully resolved and
/// read-only makes little practical difference either way) but is exposed as
/// a plain iterator so callers in `record.rs`/`cli.rs` compose with it the
/// same way they would any other chain source.
pub struct Chains(std::vec::IntoIter<Chain>);

impl Iterator for Chains {
    type Item = Chain;
    fn next(&mut self) -> Option<Chain> {
        self.0.next()
    }
}

/// Walk every symbol in `types` and return the discovered chains. Fatal
/// errors abort the whole walk; everything else is pushed to `diag` and the
/// offending branch is simply skipped (spec §7).
pub fn walk(types: &TypeTable, diag: &mut Diagnostics) -> Result<Chains> {
    let mut out = Vec::new();
    for symbol in &types.symbols {
        walk_symbol(symbol, types, diag, &mut out)?;
    }
    Ok(Chains(out.into_iter()))
}

fn walk_symbol(symbol: &Symbol, types: &TypeTable, diag: &mut Diagnostics, out: &mut Vec<Chain>) -> Result<()> {
    let own_pragma = parse_own_pragma(symbol.pragma.as_deref(), &symbol.name, diag)?;
    let mut levels = Vec::new();
    if let Some(p) = own_pragma {
        if !p.is_empty() {
            levels.push(p);
        }
    }
    descend(
        &symbol.name,
        symbol.type_name.as_str(),
        None,
        symbol.array.as_ref(),
        symbol.pointer_depth,
        levels,
        types,
        diag,
        out,
    )
}

fn parse_own_pragma(raw: Option<&str>, location: &str, diag: &mut Diagnostics) -> Result<Option<Pragma>> {
    let Some(raw) = raw else { return Ok(None) };
    match pragma::parse(raw) {
        Ok(p) => Ok(Some(p)),
        Err(err) => {
            let err = match err {
                CompileError::MalformedPragma { reason, .. } => CompileError::MalformedPragma {
                    path: location.to_string(),
                    reason,
                },
                other => other,
            };
            diag.push_error(&err);
            Ok(None)
        }
    }
}

/// Resolve `type_name` at `tcname`, then either emit a leaf chain or recurse
/// into a composite's subitems, depending on what it resolves to.
#[allow(clippy::too_many_arguments)]
fn descend(
    tcname: &str,
    type_name: &str,
    guid: Option<&str>,
    array: Option<&ArrayInfo>,
    pointer_depth: u32,
    levels: Vec<Pragma>,
    types: &TypeTable,
    diag: &mut Diagnostics,
    out: &mut Vec<Chain>,
) -> Result<()> {
    if pointer_depth > 0 {
        emit_scalar_or_array(tcname, LeafKind::Primitive(POINTER_PRIMITIVE), array, &levels, diag, out);
        return Ok(());
    }

    let resolved = match types.resolve(type_name, guid) {
        Ok(r) => r,
        Err(err) => {
            if !levels.is_empty() {
                diag.push_error(&err);
            }
            return Ok(());
        }
    };

    match resolved {
        Resolved::Primitive(prim) => {
            if prim.is_unsupported() {
                if !levels.is_empty() {
                    diag.push_error(&CompileError::UnsupportedType {
                        tcname: tcname.to_string(),
                        type_name: type_name.to_string(),
                    });
                }
                return Ok(());
            }
            emit_scalar_or_array(tcname, LeafKind::Primitive(prim), array, &levels, diag, out);
            Ok(())
        }
        Resolved::Composite(dt) => {
            if dt.subitems.is_empty() {
                if let Some(info) = &dt.enum_info {
                    emit_scalar_or_array(tcname, LeafKind::Enum(info.clone()), array, &levels, diag, out);
                }
                return Ok(());
            }
            let subitems = types.all_subitems(dt)?;
            match array {
                None => descend_into_subitems(tcname, &subitems, &levels, types, diag, out),
                Some(info) => {
                    for (idx, selector_level) in array_expansion_levels(tcname, info, &levels, diag, true)? {
                        let mut child_levels = levels.clone();
                        child_levels.push(selector_level);
                        let child_tcname = indexed_tcname(tcname, &idx);
                        descend_into_subitems(&child_tcname, &subitems, &child_levels, types, diag, out)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

fn descend_into_subitems(
    tcname: &str,
    subitems: &[&SubItem],
    levels: &[Pragma],
    types: &TypeTable,
    diag: &mut Diagnostics,
    out: &mut Vec<Chain>,
) -> Result<()> {
    for sub in subitems {
        let child_tcname = format!("{tcname}.{}", sub.name);
        let own_pragma = parse_own_pragma(sub.pragma.as_deref(), &child_tcname, diag)?;
        let mut child_levels = levels.to_vec();
        if let Some(p) = own_pragma {
            if !p.is_empty() {
                child_levels.push(p);
            }
        }
        descend(
            &child_tcname,
            &sub.type_name,
            None,
            sub.array.as_ref(),
            sub.pointer_depth,
            child_levels,
            types,
            diag,
            out,
        )?;
    }
    Ok(())
}

/// Emit either one whole-array leaf or N per-index leaves, depending on
/// whether the accumulated pragma requests per-element expansion.
fn emit_scalar_or_array(
    tcname: &str,
    leaf: LeafKind,
    array: Option<&ArrayInfo>,
    levels: &[Pragma],
    diag: &mut Diagnostics,
    out: &mut Vec<Chain>,
) {
    let Some(info) = array else {
        emit_leaf(tcname, leaf, levels, out);
        return;
    };
    let prim = match &leaf {
        LeafKind::Primitive(p) => *p,
        _ => {
            emit_leaf(tcname, leaf, levels, out);
            return;
        }
    };
    if !wants_per_element_expansion(levels) {
        emit_leaf(
            tcname,
            LeafKind::PrimitiveArray { prim, array: info.clone() },
            levels,
            out,
        );
        return;
    }
    match array_expansion_levels(tcname, info, levels, diag, false) {
        Ok(expansions) => {
            for (idx, selector_level) in expansions {
                let mut child_levels = levels.to_vec();
                child_levels.push(selector_level);
                let child_tcname = indexed_tcname(tcname, &idx);
                emit_leaf(&child_tcname, LeafKind::Primitive(prim), &child_levels, out);
            }
        }
        Err(err) => diag.push_error(&err),
    }
}

fn wants_per_element_expansion(levels: &[Pragma]) -> bool {
    levels.iter().flat_map(|p| &p.directives).any(|d| matches!(d, Directive::Array(_) | Directive::Expand(_)))
}

/// Resolve the `array`/`expand` pragma keys against `info`'s bounds, returning
/// one `(flat_index, synthetic pv-suffix level)` pair per selected element.
///
/// `force_all` is used for composite arrays, which always expand even without
/// an explicit `array`/`expand` key (spec §3: "a composite array always
/// expands").
fn array_expansion_levels(
    tcname: &str,
    info: &ArrayInfo,
    levels: &[Pragma],
    diag: &mut Diagnostics,
    force_all: bool,
) -> Result<Vec<(Vec<i64>, Pragma)>> {
    let selector = levels
        .iter()
        .flat_map(|p| &p.directives)
        .find_map(|d| match d {
            Directive::Array(v) => Some(v.as_str()),
            _ => None,
        });
    let explicit_expand_fmt = levels
        .iter()
        .flat_map(|p| &p.directives)
        .find_map(|d| match d {
            Directive::Expand(v) => Some(v.as_str()),
            _ => None,
        });
    let default_expand_fmt = default_expand_format(info);
    let expand_fmt = explicit_expand_fmt.unwrap_or(default_expand_fmt.as_str());

    let all_flat = info.flat_indices();
    let selected: Vec<Vec<i64>> = match selector {
        None => {
            if !force_all && !wants_per_element_expansion(levels) {
                Vec::new()
            } else {
                all_flat
            }
        }
        Some(raw) => {
            let ranges = pragma::parse_array_selector(raw).map_err(|e| match e {
                CompileError::MalformedPragma { reason, .. } => CompileError::MalformedPragma {
                    path: tcname.to_string(),
                    reason,
                },
                other => other,
            })?;
            // Only the outermost dimension is selector-restricted; inner
            // dimensions (if any) are expanded in full for each selected outer index.
            if info.dims.is_empty() {
                Vec::new()
            } else {
                let (outer_lo, outer_hi) = info.dims[0];
                let mut picked = Vec::new();
                for (lo, hi) in ranges {
                    let lo = lo.unwrap_or(outer_lo).max(outer_lo);
                    let hi = hi.unwrap_or(outer_hi).min(outer_hi);
                    for v in lo..=hi {
                        picked.push(v);
                    }
                }
                if info.dims.len() == 1 {
                    picked.into_iter().map(|v| vec![v]).collect()
                } else {
                    let inner = ArrayInfo { dims: info.dims[1..].to_vec() };
                    let inner_flat = inner.flat_indices();
                    picked
                        .into_iter()
                        .flat_map(|outer| {
                            inner_flat.iter().map(move |rest| {
                                let mut full = vec![outer];
                                full.extend(rest.iter().copied());
                                full
                            })
                        })
                        .collect()
                }
            }
        }
    };

    let mut out = Vec::with_capacity(selected.len());
    for idx in selected {
        let suffix = format_index(expand_fmt, idx.last().copied().unwrap_or(0));
        out.push((idx, Pragma { directives: vec![Directive::Pv(suffix)] }));
    }
    Ok(out)
}

fn indexed_tcname(tcname: &str, idx: &[i64]) -> String {
    let joined: Vec<String> = idx.iter().map(i64::to_string).collect();
    format!("{tcname}[{}]", joined.join(","))
}

fn emit_leaf(tcname: &str, leaf: LeafKind, levels: &[Pragma], out: &mut Vec<Chain>) {
    if levels.is_empty() {
        return;
    }
    out.push(Chain {
        tcname: tcname.to_string(),
        levels: levels.to_vec(),
        leaf,
    });
}

/// Default `expand:` format, auto-sized to the array's own length (spec §3:
/// "default `:%.2d` auto-sized to array length") — the zero-padded width
/// grows to fit the outer dimension's highest index, with a floor of 2 digits
/// so small arrays still get the conventional `:00`/`:01`/... suffix.
fn default_expand_format(info: &ArrayInfo) -> String {
    let max_index = info.dims.first().map(|&(_, hi)| hi).unwrap_or(0).unsigned_abs();
    let width = max_index.to_string().len().max(2);
    format!(":%.{width}d")
}

/// Expand a `printf`-style `%d` / `%.Nd` token against `idx`, keeping any
/// literal text before/after it. Falls back to appending the bare index if
/// the format string has no recognizable `%...d` token.
fn format_index(fmt: &str, idx: i64) -> String {
    let Some(pct) = fmt.find('%') else {
        return format!("{fmt}{idx}");
    };
    let after_pct = &fmt[pct + 1..];
    let Some(d_rel) = after_pct.find('d') else {
        return format!("{fmt}{idx}");
    };
    let spec = &after_pct[..d_rel];
    let before = &fmt[..pct];
    let after = &after_pct[d_rel + 1..];
    let width: usize = spec.strip_prefix('.').and_then(|w| w.parse().ok()).unwrap_or(0);
    format!("{before}{:0width$}{after}", idx, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml_obj::XmlTree;

    fn build(xml: &str) -> TypeTable {
        let tree = XmlTree::parse(xml).unwrap();
        TypeTable::build(&tree).unwrap()
    }

    #[test]
    fn scalar_symbol_with_pragma_yields_one_chain() {
        let xml = r#"<Project>
          <Symbol Name="Main.scale" pytmc="pv: TEST:SCALE&#10;io: i"><Type>LREAL</Type></Symbol>
        </Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tcname, "Main.scale");
        assert!(matches!(chains[0].leaf, LeafKind::Primitive(PlcPrimitive::Lreal)));
    }

    #[test]
    fn symbol_without_pragma_yields_nothing() {
        let xml = r#"<Project><Symbol Name="Main.unused"><Type>INT</Type></Symbol></Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert!(chains.is_empty());
    }

    #[test]
    fn nested_composite_without_own_pragma_inherits_descent() {
        let xml = r#"<Project>
          <DataType Name="DUT_Counter">
            <SubItem Name="count" pytmc="pv: COUNT&#10;io: i"><Type>DINT</Type></SubItem>
          </DataType>
          <Symbol Name="Main.counter"><Type>DUT_Counter</Type></Symbol>
        </Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tcname, "Main.counter.count");
        assert_eq!(chains[0].levels.len(), 1);
    }

    #[test]
    fn unsupported_lword_is_skipped_with_diagnostic() {
        let xml = r#"<Project>
          <Symbol Name="Main.big" pytmc="pv: BIG&#10;io: i"><Type>LWORD</Type></Symbol>
        </Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert!(chains.is_empty());
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn primitive_array_without_expand_stays_one_waveform_leaf() {
        let xml = r#"<Project>
          <Symbol Name="Main.samples" pytmc="pv: SAMPLES&#10;io: i">
            <Type>LREAL</Type>
            <ArrayInfo><Elements><LBound>0</LBound><Elements>4</Elements></Elements></ArrayInfo>
          </Symbol>
        </Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert_eq!(chains.len(), 1);
        assert!(matches!(chains[0].leaf, LeafKind::PrimitiveArray { .. }));
    }

    #[test]
    fn primitive_array_with_expand_key_produces_one_chain_per_index() {
        let xml = r#"<Project>
          <Symbol Name="Main.samples" pytmc="pv: SAMPLES&#10;io: i&#10;expand: :%.2d">
            <Type>LREAL</Type>
            <ArrayInfo><Elements><LBound>0</LBound><Elements>3</Elements></Elements></ArrayInfo>
          </Symbol>
        </Project>"#;
        let types = build(xml);
        let mut diag = Diagnostics::new(false);
        let chains: Vec<_> = walk(&types, &mut diag).unwrap().collect();
        assert_eq!(chains.len(), 3);
        assert!(chains.iter().any(|c| c.tcname == "Main.samples[0]"));
    }

    #[test]
    fn format_index_applies_zero_padded_width() {
        assert_eq!(format_index(":%.2d", 3), ":03");
        assert_eq!(format_index("_%d", 7), "_7");
    }
}
