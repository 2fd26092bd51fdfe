//! Configuration merger (spec §4.E): folds a chain's ordered pragma levels
//! into one or more [`Configuration`]s, one per final PV.
//!
//! Each level is first split at its `pv` boundaries by
//! [`crate::pragma::Pragma::configs`]; a level with more than one `pv` fans
//! out into that many independent configurations (multi-PV pragmas), and the
//! merge is the cartesian product across levels — in practice almost every
//! level contributes exactly one segment, so this is rarely more than a
//! single pass down the chain.

use crate::chain::Chain;
use crate::error::{CompileError, Result};
use crate::pragma::{ArchiveSpec, Direction, Directive, PragmaConfig, UpdateSpec};
use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub pv: String,
    pub direction: Option<Direction>,
    /// Explicit field overrides, in first-seen order, later values winning
    /// in place (spec §4.E: "field: override-by-name").
    pub fields: IndexMap<String, String>,
    pub update: Option<UpdateSpec>,
    pub archive: Option<ArchiveSpec>,
    pub archive_fields: Vec<String>,
    pub autosave_pass0: Vec<String>,
    pub autosave_pass1: Vec<String>,
    pub autosave_input_pass0: Vec<String>,
    pub autosave_input_pass1: Vec<String>,
    pub autosave_output_pass0: Vec<String>,
    pub autosave_output_pass1: Vec<String>,
    pub link: Option<String>,
    pub str_format: Option<String>,
    pub scale: Option<String>,
    pub offset: Option<String>,
    pub macro_character: Option<char>,
    pub type_override: Option<String>,
}

/// Merge one chain into its final configuration(s). Most chains produce
/// exactly one; a chain with a multi-`pv` pragma anywhere on its path
/// produces the cartesian product of those fan-outs.
pub fn merge_chain(chain: &Chain) -> Result<Vec<Configuration>> {
    let per_level: Vec<Vec<PragmaConfig>> = chain.levels.iter().map(|p| p.configs()).collect();
    let combos = cartesian(&per_level);
    combos.iter().map(|combo| merge_configs(&chain.tcname, combo)).collect()
}

fn cartesian(levels: &[Vec<PragmaConfig>]) -> Vec<Vec<&PragmaConfig>> {
    let mut acc: Vec<Vec<&PragmaConfig>> = vec![Vec::new()];
    for level in levels {
        let mut next = Vec::with_capacity(acc.len() * level.len().max(1));
        for prefix in &acc {
            for cfg in level {
                let mut combo = prefix.clone();
                combo.push(cfg);
                next.push(combo);
            }
        }
        acc = next;
    }
    acc
}

/// Join one more `pv` token onto the accumulated path (spec §4.E: "`pv`
/// values are appended with `:` between non-empty tokens"). A separator is
/// inserted only when neither side already supplies one, so a level that
/// wants to control its own join (the chain walker's array-index suffix,
/// whose `expand:` format defaults to `:%.2d`) isn't given a doubled `::`.
fn append_pv(acc: &mut String, next: &str) {
    if next.is_empty() {
        return;
    }
    if !acc.is_empty() && !acc.ends_with(':') && !next.starts_with(':') {
        acc.push(':');
    }
    acc.push_str(next);
}

fn merge_configs(tcname: &str, combo: &[&PragmaConfig]) -> Result<Configuration> {
    let mut cfg = Configuration::default();
    let mut pv = String::new();
    let mut array_key_seen = 0u32;
    let mut expand_key_seen = 0u32;

    for segment in combo {
        if let Some(p) = &segment.pv {
            append_pv(&mut pv, p);
        }
        for directive in &segment.directives {
            match directive {
                Directive::Pv(_) => unreachable!("Pragma::configs never leaves a Pv directive in place"),
                Directive::Io(dir) => cfg.direction = Some(*dir),
                Directive::Field(name, value) => {
                    cfg.fields.insert(name.clone(), value.clone());
                }
                Directive::Update(spec) => cfg.update = Some(*spec),
                Directive::Archive(spec) => cfg.archive = Some(*spec),
                Directive::ArchiveFields(list) => union_extend(&mut cfg.archive_fields, list),
                Directive::AutosavePass0(list) => union_extend(&mut cfg.autosave_pass0, list),
                Directive::AutosavePass1(list) => union_extend(&mut cfg.autosave_pass1, list),
                Directive::AutosaveInputPass0(list) => union_extend(&mut cfg.autosave_input_pass0, list),
                Directive::AutosaveInputPass1(list) => union_extend(&mut cfg.autosave_input_pass1, list),
                Directive::AutosaveOutputPass0(list) => union_extend(&mut cfg.autosave_output_pass0, list),
                Directive::AutosaveOutputPass1(list) => union_extend(&mut cfg.autosave_output_pass1, list),
                Directive::Link(v) => cfg.link = Some(v.clone()),
                Directive::Str(v) => cfg.str_format = Some(v.clone()),
                Directive::Scale(v) => cfg.scale = Some(v.clone()),
                Directive::Offset(v) => cfg.offset = Some(v.clone()),
                Directive::MacroCharacter(c) => cfg.macro_character = Some(*c),
                Directive::Type(v) => cfg.type_override = Some(v.clone()),
                Directive::Array(_) => array_key_seen += 1,
                Directive::Expand(_) => expand_key_seen += 1,
                Directive::Unknown(..) => {}
            }
        }
    }

    if array_key_seen > 1 {
        return Err(CompileError::InvalidChain {
            tcname: tcname.to_string(),
            reason: "array key specified at more than one level".to_string(),
        });
    }
    if expand_key_seen > 1 {
        return Err(CompileError::InvalidChain {
            tcname: tcname.to_string(),
            reason: "expand key specified at more than one level".to_string(),
        });
    }
    if pv.is_empty() {
        return Err(CompileError::InvalidChain {
            tcname: tcname.to_string(),
            reason: "no pv directive anywhere on the chain".to_string(),
        });
    }
    cfg.pv = pv;
    Ok(cfg)
}

fn union_extend(acc: &mut Vec<String>, new: &[String]) {
    for item in new {
        if !acc.contains(item) {
            acc.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LeafKind;
    use crate::pragma::{self, Pragma};
    use crate::types::PlcPrimitive;

    fn chain_from(levels: &[&str]) -> Chain {
        Chain {
            tcname: "Main.test".to_string(),
            levels: levels.iter().map(|s| pragma::parse(s).unwrap()).collect(),
            leaf: LeafKind::Primitive(PlcPrimitive::Int),
        }
    }

    #[test]
    fn simple_scalar_merges_to_one_configuration() {
        let chain = chain_from(&["pv: TEST:SCALE\nio: i"]);
        let configs = merge_chain(&chain).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].pv, "TEST:SCALE");
        assert_eq!(configs[0].direction, Some(Direction::Input));
    }

    #[test]
    fn pv_concatenates_across_levels_without_separator() {
        let chain = chain_from(&["pv: TEST", "pv: :SCALE\nio: i"]);
        let configs = merge_chain(&chain).unwrap();
        assert_eq!(configs[0].pv, "TEST:SCALE");
    }

    #[test]
    fn later_level_overrides_earlier_scalar_keys() {
        let chain = chain_from(&["pv: A\nio: i\nscale: 2.0", "io: o\nscale: 4.0"]);
        let configs = merge_chain(&chain).unwrap();
        assert_eq!(configs[0].direction, Some(Direction::Output));
        assert_eq!(configs[0].scale.as_deref(), Some("4.0"));
    }

    #[test]
    fn autosave_lists_union_by_first_occurrence() {
        let chain = chain_from(&["pv: A\nautosave_pass0: VAL DESC", "autosave_pass0: DESC EGU"]);
        let configs = merge_chain(&chain).unwrap();
        assert_eq!(configs[0].autosave_pass0, vec!["VAL", "DESC", "EGU"]);
    }

    #[test]
    fn missing_pv_is_invalid_chain() {
        let chain = chain_from(&["io: i"]);
        let err = merge_chain(&chain).unwrap_err();
        assert!(matches!(err, CompileError::InvalidChain { .. }));
    }

    #[test]
    fn multi_pv_pragma_fans_out_into_independent_configurations() {
        let pragma = "pv: A\nio: i\npv: B\nio: o";
        let chain = Chain {
            tcname: "Main.test".to_string(),
            levels: vec![Pragma { directives: pragma::parse(pragma).unwrap().directives }],
            leaf: LeafKind::Primitive(PlcPrimitive::Int),
        };
        let configs = merge_chain(&chain).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].pv, "A");
        assert_eq!(configs[1].pv, "B");
    }

    #[test]
    fn conflicting_array_key_at_two_levels_is_rejected() {
        let chain = chain_from(&["pv: A\narray: 0..1", "array: 2..3"]);
        let err = merge_chain(&chain).unwrap_err();
        assert!(matches!(err, CompileError::InvalidChain { .. }));
    }
}
