//! Grammar linter (spec §4.G): validates built [`RecordPackage`]s against a
//! line-oriented record-definition grammar (the `--record-defs`/`--lint-defs`
//! files), the same shape as an EPICS `.dbd` but pared down to just the
//! record-type/field-name grammar this crate needs to check.
//!
//! ```text
//! recordtype(ai) {
//!     field(VAL, DOUBLE)
//!     field(PREC, SHORT)
//!     field(EGU, STRING)
//!     field(SCAN, MENU, Passive Event "I/O Intr" "10 second" "5 second")
//! }
//! ```
//!
//! A field's third, comma-separated argument is an optional space-delimited
//! list of its only legal values (quote a value containing spaces); fields
//! without one accept any value.

use crate::diag::Diagnostics;
use crate::error::{CompileError, Result};
use crate::record::RecordPackage;
use std::collections::{HashMap, HashSet};

/// Fields every record type accepts regardless of what the grammar file says
/// (spec §4.F's common fields: DTYP/SCAN/INP/OUT/NELM/FTVL/PREC/PINI/ASG, plus
/// DESC which every record type carries).
const IMPLICIT_FIELDS: &[&str] = &["DTYP", "SCAN", "INP", "OUT", "NELM", "FTVL", "PREC", "PINI", "ASG", "DESC"];

#[derive(Debug, Clone, Default)]
pub struct RecordTypeDef {
    pub name: String,
    pub fields: HashSet<String>,
    /// Declared legal values for choice fields (spec §4.G: "each choice-field
    /// value among the declared choices"), keyed by field name. A field
    /// absent here has no value restriction beyond being a known field name.
    pub choices: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordDefs {
    pub types: HashMap<String, RecordTypeDef>,
}

impl RecordDefs {
    pub fn parse(text: &str) -> Result<RecordDefs> {
        let mut defs = RecordDefs::default();
        let mut current: Option<RecordTypeDef> = None;
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("recordtype(") {
                let name = rest
                    .split(')')
                    .next()
                    .ok_or_else(|| grammar_err(lineno, "expected recordtype(NAME)"))?
                    .trim()
                    .to_string();
                current = Some(RecordTypeDef { name, fields: HashSet::new() });
            } else if let Some(rest) = line.strip_prefix("field(") {
                let Some(current) = current.as_mut() else {
                    return Err(grammar_err(lineno, "field() outside of a recordtype block"));
                };
                let inner = rest
                    .split(')')
                    .next()
                    .ok_or_else(|| grammar_err(lineno, "expected field(NAME, TYPE)"))?;
                let mut parts = inner.splitn(3, ',');
                let name = parts
                    .next()
                    .ok_or_else(|| grammar_err(lineno, "expected field(NAME, TYPE)"))?
                    .trim()
                    .to_string();
                let _field_type = parts.next();
                if let Some(choice_list) = parts.next() {
                    let choices = split_quoted_words(choice_list);
                    if !choices.is_empty() {
                        current.choices.insert(name.clone(), choices);
                    }
                }
                current.fields.insert(name);
            } else if line == "}" {
                if let Some(def) = current.take() {
                    defs.types.insert(def.name.clone(), def);
                }
            }
        }
        Ok(defs)
    }

    /// Merge another definitions file in on top of this one (`--lint-defs`
    /// layered over `--record-defs`); later record-type/field entries win.
    pub fn merge(&mut self, other: RecordDefs) {
        for (name, def) in other.types {
            self.types.insert(name, def);
        }
    }
}

/// Split a choice list on whitespace, honoring `"..."` quoting for values
/// that themselves contain spaces (e.g. `"I/O Intr"`, `"10 second"`).
fn split_quoted_words(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = value.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let word: String = chars.by_ref().take_while(|&c| c != '"').collect();
            out.push(word);
        } else {
            let word: String = std::iter::from_fn(|| chars.next_if(|c| !c.is_whitespace())).collect();
            out.push(word);
        }
    }
    out
}

fn grammar_err(lineno: usize, message: &str) -> CompileError {
    CompileError::MalformedPragma {
        path: format!("record-defs:{}", lineno + 1),
        reason: message.to_string(),
    }
}

/// Validate every record against `defs`; a record whose type or field names
/// don't match the grammar is dropped unless `allow_errors` is set, in which
/// case it's kept but demoted to a warning (spec §4.G).
pub fn lint(records: Vec<RecordPackage>, defs: &RecordDefs, diag: &mut Diagnostics, allow_errors: bool) -> Vec<RecordPackage> {
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        match validate(&record, defs) {
            Ok(()) => kept.push(record),
            Err(err) => {
                diag.push_error(&err);
                if allow_errors {
                    kept.push(record);
                }
            }
        }
    }
    kept
}

fn validate(record: &RecordPackage, defs: &RecordDefs) -> Result<()> {
    let Some(def) = defs.types.get(&record.record_type) else {
        return Err(CompileError::LintError {
            pv: record.pv.clone(),
            message: format!("unknown record type {:?}", record.record_type),
        });
    };
    for (name, value) in &record.fields {
        if !IMPLICIT_FIELDS.contains(&name.as_str()) && !def.fields.contains(name) {
            return Err(CompileError::LintError {
                pv: record.pv.clone(),
                message: format!("field {name:?} is not valid on record type {:?}", record.record_type),
            });
        }
        if let Some(choices) = def.choices.get(name) {
            if !choices.iter().any(|c| c == value) {
                return Err(CompileError::LintError {
                    pv: record.pv.clone(),
                    message: format!("field {name:?} value {value:?} is not among its declared choices {choices:?}"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &str = r#"
    recordtype(longin) {
        field(VAL, LONG)
        field(EGU, STRING)
    }
    recordtype(longout) {
        field(VAL, LONG)
        field(DOL, LINK)
    }
    "#;

    fn record(record_type: &str, fields: &[(&str, &str)]) -> RecordPackage {
        RecordPackage {
            pv: "TEST:X".to_string(),
            record_type: record_type.to_string(),
            fields: fields.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
            infos: Vec::new(),
        }
    }

    #[test]
    fn parses_recordtype_blocks() {
        let defs = RecordDefs::parse(DEFS).unwrap();
        assert!(defs.types.contains_key("longin"));
        assert!(defs.types["longin"].fields.contains("EGU"));
    }

    #[test]
    fn unknown_record_type_is_dropped_by_default() {
        let defs = RecordDefs::parse(DEFS).unwrap();
        let mut diag = Diagnostics::new(false);
        let records = vec![record("ai", &[("DTYP", "asynFloat64")])];
        let kept = lint(records, &defs, &mut diag, false);
        assert!(kept.is_empty());
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn unknown_field_is_kept_under_allow_errors() {
        let defs = RecordDefs::parse(DEFS).unwrap();
        let mut diag = Diagnostics::new(true);
        let records = vec![record("longin", &[("BOGUS", "1")])];
        let kept = lint(records, &defs, &mut diag, true);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn implicit_fields_always_pass() {
        let defs = RecordDefs::parse(DEFS).unwrap();
        let mut diag = Diagnostics::new(false);
        let records = vec![record("longin", &[("DTYP", "asynInt32"), ("SCAN", "I/O Intr")])];
        let kept = lint(records, &defs, &mut diag, false);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn choice_field_value_outside_declared_set_is_rejected() {
        let defs = RecordDefs::parse(
            r#"recordtype(ai) { field(SCAN, MENU, Passive "I/O Intr" "1 second") field(VAL, DOUBLE) }"#,
        )
        .unwrap();
        let mut diag = Diagnostics::new(false);
        let records = vec![record("ai", &[("SCAN", "17 second")])];
        let kept = lint(records, &defs, &mut diag, false);
        assert!(kept.is_empty());
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn choice_field_value_within_declared_set_passes() {
        let defs = RecordDefs::parse(r#"recordtype(ai) { field(SCAN, MENU, Passive "I/O Intr" "1 second") }"#).unwrap();
        let mut diag = Diagnostics::new(false);
        let records = vec![record("ai", &[("SCAN", "I/O Intr")])];
        let kept = lint(records, &defs, &mut diag, false);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn split_quoted_words_honors_quoted_multi_word_values() {
        let words = split_quoted_words(r#"Passive "I/O Intr" "10 second""#);
        assert_eq!(words, vec!["Passive", "I/O Intr", "10 second"]);
    }

    #[test]
    fn merge_layers_lint_defs_over_record_defs() {
        let mut defs = RecordDefs::parse(DEFS).unwrap();
        let extra = RecordDefs::parse("recordtype(ai) { field(VAL, DOUBLE) }").unwrap();
        defs.merge(extra);
        assert!(defs.types.contains_key("ai"));
        assert!(defs.types.contains_key("longin"));
    }
}
