//! Deterministic textual emission (spec §4.H): turns built [`RecordPackage`]s
//! into EPICS record-database text and a companion archive-descriptor file.
//!
//! Records and fields are sorted before being passed in (by `record.rs` and
//! `lint.rs`), so rendering itself does no reordering — the same compiled
//! input always produces byte-identical output.

use crate::record::RecordPackage;
use std::fmt::Write as _;

/// Render a full record-database text body.
pub fn render_db(records: &[RecordPackage]) -> String {
    let mut out = String::new();
    for record in records {
        render_record(record, &mut out);
        out.push('\n');
    }
    out
}

fn render_record(record: &RecordPackage, out: &mut String) {
    let _ = writeln!(out, "record({}, \"{}\") {{", record.record_type, escape(&record.pv));
    for (name, value) in &record.fields {
        let _ = writeln!(out, "    field({name}, \"{}\")", escape(value));
    }
    for (key, value) in &record.infos {
        let _ = writeln!(out, "    info({key}, \"{}\")", escape(value));
    }
    out.push('}');
    out.push('\n');
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the archive descriptor lines for every record that carries an
/// `info(archive, "<period> <method>")` node. One line per archived PV:
/// `<pv> <period> <method> [<extra fields>]` (spec §6).
///
/// Reads the `archive`/`archive_fields` info nodes `record.rs` already
/// attached to each [`RecordPackage`] rather than recomputing them from the
/// configuration directly, so the archive-descriptor file and the db's own
/// `info(archive, ...)` node can never disagree about the array-size gate
/// (spec §8 scenario invariant 6) or the update-rate cap (spec §4.F.5).
pub fn render_archive(records: &[RecordPackage]) -> String {
    let mut out = String::new();
    for record in records {
        let Some((_, period_method)) = record.infos.iter().find(|(k, _)| k == "archive") else {
            continue;
        };
        match record.infos.iter().find(|(k, _)| k == "archive_fields") {
            Some((_, fields)) if !fields.is_empty() => {
                let _ = writeln!(out, "{} {period_method} {fields}", record.pv);
            }
            _ => {
                let _ = writeln!(out, "{} {period_method}", record.pv);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_record_block_per_package() {
        let records = vec![RecordPackage {
            pv: "TEST:X".to_string(),
            record_type: "longin".to_string(),
            fields: vec![("DTYP".to_string(), "asynInt32".to_string())],
            infos: vec![("archive".to_string(), "1 scan".to_string())],
        }];
        let text = render_db(&records);
        assert!(text.contains("record(longin, \"TEST:X\") {"));
        assert!(text.contains("field(DTYP, \"asynInt32\")"));
        assert!(text.contains("info(archive, \"1 scan\")"));
    }

    #[test]
    fn escapes_embedded_quotes_and_backslashes() {
        assert_eq!(escape(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn render_archive_includes_extra_fields_and_skips_unarchived_records() {
        let records = vec![
            RecordPackage {
                pv: "TEST:X".to_string(),
                record_type: "ai".to_string(),
                fields: Vec::new(),
                infos: vec![
                    ("archive".to_string(), "1 scan".to_string()),
                    ("archive_fields".to_string(), "HIHI LOLO".to_string()),
                ],
            },
            RecordPackage {
                pv: "TEST:Y".to_string(),
                record_type: "ai".to_string(),
                fields: Vec::new(),
                infos: Vec::new(),
            },
        ];
        let text = render_archive(&records);
        assert_eq!(text, "TEST:X 1 scan HIHI LOLO\n");
    }
}
