//! Grammar linter (spec §4.G) and renderer (spec §4.H) end to end: a record
//! using an unknown field is dropped unless `--allow-errors`, and rendering
//! twice from the same input produces byte-identical text (spec §8 invariant 4).

mod common;
use common::compile;
use pytmc_gen::diag::Diagnostics;
use pytmc_gen::lint::{self, RecordDefs};
use pytmc_gen::render;

const DEFS: &str = r#"
recordtype(ai) {
    field(VAL, DOUBLE)
    field(EGU, STRING)
}
recordtype(longin) {
    field(VAL, LONG)
}
recordtype(longout) {
    field(VAL, LONG)
    field(DOL, LINK)
}
"#;

#[test]
fn record_with_unknown_field_is_dropped_then_kept_under_allow_errors() {
    let xml = r#"<Project>
      <Symbol Name="Main.scale" pytmc="pv: TEST:SCALE&#10;io: i&#10;field: BOGUS oops">
        <Type>LREAL</Type>
      </Symbol>
    </Project>"#;
    let compiled = compile(xml);
    assert_eq!(compiled.records.len(), 1);

    let defs = RecordDefs::parse(DEFS).unwrap();

    let mut diag = Diagnostics::new(false);
    let kept = lint::lint(compiled.records.clone(), &defs, &mut diag, false);
    assert!(kept.is_empty());
    assert_eq!(diag.error_count(), 1);

    let mut diag2 = Diagnostics::new(true);
    let kept2 = lint::lint(compiled.records, &defs, &mut diag2, true);
    assert_eq!(kept2.len(), 1);
}

#[test]
fn rendering_the_same_records_twice_is_byte_identical() {
    let xml = r#"<Project>
      <Symbol Name="Main.upper_limit" pytmc="pv: TEST:ULIMIT&#10;io: io">
        <Type>DINT</Type>
      </Symbol>
    </Project>"#;

    let defs = RecordDefs::parse(DEFS).unwrap();
    let first = compile(xml);
    let second = compile(xml);

    let mut diag_a = Diagnostics::new(false);
    let mut diag_b = Diagnostics::new(false);
    let kept_a = lint::lint(first.records, &defs, &mut diag_a, false);
    let kept_b = lint::lint(second.records, &defs, &mut diag_b, false);

    assert_eq!(render::render_db(&kept_a), render::render_db(&kept_b));
    assert!(render::render_db(&kept_a).contains("record(longout, \"TEST:ULIMIT\")"));
}
