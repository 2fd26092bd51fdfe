//! Boundary scenario 3 (spec §8): a pragma on an intermediate composite
//! instance combines with a pragma on one of its subitems.

mod common;
use common::compile;

#[test]
fn nested_subitem_pragma_inherits_parent_pv_prefix() {
    let xml = r#"<Project>
      <DataType Name="DUT_Counter">
        <SubItem Name="value_d" pytmc="pv: VALUE&#10;io: i"><Type>DINT</Type></SubItem>
      </DataType>
      <Symbol Name="Main.counter_b" pytmc="pv: TEST:COUNTER_B">
        <Type>DUT_Counter</Type>
      </Symbol>
    </Project>"#;

    let compiled = compile(xml);
    assert!(compiled.diag.is_empty(), "unexpected diagnostics: {:?}", compiled.diag.entries());
    assert_eq!(compiled.records.len(), 1);
    assert_eq!(compiled.records[0].pv, "TEST:COUNTER_B:VALUE");
    assert_eq!(compiled.records[0].record_type, "longin");
}
