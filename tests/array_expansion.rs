//! Boundary scenarios 4 and 5 (spec §8): an array of a composite type always
//! expands per-element, optionally restricted by an `array:` selector.

mod common;
use common::compile;

const DUT_X: &str = r#"
  <DataType Name="DUT_X">
    <SubItem Name="flag" pytmc="pv: A&#10;io: i"><Type>BOOL</Type></SubItem>
  </DataType>
"#;

#[test]
fn composite_array_expands_to_one_record_per_index_with_auto_width() {
    let xml = format!(
        r#"<Project>
          {DUT_X}
          <Symbol Name="Main.arr" pytmc="pv: MY:ARRAY">
            <Type>DUT_X</Type>
            <ArrayInfo><Elements><LBound>0</LBound><Elements>6</Elements></Elements></ArrayInfo>
          </Symbol>
        </Project>"#
    );

    let compiled = compile(&xml);
    assert!(compiled.diag.is_empty(), "unexpected diagnostics: {:?}", compiled.diag.entries());
    assert_eq!(compiled.records.len(), 6);

    let pvs: Vec<&str> = compiled.records.iter().map(|r| r.pv.as_str()).collect();
    assert_eq!(
        pvs,
        vec![
            "MY:ARRAY:00:A",
            "MY:ARRAY:01:A",
            "MY:ARRAY:02:A",
            "MY:ARRAY:03:A",
            "MY:ARRAY:04:A",
            "MY:ARRAY:05:A",
        ]
    );
}

#[test]
fn array_selector_restricts_to_chosen_indices_with_width_matching_bounds() {
    let xml = format!(
        r#"<Project>
          {DUT_X}
          <Symbol Name="Main.arr" pytmc="pv: MY:ARRAY&#10;array: 0..1, 99">
            <Type>DUT_X</Type>
            <ArrayInfo><Elements><LBound>0</LBound><Elements>101</Elements></Elements></ArrayInfo>
          </Symbol>
        </Project>"#
    );

    let compiled = compile(&xml);
    assert!(compiled.diag.is_empty(), "unexpected diagnostics: {:?}", compiled.diag.entries());
    let pvs: Vec<&str> = compiled.records.iter().map(|r| r.pv.as_str()).collect();
    assert_eq!(pvs, vec!["MY:ARRAY:000:A", "MY:ARRAY:001:A", "MY:ARRAY:099:A"]);
}
