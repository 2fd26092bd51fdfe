//! Boundary scenario 8 (spec §8): `link:` text using the macro sigil is
//! translated to EPICS `$(...)` macro syntax in the emitted `DOL`.

mod common;
use common::{compile, field};

#[test]
fn macro_sigil_becomes_dollar_paren_in_dol() {
    let xml = r#"<Project>
      <Symbol Name="Main.relay" pytmc="pv: TEST:RELAY&#10;io: o&#10;link: @(PREFIX)OTHER:PV">
        <Type>BOOL</Type>
      </Symbol>
    </Project>"#;

    let compiled = compile(xml);
    assert!(compiled.diag.is_empty(), "unexpected diagnostics: {:?}", compiled.diag.entries());
    let out = &compiled.records[0];
    assert_eq!(field(out, "DOL"), Some("$(PREFIX)OTHER:PV"));
}

#[test]
fn custom_macro_character_is_honored() {
    let xml = r#"<Project>
      <Symbol Name="Main.relay" pytmc="pv: TEST:RELAY&#10;io: o&#10;macro_character: #&#10;link: #(PREFIX)OTHER:PV">
        <Type>BOOL</Type>
      </Symbol>
    </Project>"#;

    let compiled = compile(xml);
    let out = &compiled.records[0];
    assert_eq!(field(out, "DOL"), Some("$(PREFIX)OTHER:PV"));
}
