//! Shared end-to-end harness for the boundary-scenario tests (spec §8).
//!
//! Runs the whole pipeline — parse, resolve types, walk chains, merge
//! configurations, build records — and hands back whatever records were
//! produced plus the diagnostics collected along the way. Each scenario test
//! only needs to assert on the result, not re-wire the pipeline.

use pytmc_gen::chain;
use pytmc_gen::diag::Diagnostics;
use pytmc_gen::merge;
use pytmc_gen::record::{self, RecordOptions, RecordPackage};
use pytmc_gen::types::TypeTable;
use pytmc_gen::xml_obj::XmlTree;

pub struct Compiled {
    pub records: Vec<RecordPackage>,
    pub diag: Diagnostics,
}

pub fn compile(xml: &str) -> Compiled {
    compile_with(xml, RecordOptions::default(), false)
}

pub fn compile_with(xml: &str, opts: RecordOptions, allow_errors: bool) -> Compiled {
    let tree = XmlTree::parse(xml).expect("valid XML");
    let types = TypeTable::build(&tree).expect("type table build");
    let mut diag = Diagnostics::new(allow_errors);

    let mut records = Vec::new();
    for c in chain::walk(&types, &mut diag).expect("chain walk") {
        match merge::merge_chain(&c) {
            Ok(configs) => {
                for cfg in configs {
                    match record::build_records(&c, &cfg, &opts, &mut diag) {
                        Ok(recs) => records.extend(recs),
                        Err(err) => diag.push_error(&err),
                    }
                }
            }
            Err(err) => diag.push_error(&err),
        }
    }
    Compiled { records, diag }
}

pub fn field<'a>(rec: &'a RecordPackage, name: &str) -> Option<&'a str> {
    rec.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
}

pub fn info<'a>(rec: &'a RecordPackage, key: &str) -> Option<&'a str> {
    rec.infos.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
