//! Command-line surface (spec §6): three subcommands sharing the same
//! project-loading and type-resolution front end, differing only in what
//! they do with the resulting chains.

use crate::chain;
use crate::diag::Diagnostics;
use crate::lint::{self, RecordDefs};
use crate::merge;
use crate::project;
use crate::record::{self, RecordOptions};
use crate::render;
use crate::types::TypeTable;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::fs;

#[derive(Debug, Parser)]
#[command(name = "pytmc-gen", about = "Compiles annotated TwinCAT project XML into EPICS record and archive definitions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile a project into an EPICS record database plus archive descriptor.
    Db(DbArgs),
    /// Print diagnostics only — no output files, meant for CI gating.
    Summary(SummaryArgs),
    /// Dump the resolved type graph.
    Types(TypesArgs),
}

#[derive(Debug, Args)]
pub struct DbArgs {
    pub project_file: Utf8PathBuf,
    #[arg(long = "record-defs")]
    pub record_defs: Utf8PathBuf,
    #[arg(long = "lint-defs")]
    pub lint_defs: Option<Utf8PathBuf>,
    #[arg(long = "allow-errors")]
    pub allow_errors: bool,
    #[arg(long = "max-name-len", default_value_t = 60)]
    pub max_name_len: usize,
    #[arg(short = 'o', long = "output")]
    pub output: Utf8PathBuf,
    #[arg(long = "archive-out")]
    pub archive_out: Option<Utf8PathBuf>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    pub project_file: Utf8PathBuf,
    #[arg(long = "allow-errors")]
    pub allow_errors: bool,
}

#[derive(Debug, Args)]
pub struct TypesArgs {
    pub project_file: Utf8PathBuf,
    #[arg(long)]
    pub json: bool,
}

/// Process exit codes (spec §6): 0 success, 1 parse failure, 2 config/merge
/// failure, 3 lint failure.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARSE_FAILURE: i32 = 1;
pub const EXIT_CONFIG_FAILURE: i32 = 2;
pub const EXIT_LINT_FAILURE: i32 = 3;

pub fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Db(args) => run_db(args),
        Command::Summary(args) => run_summary(args),
        Command::Types(args) => run_types(args),
    }
}

struct CollectedChains {
    diag: Diagnostics,
    configured_records: Vec<(chain::Chain, merge::Configuration)>,
    config_failures: usize,
}

fn collect(project_file: &Utf8PathBuf, allow_errors: bool) -> anyhow::Result<CollectedChains> {
    let trees = project::load(project_file)?;
    let types = TypeTable::build_many(&trees)?;
    let mut diag = Diagnostics::new(allow_errors);

    let mut configured_records = Vec::new();
    let mut config_failures = 0usize;
    for chain in chain::walk(&types, &mut diag)? {
        match merge::merge_chain(&chain) {
            Ok(configs) => {
                for cfg in configs {
                    configured_records.push((chain.clone(), cfg));
                }
            }
            Err(err) => {
                config_failures += 1;
                diag.push_error(&err);
            }
        }
    }

    Ok(CollectedChains { diag, configured_records, config_failures })
}

fn run_db(args: DbArgs) -> anyhow::Result<i32> {
    let mut collected = collect(&args.project_file, args.allow_errors)?;

    let record_defs_text = fs::read_to_string(&args.record_defs)?;
    let mut defs = RecordDefs::parse(&record_defs_text)?;
    if let Some(lint_defs_path) = &args.lint_defs {
        let extra_text = fs::read_to_string(lint_defs_path)?;
        defs.merge(RecordDefs::parse(&extra_text)?);
    }

    let opts = RecordOptions { max_name_len: args.max_name_len, ..RecordOptions::default() };
    let mut built = Vec::new();
    for (chain, cfg) in &collected.configured_records {
        match record::build_records(chain, cfg, &opts, &mut collected.diag) {
            Ok(recs) => built.extend(recs),
            Err(err) => {
                collected.config_failures += 1;
                collected.diag.push_error(&err);
            }
        }
    }

    let lint_error_count_before = collected.diag.error_count();
    let linted = lint::lint(built, &defs, &mut collected.diag, args.allow_errors);
    let lint_failures = collected.diag.error_count() - lint_error_count_before;

    fs::write(&args.output, render::render_db(&linted))?;
    if let Some(archive_out) = &args.archive_out {
        fs::write(archive_out, render::render_archive(&linted))?;
    }

    print_diagnostics(&collected.diag);

    if !args.allow_errors {
        if lint_failures > 0 {
            return Ok(EXIT_LINT_FAILURE);
        }
        if collected.config_failures > 0 {
            return Ok(EXIT_CONFIG_FAILURE);
        }
    }
    Ok(EXIT_OK)
}

fn run_summary(args: SummaryArgs) -> anyhow::Result<i32> {
    let collected = collect(&args.project_file, args.allow_errors)?;
    print_diagnostics(&collected.diag);
    println!("{} configuration(s) resolved", collected.configured_records.len());
    if !args.allow_errors && collected.config_failures > 0 {
        return Ok(EXIT_CONFIG_FAILURE);
    }
    Ok(EXIT_OK)
}

fn run_types(args: TypesArgs) -> anyhow::Result<i32> {
    let trees = project::load(&args.project_file)?;
    let types = TypeTable::build_many(&trees)?;
    if args.json {
        let names: Vec<&str> = types.symbols.iter().map(|s| s.name.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for symbol in &types.symbols {
            println!("{}: {}", symbol.name, symbol.type_name);
        }
    }
    Ok(EXIT_OK)
}

fn print_diagnostics(diag: &Diagnostics) {
    for entry in diag.entries() {
        eprintln!("{entry}");
    }
}
