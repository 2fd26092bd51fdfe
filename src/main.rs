use clap::Parser;
use pytmc_gen::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let exit_code = cli::run(cli)?;
    std::process::exit(exit_code);
}
