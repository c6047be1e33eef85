use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use vm_translator::{target, Options};

/// Translate VM code into Hack assembly
#[derive(Parser, Debug)]
#[command(name = "vm-translator", version, about)]
struct Cli {
    /// `.vm` files or directories of `.vm` files
    #[arg(required = true)]
    targets: Vec<PathBuf>,

    /// Emit bootstrap code (SP = 256, call Sys.init)
    #[arg(short, long)]
    bootstrap: bool,

    /// Leave out the `// <command>` comments in the output
    #[arg(long)]
    no_comments: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let options = Options {
        bootstrap: cli.bootstrap,
        annotate: !cli.no_comments,
    };

    for path in &cli.targets {
        let output = target::compile(path, &options)
            .with_context(|| format!("Translating {}", path.display()))?;
        info!("wrote {}", output.display());
    }

    Ok(())
}
