//! Command-line driver: read a JSON module specification, generate the
//! binding source set, reconcile it with the committed output directory.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use bindforge::{generate, GenConfig, ModuleSpec, OutputOptions};

#[derive(Parser, Debug)]
#[command(name = "bindforge", about = "Generate pybind11 bindings from a module specification")]
struct Cli {
    /// Path to the JSON module specification.
    spec: PathBuf,

    /// Override the module name declared in the specification.
    #[arg(long)]
    name: Option<String>,

    /// Directory receiving the committed output set.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Generate one file per logical unit plus a master header.
    #[arg(long)]
    split: bool,

    /// Manifest file name (one generated path per line). Defaults to
    /// `<module>_generated_files.txt` in split mode.
    #[arg(long)]
    manifest: Option<String>,

    /// pybind11 holder type for every bound class.
    #[arg(long, default_value = "py::smart_holder")]
    holder: String,

    /// Report the reconciliation diff without applying it.
    #[arg(long)]
    dry_run: bool,
}

fn run(cli: Cli) -> bindforge::Result<()> {
    let text = fs::read_to_string(&cli.spec)?;
    let mut module = ModuleSpec::from_json(&text)?;
    if let Some(name) = cli.name {
        module.name = name;
    }

    let manifest = cli.manifest.or_else(|| {
        cli.split
            .then(|| format!("{}_generated_files.txt", module.name))
    });
    let options = OutputOptions {
        output_dir: cli.output,
        split: cli.split,
        manifest,
    };
    let config = GenConfig {
        holder_type: cli.holder,
        dry_run: cli.dry_run,
    };

    let outcome = generate(&module, &options, &config)?;
    if cli.dry_run {
        for name in &outcome.added {
            println!("would add     {}", name);
        }
        for name in &outcome.changed {
            println!("would update  {}", name);
        }
        for name in &outcome.removed {
            println!("would remove  {}", name);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bindforge: {}", err);
            ExitCode::FAILURE
        }
    }
}
