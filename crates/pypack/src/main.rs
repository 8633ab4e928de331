use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use pypack::{
    BundleOrchestrator,
    config::Config,
    dialect::Dialect,
    insertion::Fallback,
};

/// Pack a Python program and the libraries it declares into one script
#[derive(Debug, Parser)]
#[command(name = "pypack", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra configuration file layered over the discovered ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bundle a main library found along the search roots
    Bundle(BundleArgs),
    /// Bundle a single script; its directory acts as the main library
    Script(ScriptArgs),
}

#[derive(Debug, Args)]
struct BundleArgs {
    /// Target runtime: 2.7 (legacy) or 3.5 (modern)
    dialect: String,
    /// File the bundled script is written to
    output: PathBuf,
    /// Main library, a directory holding `pack.list` and `__main__.py`
    library: String,
    /// Directories searched for libraries, highest priority first
    roots: Vec<PathBuf>,

    /// Nest every bundled library under this namespace
    #[arg(long)]
    product: Option<String>,

    #[command(flatten)]
    output_options: OutputOptions,
}

#[derive(Debug, Args)]
struct ScriptArgs {
    /// Script to bundle
    input: PathBuf,
    /// File the bundled script is written to
    output: PathBuf,

    /// Target runtime: 2.7 (legacy) or 3.5 (modern)
    #[arg(long)]
    dialect: Option<String>,

    #[command(flatten)]
    output_options: OutputOptions,
}

#[derive(Debug, Args)]
struct OutputOptions {
    /// Comment line marking where modules go when the script has no imports
    #[arg(long)]
    marker: Option<String>,

    /// Where modules go when neither an import nor the marker is found
    #[arg(long, value_enum)]
    fallback: Option<Fallback>,

    /// Do not emit the per-process isolation token
    #[arg(long)]
    no_isolation_token: bool,
}

impl OutputOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(marker) = &self.marker {
            config.marker = (!marker.trim().is_empty()).then(|| marker.clone());
        }
        if let Some(fallback) = self.fallback {
            config.fallback = fallback;
        }
        if self.no_isolation_token {
            config.isolation_token = false;
        }
    }
}

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let usage_error = err.use_stderr();
            let _ = err.print();
            return if usage_error {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let mut config = Config::load(cli.config.as_deref(), &cwd)?;

    let (script, output) = match cli.command {
        Command::Bundle(args) => {
            config.dialect = args.dialect.parse::<Dialect>()?;
            config.prepend_search_roots(args.roots);
            if args.product.is_some() {
                config.product = args.product;
            }
            args.output_options.apply(&mut config);
            debug!("Search roots: {:?}", config.search_roots);

            let script = BundleOrchestrator::new(config).bundle_library(&args.library)?;
            (script, args.output)
        }
        Command::Script(args) => {
            if let Some(dialect) = &args.dialect {
                config.dialect = dialect.parse::<Dialect>()?;
            }
            args.output_options.apply(&mut config);

            let script = BundleOrchestrator::new(config).bundle_script(&args.input)?;
            (script, args.output)
        }
    };

    write_output(&output, &script)
}

fn write_output(path: &Path, script: &str) -> Result<()> {
    fs::write(path, script).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}
