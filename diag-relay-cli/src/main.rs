//! Squirrel script runner with relayed diagnostics
//!
//! Runs a script in an embedded Squirrel VM and routes everything the VM
//! prints (script output, compile errors, runtime call stacks) through the
//! diag-relay library to configurable sinks:
//! - stdout/stderr, optionally timestamped or as JSON lines
//! - a file
//! - the log facade
//! - C callbacks from a shared library

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

mod callbacks;
mod config;
mod output;

use callbacks::NativeCallbacks;
use config::{AppConfig, OutputFormat};
use diag_relay::HostRelay;

#[cfg(feature = "squirrel")]
type VmChar = diag_relay::squirrel::SQChar;
#[cfg(not(feature = "squirrel"))]
type VmChar = u8;

/// sqrelay - Run Squirrel scripts with relayed print/error output
#[derive(Parser, Debug)]
#[command(name = "sqrelay")]
#[command(about = "Run Squirrel scripts and relay their diagnostics", long_about = None)]
#[command(version)]
struct Args {
    /// Script to run
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Path to configuration file (sqrelay.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initial VM stack size (overrides config)
    #[arg(long, value_name = "SLOTS")]
    stack_size: Option<isize>,

    /// Write relayed output to this file instead of the terminal
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Prefix relayed lines with a UTC timestamp
    #[arg(long)]
    timestamps: bool,

    /// Emit one JSON object per relayed diagnostic
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging except errors and log-sink script output
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Command line flags win over the config file
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(stack_size) = self.stack_size {
            config.vm.stack_size = stack_size;
        }
        if let Some(output) = &self.output {
            config.output.file = Some(output.clone());
        }
        if self.timestamps {
            config.output.timestamps = true;
        }
        if self.json {
            config.output.format = OutputFormat::Json;
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("sqrelay v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using diag-relay library v{}", diag_relay::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    args.apply_overrides(&mut config);
    config::validate(&config).context("Invalid configuration")?;
    log::debug!("Effective configuration: {:?}", config);

    match &args.script {
        Some(script) => run_script(script, &config),
        None => {
            println!("sqrelay - No script specified");
            println!("\nQuick Start:");
            println!("  sqrelay hello.nut");
            println!("  sqrelay hello.nut --json --timestamps");
            println!("  sqrelay hello.nut --config sqrelay.toml");
            println!("\nUse --help for more options");
            Ok(())
        }
    }
}

/// Load the script, build the relay and run it
fn run_script(script: &Path, config: &AppConfig) -> Result<()> {
    let source = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script: {:?}", script))?;
    let source_name = script.display().to_string();

    // Declared before the VM is created so the library outlives it
    let native = NativeCallbacks::<VmChar>::load(&config.callbacks)?;

    let mut relay = output::build_relay::<VmChar>(config)?;
    if let Some(native) = &native {
        native.apply(&mut relay);
    }

    execute(&source, &source_name, config, relay)
}

#[cfg(feature = "squirrel")]
fn execute(source: &str, source_name: &str, config: &AppConfig, relay: HostRelay<VmChar>) -> Result<()> {
    use diag_relay::squirrel::SquirrelVm;

    let mut vm = SquirrelVm::new(config.vm.stack_size)?;
    vm.install_relay(relay)?;
    if config.vm.stdlib {
        vm.register_stdlib()?;
    }

    log::info!("Running {}", source_name);
    vm.run_source(source, source_name)?;
    log::info!("Finished {}", source_name);
    Ok(())
}

#[cfg(not(feature = "squirrel"))]
fn execute(_source: &str, source_name: &str, _config: &AppConfig, _relay: HostRelay<VmChar>) -> Result<()> {
    anyhow::bail!(
        "cannot run {}: sqrelay was built without the `squirrel` feature",
        source_name
    )
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        // The log sink carries script output, keep it visible by default
        .filter_module(diag_relay::VM_LOG_TARGET, level.max(LevelFilter::Info))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "sqrelay",
            "script.nut",
            "--stack-size",
            "4096",
            "--json",
            "--output",
            "out.jsonl",
        ]);
        let mut config = AppConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.vm.stack_size, 4096);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.file, Some(PathBuf::from("out.jsonl")));
        assert!(!config.output.timestamps);
    }

    #[test]
    fn test_override_is_validated() {
        let args = Args::parse_from(["sqrelay", "script.nut", "--stack-size", "0"]);
        let mut config = AppConfig::default();
        assert!(config::validate(&config).is_ok());

        args.apply_overrides(&mut config);
        assert!(config::validate(&config).is_err());
    }

    #[test]
    fn test_missing_script_is_reported() {
        let err = run_script(Path::new("/nonexistent/script.nut"), &AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to read script"));
    }
}
