//! recast CLI
//!
//! Command-line interface for applying mappings to FHIR bundles

mod commands;
mod output;

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use recast_core::init_tracing;
use tracing::error;

use crate::commands::RunOptions;

const RUN_USAGE: &str = "Usage: recast run -m <MAPPING> -s <SOURCE> [-ig <IG_DIR>] [-o <OUT_DIR>] [--subject <FILE>] [--seed <N>] [--strict]";

#[derive(Parser)]
#[command(name = "recast")]
#[command(about = "recast: declarative transformations for FHIR R4 bundles")]
#[command(version = recast_core::VERSION)]
#[command(
    long_about = "recast applies a mapping (a list of actions such as profiles, set_values,\n\
create_resource and shift_dates) to FHIR bundles and writes the results.\n\
\n\
Examples:\n  \
recast run -m mapping.yaml -s bundle.json           # Transform one bundle\n  \
recast run -m mapping.yaml -s bundles/ -o out/      # Transform every bundle in a folder\n  \
recast run -m mapping.yaml -s b.json -ig ig/        # Load profiles and ValueSets first\n  \
recast check -m mapping.yaml                        # Validate a mapping"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (.recastrc.json/recast.yaml)"
    )]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generate shell completion script
    #[arg(
        long,
        value_enum,
        help = "Generate completion script for specified shell"
    )]
    generate_completion: Option<Shell>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a mapping to one bundle or a folder of bundles
    Run {
        /// Mapping file (YAML or JSON)
        #[arg(short, long, help = "Mapping file (YAML, or JSON by extension)")]
        mapping: Option<PathBuf>,

        /// Bundle file or folder of bundle files
        #[arg(short, long, help = "Bundle file, or a folder of .json bundles")]
        source: Option<PathBuf>,

        /// Implementation guide folder (also accepted as -ig)
        #[arg(long, help = "Folder of StructureDefinitions and ValueSets")]
        ig: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, help = "Output directory (default: output)")]
        output: Option<PathBuf>,

        /// Subject record with attributes and module history
        #[arg(long, help = "Subject record (YAML or JSON) for $getAttribute and based_on modules")]
        subject: Option<PathBuf>,

        /// Seed for $randomCode
        #[arg(long, help = "Seed for $randomCode, for reproducible output")]
        seed: Option<u64>,

        /// Fail when $findRef matches nothing
        #[arg(long, help = "Treat unresolved $findRef targets as errors")]
        strict: bool,

        /// Pretty-print output JSON
        #[arg(long, help = "Pretty-print output JSON")]
        pretty: bool,
    },

    /// Load a mapping and print its actions
    Check {
        /// Mapping file to validate
        #[arg(short, long, help = "Mapping file (YAML, or JSON by extension)")]
        mapping: PathBuf,
    },

    /// Show version information
    #[command(alias = "ver")]
    Version {
        /// Show detailed version information
        #[arg(long, help = "Show detailed version and build information")]
        detailed: bool,
    },
}

/// Accept the single-dash `-ig` spelling
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-ig") => OsString::from("--ig"),
            Some(text) if text.starts_with("-ig=") => OsString::from(format!("-{text}")),
            _ => arg,
        })
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    if let Some(shell) = cli.generate_completion {
        generate_completion_script(shell);
        return ExitCode::SUCCESS;
    }

    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    let log_level = match cli.verbose {
        0 => "recast=error",
        1 => "recast=warn",
        2 => "recast=info",
        3 => "recast=debug",
        _ => "recast=trace",
    };
    init_tracing(log_level);

    match run_command(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("recast failed: {:#}", e);
            output::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn generate_completion_script(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Commands::Run {
            mapping,
            source,
            ig,
            output,
            subject,
            seed,
            strict,
            pretty,
        }) => {
            let (Some(mapping), Some(source)) = (mapping, source) else {
                eprintln!("{RUN_USAGE}");
                return Ok(ExitCode::FAILURE);
            };
            let options = RunOptions {
                mapping,
                source,
                ig,
                output,
                subject,
                seed,
                strict,
                pretty,
            };
            let summary = commands::run_command(options, cli.config.as_deref())?;
            output::print_run_summary(&summary);
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Check { mapping }) => {
            let mapping = commands::check_command(&mapping)?;
            output::print_mapping(&mapping);
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Version { detailed }) => {
            if detailed {
                println!("recast {}", recast_core::VERSION);
                println!("Build information:");
                println!("  Target: {}", std::env::consts::ARCH);
                println!("  OS: {}", std::env::consts::OS);
                println!(
                    "  Rust version: {}",
                    option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown")
                );
            } else {
                println!("{}", recast_core::VERSION);
            }
            Ok(ExitCode::SUCCESS)
        }

        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_single_dash_ig_is_normalized() {
        assert_eq!(
            normalize_args(os(&["recast", "run", "-ig", "dir", "-ig=other", "-i"])),
            os(&["recast", "run", "--ig", "dir", "--ig=other", "-i"])
        );
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from(normalize_args(os(&[
            "recast", "-vv", "run", "-m", "m.yaml", "-s", "b.json", "-ig", "ig", "--seed", "4",
        ])))
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Some(Commands::Run { ig, seed, strict, .. }) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(ig, Some(PathBuf::from("ig")));
        assert_eq!(seed, Some(4));
        assert!(!strict);
    }
}
