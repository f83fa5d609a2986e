//! Cuforge CLI — a cached front-end for CUDA kernel compilation.
//!
//! Provides `cuforge build` to compile a kernel through the two-tier cache,
//! `cuforge clean` to drop cached artifacts and scratch files, and
//! `cuforge toolchain` to resolve and display the external toolchain.

#![warn(missing_docs)]

mod build;
mod clean;
mod project;
mod toolchain;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Cuforge — a content-addressed compilation cache for CUDA kernels.
#[derive(Parser, Debug)]
#[command(name = "cuforge", version, about = "Cuforge CUDA kernel compile cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose progress output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `cuforge.toml` configuration file or directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a kernel through the cache.
    Build(BuildArgs),
    /// Remove cached artifacts and scratch files.
    Clean,
    /// Resolve and display the compiler toolchain.
    Toolchain,
}

/// Arguments for the `cuforge build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Kernel source file to compile.
    pub source: String,

    /// Preprocessor defines (`NAME=VALUE`; a bare `NAME` defines it to 1).
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    pub defines: Vec<String>,

    /// Compiler options appended after the configured static options.
    #[arg(short, long, default_value = "", allow_hyphen_values = true)]
    pub options: String,

    /// Preamble text injected ahead of the kernel.
    #[arg(long, default_value = "")]
    pub preamble: String,

    /// Force a target SM generation (e.g. 20).
    #[arg(long)]
    pub arch: Option<u32>,

    /// Output format for the build result.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Build result output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose progress information.
    pub verbose: bool,
    /// Optional path to a custom config file or directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Clean => clean::run(&global),
        Command::Toolchain => toolchain::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
