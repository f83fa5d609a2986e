//! The `cuforge build` command: compile one kernel through the cache.

use std::error::Error;
use std::path::Path;

use cuforge_cache::{CacheSettings, CompileCache, CompileRequest, ProgressObserver};

use crate::{BuildArgs, GlobalArgs, ReportFormat};

/// Prints a status line when a real compile (not a cache hit) starts.
struct ConsoleStatus;

impl ProgressObserver for ConsoleStatus {
    fn compile_started(&self, source: &Path) {
        eprintln!("Compiling CUDA kernel '{}'...", source.display());
    }

    fn compile_finished(&self, _success: bool) {}
}

/// Runs the build command. Returns the process exit code.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = crate::project::resolve_config(global)?;
    let settings = CacheSettings {
        options: config.kernel.options.clone(),
        preamble: config.kernel.preamble.clone(),
        binary_format: config.kernel.binary_format.clone(),
        forced_arch: config.kernel.arch,
    };

    let mut cache = CompileCache::open(&config.cache.dir, settings);
    if let Some(bin) = &config.toolchain.bin_path {
        cache.set_toolchain_override(bin);
    }
    cache.set_verbose(global.verbose);
    if !global.quiet {
        cache.set_observer(Box::new(ConsoleStatus));
    }

    let mut request = CompileRequest::new(&args.source);
    request.set_options(args.options.clone());
    request.set_preamble(args.preamble.clone());
    request.set_forced_arch(args.arch);
    for spec in &args.defines {
        let (name, value) = parse_define(spec)?;
        request.define(name, value);
    }

    let artifact = cache.lookup_or_compile(&request)?;

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                println!(
                    "{} ({} bytes)",
                    artifact.path().display(),
                    artifact.bytes().len()
                );
            }
        }
        ReportFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "artifact": artifact.path(),
                    "size": artifact.bytes().len(),
                })
            );
        }
    }
    Ok(0)
}

/// Splits a `NAME=VALUE` define; a bare `NAME` defines it to `1`.
fn parse_define(spec: &str) -> Result<(String, String), Box<dyn Error>> {
    match spec.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        Some(_) => Err(format!("invalid define '{spec}' (expected NAME=VALUE)").into()),
        None if !spec.is_empty() => Ok((spec.to_string(), "1".to_string())),
        None => Err("empty define".into()),
    }
}
