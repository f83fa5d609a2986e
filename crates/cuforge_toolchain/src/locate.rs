//! Compiler toolchain discovery.
//!
//! Builds priority-ordered candidate directory lists from explicit overrides,
//! environment variables, and conventional install locations, then accepts
//! the first candidate that passes validation. Resolution runs at most once
//! per [`ToolchainLocator`]; both success and failure are remembered, so a
//! broken environment fails fast instead of being re-scanned on every
//! compile.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use cuforge_common::Hash64;

use crate::error::ToolchainError;
use crate::runner::{CommandRunner, CommandSpec};

/// Expected prefix of a valid compiler version-query response.
pub const VERSION_SIGNATURE: &str = "nvcc: NVIDIA";

/// Compiler executable name probed in each candidate binary directory.
#[cfg(windows)]
pub const COMPILER_EXE: &str = "nvcc.exe";
/// Compiler executable name probed in each candidate binary directory.
#[cfg(not(windows))]
pub const COMPILER_EXE: &str = "nvcc";

/// Marker file validating a host-toolchain binary directory.
#[cfg(windows)]
pub const HOST_BIN_MARKER: &str = "vcvars32.bat";
/// Marker file validating a host-toolchain binary directory.
#[cfg(not(windows))]
pub const HOST_BIN_MARKER: &str = "gcc";

/// Header file validating a compiler include directory.
pub const COMPILER_INCLUDE_MARKER: &str = "cuda.h";

/// Header file validating a host include directory.
#[cfg(windows)]
pub const HOST_INCLUDE_MARKER: &str = "crtdefs.h";
/// Header file validating a host include directory.
#[cfg(not(windows))]
pub const HOST_INCLUDE_MARKER: &str = "stdlib.h";

#[cfg(windows)]
const FALLBACK_COMPILER_BINS: &[&str] = &[
    "C:\\CUDA\\bin",
    "C:\\CUDA\\bin64",
    "D:\\CUDA\\bin",
    "D:\\CUDA\\bin64",
];
#[cfg(not(windows))]
const FALLBACK_COMPILER_BINS: &[&str] = &["/usr/local/cuda/bin", "/opt/cuda/bin"];

#[cfg(windows)]
const FALLBACK_HOST_BINS: &[&str] = &[
    "C:\\Program Files\\Microsoft Visual Studio 8\\VC\\bin",
    "C:\\Program Files\\Microsoft Visual Studio 9.0\\VC\\bin",
    "C:\\Program Files (x86)\\Microsoft Visual Studio 8\\VC\\bin",
    "C:\\Program Files (x86)\\Microsoft Visual Studio 9.0\\VC\\bin",
];
#[cfg(not(windows))]
const FALLBACK_HOST_BINS: &[&str] = &["/usr/bin", "/usr/local/bin"];

#[cfg(windows)]
const FALLBACK_COMPILER_INCLUDES: &[&str] = &["C:\\CUDA\\include", "D:\\CUDA\\include"];
#[cfg(not(windows))]
const FALLBACK_COMPILER_INCLUDES: &[&str] = &["/usr/local/cuda/include", "/opt/cuda/include"];

#[cfg(windows)]
const FALLBACK_HOST_INCLUDES: &[&str] = &[
    "C:\\Program Files\\Microsoft Visual Studio 8\\VC\\INCLUDE",
    "C:\\Program Files\\Microsoft Visual Studio 9.0\\VC\\INCLUDE",
    "C:\\Program Files (x86)\\Microsoft Visual Studio 8\\VC\\INCLUDE",
    "C:\\Program Files (x86)\\Microsoft Visual Studio 9.0\\VC\\INCLUDE",
];
#[cfg(not(windows))]
const FALLBACK_HOST_INCLUDES: &[&str] = &["/usr/include"];

/// Explicit overrides applied before any environment probing.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOverrides {
    /// Compiler binary directory. When set, it is the only compiler
    /// candidate considered.
    pub bin_dir: Option<PathBuf>,
}

/// Priority-ordered candidate directories for each location to resolve.
///
/// Built from the environment by [`CandidateSet::from_environment`], or
/// constructed directly by embedders and tests. Bin-relative include
/// candidates (`<bin>/../include`) are prepended during resolution, once the
/// binary directories are known.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// Candidate compiler binary directories.
    pub compiler_bins: Vec<PathBuf>,
    /// Candidate host-toolchain binary directories.
    pub host_bins: Vec<PathBuf>,
    /// Candidate compiler include directories.
    pub compiler_includes: Vec<PathBuf>,
    /// Candidate host include directories.
    pub host_includes: Vec<PathBuf>,
}

impl CandidateSet {
    /// Builds the candidate lists from the process environment and the
    /// conventional install locations.
    ///
    /// Compiler binaries: the explicit override alone if set, else
    /// `CUDA_BIN_PATH`, `<CUDA_PATH>/bin`, every `PATH` entry, then fixed
    /// fallbacks. Includes: `CUDA_INC_PATH` / `INCLUDE` entries then fixed
    /// fallbacks. Host binaries: `PATH` entries then fixed fallbacks.
    pub fn from_environment(overrides: &ToolchainOverrides) -> Self {
        let path_entries = env_path_list("PATH");
        let include_entries = env_path_list("INCLUDE");

        let mut compiler_bins = Vec::new();
        if let Some(dir) = &overrides.bin_dir {
            compiler_bins.push(dir.clone());
        } else {
            if let Some(dir) = env_dir("CUDA_BIN_PATH") {
                compiler_bins.push(dir);
            }
            if let Some(dir) = env_dir("CUDA_PATH") {
                compiler_bins.push(dir.join("bin"));
            }
            compiler_bins.extend(path_entries.iter().cloned());
            compiler_bins.extend(FALLBACK_COMPILER_BINS.iter().map(PathBuf::from));
        }

        let mut host_bins = path_entries;
        host_bins.extend(FALLBACK_HOST_BINS.iter().map(PathBuf::from));

        let mut compiler_includes = Vec::new();
        if let Some(dir) = env_dir("CUDA_INC_PATH") {
            compiler_includes.push(dir);
        }
        compiler_includes.extend(include_entries.iter().cloned());
        compiler_includes.extend(FALLBACK_COMPILER_INCLUDES.iter().map(PathBuf::from));

        let mut host_includes = include_entries;
        host_includes.extend(FALLBACK_HOST_INCLUDES.iter().map(PathBuf::from));

        Self {
            compiler_bins,
            host_bins,
            compiler_includes,
            host_includes,
        }
    }
}

/// Reads a single-directory environment variable.
fn env_dir(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Splits a `PATH`-style environment variable into its entries.
fn env_path_list(name: &str) -> Vec<PathBuf> {
    match env::var_os(name) {
        Some(value) => env::split_paths(&value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// A fully resolved compiler toolchain.
///
/// Created once per locator and shared read-only behind an `Arc`; every
/// compile in the process reuses the same resolution.
#[derive(Debug, Clone)]
pub struct ToolchainInfo {
    /// Directory containing the compiler binary.
    pub bin_dir: PathBuf,
    /// Directory containing the host toolchain binaries.
    pub host_bin_dir: PathBuf,
    /// Compiler header directory.
    pub compiler_include_dir: PathBuf,
    /// Host toolchain header directory.
    pub host_include_dir: PathBuf,
    /// Hash of the compiler's version-query response; folded into every
    /// artifact hash so a toolkit upgrade invalidates the disk cache.
    pub version_hash: Hash64,
    /// Numeric release parsed from the version response, tens-encoded
    /// (release 12.3 is `123`). `None` when the response carries no
    /// recognizable release token.
    pub release: Option<u32>,
}

impl ToolchainInfo {
    /// Composes the base invocation shared by every preprocessor and
    /// compiler run: the compiler binary, the host-toolchain binding, and
    /// both include directories.
    pub fn base_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.bin_dir.join(COMPILER_EXE));
        spec.arg("-ccbin")
            .arg(self.host_bin_dir.clone())
            .arg("-I")
            .arg(self.compiler_include_dir.clone())
            .arg("-I")
            .arg(self.host_include_dir.clone());
        #[cfg(windows)]
        spec.arg("-D_CRT_SECURE_NO_DEPRECATE");
        spec
    }
}

/// Resolves the toolchain once and remembers the outcome.
#[derive(Default)]
pub struct ToolchainLocator {
    resolved: Option<Result<Arc<ToolchainInfo>, ToolchainError>>,
}

impl ToolchainLocator {
    /// Creates a locator with no cached resolution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resolved toolchain, probing the environment on first use.
    pub fn resolve(
        &mut self,
        overrides: &ToolchainOverrides,
        runner: &dyn CommandRunner,
    ) -> Result<Arc<ToolchainInfo>, ToolchainError> {
        if let Some(outcome) = &self.resolved {
            return outcome.clone();
        }
        self.resolve_with(CandidateSet::from_environment(overrides), runner)
    }

    /// Like [`resolve`](Self::resolve), with an explicit candidate set
    /// instead of the process environment.
    pub fn resolve_with(
        &mut self,
        candidates: CandidateSet,
        runner: &dyn CommandRunner,
    ) -> Result<Arc<ToolchainInfo>, ToolchainError> {
        if let Some(outcome) = &self.resolved {
            return outcome.clone();
        }
        let outcome = resolve_candidates(&candidates, runner).map(Arc::new);
        self.resolved = Some(outcome.clone());
        outcome
    }

    /// Seeds the locator with an already-resolved toolchain, replacing any
    /// cached outcome (including a remembered failure).
    pub fn seed(&mut self, info: ToolchainInfo) {
        self.resolved = Some(Ok(Arc::new(info)));
    }

    /// Returns `true` once a resolution outcome (success or failure) is
    /// cached.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Runs the four-stage discovery over a candidate set.
fn resolve_candidates(
    candidates: &CandidateSet,
    runner: &dyn CommandRunner,
) -> Result<ToolchainInfo, ToolchainError> {
    let (bin_dir, version_hash, release) = probe_compiler(&candidates.compiler_bins, runner)?;

    let host_bin_dir = first_with_marker(&candidates.host_bins, HOST_BIN_MARKER)
        .ok_or(ToolchainError::HostToolchainNotFound)?;

    let mut compiler_includes = vec![bin_dir.join("..").join("include")];
    compiler_includes.extend(candidates.compiler_includes.iter().cloned());
    let compiler_include_dir = first_with_marker(&compiler_includes, COMPILER_INCLUDE_MARKER)
        .ok_or(ToolchainError::CompilerIncludeNotFound)?;

    let mut host_includes = vec![host_bin_dir.join("..").join("include")];
    host_includes.extend(candidates.host_includes.iter().cloned());
    let host_include_dir = first_with_marker(&host_includes, HOST_INCLUDE_MARKER)
        .ok_or(ToolchainError::HostIncludeNotFound)?;

    Ok(ToolchainInfo {
        bin_dir,
        host_bin_dir,
        compiler_include_dir,
        host_include_dir,
        version_hash,
        release,
    })
}

/// Probes compiler candidates in order, accepting the first directory whose
/// version-query response carries the expected signature.
///
/// Unreadable or unresponsive candidates are skipped, not errors.
fn probe_compiler(
    dirs: &[PathBuf],
    runner: &dyn CommandRunner,
) -> Result<(PathBuf, Hash64, Option<u32>), ToolchainError> {
    for dir in dirs {
        let exe = dir.join(COMPILER_EXE);
        if !exe.is_file() {
            continue;
        }

        let mut spec = CommandSpec::new(exe);
        spec.arg("--version");
        let Ok(output) = runner.run(&spec) else {
            continue;
        };
        if !output.success() {
            continue;
        }

        let response = output.stdout_text();
        if !response.starts_with(VERSION_SIGNATURE) {
            continue;
        }

        let release = parse_release(&response);
        return Ok((dir.clone(), Hash64::from_bytes(response.as_bytes()), release));
    }
    Err(ToolchainError::CompilerNotFound)
}

/// Returns the first directory containing the given marker file.
fn first_with_marker(dirs: &[PathBuf], marker: &str) -> Option<PathBuf> {
    dirs.iter().find(|d| d.join(marker).is_file()).cloned()
}

/// Parses the `release X.Y` token of a version response into a tens-encoded
/// number (`release 12.3` becomes 123, `release 3.2` becomes 32).
fn parse_release(response: &str) -> Option<u32> {
    let rest = &response[response.find("release ")? + "release ".len()..];
    let token = rest
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()?;
    let mut parts = token.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    Some(major * 10 + minor)
}
