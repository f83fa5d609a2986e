//! The two-tier compile cache orchestrator.
//!
//! [`CompileCache`] ties the fingerprint engine, toolchain locator,
//! preprocessing stage, and compiler invocation into a single
//! `lookup_or_compile` entry point. It is an explicit context object owned
//! by the embedding application: opening one creates the in-memory tier,
//! dropping it releases every loaded artifact, and the on-disk tier stays
//! behind for the next process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cuforge_toolchain::{
    CommandRunner, SystemRunner, ToolchainInfo, ToolchainLocator, ToolchainOverrides,
};

use crate::artifact::CachedArtifact;
use crate::error::CompileError;
use crate::preprocess::{self, PreprocessOutcome, COMPILE_LOG, DEFINE_FILE};
use crate::progress::ProgressObserver;
use crate::request::{CompileRequest, Fingerprint};

/// Process-wide static compile settings, typically loaded from
/// `cuforge.toml` and shared by every request in a context.
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Option string placed before every request's own options.
    pub options: String,
    /// Preamble injected into the define file ahead of each request's
    /// preamble.
    pub preamble: String,
    /// Binary-format flag; `-cubin` when unset.
    pub binary_format: Option<String>,
    /// Forced SM generation for requests without their own override.
    pub forced_arch: Option<u32>,
}

/// The two-tier kernel compilation cache.
///
/// Tier 1 maps request [`Fingerprint`]s to artifacts already loaded in this
/// process; a hit performs no filesystem or subprocess activity. Tier 2 is
/// the cache directory, where each distinct artifact hash names one
/// compiled file; a hit there skips the compiler entirely. Both tiers are
/// append-only for the context's lifetime — nothing is evicted, and
/// failures are never recorded in either tier.
///
/// Single-threaded by design: one compile is in flight per context, and a
/// multithreaded embedder must serialize access itself.
pub struct CompileCache {
    cache_dir: PathBuf,
    settings: CacheSettings,
    overrides: ToolchainOverrides,
    locator: ToolchainLocator,
    runner: Box<dyn CommandRunner>,
    memory: HashMap<Fingerprint, Arc<CachedArtifact>>,
    observer: Option<Box<dyn ProgressObserver>>,
    detected_arch: Option<u32>,
    verbose: bool,
}

impl CompileCache {
    /// Opens a cache context over the given directory.
    ///
    /// The directory is created lazily by the first compile that needs it.
    /// External processes run through [`SystemRunner`] unless a different
    /// runner is injected.
    pub fn open(cache_dir: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            settings,
            overrides: ToolchainOverrides::default(),
            locator: ToolchainLocator::new(),
            runner: Box::new(SystemRunner),
            memory: HashMap::new(),
            observer: None,
            detected_arch: None,
            verbose: false,
        }
    }

    /// The cache directory this context operates on.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Replaces the subprocess runner used for every external invocation.
    pub fn set_runner(&mut self, runner: Box<dyn CommandRunner>) {
        self.runner = runner;
    }

    /// Restricts toolchain discovery to an explicit compiler binary
    /// directory instead of probing the environment.
    pub fn set_toolchain_override(&mut self, bin_dir: impl Into<PathBuf>) {
        self.overrides.bin_dir = Some(bin_dir.into());
    }

    /// Seeds the locator with an already-resolved toolchain, replacing any
    /// cached outcome (including a remembered resolution failure).
    pub fn set_toolchain(&mut self, info: ToolchainInfo) {
        self.locator.seed(info);
    }

    /// Installs the progress observer notified around compiler runs.
    pub fn set_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observer = Some(observer);
    }

    /// Records the device generation reported by the embedding runtime,
    /// consumed by the architecture-override policy.
    pub fn set_detected_arch(&mut self, sm: u32) {
        self.detected_arch = Some(sm);
    }

    /// Enables progress lines on stdout.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Returns the artifact for a request, compiling only on a miss in both
    /// tiers.
    ///
    /// On any failure nothing is inserted into either tier and the error is
    /// returned without being cached, so a retry after fixing the underlying
    /// cause can succeed. The exception is toolchain resolution, whose
    /// failure is remembered by the locator so later requests fail fast
    /// without re-scanning a known-broken environment.
    pub fn lookup_or_compile(
        &mut self,
        request: &CompileRequest,
    ) -> Result<Arc<CachedArtifact>, CompileError> {
        let fingerprint = request.fingerprint();
        if let Some(artifact) = self.memory.get(&fingerprint) {
            return Ok(artifact.clone());
        }

        let toolchain = self.locator.resolve(&self.overrides, self.runner.as_ref())?;

        if !request.source_file().is_file() {
            return Err(CompileError::SourceNotFound {
                path: request.source_file().to_path_buf(),
            });
        }

        self.ensure_cache_dir()?;
        preprocess::write_define_file(&self.cache_dir, request, &self.settings.preamble)?;
        let outcome = preprocess::run_preprocessor(
            request,
            &toolchain,
            &self.cache_dir,
            &self.settings,
            self.detected_arch,
            self.runner.as_ref(),
        )?;

        if !outcome.artifact_path.is_file() {
            self.run_compiler(request, &toolchain, &outcome)?;
        }

        let artifact = Arc::new(CachedArtifact::load(&outcome.artifact_path)?);
        self.memory.insert(fingerprint, artifact.clone());
        Ok(artifact)
    }

    /// Drops every in-memory artifact; Tier-2 files stay on disk.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// Number of artifacts currently held in memory.
    pub fn memory_entries(&self) -> usize {
        self.memory.len()
    }

    fn ensure_cache_dir(&self) -> Result<(), CompileError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| CompileError::CacheDir {
            path: self.cache_dir.clone(),
            reason: e.to_string(),
        })
    }

    /// Invokes the external compiler for a Tier-2 miss.
    ///
    /// The compiler writes to a temporary name; the file is renamed to its
    /// hash name only after a verified zero exit, so a concurrent reader of
    /// the cache directory never observes a partially written artifact.
    fn run_compiler(
        &self,
        request: &CompileRequest,
        toolchain: &ToolchainInfo,
        outcome: &PreprocessOutcome,
    ) -> Result<(), CompileError> {
        let log_file = self.cache_dir.join(COMPILE_LOG);
        let tmp_path = outcome.artifact_path.with_extension("cubin.tmp");

        let mut spec = toolchain.base_command();
        spec.arg("-o")
            .arg(tmp_path.clone())
            .arg("-include")
            .arg(self.cache_dir.join(DEFINE_FILE));
        spec.args(outcome.final_options.split_whitespace());
        spec.arg(request.source_file().to_path_buf());

        if let Some(observer) = &self.observer {
            observer.compile_started(request.source_file());
        }
        if self.verbose {
            println!(
                "cuforge: compiling '{}'...",
                request.source_file().display()
            );
        }

        let result = self.run_compiler_command(request, &spec, &log_file, &tmp_path, outcome);

        if let Some(observer) = &self.observer {
            observer.compile_finished(result.is_ok());
        }
        if self.verbose {
            println!(
                "cuforge: compiling '{}' {}",
                request.source_file().display(),
                if result.is_ok() { "done" } else { "failed" }
            );
        }
        result
    }

    fn run_compiler_command(
        &self,
        request: &CompileRequest,
        spec: &cuforge_toolchain::CommandSpec,
        log_file: &Path,
        tmp_path: &Path,
        outcome: &PreprocessOutcome,
    ) -> Result<(), CompileError> {
        preprocess::init_log_file(log_file, &spec.render())?;
        let output = match self.runner.run(spec) {
            Ok(output) => output,
            Err(e) => {
                return Err(CompileError::Compile {
                    path: request.source_file().to_path_buf(),
                    log: format!("failed to run compiler: {e}"),
                })
            }
        };
        preprocess::append_log(log_file, &output.stderr)?;

        if !output.success() || !tmp_path.is_file() {
            let _ = std::fs::remove_file(tmp_path);
            return Err(CompileError::Compile {
                path: request.source_file().to_path_buf(),
                log: preprocess::logged_error_text(log_file),
            });
        }

        std::fs::rename(tmp_path, &outcome.artifact_path).map_err(|e| CompileError::Io {
            path: outcome.artifact_path.clone(),
            reason: e.to_string(),
        })
    }
}
