//! Error types for kernel compilation and caching.

use std::path::PathBuf;

use cuforge_toolchain::ToolchainError;

/// Errors surfaced by the compile cache.
///
/// Preprocess and compile failures embed the full captured subprocess log in
/// their message, so a failure is diagnosable without re-running the
/// toolchain. Errors are never cached: a later retry after fixing the
/// underlying cause starts clean (the one exception is the toolchain
/// resolution failure, which is remembered by the locator itself).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The external toolchain could not be resolved.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// The request's kernel source file is missing or unreadable.
    #[error("kernel source '{path}' is missing or unreadable")]
    SourceNotFound {
        /// The source path from the request.
        path: PathBuf,
    },

    /// The cache directory does not exist and could not be created.
    #[error("cannot create kernel cache directory '{path}': {reason}")]
    CacheDir {
        /// The configured cache directory.
        path: PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// The external preprocessor exited nonzero.
    #[error("preprocessing '{path}' failed\n{log}")]
    Preprocess {
        /// The source being preprocessed.
        path: PathBuf,
        /// The captured preprocessor log.
        log: String,
    },

    /// The external compiler exited nonzero or produced no output file.
    #[error("compiling '{path}' failed\n{log}")]
    Compile {
        /// The source being compiled.
        path: PathBuf,
        /// The captured compiler log.
        log: String,
    },

    /// An I/O error occurred while reading or writing cache files.
    #[error("kernel cache I/O error at {path}: {reason}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },
}
