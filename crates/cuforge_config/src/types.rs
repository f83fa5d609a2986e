//! Configuration types deserialized from `cuforge.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The top-level configuration parsed from `cuforge.toml`.
///
/// All sections are optional; [`CuforgeConfig::default`] matches a missing
/// or empty configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct CuforgeConfig {
    /// Static kernel compilation settings applied to every request.
    #[serde(default)]
    pub kernel: KernelConfig,
    /// Toolchain discovery overrides.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Cache location settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Static settings prepended to every compile request.
#[derive(Debug, Default, Deserialize)]
pub struct KernelConfig {
    /// Option string placed before each request's own options.
    #[serde(default)]
    pub options: String,

    /// Preamble text injected after the define block of every kernel.
    #[serde(default)]
    pub preamble: String,

    /// Binary-format flag overriding the `-cubin` default.
    #[serde(default)]
    pub binary_format: Option<String>,

    /// Forced SM generation applied to requests without their own override.
    #[serde(default)]
    pub arch: Option<u32>,
}

/// Toolchain discovery overrides.
#[derive(Debug, Default, Deserialize)]
pub struct ToolchainConfig {
    /// Explicit compiler binary directory; when set, environment probing for
    /// the compiler is skipped entirely.
    #[serde(default)]
    pub bin_path: Option<PathBuf>,
}

/// Cache location settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Directory holding scratch files and compiled artifacts.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cudacache")
}
