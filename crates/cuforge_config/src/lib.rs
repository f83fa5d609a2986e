//! Configuration loading for the Cuforge kernel compilation cache.
//!
//! Projects may carry a `cuforge.toml` declaring the static option string,
//! preamble, binary format, architecture override, toolchain location, and
//! cache directory. Every section is optional; a missing file is equivalent
//! to the defaults.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::{CacheConfig, CuforgeConfig, KernelConfig, ToolchainConfig};
