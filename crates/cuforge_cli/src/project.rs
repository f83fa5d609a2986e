//! Shared helpers for CLI commands: configuration resolution.

use std::path::PathBuf;

use cuforge_config::{load_config, load_config_from_str, CuforgeConfig};

use crate::GlobalArgs;

/// Resolves the effective configuration for a command.
///
/// `--config` may name a `cuforge.toml` file or a directory containing one.
/// Without it, the current directory's `cuforge.toml` is used when present,
/// and the built-in defaults when not.
pub fn resolve_config(global: &GlobalArgs) -> Result<CuforgeConfig, Box<dyn std::error::Error>> {
    if let Some(config_path) = &global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            let content = std::fs::read_to_string(&p)?;
            return Ok(load_config_from_str(&content)?);
        }
        return Ok(load_config(&p)?);
    }

    let cwd = std::env::current_dir()?;
    if cwd.join("cuforge.toml").is_file() {
        return Ok(load_config(&cwd)?);
    }
    Ok(CuforgeConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn global_with_config(config: Option<String>) -> GlobalArgs {
        GlobalArgs {
            quiet: false,
            verbose: false,
            config,
        }
    }

    #[test]
    fn resolve_from_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cuforge.toml");
        fs::write(&path, "[kernel]\noptions = \"-O3\"\n").unwrap();

        let config =
            resolve_config(&global_with_config(Some(path.to_str().unwrap().to_string()))).unwrap();
        assert_eq!(config.kernel.options, "-O3");
    }

    #[test]
    fn resolve_from_config_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("cuforge.toml"),
            "[cache]\ndir = \"my-cache\"\n",
        )
        .unwrap();

        let config = resolve_config(&global_with_config(Some(
            tmp.path().to_str().unwrap().to_string(),
        )))
        .unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("my-cache"));
    }

    #[test]
    fn resolve_missing_explicit_config_errors() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_config(&global_with_config(Some(
            tmp.path().join("nowhere").to_str().unwrap().to_string(),
        )));
        assert!(result.is_err());
    }

    #[test]
    fn resolve_invalid_config_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cuforge.toml");
        fs::write(&path, "not toml {{{").unwrap();

        let result =
            resolve_config(&global_with_config(Some(path.to_str().unwrap().to_string())));
        assert!(result.is_err());
    }
}
