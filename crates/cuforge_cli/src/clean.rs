//! The `cuforge clean` command: drop cached artifacts and scratch files.

use std::error::Error;
use std::path::Path;

use cuforge_cache::preprocess::{
    ARTIFACT_EXT, COMPILE_LOG, DEFINE_FILE, PREPROCESSED_FILE, PREPROCESS_LOG,
};

use crate::GlobalArgs;

/// Runs the clean command. Returns the process exit code.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = crate::project::resolve_config(global)?;
    let removed = clean_cache_dir(&config.cache.dir)?;
    if !global.quiet {
        println!(
            "removed {removed} cached file(s) from {}",
            config.cache.dir.display()
        );
    }
    Ok(0)
}

/// Removes every cache-owned file from the directory, leaving everything
/// else untouched. Returns the number of files removed.
fn clean_cache_dir(dir: &Path) -> Result<usize, Box<dyn Error>> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_cache_file = name.ends_with(&format!(".{ARTIFACT_EXT}"))
            || name.ends_with(".tmp")
            || matches!(
                name.as_ref(),
                DEFINE_FILE | PREPROCESSED_FILE | PREPROCESS_LOG | COMPILE_LOG
            );
        if is_cache_file {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn clean_removes_cache_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("0011223344556677.cubin"), b"artifact").unwrap();
        fs::write(tmp.path().join("8899aabbccddeeff.cubin.tmp"), b"partial").unwrap();
        fs::write(tmp.path().join("defines.inl"), "\n\n").unwrap();
        fs::write(tmp.path().join("preprocessed.cu"), "int x;").unwrap();
        fs::write(tmp.path().join("preprocess.log"), "cmd").unwrap();
        fs::write(tmp.path().join("compile.log"), "cmd").unwrap();
        fs::write(tmp.path().join("unrelated.txt"), "keep me").unwrap();

        let removed = clean_cache_dir(tmp.path()).unwrap();
        assert_eq!(removed, 6);
        assert!(tmp.path().join("unrelated.txt").exists());
        assert!(!tmp.path().join("0011223344556677.cubin").exists());
    }

    #[test]
    fn clean_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let removed = clean_cache_dir(&tmp.path().join("absent")).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn clean_empty_dir_removes_nothing() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(clean_cache_dir(tmp.path()).unwrap(), 0);
    }
}
