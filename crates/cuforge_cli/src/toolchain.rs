//! The `cuforge toolchain` command: resolve and display the toolchain.

use std::error::Error;

use cuforge_toolchain::{SystemRunner, ToolchainLocator, ToolchainOverrides};

use crate::GlobalArgs;

/// Runs the toolchain command. Returns the process exit code.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = crate::project::resolve_config(global)?;
    let overrides = ToolchainOverrides {
        bin_dir: config.toolchain.bin_path.clone(),
    };

    let mut locator = ToolchainLocator::new();
    match locator.resolve(&overrides, &SystemRunner) {
        Ok(info) => {
            println!("compiler:      {}", info.bin_dir.display());
            println!("host:          {}", info.host_bin_dir.display());
            println!("includes:      {}", info.compiler_include_dir.display());
            println!("host includes: {}", info.host_include_dir.display());
            println!("version hash:  {}", info.version_hash);
            if let Some(release) = info.release {
                println!("release:       {}.{}", release / 10, release % 10);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(1)
        }
    }
}
