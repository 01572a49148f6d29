use std::path::PathBuf;

use anyhow::{Context, Result};
use flowguard_core::ir::Module;
use flowguard_core::AnalysisConfig;

use crate::canonicalize_or_current;

/// Load a module JSON file, returning its resolved path alongside it.
pub fn load_module(path: &str) -> Result<(PathBuf, Module)> {
    let module_path = canonicalize_or_current(path)?;
    let module = Module::load(&module_path)
        .with_context(|| format!("Failed to load module: {}", module_path.display()))?;
    Ok((module_path, module))
}

/// Load the analysis config, or the defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => {
            let config_path = canonicalize_or_current(p)?;
            AnalysisConfig::load(&config_path)
                .with_context(|| format!("Failed to load config: {}", config_path.display()))
        }
        None => Ok(AnalysisConfig::default()),
    }
}
