//! Analysis configuration.
//!
//! Every field has a default so an empty YAML document is a valid config.
//! Files ending in `.json` are parsed as JSON, anything else as YAML.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::ReportSections;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name prefix of lifted (isolated) functions.
    pub isolated_prefix: String,
    /// Isolated functions whose name starts with one of these are not analysed.
    pub skip_prefixes: Vec<String>,
    /// Leading entry-metadata operands that carry no arguments.
    pub entry_metadata_skip: usize,
    pub stack_pointer_names: Vec<String>,
    /// CPU-state globals never treated as parameters.
    pub deny_list: Vec<String>,
    /// Callee that marks the start of each original machine instruction.
    pub address_marker: String,
    /// Return register per architecture.
    pub return_registers: BTreeMap<String, String>,
    pub arch: String,
    pub only_marked: bool,
    pub trace_stack_pointer: bool,
    pub sections: ReportSections,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub verbosity: u8,
    /// Prefixes tried between the isolated prefix and a relocation address.
    pub relocation_prefixes: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let return_registers = [("x86_64", "rax"), ("x86", "eax"), ("arm", "r0"), ("aarch64", "x0")]
            .into_iter()
            .map(|(arch, reg)| (arch.to_string(), reg.to_string()))
            .collect();
        Self {
            isolated_prefix: "bb.".to_string(),
            skip_prefixes: vec!["bb.__".to_string(), "bb.vasnprintf".to_string()],
            entry_metadata_skip: 3,
            stack_pointer_names: vec!["rsp".to_string(), "esp".to_string()],
            deny_list: ["ExceptionFlag", "pc", "cc_op", "cc_src", "cc_dst"]
                .into_iter()
                .map(String::from)
                .collect(),
            address_marker: "newpc".to_string(),
            return_registers,
            arch: "x86_64".to_string(),
            only_marked: false,
            trace_stack_pointer: true,
            sections: ReportSections::all(),
            output: None,
            verbosity: 0,
            relocation_prefixes: vec!["0x".to_string(), "0x5000".to_string()],
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: AnalysisConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml::from_slice(&bytes)?
        };
        Ok(config)
    }

    /// Register holding return values for the configured architecture.
    /// Falls back to `rax` for unknown architectures.
    pub fn return_register(&self) -> &str {
        self.return_registers.get(&self.arch).map(String::as_str).unwrap_or("rax")
    }

    /// Whether a global name is CPU bookkeeping rather than a parameter.
    pub fn is_denied(&self, name: &str) -> bool {
        name.is_empty() || self.deny_list.iter().any(|d| d == name)
    }

    pub fn is_stack_pointer(&self, name: &str) -> bool {
        self.stack_pointer_names.iter().any(|s| s == name)
    }

    /// Whether a function with this name is in scope for the flow analyses.
    pub fn is_in_scope(&self, name: &str) -> bool {
        name.starts_with(&self.isolated_prefix)
            && !self.skip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: AnalysisConfig = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.return_register(), "rax");
    }

    #[test]
    fn scope_filter_skips_runtime_helpers() {
        let config = AnalysisConfig::default();
        assert!(config.is_in_scope("bb.main"));
        assert!(!config.is_in_scope("bb.__libc_start"));
        assert!(!config.is_in_scope("bb.vasnprintf"));
        assert!(!config.is_in_scope("newpc"));
    }

    #[test]
    fn arch_selects_return_register() {
        let config = AnalysisConfig { arch: "aarch64".into(), ..AnalysisConfig::default() };
        assert_eq!(config.return_register(), "x0");
        let unknown = AnalysisConfig { arch: "mips".into(), ..AnalysisConfig::default() };
        assert_eq!(unknown.return_register(), "rax");
    }

    #[test]
    fn empty_name_is_always_denied() {
        let config = AnalysisConfig { deny_list: Vec::new(), ..AnalysisConfig::default() };
        assert!(config.is_denied(""));
        assert!(!config.is_denied("rdi"));
    }
}
