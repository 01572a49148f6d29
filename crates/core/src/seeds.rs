//! Input-function seeds and relocation tables.
//!
//! Both tables are plain comma-separated text:
//!
//! ```text
//! # name,arg_index,arg_name
//! read,2,rsi
//! getenv,-1,rax
//! ```
//!
//! ```text
//! # address,name
//! 0x1000,memcpy
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::analysis::{ArgPosition, MarkedFunctionInfo};
use crate::config::AnalysisConfig;
use crate::error::SeedError;
use crate::ir::{FunctionId, Module};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSeed {
    pub name: String,
    pub position: ArgPosition,
    pub arg_name: String,
}

/// A seed bound to a module function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSeed {
    pub function: FunctionId,
    pub info: MarkedFunctionInfo,
}

/// Relocation address to imported name. Addresses are stored without
/// spaces or a leading `0x`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationTable {
    entries: BTreeMap<String, String>,
}

impl RelocationTable {
    pub fn insert(&mut self, address: &str, name: &str) {
        self.entries.entry(normalize_address(address)).or_insert_with(|| name.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses whose relocation names `name`.
    pub fn addresses_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter(move |(_, n)| n.as_str() == name).map(|(a, _)| a.as_str())
    }
}

fn normalize_address(address: &str) -> String {
    let compact: String = address.chars().filter(|c| !c.is_whitespace()).collect();
    match compact.strip_prefix("0x").or_else(|| compact.strip_prefix("0X")) {
        Some(rest) => rest.to_string(),
        None => compact,
    }
}

/// Non-empty, non-comment lines with their 1-based line numbers.
fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some((i + 1, line.split(',').map(str::trim).collect()))
    })
}

pub fn parse_input_functions(text: &str) -> Result<Vec<InputSeed>, SeedError> {
    let mut seeds = Vec::new();
    for (line, fields) in records(text) {
        let [name, index, arg_name] = fields.as_slice() else {
            return Err(SeedError::Malformed {
                line,
                message: format!("expected `name,arg_index,arg_name`, got {} fields", fields.len()),
            });
        };
        if name.is_empty() {
            return Err(SeedError::Malformed { line, message: "empty function name".into() });
        }
        let value: i64 = index.parse().map_err(|_| SeedError::Malformed {
            line,
            message: format!("argument index `{index}` is not an integer"),
        })?;
        let position =
            ArgPosition::try_from(value).map_err(|_| SeedError::InvalidPosition { line, value })?;
        seeds.push(InputSeed { name: name.to_string(), position, arg_name: arg_name.to_string() });
    }
    Ok(seeds)
}

pub fn parse_relocations(text: &str) -> Result<RelocationTable, SeedError> {
    let mut table = RelocationTable::default();
    for (line, fields) in records(text) {
        let [address, name] = fields.as_slice() else {
            return Err(SeedError::Malformed {
                line,
                message: format!("expected `address,name`, got {} fields", fields.len()),
            });
        };
        table.insert(address, name);
    }
    Ok(table)
}

pub fn load_input_functions(path: &Path) -> Result<Vec<InputSeed>, SeedError> {
    parse_input_functions(&read(path)?)
}

pub fn load_relocations(path: &Path) -> Result<RelocationTable, SeedError> {
    parse_relocations(&read(path)?)
}

fn read(path: &Path) -> Result<String, SeedError> {
    fs::read_to_string(path).map_err(|source| SeedError::Io { path: path.to_path_buf(), source })
}

/// Bind seeds to module functions. When several entries resolve to the
/// same function, the first one (by seed name) wins.
pub fn resolve_seeds(
    module: &Module,
    config: &AnalysisConfig,
    seeds: &[InputSeed],
    relocations: &RelocationTable,
) -> Vec<ResolvedSeed> {
    let mut by_name: BTreeMap<&str, &InputSeed> = BTreeMap::new();
    for seed in seeds {
        by_name.entry(seed.name.as_str()).or_insert(seed);
    }

    let mut resolved: Vec<ResolvedSeed> = Vec::new();
    let mut push = |function: FunctionId, seed: &InputSeed| {
        if resolved.iter().any(|r| r.function == function) {
            return;
        }
        let info = MarkedFunctionInfo {
            callee: module.function(function).name.clone(),
            position: seed.position,
            arg_name: seed.arg_name.clone(),
        };
        debug!(seed = %seed.name, function = %info.callee, "resolved seed");
        resolved.push(ResolvedSeed { function, info });
    };

    for seed in by_name.values().copied() {
        let prefixed = format!("{}{}", config.isolated_prefix, seed.name);
        let direct = module
            .function_by_name(&seed.name)
            .or_else(|| module.function_by_name(&prefixed));
        let mut found = direct.is_some();
        if let Some(function) = direct {
            push(function, seed);
        }
        for address in relocations.addresses_of(&seed.name) {
            let target = config.relocation_prefixes.iter().find_map(|prefix| {
                module.function_by_name(&format!("{}{}{}", config.isolated_prefix, prefix, address))
            });
            if let Some(function) = target {
                found = true;
                push(function, seed);
            }
        }
        if !found {
            warn!(seed = %seed.name, "no module function for seed");
        }
    }
    resolved
}
