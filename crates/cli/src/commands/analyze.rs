use std::fs;

use anyhow::{Context, Result};
use flowguard_core::analysis::AnalysisContext;
use flowguard_core::seeds::{self, RelocationTable};
use flowguard_core::{ReportSections, SecurityPipeline};
use tracing::info;

use crate::commands::{load_config, load_module};
use crate::{canonicalize_or_current, sha256_file};

/// Inputs of `flowguard analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub module: String,
    pub inputs: Option<String>,
    pub relocations: Option<String>,
    pub config: Option<String>,
    pub output: Option<String>,
    pub sections: Option<String>,
    pub only_marked: bool,
    pub arch: Option<String>,
}

/// Run the full pipeline, print a per-function summary and optionally write
/// the JSON report.
pub fn analyze_command(opts: &AnalyzeOptions) -> Result<()> {
    let (module_path, module) = load_module(&opts.module)?;
    let mut config = load_config(opts.config.as_deref())?;

    // Flag beats config; the module's own arch only fills in for a missing config.
    if let Some(arch) = &opts.arch {
        config.arch = arch.clone();
    } else if let (None, Some(arch)) = (&opts.config, &module.arch) {
        config.arch = arch.clone();
    }
    if let Some(sections) = &opts.sections {
        config.sections = sections
            .parse::<ReportSections>()
            .with_context(|| format!("Invalid --sections value: {sections}"))?;
    }
    if opts.only_marked {
        config.only_marked = true;
    }
    if let Some(output) = &opts.output {
        config.output = Some(canonicalize_or_current(output)?);
    }

    let input_seeds = match &opts.inputs {
        Some(p) => {
            let path = canonicalize_or_current(p)?;
            seeds::load_input_functions(&path)
                .with_context(|| format!("Failed to read input functions: {}", path.display()))?
        }
        None => Vec::new(),
    };
    let relocations = match &opts.relocations {
        Some(p) => {
            let path = canonicalize_or_current(p)?;
            seeds::load_relocations(&path)
                .with_context(|| format!("Failed to read relocations: {}", path.display()))?
        }
        None => RelocationTable::default(),
    };
    let resolved = seeds::resolve_seeds(&module, &config, &input_seeds, &relocations);
    info!(seeds = input_seeds.len(), resolved = resolved.len(), "seeds loaded");

    let mut ctx = AnalysisContext::new();
    let mut report = SecurityPipeline::new(&module, &config).run(&mut ctx, &resolved);
    report.module_hash = Some(sha256_file(&module_path)?);

    println!("Module: {} ({} functions analysed)", module.name, report.functions.len());
    for (name, function) in &report.functions {
        let verdict = if function.is_safe { "safe" } else { "VULNERABLE" };
        let marked = if function.is_marked { ", input-reachable" } else { "" };
        println!("  {name}: {verdict}{marked} (risky stores: {})", function.risky_stores);
    }
    let stats = &report.statistics;
    println!(
        "Vulnerable functions: {} ({} reachable by input)",
        stats.vulnerable_functions, stats.input_vulnerable_functions
    );

    if let Some(out) = &config.output {
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output dir: {}", parent.display()))?;
        }
        fs::write(out, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report: {}", out.display()))?;
        println!("Report written to {}", out.display());
    }

    Ok(())
}
