//! Serializable analysis report.

use std::collections::BTreeMap;
use std::str::FromStr;

use bitflags::bitflags;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analysis::{LoopDependencies, ParamsUsage, Statistics, ValueFlow};
use crate::error::ConfigError;
use crate::ir::Module;

bitflags! {
    /// Report sections to emit per function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ReportSections: u8 {
        /// Loop dependencies.
        const LDP = 0b001;
        /// Function parameter usage.
        const FPU = 0b010;
        /// Function parameters (register and stack).
        const RFP = 0b100;
    }
}

impl Default for ReportSections {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for ReportSections {
    type Err = ConfigError;

    /// Comma separated section names, e.g. `ldp,fpu`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sections = ReportSections::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            sections |= match part.to_ascii_lowercase().as_str() {
                "ldp" => ReportSections::LDP,
                "fpu" => ReportSections::FPU,
                "rfp" => ReportSections::RFP,
                "all" => ReportSections::all(),
                _ => return Err(ConfigError::UnknownSection(part.to_string())),
            };
        }
        Ok(sections)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub module: String,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_hash: Option<String>,
    pub functions: BTreeMap<String, FunctionReport>,
    pub statistics: Statistics,
}

impl AnalysisReport {
    pub fn new(module: &Module) -> Self {
        Self {
            module: module.name.clone(),
            generated_at: Utc::now().to_rfc3339(),
            module_hash: None,
            functions: BTreeMap::new(),
            statistics: Statistics::default(),
        }
    }

    pub fn vulnerable_functions(&self) -> impl Iterator<Item = (&String, &FunctionReport)> {
        self.functions.iter().filter(|(_, f)| !f.is_safe)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_dependencies: Option<BTreeMap<String, LoopReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_usage: Option<ParamsUsageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_infos: Option<FunctionInfosReport>,
    pub is_marked: bool,
    pub is_safe: bool,
    pub risky_stores: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub candidate_branches: Vec<String>,
    pub risky_stores: Vec<RiskyStoreReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskyStoreReport {
    pub value: String,
    pub store_instruction: String,
    pub binary_address: String,
    pub instruction_offset: u32,
}

/// Per parameter, `chainN` to the instruction texts along that chain.
pub type FlowMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamsUsageReport {
    pub variables_flows: FlowMap,
    pub stack_variables_flows: FlowMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfosReport {
    pub function_arguments: Vec<String>,
    pub function_virt_stack_params: BTreeMap<String, StackParamReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackParamReport {
    pub value: String,
    pub offset: i64,
}

impl FunctionReport {
    pub fn build(
        module: &Module,
        usage: &ParamsUsage,
        loops: &LoopDependencies,
        sections: ReportSections,
        is_marked: bool,
    ) -> Self {
        let loop_dependencies = sections
            .contains(ReportSections::LDP)
            .then(|| loop_section(module, loops));
        let params_usage = sections.contains(ReportSections::FPU).then(|| ParamsUsageReport {
            variables_flows: flow_map(module, usage.var_flows.iter()),
            stack_variables_flows: flow_map(module, usage.stack_flows.iter().map(|(_, f)| f)),
        });
        let function_infos = sections.contains(ReportSections::RFP).then(|| FunctionInfosReport {
            function_arguments: usage
                .descriptor
                .register_params
                .iter()
                .map(|v| module.display_value(*v).to_string())
                .collect(),
            function_virt_stack_params: usage
                .descriptor
                .stack_params
                .iter()
                .map(|p| {
                    let entry = StackParamReport { value: module.value_text(p.value), offset: p.offset };
                    (p.name(), entry)
                })
                .collect(),
        });
        Self {
            loop_dependencies,
            params_usage,
            function_infos,
            is_marked,
            is_safe: loops.is_function_safe(),
            risky_stores: loops.risky_store_count(),
        }
    }
}

fn loop_section(module: &Module, loops: &LoopDependencies) -> BTreeMap<String, LoopReport> {
    loops
        .vulnerable_loops
        .iter()
        .map(|(name, l)| {
            let report = LoopReport {
                candidate_branches: l
                    .candidate_branches
                    .iter()
                    .map(|b| module.display_inst(*b).to_string())
                    .collect(),
                risky_stores: l
                    .risky_stores
                    .iter()
                    .map(|s| RiskyStoreReport {
                        value: module.display_value(s.pointed_value).to_string(),
                        store_instruction: module.display_inst(s.store).to_string(),
                        binary_address: format!("{:#x}", s.original_address),
                        instruction_offset: s.inst_offset,
                    })
                    .collect(),
            };
            (name.clone(), report)
        })
        .collect()
}

fn flow_map<'f>(module: &Module, flows: impl Iterator<Item = &'f ValueFlow>) -> FlowMap {
    flows
        .map(|flow| {
            let chains: BTreeMap<String, Vec<String>> = flow
                .chains
                .iter()
                .enumerate()
                .map(|(i, chain)| {
                    let texts: Vec<String> =
                        chain.edges().iter().map(|e| module.display_inst(e.user).to_string()).collect();
                    (format!("chain{}", i + 1), texts)
                })
                .collect();
            (module.display_value(flow.source).to_string(), chains)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_parse_case_insensitively() {
        let sections: ReportSections = "LDP, rfp".parse().expect("parse");
        assert_eq!(sections, ReportSections::LDP | ReportSections::RFP);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = "ldp,xyz".parse::<ReportSections>().expect_err("unknown");
        assert!(matches!(err, ConfigError::UnknownSection(s) if s == "xyz"));
    }

    #[test]
    fn sections_round_trip_through_yaml() {
        let yaml = serde_yaml::to_string(&(ReportSections::LDP | ReportSections::FPU)).expect("ser");
        let back: ReportSections = serde_yaml::from_str(&yaml).expect("de");
        assert_eq!(back, ReportSections::LDP | ReportSections::FPU);
    }
}
