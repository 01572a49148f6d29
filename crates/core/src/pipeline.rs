//! End-to-end run over a module.

use tracing::{debug, info};

use crate::analysis::{
    AnalysisContext, BackwardPropagation, CallGraph, LoopAnalyzer, LoopDependencies,
    ParameterExtractor, ParamsUsage,
};
use crate::config::AnalysisConfig;
use crate::ir::{FunctionId, Module};
use crate::report::{AnalysisReport, FunctionReport};
use crate::seeds::ResolvedSeed;

/// Results for one analysed function.
#[derive(Debug, Clone)]
pub struct FunctionAnalysis {
    pub usage: ParamsUsage,
    pub loops: LoopDependencies,
}

pub struct SecurityPipeline<'a> {
    module: &'a Module,
    config: &'a AnalysisConfig,
    callgraph: CallGraph,
}

impl<'a> SecurityPipeline<'a> {
    pub fn new(module: &'a Module, config: &'a AnalysisConfig) -> Self {
        Self { module, config, callgraph: CallGraph::build(module) }
    }

    pub fn callgraph(&self) -> &CallGraph {
        &self.callgraph
    }

    /// Propagate input marks from `seeds`, then analyse every in-scope function.
    pub fn run(&self, ctx: &mut AnalysisContext, seeds: &[ResolvedSeed]) -> AnalysisReport {
        let bound = self.callgraph.max_path_length();
        info!(module = %self.module.name, functions = self.callgraph.function_count(), bound, "starting analysis");
        BackwardPropagation::new(self.module, &self.callgraph, self.config, bound).run(ctx, seeds);

        let extractor = ParameterExtractor::new(self.module, self.config);
        let mut report = AnalysisReport::new(self.module);
        for function in self.module.function_ids() {
            let Some(analysis) = self.analyze_function(ctx, &extractor, function) else {
                continue;
            };
            let marked = ctx.is_marked(function);
            let stats = ctx.stats_mut();
            if !analysis.loops.is_function_safe() {
                stats.vulnerable_functions += 1;
                if marked {
                    stats.input_vulnerable_functions += 1;
                }
            }
            let entry = FunctionReport::build(
                self.module,
                &analysis.usage,
                &analysis.loops,
                self.config.sections,
                marked,
            );
            report.functions.insert(analysis.usage.descriptor.name.clone(), entry);
        }
        report.statistics = *ctx.stats();
        info!(
            analysed = report.statistics.overall_functions,
            vulnerable = report.statistics.vulnerable_functions,
            "analysis finished"
        );
        report
    }

    /// Run the per-function passes, or `None` when the function is out of scope.
    pub fn analyze_function(
        &self,
        ctx: &mut AnalysisContext,
        extractor: &ParameterExtractor<'_>,
        function: FunctionId,
    ) -> Option<FunctionAnalysis> {
        let descriptor = extractor.extract(function);
        if !descriptor.isolated {
            return None;
        }
        if !self.config.is_in_scope(&descriptor.name)
            || (self.config.only_marked && !ctx.is_marked(function))
        {
            debug!(function = %descriptor.name, "skipped");
            ctx.stats_mut().skipped_functions += 1;
            return None;
        }

        let usage = ParamsUsage::analyze(self.module, descriptor, self.config);
        let loops = LoopAnalyzer::new(self.module, &usage).analyze();

        let (var_chains, stack_chains) = usage.chain_count();
        let stats = ctx.stats_mut();
        stats.overall_functions += 1;
        stats.var_chains += var_chains;
        stats.stack_chains += stack_chains;
        stats.total_stores += usage.risky_stores.len();
        stats.total_loops += loops.total_loops;
        stats.candidate_loops += loops.candidate_loops;
        stats.filtered_stores += loops.filtered_stores;
        Some(FunctionAnalysis { usage, loops })
    }
}
