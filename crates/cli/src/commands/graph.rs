use anyhow::{anyhow, Result};
use flowguard_core::analysis::{CallGraph, ParameterExtractor};

use crate::commands::{load_config, load_module};

/// Print the propagation bound derived from the module's call graph.
pub fn max_steps_command(module: &str) -> Result<()> {
    let (_, module) = load_module(module)?;
    let callgraph = CallGraph::build(&module);
    println!("Functions: {}", callgraph.function_count());
    println!("Max steps: {}", callgraph.max_path_length());
    Ok(())
}

/// Print the register and stack parameters recovered for one function.
pub fn params_command(module: &str, function: &str, config: Option<&str>) -> Result<()> {
    let (_, module) = load_module(module)?;
    let config = load_config(config)?;
    let id = module
        .function_by_name(function)
        .ok_or_else(|| anyhow!("Function not found in module: {function}"))?;

    let descriptor = ParameterExtractor::new(&module, &config).extract(id);
    if !descriptor.isolated {
        println!("{function}: not an isolated function");
        return Ok(());
    }
    println!("{function}:");
    println!("  Register parameters:");
    for value in &descriptor.register_params {
        println!("    - {}", module.display_value(*value));
    }
    println!("  Stack parameters:");
    for param in &descriptor.stack_params {
        println!("    - {} (offset {}): {}", param.name(), param.offset, module.value_text(param.value));
    }
    Ok(())
}
