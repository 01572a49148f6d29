use anyhow::Result;
use clap::{Parser, Subcommand};
use flowguard::commands::{analyze_command, max_steps_command, params_command, AnalyzeOptions};
use flowguard::verbosity_filter;
use tracing_subscriber::EnvFilter;

/// Loop-bound taint scanner for lifted binary IR.
///
/// This CLI is a thin wrapper around `flowguard-core` (exposed in code as
/// `flowguard_core`). All analysis logic lives in the library.
#[derive(Parser, Debug)]
#[command(name = "flowguard", version, about = "Loop-bound taint scanner for lifted binary IR", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a module and report parameter-bounded loops that write memory.
    Analyze {
        /// Module JSON produced by the lifter export.
        #[arg(long)]
        module: String,

        /// CSV of input functions: `name,arg_index,arg_name`.
        #[arg(long)]
        inputs: Option<String>,

        /// CSV of relocations: `address,name`.
        #[arg(long)]
        relocations: Option<String>,

        /// YAML or JSON analysis config.
        #[arg(long)]
        config: Option<String>,

        /// Write the JSON report here.
        #[arg(long)]
        output: Option<String>,

        /// Report sections, comma separated: ldp, fpu, rfp.
        #[arg(long)]
        sections: Option<String>,

        /// Only analyse functions reached by input.
        #[arg(long, default_value_t = false)]
        only_marked: bool,

        /// Target architecture (selects the return register).
        #[arg(long)]
        arch: Option<String>,
    },

    /// Print the call-graph bound used for backward propagation.
    MaxSteps {
        #[arg(long)]
        module: String,
    },

    /// Print the parameters recovered for one function.
    Params {
        #[arg(long)]
        module: String,

        #[arg(long)]
        function: String,

        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(verbosity_filter(cli.verbose)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Analyze {
            module,
            inputs,
            relocations,
            config,
            output,
            sections,
            only_marked,
            arch,
        } => analyze_command(&AnalyzeOptions {
            module,
            inputs,
            relocations,
            config,
            output,
            sections,
            only_marked,
            arch,
        })?,
        Command::MaxSteps { module } => max_steps_command(&module)?,
        Command::Params { module, function, config } => {
            params_command(&module, &function, config.as_deref())?
        }
    }

    Ok(())
}
