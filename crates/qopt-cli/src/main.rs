//! qopt CLI: optimize plan files and show what every rule did.

use clap::{Parser, Subcommand, ValueEnum};
use qopt_core::config::OptimizerConfig;
use qopt_core::hash::plan_digest;
use qopt_planner::dsl::build_plan;
use qopt_planner::{registry, Optimizer, RuleFlags};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "qopt")]
#[command(about = "Rule-based logical plan optimizer with rewrite traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a plan file and print the result with its trace (EXPLAIN)
    Explain {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,

        /// Comma-separated rule keys to enable (default: every rule, or QOPT_RULES)
        #[arg(long, value_delimiter = ',')]
        rules: Option<Vec<String>>,

        /// Do not collect the rewrite trace
        #[arg(long)]
        no_trace: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Build and validate a plan file without optimizing it
    Validate {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// List the rules in the order they run
    Rules,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Engine(#[from] qopt_core::error::Error),

    #[error("cannot render output: {0}")]
    Render(#[from] serde_json::Error),
}

impl CliError {
    fn suggestions(&self) -> Vec<String> {
        match self {
            CliError::Engine(e) => e.suggestions(),
            CliError::Read { .. } => vec!["Check the path given to --plan".into()],
            CliError::Render(_) => vec![],
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Explain {
            plan,
            rules,
            no_trace,
            format,
        } => explain(&plan, rules, no_trace, format),
        Commands::Validate { plan } => validate(&plan),
        Commands::Rules => {
            list_rules();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        for hint in e.suggestions() {
            eprintln!("  hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn read_plan(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn explain(path: &Path, rules: Option<Vec<String>>, no_trace: bool, format: Format) -> Result<(), CliError> {
    let src = read_plan(path)?;
    let mut built = build_plan(&src)?;

    let mut config = OptimizerConfig::from_env().with_trace(!no_trace);
    if rules.is_some() {
        config.rules = rules;
    }
    let optimizer = Optimizer::new(config);
    let flags = optimizer.configured_flags()?;
    let optimized = optimizer.run(&mut built.ctx, flags, built.plan)?;
    let digest = plan_digest(&optimized.plan)?;

    match format {
        Format::Json => {
            let report = serde_json::json!({
                "rules": flags.to_string(),
                "digest": digest.to_hex(),
                "plan": optimized.plan,
                "trace": optimized.trace,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Text => {
            println!("Optimized Plan");
            println!("==============");
            println!();
            println!("Rules: {}", flags);
            println!("Digest: {}", digest);
            println!();
            print!("{}", optimized.plan);
            if let Some(trace) = &optimized.trace {
                println!();
                println!("Trace:");
                if trace.is_empty() {
                    println!("  (no rewrites)");
                } else {
                    print!("{}", trace.render_text());
                }
            }
        }
    }
    Ok(())
}

fn validate(path: &Path) -> Result<(), CliError> {
    let src = read_plan(path)?;
    let built = build_plan(&src)?;
    built.plan.validate()?;
    println!("✓ Plan is valid ({} nodes)", built.plan.node_count());
    print!("{}", built.plan);
    Ok(())
}

fn list_rules() {
    println!("{:<4} {:<24} {:<24} {}", "#", "key", "trace name", "flag");
    for (i, entry) in registry().iter().enumerate() {
        println!(
            "{:<4} {:<24} {:<24} {:#06x}",
            i + 1,
            entry.key,
            entry.rule.name(),
            entry.flag.0
        );
    }
    println!();
    println!("all: {}", RuleFlags::all());
}
