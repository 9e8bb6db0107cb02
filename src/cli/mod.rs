//! SF-018: CLI subcommands: init, validate, graph, run.

use crate::config::{self, SopflowConfig, CONFIG_FILE};
use crate::core::executor::AgentExecutor;
use crate::core::{loader, parser, resolver};
use crate::tools::ToolRegistry;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter sopflow.yaml and plan.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Check a plan against the configured tools
    Validate {
        /// Plan file (.yaml, .yml or .json)
        plan: PathBuf,

        /// Path to sopflow.yaml
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },

    /// Show the dependency wavefronts of a plan
    Graph {
        /// Plan file (.yaml, .yml or .json)
        plan: PathBuf,
    },

    /// Execute a plan and print its result
    Run {
        /// Plan file (.yaml, .yml or .json)
        plan: PathBuf,

        /// Path to sopflow.yaml
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Dispatch one step at a time
        #[arg(long)]
        sequential: bool,

        /// Worker pool size (overrides executor.max_workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Append JSONL run events to this file
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { plan, config } => cmd_validate(&plan, &config),
        Commands::Graph { plan } => cmd_graph(&plan),
        Commands::Run {
            plan,
            config,
            sequential,
            workers,
            log,
        } => cmd_run(&plan, &config, sequential, workers, log),
    }
}

const CONFIG_TEMPLATE: &str = r#"executor:
  max_workers: 5
  concurrent: true

tools:
  Echo:
    description: "echo a query back"
    input_parameters:
      q: { type: string }
    output_parameters:
      output: { type: string }
    command: 'printf "{\"output\": \"%s\"}" "$ARG_Q"'
"#;

const PLAN_TEMPLATE: &str = r#"- name: greet
  step: 1
  toolname: Echo
  input:
    q: "hello"

- name: shout
  step: 2
  toolname: Echo
  input:
    q: "${greet.output}, world"
  dependency: [greet]
  activate: "'${greet.output}' != ''"
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(CONFIG_FILE);
    let plan_path = path.join("plan.yaml");
    for existing in [&config_path, &plan_path] {
        if existing.exists() {
            return Err(format!("{} already exists", existing.display()));
        }
    }

    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    for (target, body) in [(&config_path, CONFIG_TEMPLATE), (&plan_path, PLAN_TEMPLATE)] {
        std::fs::write(target, body)
            .map_err(|e| format!("cannot write {}: {}", target.display(), e))?;
    }

    println!("Initialized sopflow project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", plan_path.display());
    Ok(())
}

fn cmd_validate(plan: &Path, config_path: &Path) -> Result<(), String> {
    let content = plan_arg(plan)?;
    let config = config::load_config(config_path)?;
    let executor = build_executor(&config)?;

    let (valid, report) = executor.check_valid(&content);
    if valid {
        println!("OK: {} ({} tools registered)", plan.display(), config.tools.len());
        Ok(())
    } else {
        eprint!("{}", report);
        if !report.ends_with('\n') {
            eprintln!();
        }
        Err(format!("{} is not a valid plan", plan.display()))
    }
}

fn cmd_graph(plan: &Path) -> Result<(), String> {
    let content = plan_arg(plan)?;
    let raw = loader::load_plan(&content).map_err(|e| e.to_string())?;
    let graph = parser::parse(&raw).map_err(|e| e.to_string())?;
    let waves = resolver::wavefronts(&graph)?;

    println!("{} step(s) in {} wavefront(s)", graph.len(), waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("  wave {}:", i + 1);
        for name in wave {
            let Some(node) = graph.get(name) else { continue };
            let guard = node
                .activate
                .as_deref()
                .map(|a| format!("  [if {}]", a))
                .unwrap_or_default();
            println!("    {} ({}){}", name, node.toolname, guard);
        }
    }
    Ok(())
}

fn cmd_run(
    plan: &Path,
    config_path: &Path,
    sequential: bool,
    workers: Option<usize>,
    log: Option<PathBuf>,
) -> Result<(), String> {
    let content = plan_arg(plan)?;
    let mut config = config::load_config(config_path)?;
    if let Some(n) = workers {
        if n == 0 {
            return Err("--workers must be at least 1".to_string());
        }
        config.executor.max_workers = n;
    }
    if sequential {
        config.executor.concurrent = false;
    }

    let mut executor = build_executor(&config)?;
    if let Some(log) = log {
        executor = executor.with_event_log(log);
    }

    let result = if config.executor.concurrent {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("cannot start runtime: {}", e))?;
        runtime.block_on(executor.async_run(&content, None))
    } else {
        executor.run(&content)
    };

    let output = result.map_err(|e| e.to_string())?;
    print!("{}", output);
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Plan path as handed to the loader. Missing files are reported here rather
/// than being parsed as inline plan text.
fn plan_arg(plan: &Path) -> Result<String, String> {
    if !plan.is_file() {
        return Err(format!("plan file {} not found", plan.display()));
    }
    Ok(plan.display().to_string())
}

fn build_executor(config: &SopflowConfig) -> Result<AgentExecutor, String> {
    let registry = ToolRegistry::from_config(config)?;
    Ok(AgentExecutor::new(Arc::new(registry)).with_config(config.executor.clone()))
}
