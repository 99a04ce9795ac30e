//! `eddyd` — drives replication convergence scenarios against a primary
//! cluster and its downstream index cluster.
//!
//! # Usage
//!
//! ```text
//! eddyd run                               # run the configured scenario
//! eddyd run -c nightly.toml               # with another config file
//! eddyd run --scenario passthrough        # pick another situation
//! eddyd run --budget-ms 30000 --json      # longer budget, JSON report
//! eddyd check                             # validate the config
//! eddyd list                              # list scenario kinds
//! ```
//!
//! `run` exits with 0 when the scenario passed, 1 for any failed verdict and
//! 2 when teardown failed.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eddy_cluster::{IndexNode, PrimaryNode, RestIndexNode, RestPrimaryNode};
use eddy_scenario::{ScenarioEnv, ScenarioRegistry, execute};
use eddy_types::{RunReport, ScenarioDefinition};
use tracing::{error, info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "eddyd",
    version,
    about = "Replication convergence scenario driver"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, default_value = "eddy.toml", env = "EDDY_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up, run, verify and tear down the selected scenario.
    Run {
        /// Situation id to run instead of the configured `scenario`.
        #[arg(short, long)]
        scenario: Option<String>,

        /// Verification budget in milliseconds.
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load the config and print the resolved scenario.
    Check {
        /// Situation id to resolve instead of the configured `scenario`.
        #[arg(short, long)]
        scenario: Option<String>,
    },

    /// List the registered scenario kinds.
    List,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            budget_ms,
            json,
        } => {
            let mut config = load_config(&cli.config, scenario)?;
            if let Some(ms) = budget_ms {
                config.timing.verify_budget_ms = Some(ms);
            }
            cmd_run(&config, json).await
        }
        Commands::Check { scenario } => {
            let config = load_config(&cli.config, scenario)?;
            cmd_check(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            cmd_list();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: &Path, scenario: Option<String>) -> Result<CliConfig> {
    let mut config = CliConfig::load(path).context("failed to load config")?;
    if let Some(scenario) = scenario {
        config.scenario = scenario;
    }
    setup_tracing(&config.log.level);
    Ok(config)
}

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// eddyd run
// -----------------------------------------------------------------------

async fn cmd_run(config: &CliConfig, json: bool) -> Result<ExitCode> {
    let definition = config.definition().context("invalid scenario configuration")?;
    let env = build_env(config, definition)?;

    let registry = ScenarioRegistry::with_defaults();
    let mut executor = registry.build(env).context("failed to build scenario")?;

    let execution = execute(executor.as_mut()).await;
    print_report(&execution.report, json)?;

    if let Err(e) = execution.teardown {
        error!(error = %e, "teardown failed, clusters may need manual cleanup");
        eprintln!("teardown failed: {e}");
        return Ok(ExitCode::from(2));
    }
    if execution.report.verdict.is_pass() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Build one REST handle per configured member.
fn build_env(config: &CliConfig, definition: ScenarioDefinition) -> Result<ScenarioEnv> {
    let primary_options = config.primary_options();
    let index_options = config.index_options();

    let members = config.primary_members();
    if definition.node_count > members.len() {
        warn!(
            expected = definition.node_count,
            configured = members.len(),
            "fewer primary members configured than the situation expects"
        );
    }

    let mut primaries: Vec<Arc<dyn PrimaryNode>> = Vec::with_capacity(members.len());
    for member in members {
        let id = member.id.clone();
        let node = RestPrimaryNode::new(member, &primary_options)
            .with_context(|| format!("failed to create handle for primary {id}"))?;
        primaries.push(Arc::new(node));
    }

    let mut indexes: Vec<Arc<dyn IndexNode>> = Vec::new();
    for member in config.index_members() {
        let id = member.id.clone();
        let node = RestIndexNode::new(member, &index_options)
            .with_context(|| format!("failed to create handle for index {id}"))?;
        indexes.push(Arc::new(node));
    }

    info!(
        scenario = %definition.kind,
        primaries = primaries.len(),
        indexes = indexes.len(),
        slots = definition.replications.len(),
        "deployment configured"
    );

    Ok(ScenarioEnv::new(definition, primaries, indexes)
        .with_timing(config.timing())
        .with_managed_services(config.services.manage))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("failed to encode report")?;
        println!("{out}");
        return Ok(());
    }

    println!("Scenario: {} ({})", report.scenario, report.description);
    println!("  verdict:  {}", report.verdict);
    println!("  observed: {}", report.observed);
    println!("  expected: {}", report.expected);
    println!("  elapsed:  {}", format_duration(report.elapsed));
    if let Some(outcome) = &report.convergence {
        println!("  outcome:  {outcome:?}");
    }
    if let Some(err) = &report.error {
        println!("  error:    {err}");
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    if d >= Duration::from_secs(1) {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

// -----------------------------------------------------------------------
// eddyd check / list
// -----------------------------------------------------------------------

fn cmd_check(config: &CliConfig) -> Result<()> {
    let definition = config.definition().context("invalid scenario configuration")?;
    let timing = config.timing();

    println!("Scenario: {} ({})", definition.kind, definition.description);
    println!("  action:         {}", definition.action);
    println!(
        "  members:        {} primary, {} index",
        config.primary.len(),
        config.index.len()
    );
    println!(
        "  perturbation:   add={} remove={} failover={}",
        definition.add_count, definition.remove_count, definition.failover_count
    );
    for (slot, replication) in definition.replications.iter().enumerate() {
        println!(
            "  slot {slot}:         {} quota={}MB replicas={}",
            replication.bucket_type.as_str(),
            replication.quota_mb,
            replication.replica_count
        );
    }
    match definition.workload.item_count {
        Some(n) => println!(
            "  workload:       {n} items of {} bytes",
            definition.workload.item_size
        ),
        None => println!(
            "  workload:       until stopped, {} bytes per item",
            definition.workload.item_size
        ),
    }
    println!(
        "  timing:         settle={} budget={} poll={}",
        format_duration(timing.perturbation_settle),
        format_duration(timing.verify_budget),
        format_duration(timing.poll_interval)
    );
    Ok(())
}

fn cmd_list() {
    let registry = ScenarioRegistry::with_defaults();
    println!("Scenario kinds:");
    for kind in registry.kinds() {
        println!("  {kind}");
    }
}
