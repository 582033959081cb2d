//! Fairscope - fairness auditing CLI
//!
//! The `fairscope` command runs audit cycles over labeled predictions and
//! compares model variants statistically.
//!
//! ## Commands
//!
//! - `audit`: Run one observe/orient/decide/act cycle over a records file
//! - `history`: Show the append-only audit log
//! - `ab`: Compare two metric samples (Welch t, Mann-Whitney, bootstrap, chi-square)
//! - `sample-size`: Per-variant sample size for a conversion experiment
//! - `bayes`: Bayesian comparison of two success rates
//! - `compare-models`: Rank prediction sets by accuracy, F1, fairness and latency
//! - `validate`: Check a records file without running a cycle
//! - `verify`: Check a stored cycle artifact against its digest

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fairscope_core::metrics::METRICS;
use fairscope_core::{
    read_cycle_artifact, render_cycle_summary_md, render_group_stats_csv, validate_records,
    write_cycle_artifact, AbTester, AuditLog, BootstrapConfig, CycleArtifact, EvaluationRecord,
    JsonlAuditLog, ModelComparator, OodaController, PipelineConfig, TestMethod,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fairscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Demographic fairness audits for classifier predictions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one audit cycle over a records file
    Audit {
        /// Records file (JSON array or JSON Lines)
        records: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Directory for cycle artifacts
        #[arg(long, default_value = ".fairscope/cycles")]
        artifacts_dir: PathBuf,

        /// Audit log file (JSON Lines)
        #[arg(long, default_value = ".fairscope/audit.jsonl")]
        audit_log: PathBuf,

        /// Also write per-group statistics as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },

    /// Show audit log entries
    History {
        /// Audit log file (JSON Lines)
        #[arg(long, default_value = ".fairscope/audit.jsonl")]
        audit_log: PathBuf,

        /// Only entries for this cycle
        #[arg(long)]
        cycle: Option<Uuid>,

        /// Maximum number of entries to show, most recent last
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Compare two samples statistically
    Ab {
        /// Samples of variant A (JSON array or one number per line)
        sample_a: PathBuf,

        /// Samples of variant B
        sample_b: PathBuf,

        /// welch_t, mann_whitney, bootstrap or chi_square (samples are category counts)
        #[arg(short, long, default_value = "welch_t")]
        method: TestMethod,

        /// Significance level
        #[arg(long, env = "FAIRSCOPE_ALPHA", default_value = "0.05")]
        alpha: f64,

        /// Bootstrap resamples
        #[arg(long, default_value = "10000")]
        iterations: usize,

        /// Bootstrap seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Required per-variant sample size for a two-proportion test
    SampleSize {
        /// Baseline conversion rate in (0, 1)
        #[arg(long)]
        baseline: f64,

        /// Relative minimum detectable effect (0.1 = +10%)
        #[arg(long)]
        mde: f64,

        #[arg(long, env = "FAIRSCOPE_ALPHA", default_value = "0.05")]
        alpha: f64,

        #[arg(long, default_value = "0.8")]
        power: f64,
    },

    /// Bayesian comparison of two success rates
    Bayes {
        #[arg(long)]
        successes_a: u64,
        #[arg(long)]
        trials_a: u64,
        #[arg(long)]
        successes_b: u64,
        #[arg(long)]
        trials_b: u64,

        /// Beta prior alpha
        #[arg(long, default_value = "1")]
        prior_alpha: u64,

        /// Beta prior beta
        #[arg(long, default_value = "1")]
        prior_beta: u64,
    },

    /// Rank several prediction sets
    CompareModels {
        /// Model as NAME=PATH; repeat per model
        #[arg(short, long = "model", required = true, value_parser = parse_key_value::<PathBuf>)]
        models: Vec<(String, PathBuf)>,

        /// Mean latency as NAME=MS
        #[arg(long = "latency", value_parser = parse_key_value::<f64>)]
        latencies: Vec<(String, f64)>,

        /// Demographic attribute to analyse; repeatable
        #[arg(short, long = "attribute", required = true)]
        attributes: Vec<String>,

        /// Print the ranking as JSON instead of the text report
        #[arg(long)]
        as_json: bool,
    },

    /// Validate a records file
    Validate {
        records: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Verify a stored cycle artifact and print its summary
    Verify {
        /// Cycle id
        cycle: Uuid,

        #[arg(long, default_value = ".fairscope/cycles")]
        artifacts_dir: PathBuf,
    },
}

/// Pipeline settings shared by `audit` and `validate`; flags override the config file.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Config file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Demographic attribute to analyse; repeatable
    #[arg(short, long = "attribute")]
    attributes: Vec<String>,

    /// Fairness pass bar in [0, 1]
    #[arg(long, env = "FAIRSCOPE_THRESHOLD")]
    threshold: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fairscope_core::telemetry::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Audit {
            records,
            pipeline,
            artifacts_dir,
            audit_log,
            csv,
            format,
        } => {
            cmd_audit(
                &records,
                &pipeline,
                &artifacts_dir,
                &audit_log,
                csv.as_deref(),
                format,
            )
            .await
        }
        Commands::History {
            audit_log,
            cycle,
            limit,
        } => cmd_history(&audit_log, cycle, limit).await,
        Commands::Ab {
            sample_a,
            sample_b,
            method,
            alpha,
            iterations,
            seed,
        } => cmd_ab(
            &sample_a,
            &sample_b,
            method,
            alpha,
            &BootstrapConfig { iterations, seed },
        ),
        Commands::SampleSize {
            baseline,
            mde,
            alpha,
            power,
        } => cmd_sample_size(baseline, mde, alpha, power),
        Commands::Bayes {
            successes_a,
            trials_a,
            successes_b,
            trials_b,
            prior_alpha,
            prior_beta,
        } => cmd_bayes(
            (successes_a, trials_a),
            (successes_b, trials_b),
            (prior_alpha, prior_beta),
        ),
        Commands::CompareModels {
            models,
            latencies,
            attributes,
            as_json,
        } => cmd_compare_models(&models, &latencies, &attributes, as_json),
        Commands::Validate { records, pipeline } => cmd_validate(&records, &pipeline),
        Commands::Verify {
            cycle,
            artifacts_dir,
        } => cmd_verify(cycle, &artifacts_dir),
    };

    METRICS.flush();
    result
}

/// Run one cycle, persist its artifact and append the action to the audit log
async fn cmd_audit(
    records_path: &Path,
    pipeline: &PipelineArgs,
    artifacts_dir: &Path,
    audit_log: &Path,
    csv: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = resolve_config(pipeline)?;
    let records = load_records(records_path)?;

    let validation = validate_records(&records, &config.attributes, &config.validation)
        .context("Records failed validation")?;
    for warning in &validation.warnings {
        warn!(warning = %warning, "validation warning");
    }

    let controller = OodaController::new(&config).context("Invalid pipeline configuration")?;
    let outcome = controller
        .run_cycle(&records, None)
        .context("Audit cycle failed")?;

    let artifact = CycleArtifact::from_outcome(&outcome, &config)?;
    let artifact_path = write_cycle_artifact(&artifact, artifacts_dir)
        .with_context(|| format!("Failed to write cycle artifact to {:?}", artifacts_dir))?;

    let log = JsonlAuditLog::open(audit_log)
        .await
        .with_context(|| format!("Failed to open audit log {:?}", audit_log))?;
    let entry = log
        .append(outcome.cycle_id, outcome.action.clone())
        .await
        .context("Failed to append audit entry")?;

    if let Some(path) = csv {
        std::fs::write(path, render_group_stats_csv(&artifact.aggregation))
            .with_context(|| format!("Failed to write CSV to {:?}", path))?;
    }

    info!(
        cycle_id = %outcome.cycle_id,
        seq = entry.seq,
        artifact = %artifact_path.display(),
        "audit recorded"
    );

    match format {
        OutputFormat::Json => print_json(&artifact)?,
        OutputFormat::Markdown => print!("{}", render_cycle_summary_md(&artifact)),
    }
    Ok(())
}

/// List audit log entries
async fn cmd_history(audit_log: &Path, cycle: Option<Uuid>, limit: usize) -> Result<()> {
    if !audit_log.exists() {
        println!("No audit log at {:?}. Run 'fairscope audit' first.", audit_log);
        return Ok(());
    }

    let log = JsonlAuditLog::open(audit_log)
        .await
        .with_context(|| format!("Failed to open audit log {:?}", audit_log))?;
    let entries = match cycle {
        Some(id) => log.entries_for(id).await?,
        None => log.entries().await?,
    };

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        let decision = &entry.action.decision_ref;
        println!(
            "#{:<4} {} {} severity={:<8} applied={} {}",
            entry.seq,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            &entry.cycle_id.to_string()[..8],
            decision.severity,
            entry.action.applied,
            entry.action.notes
        );
    }
    Ok(())
}

/// Compare two sample files
fn cmd_ab(
    path_a: &Path,
    path_b: &Path,
    method: TestMethod,
    alpha: f64,
    bootstrap: &BootstrapConfig,
) -> Result<()> {
    let tester = AbTester::new(alpha, AbTester::default().power())?;
    let a = load_samples(path_a)?;
    let b = load_samples(path_b)?;

    let result = match method {
        TestMethod::WelchT => tester.welch_t_test(&a, &b)?,
        TestMethod::MannWhitney => tester.mann_whitney(&a, &b)?,
        TestMethod::Bootstrap => tester.bootstrap(&a, &b, bootstrap)?,
        TestMethod::ChiSquare => {
            let counts_a = as_counts(&a, path_a)?;
            let counts_b = as_counts(&b, path_b)?;
            tester.chi_square(&counts_a, &counts_b)?
        }
    };
    print_json(&result)
}

fn cmd_sample_size(baseline: f64, mde: f64, alpha: f64, power: f64) -> Result<()> {
    let tester = AbTester::new(alpha, power)?;
    let per_variant = tester.required_sample_size(baseline, mde)?;
    print_json(&serde_json::json!({
        "baseline_rate": baseline,
        "min_detectable_effect": mde,
        "alpha": alpha,
        "power": power,
        "per_variant": per_variant,
        "total": per_variant.saturating_mul(2),
    }))
}

fn cmd_bayes(a: (u64, u64), b: (u64, u64), prior: (u64, u64)) -> Result<()> {
    let result = AbTester::default().bayesian(a.0, a.1, b.0, b.1, prior)?;
    print_json(&result)
}

/// Evaluate and rank several prediction sets
fn cmd_compare_models(
    models: &[(String, PathBuf)],
    latencies: &[(String, f64)],
    attributes: &[String],
    as_json: bool,
) -> Result<()> {
    let latency: BTreeMap<&str, f64> = latencies.iter().map(|(n, l)| (n.as_str(), *l)).collect();
    for name in latency.keys() {
        if !models.iter().any(|(m, _)| m == name) {
            anyhow::bail!("Latency given for unknown model '{}'", name);
        }
    }

    let mut comparator = ModelComparator::new(attributes)?;
    for (name, path) in models {
        let records = load_records(path)?;
        comparator
            .evaluate(name, &records, latency.get(name.as_str()).copied())
            .with_context(|| format!("Failed to evaluate model '{}'", name))?;
    }

    if as_json {
        #[derive(Serialize)]
        struct Comparison<'a> {
            models: Vec<&'a fairscope_core::ModelMetrics>,
            ranking: Vec<fairscope_core::RankedModel>,
        }
        print_json(&Comparison {
            models: comparator.results().collect(),
            ranking: comparator.ranking(),
        })
    } else {
        print!("{}", comparator.render_report()?);
        Ok(())
    }
}

fn cmd_validate(records_path: &Path, pipeline: &PipelineArgs) -> Result<()> {
    let config = resolve_config(pipeline)?;
    let records = load_records(records_path)?;
    let report = validate_records(&records, &config.attributes, &config.validation)?;
    print_json(&report)?;
    if !report.is_clean() {
        warn!(warnings = report.warnings.len(), "records validated with warnings");
    }
    Ok(())
}

/// Verify a stored artifact's digest and print its summary
fn cmd_verify(cycle: Uuid, artifacts_dir: &Path) -> Result<()> {
    let artifact = read_cycle_artifact(cycle, artifacts_dir)
        .with_context(|| format!("Failed to verify cycle {}", cycle))?;
    print!("{}", render_cycle_summary_md(&artifact));
    println!("\nArtifact digest verified for cycle {}", cycle);
    Ok(())
}

/// Load the config file (if any) and apply flag overrides.
fn resolve_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    if !args.attributes.is_empty() {
        config.attributes = args.attributes.clone();
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if config.attributes.is_empty() {
        anyhow::bail!("No attributes configured; pass --attribute or set them in --config");
    }
    config.validate()?;
    Ok(config)
}

/// Read records from a JSON array or a JSON Lines file.
fn load_records(path: &Path) -> Result<Vec<EvaluationRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file {:?}", path))?;
    parse_records(&raw).with_context(|| format!("Invalid records in {:?}", path))
}

fn parse_records(raw: &str) -> Result<Vec<EvaluationRecord>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

/// Read numbers from a JSON array or whitespace-separated text.
fn load_samples(path: &Path) -> Result<Vec<f64>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples file {:?}", path))?;
    parse_samples(&raw).with_context(|| format!("Invalid samples in {:?}", path))
}

fn parse_samples(raw: &str) -> Result<Vec<f64>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("'{}' is not a number", tok))
        })
        .collect()
}

fn as_counts(values: &[f64], path: &Path) -> Result<Vec<u64>> {
    values
        .iter()
        .map(|&v| {
            if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
                Ok(v as u64)
            } else {
                anyhow::bail!("{:?}: chi-square needs non-negative integer counts, got {}", path, v)
            }
        })
        .collect()
}

fn parse_key_value<T>(s: &str) -> Result<(String, T)>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if key.is_empty() {
        anyhow::bail!("empty name in '{}'", s);
    }
    Ok((key.to_string(), value.parse()?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
