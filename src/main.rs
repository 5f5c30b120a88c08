//! Proctor CLI
//!
//! Replays scripted sessions and inspects exported evidence.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proctor_core::transparency::{create_shared_log, create_shared_log_with_persistence};
use proctor_core::{
    sensors::ViolationAnalyzer, EvidenceExport, ProctoringConfig, ReplayScript, SessionSummary,
    MONITORING_DISCLOSURE, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proctor")]
#[command(version = VERSION)]
#[command(about = "Exam-integrity monitoring engine", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted session against the simulated host
    Replay {
        /// Replay script (JSON)
        script: PathBuf,

        /// Write the evidence export (ledger + summary) to this file
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Accumulate monitoring counters across runs in this file
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Summarize and pattern-check an exported evidence file
    Analyze {
        /// Evidence export (JSON)
        ledger: PathBuf,
    },

    /// Show configuration
    Config {
        /// Only print the configuration file path
        #[arg(long)]
        path: bool,

        /// Write the default configuration if no file exists yet
        #[arg(long)]
        init: bool,
    },

    /// Display the monitoring notice shown to students
    Disclosure,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Replay {
            script,
            ledger,
            stats,
        } => cmd_replay(&script, ledger.as_deref(), stats).await,
        Commands::Analyze { ledger } => cmd_analyze(&ledger),
        Commands::Config { path, init } => cmd_config(path, init),
        Commands::Disclosure => {
            println!("{MONITORING_DISCLOSURE}");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn cmd_replay(
    script_path: &Path,
    ledger: Option<&Path>,
    stats_path: Option<PathBuf>,
) -> Result<()> {
    let script = ReplayScript::load(script_path)
        .with_context(|| format!("loading replay script {}", script_path.display()))?;
    let monitoring = match stats_path {
        Some(path) => create_shared_log_with_persistence(path),
        None => create_shared_log(),
    };
    let outcome = script
        .run_with_log(monitoring.clone())
        .await
        .context("replaying session")?;
    monitoring.save().context("saving monitoring stats")?;

    print_summary(&outcome.summary);
    if !outcome.pattern_findings.is_empty() {
        println!();
        println!("Pattern findings:");
        for finding in &outcome.pattern_findings {
            println!("  [{:?}] {}", finding.severity, finding.description);
        }
    }

    let stats = outcome.monitoring;
    println!();
    println!("Monitoring:");
    println!("  Signals processed: {}", stats.signals_processed);
    println!("  Actions blocked: {}", stats.signals_prevented);
    println!("  Frames analyzed: {}", stats.frames_analyzed);

    if let Some(path) = ledger {
        let export = EvidenceExport {
            session_id: outcome.state.session_id,
            exported_at: chrono::Utc::now(),
            summary: outcome.summary,
            violations: outcome.state.violations,
        };
        std::fs::write(path, export.to_json()?)
            .with_context(|| format!("writing evidence to {}", path.display()))?;
        println!();
        println!("Evidence written to {}", path.display());
    }
    Ok(())
}

fn cmd_analyze(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading evidence file {}", path.display()))?;
    let export = EvidenceExport::from_json(&content).context("parsing evidence file")?;
    let config = ProctoringConfig::load().unwrap_or_default();

    let summary = SessionSummary::for_exported_ledger(
        export.session_id,
        &export.violations,
        config.suspicious_activity_threshold,
    );
    print_summary(&summary);

    let latest = export
        .violations
        .iter()
        .map(|v| v.timestamp)
        .max()
        .unwrap_or(export.exported_at);
    let findings = ViolationAnalyzer::analyze_patterns(&export.violations, latest);
    println!();
    if findings.is_empty() {
        println!("No suspicious patterns found.");
    } else {
        println!("Pattern findings:");
        for finding in findings {
            println!("  [{:?}] {}", finding.severity, finding.description);
        }
    }
    Ok(())
}

fn cmd_config(path_only: bool, init: bool) -> Result<()> {
    let path = ProctoringConfig::config_path();
    if init && !path.exists() {
        ProctoringConfig::default()
            .save()
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
    }
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }
    let config = ProctoringConfig::load().unwrap_or_default();
    println!("Configuration file: {}", path.display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!("Session {}", summary.session_id);
    println!("================================================");
    println!("  Total violations: {}", summary.total_violations);
    for (violation_type, count) in &summary.violations_by_type {
        println!("    {violation_type}: {count}");
    }
    let s = summary.severity_breakdown;
    println!("  Severity: {} high, {} medium, {} low", s.high, s.medium, s.low);
    println!("  Risk score: {:.1}", summary.final_risk_score);
    if summary.flagged {
        println!("  ⚠ Flagged for review");
    }
}
