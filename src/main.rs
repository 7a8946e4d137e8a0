use std::path::{Path, PathBuf};
use std::process::ExitCode;

use accessibility_tracker::{
    AccessibilityTracker, DEFAULT_STUB_ALT, Document, RULE_CATALOG_V1, ReportSink, Result,
    ScanOutcome, TrackerBuilder, TrackerConfig, TrackerError, contract_fingerprint_sha256,
    rule_catalog_v1_hash_sha256,
};
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "a11y-tracker")]
#[command(about = "Heuristic WCAG checks for HTML documents")]
#[command(version)]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a document and print grouped issues with a score
    Scan {
        file: PathBuf,
        /// Print the report payload as JSON
        #[arg(long)]
        json: bool,
        /// URL recorded in the report (defaults to the file path)
        #[arg(long)]
        url: Option<String>,
        /// Send the report to the configured collector
        #[arg(long)]
        report: bool,
        /// Collector base URL, overrides the config file
        #[arg(long, env = "A11Y_REPORT_ENDPOINT")]
        endpoint: Option<String>,
    },
    /// Apply presentation fixes and write the resulting HTML
    Enhance {
        file: PathBuf,
        /// Output path (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Stub alt text onto images that have none
        #[arg(long)]
        stub_alt: bool,
    },
    /// List the rule catalog
    Rules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match TrackerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("a11y-tracker: {err}");
                return ExitCode::from(2);
            }
        },
        None => TrackerConfig::default(),
    };
    init_tracing(&config.log_level, cli.log_json);

    match run(cli.command, config) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("a11y-tracker: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Commands, mut config: TrackerConfig) -> Result<ExitCode> {
    match command {
        Commands::Scan {
            file,
            json,
            url,
            report,
            endpoint,
        } => {
            if let Some(endpoint) = endpoint {
                config.report_endpoint = Some(endpoint);
            }
            let tracker = TrackerBuilder::from_config(&config).build()?;
            let doc = Document::from_path(&file)?;
            let outcome = tracker.scan(&doc);
            let scanned_url = url.unwrap_or_else(|| file_url(&file));
            let payload = outcome.aggregate.to_report(&scanned_url, Utc::now());
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_outcome(&scanned_url, &outcome);
            }
            tracker.emit_debug_summary("scan");
            if report {
                return send_report(&tracker, &payload);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Enhance {
            file,
            out,
            stub_alt,
        } => {
            if stub_alt && config.stub_alt_text.is_none() {
                config.stub_alt_text = Some(DEFAULT_STUB_ALT.to_string());
            }
            let tracker = TrackerBuilder::from_config(&config).build()?;
            let doc = Document::from_path(&file)?;
            // The written output keeps the fixes, so the engine is not needed.
            let (_engine, summary) = tracker.enhance(&doc);
            tracing::info!(
                text = summary.text_elements,
                images = summary.images_outlined,
                interactive = summary.interactive_outlined,
                "enhanced"
            );
            match out {
                Some(path) => std::fs::write(path, doc.to_html())?,
                None => println!("{}", doc.to_html()),
            }
            tracker.emit_debug_summary("enhance");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rules => {
            for def in RULE_CATALOG_V1.iter() {
                println!(
                    "{:<20} {:<11} {:<7} {}",
                    def.key, def.rule, def.severity.as_str(), def.message
                );
            }
            println!("catalog sha256     {}", rule_catalog_v1_hash_sha256());
            println!("contract sha256    {}", contract_fingerprint_sha256());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn send_report(
    tracker: &AccessibilityTracker,
    payload: &accessibility_tracker::ReportPayload,
) -> Result<ExitCode> {
    let Some(sink) = tracker.report_sink()? else {
        return Err(TrackerError::InvalidConfiguration(
            "--report needs report_endpoint in the config or --endpoint".to_string(),
        ));
    };
    match sink.submit(payload) {
        Ok(ack) => {
            eprintln!("report sent: {}", ack.message);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("Failed to send report: {err}");
            Ok(ExitCode::from(3))
        }
    }
}

fn print_outcome(scanned_url: &str, outcome: &ScanOutcome) {
    println!("{scanned_url}");
    println!(
        "score {}/10, {} issue types, {} occurrences (high {}, medium {}, low {})",
        outcome.aggregate.score,
        outcome.aggregate.groups.len(),
        outcome.aggregate.total_occurrences(),
        outcome.summary.high,
        outcome.summary.medium,
        outcome.summary.low,
    );
    for group in &outcome.aggregate.groups {
        println!(
            "  [{}] {} {} x{}  {}",
            group.severity, group.rule_id, group.message, group.count, group.locator
        );
    }
    let failed: Vec<&str> = outcome.metrics.failed_rules().collect();
    if !failed.is_empty() {
        println!("  skipped rules: {}", failed.join(", "));
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
