use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use bluejay::config::Config;
use bluejay::datasource::DataSource;
use bluejay::report;
use bluejay::runner::events::ConsoleEventListener;
use bluejay::runner::{ExecutionOptions, Orchestrator};
use bluejay::scenario;
use bluejay::session::playwright::PlaywrightBackend;
use bluejay::session::{BrowserKind, SessionConfig, SessionManager};

#[derive(Parser)]
#[command(name = "bluejay")]
#[command(version = "0.1.0")]
#[command(about = "Data-driven cross-browser UI test execution framework", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against every row of a data source
    Run {
        /// Scenario YAML file or directory of scenario files
        scenarios: PathBuf,

        /// Tabular data source (CSV with a header row)
        #[arg(short, long)]
        data: PathBuf,

        /// Browser engine (chrome, firefox, edge, safari)
        #[arg(short, long)]
        browser: Option<String>,

        /// Run the browser headless
        #[arg(long, default_value = "false")]
        headless: bool,

        /// Number of parallel workers
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Retry budget for units that errored with a retryable kind
        #[arg(short, long)]
        retries: Option<u32>,

        /// Output directory for reports and artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Filter scenarios by tags (comma-separated, all must match)
        #[arg(short, long, value_delimiter = ',')]
        tags: Option<Vec<String>>,

        /// Directory holding default.yaml / <env>.yaml config layers
        #[arg(long)]
        config: Option<PathBuf>,

        /// Expand and list units without acquiring any session
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Re-render a saved run report
    Report {
        /// Path to a report.json produced by `run`
        results: PathBuf,

        /// Output format (json, html, junit)
        #[arg(short, long, default_value = "html")]
        format: String,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenarios,
            data,
            browser,
            headless,
            concurrency,
            retries,
            output,
            tags,
            config,
            dry_run,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            if let Some(b) = browser {
                cfg.browser = b.parse::<BrowserKind>()?;
            }
            if headless {
                cfg.headless = true;
            }
            if let Some(c) = concurrency {
                cfg.concurrency = c.max(1);
            }
            if let Some(r) = retries {
                cfg.retry_count = r;
            }
            if let Some(o) = output {
                cfg.output_dir = o;
            }

            println!(
                "{} Running scenarios from: {}",
                "▶".green().bold(),
                scenarios.display()
            );
            println!("  Data source: {}", data.display().to_string().cyan());
            println!("  Browser: {}", cfg.browser.to_string().cyan());
            if cfg.headless {
                println!("  Headless: {}", "Enabled".green());
            }
            println!("  Concurrency: {}", cfg.concurrency.to_string().cyan());
            if cfg.retry_count > 0 {
                println!("  Retry budget: {}", cfg.retry_count.to_string().yellow());
            }
            if let Some(ref tag_list) = tags {
                println!("  Tags: {}", tag_list.join(", ").yellow());
            }
            println!(
                "  Output: {}",
                cfg.output_dir.display().to_string().cyan()
            );

            let discovered = scenario::discover(&scenarios, tags.as_deref())?;
            if discovered.is_empty() {
                println!("{} No scenarios matched.", "ℹ".blue());
                return Ok(());
            }

            // Fails here, before any session, on unreadable or headerless
            // input; malformed rows abort inside execute with the same error
            // type and no partial execution.
            let source = DataSource::open(&data)?;

            if dry_run {
                let rows = source.load()?;
                println!(
                    "\n{} {} scenarios x {} rows = {} units",
                    "ℹ".blue(),
                    discovered.len(),
                    rows.len(),
                    discovered.len() * rows.len()
                );
                for s in &discovered {
                    for row in &rows {
                        println!("  {}[row {}]", s.name, row.index());
                    }
                }
                return Ok(());
            }

            let session_config = SessionConfig {
                browser: cfg.browser,
                headless: cfg.headless,
                timeout_ms: cfg.timeout_ms,
                extra_capabilities: cfg.extra_capabilities.clone(),
            };
            let options = ExecutionOptions {
                concurrency: cfg.concurrency,
                retry_budget: cfg.retry_count,
                retry_delay_ms: cfg.retry_delay_ms,
                unit_timeout_ms: cfg.unit_timeout_ms,
                element_timeout_ms: cfg.timeout_ms,
                base_url: cfg.base_url.clone(),
                output_dir: cfg.output_dir.clone(),
            };

            let manager = SessionManager::new(Arc::new(PlaywrightBackend::new()));
            let orchestrator = Orchestrator::new(manager, session_config, options);

            // Ctrl-C lets in-flight units finish and marks the rest skipped.
            let cancel = orchestrator.cancel_flag();
            ctrlc::set_handler(move || {
                println!("\n{} Cancellation requested...", "⏹".yellow());
                cancel.store(true, Ordering::SeqCst);
            })?;

            let listener = tokio::spawn(ConsoleEventListener::listen(orchestrator.subscribe()));

            let run_report = orchestrator.execute(discovered, &source).await?;

            // Let the listener drain its queue before the summary lines.
            let _ = listener.await;

            let run_dir = cfg.output_dir.join(&run_report.run_id);
            report::write_all(&run_report, &run_dir)?;
            println!("  Reports: {}", run_dir.display().to_string().cyan());

            std::process::exit(run_report.exit_code());
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref()).await?;
        }
    }

    Ok(())
}
