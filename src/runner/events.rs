//! Execution events for real-time console reporting.

use tokio::sync::broadcast;

use crate::report::types::Totals;
use crate::runner::state::OutcomeStatus;

/// Events emitted while a run is in flight.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        total_units: usize,
        concurrency: usize,
    },
    UnitStarted {
        scenario: String,
        row_index: usize,
        worker: usize,
    },
    UnitRetrying {
        scenario: String,
        row_index: usize,
        attempt: u32,
        max_attempts: u32,
    },
    UnitFinished {
        scenario: String,
        row_index: usize,
        status: OutcomeStatus,
        duration_ms: u64,
    },
    RunCancelled,
    RunFinished {
        totals: Totals,
    },
}

/// Broadcasts run events to any number of listeners.
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Console listener: one progress bar over all units, one line per outcome.
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use std::io::IsTerminal;

        let mut bar: Option<ProgressBar> = None;

        while let Ok(event) = receiver.recv().await {
            match event {
                RunEvent::RunStarted {
                    run_id,
                    total_units,
                    concurrency,
                } => {
                    println!(
                        "\n{} Run {} started: {} units on {} workers",
                        "▶".green().bold(),
                        run_id.cyan(),
                        total_units,
                        concurrency
                    );

                    let pb = if std::io::stdout().is_terminal() {
                        ProgressBar::new(total_units as u64)
                    } else {
                        // Piped output: skip the animated bar, keep the lines.
                        ProgressBar::with_draw_target(
                            Some(total_units as u64),
                            ProgressDrawTarget::hidden(),
                        )
                    };
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("  [{bar:30}] {pos}/{len} units")
                            .unwrap(),
                    );
                    bar = Some(pb);
                }

                RunEvent::UnitStarted { .. } => {}

                RunEvent::UnitRetrying {
                    scenario,
                    row_index,
                    attempt,
                    max_attempts,
                } => {
                    let line = format!(
                        "  {} {}[row {}] {}",
                        "↻".yellow(),
                        scenario,
                        row_index,
                        format!("retry {}/{}", attempt, max_attempts).yellow()
                    );
                    match &bar {
                        Some(pb) => pb.println(line),
                        None => println!("{}", line),
                    }
                }

                RunEvent::UnitFinished {
                    scenario,
                    row_index,
                    status,
                    duration_ms,
                } => {
                    let (icon, word) = match status {
                        OutcomeStatus::Passed => ("✓".green(), "passed".green()),
                        OutcomeStatus::Failed => ("✗".red(), "failed".red()),
                        OutcomeStatus::Errored => ("✗".red(), "errored".red()),
                        OutcomeStatus::Skipped => ("○".yellow(), "skipped".yellow()),
                    };
                    let line = format!(
                        "  {} {}[row {}] {} ({}ms)",
                        icon, scenario, row_index, word, duration_ms
                    );
                    match &bar {
                        Some(pb) => {
                            pb.println(line);
                            pb.inc(1);
                        }
                        None => println!("{}", line),
                    }
                }

                RunEvent::RunCancelled => {
                    let line = format!(
                        "  {} cancellation requested, draining in-flight units",
                        "⏹".yellow()
                    );
                    match &bar {
                        Some(pb) => pb.println(line),
                        None => println!("{}", line),
                    }
                }

                RunEvent::RunFinished { totals } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                    println!(
                        "\n{} Run finished: {} passed, {} failed, {} errored, {} skipped",
                        "■".blue().bold(),
                        totals.passed.to_string().green(),
                        totals.failed.to_string().red(),
                        totals.errored.to_string().red(),
                        totals.skipped.to_string().yellow()
                    );
                    break;
                }
            }
        }
    }
}
