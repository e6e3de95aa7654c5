//! Experiment runner command

use std::path::Path;

use anyhow::{Context, Result};
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::watch;

use loadtest_lib::config::CoordinatorConfig;
use loadtest_lib::coordinator::{Coordinator, RunOutcome};

use crate::output::{print_info, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Supported Users")]
    supported_users: usize,
    #[tabled(rename = "Window Samples")]
    samples: usize,
}

/// Run an experiment to convergence or interrupt
///
/// A fatal error propagates as `Err`, which exits with code 1; both
/// convergence and a clean interrupt exit with code 0.
pub async fn run_experiment(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = CoordinatorConfig::load(Some(config_path))
        .context("failed to load coordinator configuration")?;
    let coordinator = Coordinator::new(config).context("failed to build coordinator")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    print_info("experiment started, press Ctrl-C to interrupt");

    match coordinator
        .run(shutdown_rx)
        .await
        .context("experiment failed")?
    {
        RunOutcome::Converged {
            supported_users,
            samples,
        } => match format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "outcome": "converged",
                    "supportedUsers": supported_users,
                    "windowSamples": samples.len(),
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Table => {
                print_success("experiment converged");
                let table = Table::new([ResultRow {
                    supported_users,
                    samples: samples.len(),
                }])
                .with(Style::rounded())
                .to_string();
                println!("{}", table);
            }
        },
        RunOutcome::Interrupted => match format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "outcome": "interrupted" }));
            }
            OutputFormat::Table => {
                print_warning("experiment interrupted before convergence");
            }
        },
    }

    Ok(())
}
