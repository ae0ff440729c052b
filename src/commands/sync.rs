use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use asana2calendar_core::{Clock, DateRange, Engine, SyncContext, SyncOptions, SystemClock};
use owo_colors::OwoColorize;
use tracing::debug;

use super::{load_config, open_store};
use crate::registry::Registry;
use crate::render::Render;
use crate::utils::tui::create_spinner;

/// Exits non-zero only when a required adapter could not be reached.
pub async fn run(from: Option<&str>, to: Option<&str>) -> Result<ExitCode> {
    let config = load_config()?;
    let adapters = Registry::builtin().build(&config)?;
    let store = open_store(&config)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let window = DateRange::from_args(clock.now(), config.sync_days, from, to)
        .map_err(|e| anyhow::anyhow!(e))?;
    debug!(from = ?window.from, to = ?window.to, "sync window");
    let options = SyncOptions::new(window).with_call_timeout(config.call_timeout());

    let names = adapters.names().join(" ↔ ");
    let mut engine = Engine::new(SyncContext::new(adapters, clock).with_options(options), store);

    let spinner = create_spinner(format!("Syncing {}", names));
    let result = tokio::select! {
        result = engine.run_pass() => result,
        _ = tokio::signal::ctrl_c() => {
            spinner.finish_and_clear();
            anyhow::bail!("Interrupted, nothing was committed");
        }
    };
    spinner.finish_and_clear();

    let report = result?;
    println!("{}", names.bold());
    println!("{}", report.render());

    if report.failed() {
        println!(
            "\n{}",
            format!(
                "Required {} unavailable: {}",
                if report.required_unavailable.len() == 1 { "adapter" } else { "adapters" },
                report.required_unavailable.join(", ")
            )
            .red()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
