//! Statistics dashboard.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use taskboard_core::config::ClientConfig;
use taskboard_core::session::MemorySession;
use taskboard_core::signal::UiSignal;
use taskboard_realtime::UiCommand;

use crate::output;

/// Render the dashboard and re-render on every pushed slice until Ctrl-C.
pub async fn execute(config: &ClientConfig, session: Arc<MemorySession>) -> Result<()> {
    let (mut engine, mut signals) = super::connect(config, session)?;
    engine.start()?;
    engine.execute(UiCommand::MountDashboard)?;
    println!("{}", "Watching dashboard, Ctrl-C to quit.".dimmed());

    let mut notice = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            alive = engine.process_next() => {
                if !alive {
                    while let Ok(signal) = signals.try_recv() {
                        if let UiSignal::SessionTerminated { notice: text } = signal {
                            notice = Some(text);
                        }
                    }
                    break;
                }
            }
            Some(signal) = signals.recv() => match signal {
                UiSignal::DashboardChanged => {
                    if let Some(stats) = engine.dashboard() {
                        println!();
                        output::print_dashboard(stats);
                    }
                }
                other => {
                    output::print_signal(&other);
                }
            },
        }
    }

    engine.shutdown();
    if let Some(notice) = notice {
        super::acknowledge_logout(notice).await;
    }
    Ok(())
}
