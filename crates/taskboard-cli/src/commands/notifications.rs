//! One-shot listing of pending notifications.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use taskboard_core::config::ClientConfig;
use taskboard_core::session::MemorySession;
use taskboard_core::signal::UiSignal;

use crate::output;

/// Fetch the notification map and print it.
pub async fn execute(config: &ClientConfig, session: Arc<MemorySession>) -> Result<()> {
    let (mut engine, mut signals) = super::connect(config, session)?;
    engine.start()?;

    let loaded = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            tokio::select! {
                alive = engine.process_next() => {
                    if !alive {
                        return false;
                    }
                }
                Some(signal) = signals.recv() => match signal {
                    UiSignal::NotificationsChanged { .. } => return true,
                    other => {
                        if output::print_signal(&other) && other.is_error_toast() {
                            return false;
                        }
                    }
                },
            }
        }
    })
    .await;

    let loaded = matches!(loaded, Ok(true));
    if loaded {
        output::print_notifications(engine.notifications());
    }
    let terminated = engine.is_terminated();
    engine.shutdown();

    if terminated {
        bail!("Session terminated by the server");
    }
    if !loaded {
        bail!("Could not load notifications");
    }
    Ok(())
}
