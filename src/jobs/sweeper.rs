//! Background job: periodic abuse sweep.
//!
//! Runs once per configured interval. Each run is one read, compute,
//! replace batch against the ban list; a failed run is logged and the
//! next tick retries from scratch. Concurrent sweeps race on the final
//! replace (last writer wins), so deployments must run a single sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::abuse::AbuseEngine;

/// Spawn the sweeper task. Call this once at startup.
pub fn spawn(engine: Arc<AbuseEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.sweep().await {
                Ok(summary) => {
                    tracing::debug!(total_bans = summary.total_bans, "sweep tick done");
                }
                Err(e) => {
                    tracing::error!("abuse sweep failed: {e}");
                }
            }
        }
    })
}
