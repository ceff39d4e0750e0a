use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::AppState;

/// Start the background maintenance task: sweep expired tokens to `Expired`,
/// delete rows past retention, and drop dead cache entries.
///
/// Correctness never depends on this task — reads expire lazily and the
/// conditional update guards every sweep transition — it only bounds how
/// long unobserved rows linger.
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.tokens.cleanup_interval_seconds);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_maintenance(&state).await;
        }
    })
}

async fn run_maintenance(state: &Arc<AppState>) {
    debug!("Running token maintenance");

    let batch = state.config.tokens.cleanup_batch_size;
    let blocking_state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || {
        let swept = blocking_state.service.sweep_expired(batch);
        let deleted = blocking_state.service.cleanup(batch);
        let purged = blocking_state.service.purge_cache();
        (swept, deleted, purged)
    })
    .await;

    let (swept, deleted, purged) = match result {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Maintenance task panicked");
            return;
        }
    };

    match swept {
        Ok(count) if count > 0 => debug!(swept = count, "Expired tokens swept"),
        Err(e) => error!(error = %e, "Failed to sweep expired tokens"),
        _ => {}
    }

    match deleted {
        Ok(count) if count > 0 => debug!(deleted = count, "Stale tokens deleted"),
        Err(e) => error!(error = %e, "Failed to delete stale tokens"),
        _ => {}
    }

    if purged > 0 {
        debug!(purged, "Dead cache entries dropped");
    }
}
