// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::AppState;

/// Background job driving the auto-release safety valve: jobs the hustler
/// marked complete that the customer never confirmed are released after the
/// configured window. The sweep is safe to run from overlapping ticks.
pub async fn start_auto_release_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.sweep_interval_secs));

    loop {
        interval.tick().await;

        tracing::debug!("running auto-release sweep at {}", Utc::now());

        match app_state
            .lifecycle_service
            .run_auto_release_sweep(Utc::now())
            .await
        {
            Ok(outcome) if outcome.examined > 0 => tracing::info!(
                "auto-release sweep: {} examined, {} released, {} failed",
                outcome.examined,
                outcome.released,
                outcome.failed
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("auto-release sweep failed: {}", e),
        }
    }
}
