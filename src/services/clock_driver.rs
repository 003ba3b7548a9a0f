//! Background ticker that drives the clocks of an open match.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    error::ServiceError,
    services::controller_service,
    state::{SharedState, clock::wall_clock_ms, reducer::MatchAction, session::MatchSession},
};

/// Periodically evaluate the running clocks of one match.
///
/// Clocks derive their value from wall-clock time, so a late or skipped tick only
/// delays a warning or an expiry; it never shifts the displayed time. The task ends
/// when the session is dropped.
pub async fn run(state: SharedState, session: Weak<MatchSession>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        if !tick(&state, &session).await {
            break;
        }
    }
}

/// Returns `false` once the match can no longer be ticked.
async fn tick(state: &SharedState, session: &Arc<MatchSession>) -> bool {
    match controller_service::apply(state, session, MatchAction::Tick, wall_clock_ms()).await {
        Ok(reduction) => {
            if reduction.changed() {
                debug!(
                    key = %session.key(),
                    version = reduction.state.version,
                    "clock tick changed the match"
                );
            }
            true
        }
        Err(ServiceError::InvalidState(message)) => {
            debug!(key = %session.key(), %message, "stopping clock driver");
            false
        }
        Err(err) => {
            warn!(key = %session.key(), error = %err, "clock tick failed");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::controller_service::open_match,
        state::{
            AppState,
            match_state::MatchKey,
            reducer::{ClockTarget, MatchAction},
        },
    };

    #[tokio::test]
    async fn ticks_fire_expiry_on_a_running_clock() {
        let mut config = AppConfig::default();
        config.default_settings.clocks.warmup_ms = 50;
        let state = AppState::new(config);
        let key = MatchKey::new("cup", "1");
        open_match(&state, &key).await.unwrap();
        let session = state.session(&key);

        let now = wall_clock_ms();
        controller_service::apply(&state, &session, MatchAction::Advance, now)
            .await
            .unwrap();
        controller_service::apply(
            &state,
            &session,
            MatchAction::StartClock {
                clock: ClockTarget::Warmup,
            },
            now,
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tick(&state, &session).await);
        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.progress.warmup.is_expired());
    }

    #[tokio::test]
    async fn unopened_match_stops_the_driver() {
        let state = AppState::new(AppConfig::default());
        let session = state.session(&MatchKey::new("cup", "2"));
        assert!(!tick(&state, &session).await);
    }
}
