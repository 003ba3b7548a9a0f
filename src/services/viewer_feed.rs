//! Snapshot subscription for viewers.
//!
//! A viewer learns about new snapshots from two sources: change notifications of the
//! shared store and a fixed-interval poll. Both feed the same [`ViewerFeed`], which
//! drops anything not newer than what it already holds. Cues are derived by
//! comparing the accepted snapshot with the previous one, so a duplicated delivery
//! never replays a cue.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

use crate::{
    dto::sse::{ServerEvent, ViewerCue},
    services::{bootstrap_service, sse_events},
    state::{
        SharedState,
        clock::Clock,
        match_state::{MatchKey, MatchState, Side},
        reducer::ClockTarget,
        session::MatchSession,
    },
};

/// Version-ordered view of one match.
#[derive(Debug, Default)]
pub struct ViewerFeed {
    current: Option<MatchState>,
}

/// Snapshot accepted by [`ViewerFeed::offer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub cues: Vec<ViewerCue>,
}

impl ViewerFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Option<u64> {
        self.current.as_ref().map(|state| state.version)
    }

    pub fn current(&self) -> Option<&MatchState> {
        self.current.as_ref()
    }

    /// Take `snapshot` if it is newer than the held one. The first snapshot never
    /// produces cues.
    pub fn offer(&mut self, snapshot: MatchState) -> Option<Accepted> {
        let cues = match &self.current {
            Some(current) if snapshot.version <= current.version => return None,
            Some(current) => derive_cues(current, &snapshot),
            None => Vec::new(),
        };
        self.current = Some(snapshot);
        Some(Accepted { cues })
    }
}

fn derive_cues(previous: &MatchState, next: &MatchState) -> Vec<ViewerCue> {
    let mut cues = Vec::new();
    let (before, after) = (&previous.progress, &next.progress);

    if before.section_index != after.section_index || before.section != after.section {
        cues.push(ViewerCue::SectionChanged {
            section: after.section,
            index: after.section_index,
        });
    }

    let clocks = [
        (ClockTarget::Red, &before.red.clock, &after.red.clock),
        (ClockTarget::Blue, &before.blue.clock, &after.blue.clock),
        (ClockTarget::Warmup, &before.warmup, &after.warmup),
        (ClockTarget::Interval, &before.interval, &after.interval),
    ];
    for (target, old, new) in clocks {
        cues.extend(clock_cues(target, old, new));
    }

    for side in Side::BOTH {
        if !before.side(side).penalty_throw && after.side(side).penalty_throw {
            cues.push(ViewerCue::PenaltyThrowStarted { side });
        }
    }

    if !before.approvals.completed() && after.approvals.completed() {
        cues.push(ViewerCue::MatchCompleted);
    }
    cues
}

fn clock_cues(clock: ClockTarget, old: &Clock, new: &Clock) -> Vec<ViewerCue> {
    let mut cues: Vec<ViewerCue> = new
        .warnings_fired()
        .difference(old.warnings_fired())
        .map(|&threshold_ms| ViewerCue::ClockWarning {
            clock,
            threshold_ms,
        })
        .collect();
    if !old.is_expired() && new.is_expired() {
        cues.push(ViewerCue::ClockExpired { clock });
    }
    cues
}

/// Read the latest snapshot of `key`, repairing the shared store when its entry is
/// corrupt. Falls back to a read-only remote load.
pub async fn latest_snapshot(state: &SharedState, key: &MatchKey) -> Option<MatchState> {
    match state.shared().read(key) {
        Some(Ok(snapshot)) => return Some(snapshot),
        Some(Err(err)) => {
            warn!(%key, error = %err, "discarding corrupt shared snapshot");
            state.shared().discard(key);
        }
        None => {}
    }

    let store = state.document_store().await;
    match bootstrap_service::load_match(
        store.as_ref(),
        key,
        &state.config().default_settings,
        crate::state::clock::wall_clock_ms(),
    )
    .await
    {
        Ok(loaded) => Some(loaded.state),
        Err(err) => {
            debug!(%key, error = %err, "viewer could not load match remotely");
            None
        }
    }
}

/// Pump snapshots and cues of `session` into `tx` until the receiver goes away.
pub async fn run_viewer(
    state: SharedState,
    session: Arc<MatchSession>,
    tx: mpsc::Sender<ServerEvent>,
    poll_every: Duration,
) {
    let key = session.key().clone();
    let mut feed = ViewerFeed::new();
    let mut changes = state.shared().subscribe();
    let mut hub = session.channels().viewer().subscribe();
    let mut poll = interval(poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let refresh = tokio::select! {
            _ = tx.closed() => break,
            _ = poll.tick() => true,
            change = changes.recv() => match change {
                Ok(change) => change.key == key && Some(change.version) > feed.version(),
                Err(RecvError::Lagged(_)) => true,
                Err(RecvError::Closed) => break,
            },
            event = hub.recv() => match event {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                    false
                }
                Err(RecvError::Lagged(_)) => false,
                Err(RecvError::Closed) => break,
            },
        };
        if !refresh {
            continue;
        }

        let Some(snapshot) = latest_snapshot(&state, &key).await else {
            continue;
        };
        let Some(accepted) = feed.offer(snapshot) else {
            continue;
        };
        let Some(current) = feed.current() else {
            continue;
        };
        let mut events = Vec::with_capacity(accepted.cues.len() + 1);
        events.extend(sse_events::snapshot_event(current));
        events.extend(accepted.cues.iter().filter_map(sse_events::cue_event));
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        match_state::MatchSettings,
        reducer::{MatchAction, reduce},
        sections::SectionId,
    };

    fn fresh() -> MatchState {
        MatchState::new(MatchKey::new("cup", "1"), MatchSettings::default())
    }

    #[test]
    fn duplicate_and_stale_snapshots_are_ignored() {
        let mut feed = ViewerFeed::new();
        let first = fresh();
        let second = reduce(&first, MatchAction::Advance, 1_000).unwrap().state;

        assert_eq!(feed.offer(first.clone()), Some(Accepted { cues: Vec::new() }));
        assert!(feed.offer(second.clone()).is_some());
        assert_eq!(feed.offer(second.clone()), None);
        assert_eq!(feed.offer(first), None);
        assert_eq!(feed.version(), Some(second.version));
    }

    #[test]
    fn section_change_produces_a_cue_once() {
        let mut feed = ViewerFeed::new();
        let first = fresh();
        let second = reduce(&first, MatchAction::Advance, 1_000).unwrap().state;
        feed.offer(first);

        let accepted = feed.offer(second.clone()).unwrap();
        assert_eq!(
            accepted.cues,
            vec![ViewerCue::SectionChanged {
                section: second.section(),
                index: 1,
            }]
        );
        assert_ne!(second.section(), SectionId::Standby);
    }

    #[test]
    fn warning_and_expiry_cues_follow_the_clock() {
        let mut feed = ViewerFeed::new();
        let mut state = fresh();
        state.progress.red.clock = Clock::new(crate::state::clock::ClockKind::Player, 61_000);
        feed.offer(state.clone());

        let mut next = state.clone();
        next.version = 1;
        next.progress.red.clock.start(0);
        next.progress.red.clock.tick(1_500);
        let accepted = feed.offer(next.clone()).unwrap();
        assert_eq!(
            accepted.cues,
            vec![ViewerCue::ClockWarning {
                clock: ClockTarget::Red,
                threshold_ms: 60_000,
            }]
        );

        let mut last = next;
        last.version = 2;
        last.progress.red.clock.tick(61_000);
        let cues = feed.offer(last).unwrap().cues;
        assert!(cues.contains(&ViewerCue::ClockExpired {
            clock: ClockTarget::Red
        }));
    }

    #[tokio::test]
    async fn corrupt_shared_entry_falls_back_to_defaults() {
        use crate::{config::AppConfig, state::AppState};

        let state = AppState::new(AppConfig::default());
        let key = MatchKey::new("cup", "9");
        state.shared().publish_raw(&key, "not json");

        let snapshot = latest_snapshot(&state, &key).await.unwrap();
        assert_eq!(snapshot.key, key);
        assert!(state.shared().read(&key).is_none());
    }
}
