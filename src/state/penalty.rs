//! Penalty recording, confirmation staging and the penalty-throw sub-state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    ball_count::MAX_BALLS,
    match_state::{MatchState, Side},
    reducer::{MatchEffect, RuleError},
    sections::{SectionId, allocation, enter_section},
};

/// Infringement recorded against the offending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PenaltyKind {
    /// Ball removed from play, no further sanction.
    Retraction,
    /// Opponent receives a penalty ball.
    PenaltyBall,
    /// Ball removed and the opponent receives a penalty ball.
    RetractionAndPenaltyBall,
    /// Penalty ball for the opponent plus a yellow card.
    PenaltyBallAndYellowCard,
    /// Warning; a second one forfeits the match.
    YellowCard,
    /// Immediate forfeit of the match.
    RedCard,
    /// The end is replayed from scratch.
    RestartedEnd,
    /// Offender concedes the match.
    Forfeit,
}

impl PenaltyKind {
    fn gives_yellow(self) -> bool {
        matches!(
            self,
            PenaltyKind::YellowCard | PenaltyKind::PenaltyBallAndYellowCard
        )
    }

    fn gives_penalty_ball(self) -> bool {
        matches!(
            self,
            PenaltyKind::PenaltyBall
                | PenaltyKind::RetractionAndPenaltyBall
                | PenaltyKind::PenaltyBallAndYellowCard
        )
    }
}

/// Per-side counter the operator can walk back by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PenaltyCounter {
    /// Penalty balls owed to the side.
    PenaltyBall,
    /// Yellow cards of the side.
    YellowCard,
    /// Red cards of the side.
    RedCard,
}

/// A penalty against `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyAction {
    /// Offending side.
    pub side: Side,
    /// Sanction applied.
    pub kind: PenaltyKind,
}

/// Penalty staged until the operator confirms it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PendingAction {
    /// Nothing staged.
    #[default]
    None,
    /// A severe penalty waits for the operator.
    AwaitingConfirmation { action: PenaltyAction },
}

fn is_second_yellow(state: &MatchState, action: PenaltyAction) -> bool {
    action.kind.gives_yellow() && state.progress.side(action.side).yellow_card_count == 1
}

/// Whether applying `action` must wait for an explicit confirmation.
pub fn requires_confirmation(state: &MatchState, action: PenaltyAction) -> bool {
    matches!(
        action.kind,
        PenaltyKind::RedCard | PenaltyKind::RestartedEnd | PenaltyKind::Forfeit
    ) || is_second_yellow(state, action)
}

fn causes_forfeit(state: &MatchState, action: PenaltyAction) -> bool {
    matches!(action.kind, PenaltyKind::RedCard | PenaltyKind::Forfeit)
        || is_second_yellow(state, action)
}

/// Record a penalty, or stage it when it needs confirmation.
pub(crate) fn propose(
    state: &mut MatchState,
    action: PenaltyAction,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    if state.progress.pending != PendingAction::None {
        return Err(RuleError::PenaltyPending);
    }
    if requires_confirmation(state, action) {
        state.progress.pending = PendingAction::AwaitingConfirmation { action };
        return Ok(vec![MatchEffect::PenaltyStaged {
            side: action.side,
            kind: action.kind,
        }]);
    }
    Ok(apply(state, action, now_ms))
}

pub(crate) fn confirm(state: &mut MatchState, now_ms: i64) -> Result<Vec<MatchEffect>, RuleError> {
    match std::mem::take(&mut state.progress.pending) {
        PendingAction::AwaitingConfirmation { action } => Ok(apply(state, action, now_ms)),
        PendingAction::None => Err(RuleError::NothingPending),
    }
}

pub(crate) fn cancel(state: &mut MatchState) -> Result<Vec<MatchEffect>, RuleError> {
    match std::mem::take(&mut state.progress.pending) {
        PendingAction::AwaitingConfirmation { .. } => Ok(vec![MatchEffect::PenaltyCancelled]),
        PendingAction::None => Err(RuleError::NothingPending),
    }
}

fn apply(state: &mut MatchState, action: PenaltyAction, now_ms: i64) -> Vec<MatchEffect> {
    let PenaltyAction { side, kind } = action;
    let forfeit = causes_forfeit(state, action);
    let end_number = state.progress.end_number;

    let offender = state.progress.side_mut(side);
    offender.end_score_mut(end_number).penalties.push(kind);
    if kind.gives_yellow() {
        offender.yellow_card_count += 1;
    }
    if kind == PenaltyKind::RedCard {
        offender.red_card_count += 1;
    }
    if kind.gives_penalty_ball() {
        state.progress.side_mut(side.opponent()).penalty_ball_count += 1;
    }

    let mut effects = vec![MatchEffect::PenaltyApplied { side, kind }];
    if forfeit {
        effects.extend(apply_forfeit(state, side, now_ms));
        return effects;
    }
    if kind == PenaltyKind::RestartedEnd {
        restart_end(state);
    }
    effects.extend(refresh_penalty_throw(state));
    effects
}

fn apply_forfeit(state: &mut MatchState, offender: Side, now_ms: i64) -> Vec<MatchEffect> {
    let forfeit_score = state.settings.rules.forfeit_score;
    state.progress.side_mut(offender).score = 0;
    state.progress.side_mut(offender.opponent()).score = forfeit_score;

    let mut effects = vec![MatchEffect::Forfeit { offender }];
    if let Some(index) = state
        .settings
        .sections
        .iter()
        .position(|s| *s == SectionId::MatchFinished)
    {
        effects.extend(enter_section(state, index, now_ms));
    }
    effects
}

/// Restore the current end's entry allocation and clear its shot log.
fn restart_end(state: &mut MatchState) {
    let alloc = allocation(state.progress.section, &state.settings);
    let progress = &mut state.progress;
    for side in Side::BOTH {
        let entry = progress.side_mut(side);
        entry.ball_count = alloc.balls(side);
        entry.penalty_throw = false;
        entry.clock.reset(alloc.clock_limit_ms);
    }
    progress.screen.penalty_throw_active = false;
    if let Some(log) = progress.shot_log.get_mut(&progress.end_number) {
        log.clear();
    }
}

/// Enter the penalty-throw sub-state for any side that has thrown out with penalty
/// balls owed, and leave it once every penalty ball is used.
pub(crate) fn refresh_penalty_throw(state: &mut MatchState) -> Vec<MatchEffect> {
    let penalty_throw_ms = state.settings.rules.penalty_throw_ms;
    let progress = &mut state.progress;
    let mut effects = Vec::new();

    for side in Side::BOTH {
        let entry = progress.side_mut(side);
        if !entry.penalty_throw && entry.ball_count == 0 && entry.penalty_ball_count > 0 {
            entry.penalty_throw = true;
            entry.ball_count = entry.penalty_ball_count.min(u32::from(MAX_BALLS)) as u8;
            entry.clock.rearm(penalty_throw_ms);
            progress.screen.penalty_throw_active = true;
            effects.push(MatchEffect::PenaltyThrowStarted { side });
        }
    }

    if progress.screen.penalty_throw_active
        && progress.red.penalty_ball_count == 0
        && progress.blue.penalty_ball_count == 0
    {
        progress.screen.penalty_throw_active = false;
        progress.red.penalty_throw = false;
        progress.blue.penalty_throw = false;
        effects.push(MatchEffect::PenaltyThrowFinished);
    }
    effects
}

/// Consume one penalty ball of `side` (thrown or timed out). The caller has
/// already removed the ball from `ball_count`.
pub(crate) fn consume_penalty_ball(state: &mut MatchState, side: Side) -> Vec<MatchEffect> {
    let penalty_throw_ms = state.settings.rules.penalty_throw_ms;
    let entry = state.progress.side_mut(side);
    entry.penalty_ball_count = entry.penalty_ball_count.saturating_sub(1);
    if entry.penalty_ball_count > 0 {
        entry.clock.rearm(penalty_throw_ms);
    } else {
        entry.penalty_throw = false;
    }
    refresh_penalty_throw(state)
}

/// Walk a counter back by one, clamping at zero.
pub(crate) fn decrement(
    state: &mut MatchState,
    side: Side,
    counter: PenaltyCounter,
) -> Vec<MatchEffect> {
    let entry = state.progress.side_mut(side);
    let value = match counter {
        PenaltyCounter::PenaltyBall => &mut entry.penalty_ball_count,
        PenaltyCounter::YellowCard => &mut entry.yellow_card_count,
        PenaltyCounter::RedCard => &mut entry.red_card_count,
    };
    *value = value.saturating_sub(1);

    if counter != PenaltyCounter::PenaltyBall {
        return Vec::new();
    }
    if entry.penalty_throw {
        let owed = entry.penalty_ball_count.min(u32::from(MAX_BALLS)) as u8;
        entry.ball_count = entry.ball_count.min(owed);
        if entry.penalty_ball_count == 0 {
            entry.penalty_throw = false;
        }
    }
    refresh_penalty_throw(state)
}
