//! Pure state transitions for a match.
//!
//! [`reduce`] never touches the original state: it works on a copy and returns it
//! along with the effects the transition produced. The version counter moves only
//! when the content actually changed, so no-op actions are invisible to viewers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    ball_count::MAX_BALLS,
    clock::{Clock, ClockEvent},
    match_state::{ApprovalRole, ClockLimits, MatchProgress, MatchState, RuleSet, Side},
    penalty::{self, PenaltyAction, PenaltyCounter, PenaltyKind},
    sections::{self, SectionId, TieBreakMode, WarmupMode, allocation},
};

/// Largest number of ends a match may be configured with.
pub const MAX_ENDS: u32 = 12;

/// Clock addressed by a clock action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ClockTarget {
    /// Red player clock.
    Red,
    /// Blue player clock.
    Blue,
    /// Warmup clock.
    Warmup,
    /// Interval clock.
    Interval,
}

impl From<Side> for ClockTarget {
    fn from(side: Side) -> Self {
        match side {
            Side::Red => ClockTarget::Red,
            Side::Blue => ClockTarget::Blue,
        }
    }
}

impl ClockTarget {
    fn side(self) -> Option<Side> {
        match self {
            ClockTarget::Red => Some(Side::Red),
            ClockTarget::Blue => Some(Side::Blue),
            ClockTarget::Warmup | ClockTarget::Interval => None,
        }
    }
}

impl fmt::Display for ClockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClockTarget::Red => "red",
            ClockTarget::Blue => "blue",
            ClockTarget::Warmup => "warmup",
            ClockTarget::Interval => "interval",
        };
        f.write_str(name)
    }
}

/// Partial update of the match configuration. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub red_name: Option<String>,
    pub blue_name: Option<String>,
    pub classification: Option<String>,
    pub total_ends: Option<u32>,
    pub warmup: Option<WarmupMode>,
    pub interval_enabled: Option<bool>,
    pub result_approval: Option<bool>,
    pub tie_break: Option<TieBreakMode>,
    pub rules: Option<RuleSet>,
    pub clocks: Option<ClockLimits>,
}

/// Operator intent. Every controller input and the clock driver's tick go through
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MatchAction {
    /// Move to the next section of the schedule.
    Advance,
    /// Move to any section by index.
    Jump { index: usize },
    /// Schedule a tie-break after a draw.
    SelectTieBreak { mode: TieBreakMode },
    /// Set the tie-break mark of `side`.
    SetTieBreakFlag { side: Side, value: bool },
    /// Start a clock.
    StartClock { clock: ClockTarget },
    /// Stop a clock, keeping its value.
    StopClock { clock: ClockTarget },
    /// Stop a clock and restore its limit.
    ResetClock { clock: ClockTarget },
    /// Set a stopped clock to an arbitrary value (clamped to its limit).
    AdjustClock { clock: ClockTarget, remaining_ms: u64 },
    /// Re-evaluate running clocks against the wall clock.
    Tick,
    /// `side` threw one ball.
    RecordThrow { side: Side },
    /// Undo the last throw of `side`.
    RestoreBall { side: Side },
    /// Add `delta` to the current end's score of `side`.
    AdjustScore { side: Side, delta: i32 },
    /// Overwrite the score of `side` for `end`.
    SetEndScore { side: Side, end: u32, score: u32 },
    /// Penalise `side`; severe penalties are staged for confirmation.
    ProposePenalty { side: Side, kind: PenaltyKind },
    /// Apply the staged penalty.
    ConfirmPenalty,
    /// Drop the staged penalty.
    CancelPenalty,
    /// Walk one penalty counter of `side` back by one.
    DecrementPenalty { side: Side, counter: PenaltyCounter },
    /// Record a result signature.
    SetApproval { role: ApprovalRole, approved: bool },
    /// Highlight a side, or clear the highlight.
    SetHighlight { side: Option<Side> },
    /// Toggle the score correction banner.
    SetScoreAdjusting { value: bool },
    /// Toggle the ball colour confirmation.
    SetColorConfirmed { value: bool },
    /// Change the configuration; rebuilds the schedule when needed.
    UpdateSettings { patch: SettingsPatch },
    /// Start over with the same configuration.
    Rematch,
}

impl MatchAction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            MatchAction::Advance => "advance",
            MatchAction::Jump { .. } => "jump",
            MatchAction::SelectTieBreak { .. } => "selectTieBreak",
            MatchAction::SetTieBreakFlag { .. } => "setTieBreakFlag",
            MatchAction::StartClock { .. } => "startClock",
            MatchAction::StopClock { .. } => "stopClock",
            MatchAction::ResetClock { .. } => "resetClock",
            MatchAction::AdjustClock { .. } => "adjustClock",
            MatchAction::Tick => "tick",
            MatchAction::RecordThrow { .. } => "recordThrow",
            MatchAction::RestoreBall { .. } => "restoreBall",
            MatchAction::AdjustScore { .. } => "adjustScore",
            MatchAction::SetEndScore { .. } => "setEndScore",
            MatchAction::ProposePenalty { .. } => "proposePenalty",
            MatchAction::ConfirmPenalty => "confirmPenalty",
            MatchAction::CancelPenalty => "cancelPenalty",
            MatchAction::DecrementPenalty { .. } => "decrementPenalty",
            MatchAction::SetApproval { .. } => "setApproval",
            MatchAction::SetHighlight { .. } => "setHighlight",
            MatchAction::SetScoreAdjusting { .. } => "setScoreAdjusting",
            MatchAction::SetColorConfirmed { .. } => "setColorConfirmed",
            MatchAction::UpdateSettings { .. } => "updateSettings",
            MatchAction::Rematch => "rematch",
        }
    }
}

/// Something observable that happened while applying an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MatchEffect {
    /// A new section became current.
    SectionEntered {
        #[schema(value_type = String)]
        section: SectionId,
        index: usize,
    },
    /// The section schedule was rebuilt.
    ScheduleChanged,
    /// A clock started.
    ClockStarted { clock: ClockTarget, remaining_ms: u64 },
    /// A clock stopped.
    ClockStopped { clock: ClockTarget, remaining_ms: u64 },
    /// A clock crossed a warning threshold.
    ClockWarning { clock: ClockTarget, threshold_ms: u64 },
    /// A clock reached zero.
    ClockExpired { clock: ClockTarget },
    /// A penalty waits for confirmation.
    PenaltyStaged { side: Side, kind: PenaltyKind },
    /// A penalty took effect.
    PenaltyApplied { side: Side, kind: PenaltyKind },
    /// The staged penalty was dropped.
    PenaltyCancelled,
    /// `offender` forfeited the match.
    Forfeit { offender: Side },
    /// `side` started throwing its penalty balls.
    PenaltyThrowStarted { side: Side },
    /// Every penalty ball has been thrown.
    PenaltyThrowFinished,
    /// The result is known; `None` means a draw.
    ResultDeclared { winner: Option<Side> },
    /// All result signatures are in.
    MatchCompleted,
}

/// Action rejected by the match rules; the state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Advance past the last section.
    #[error("no section follows `{0}`")]
    TerminalSection(SectionId),
    /// Jump target outside the schedule.
    #[error("section index {index} is out of range (schedule has {len} sections)")]
    SectionOutOfRange { index: usize, len: usize },
    /// Tie-break requested without a draw.
    #[error("a tie-break requires equal scores (red {red}, blue {blue})")]
    NotTied { red: u32, blue: u32 },
    /// Tie-break requested too early.
    #[error("a tie-break can only be selected at the final end or once the match is finished")]
    TieBreakUnavailable,
    /// Second tie-break requested.
    #[error("a tie-break is already scheduled")]
    TieBreakAlreadyScheduled,
    /// A penalty is already staged.
    #[error("a penalty is already awaiting confirmation")]
    PenaltyPending,
    /// No penalty is staged.
    #[error("no penalty is awaiting confirmation")]
    NothingPending,
    /// Clock must be stopped for this action.
    #[error("the {0} clock must be stopped first")]
    ClockRunning(ClockTarget),
    /// Action only allowed during an end.
    #[error("`{0}` is not an end")]
    NotInEnd(SectionId),
    /// Throw without balls left.
    #[error("{0} has no balls left")]
    NoBallsLeft(Side),
    /// Ball restored beyond the maximum.
    #[error("{0} already holds the maximum number of balls")]
    BallLimit(Side),
    /// End number outside the match.
    #[error("end {0} does not exist in this match")]
    UnknownEnd(u32),
    /// Score would not fit the score range.
    #[error("score for {0} is out of range")]
    ScoreOutOfRange(Side),
    /// Signature before the match finished.
    #[error("approvals are only accepted once the match is finished")]
    ApprovalUnavailable,
    /// Rejected configuration.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Outcome of a successful [`reduce`].
#[derive(Debug, Clone)]
pub struct Reduction {
    /// State after the action.
    pub state: MatchState,
    /// What happened, in order.
    pub effects: Vec<MatchEffect>,
    /// The settings partition changed.
    pub settings_changed: bool,
    /// The progress partition changed.
    pub progress_changed: bool,
}

impl Reduction {
    /// Whether anything changed; a no-op keeps the version.
    pub fn changed(&self) -> bool {
        self.settings_changed || self.progress_changed
    }
}

/// Apply `action` to a copy of `current` at wall-clock instant `now_ms`.
pub fn reduce(
    current: &MatchState,
    action: MatchAction,
    now_ms: i64,
) -> Result<Reduction, RuleError> {
    let mut next = current.clone();
    let effects = apply(&mut next, action, now_ms)?;

    let settings_changed = next.settings != current.settings;
    let progress_changed = next.progress != current.progress;
    if settings_changed || progress_changed {
        next.version = current.version + 1;
        next.last_updated_ms = now_ms;
    }

    Ok(Reduction {
        state: next,
        effects,
        settings_changed,
        progress_changed,
    })
}

fn apply(
    state: &mut MatchState,
    action: MatchAction,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    match action {
        MatchAction::Advance => sections::advance(state, now_ms),
        MatchAction::Jump { index } => sections::jump(state, index, now_ms),
        MatchAction::SelectTieBreak { mode } => sections::select_tie_break(state, mode, now_ms),
        MatchAction::SetTieBreakFlag { side, value } => {
            Ok(sections::set_tie_break_flag(state, side, value))
        }
        MatchAction::StartClock { clock } => Ok(start_clock(state, clock, now_ms)),
        MatchAction::StopClock { clock } => {
            Ok(clock_effect(clock, clock_mut(state, clock).stop(now_ms)))
        }
        MatchAction::ResetClock { clock } => {
            let target = clock_mut(state, clock);
            let effects = clock_effect(clock, target.stop(now_ms));
            target.reset_to_limit();
            Ok(effects)
        }
        MatchAction::AdjustClock { clock, remaining_ms } => {
            let target = clock_mut(state, clock);
            if target.is_running() {
                return Err(RuleError::ClockRunning(clock));
            }
            target.rearm(remaining_ms.min(target.limit_ms()));
            Ok(Vec::new())
        }
        MatchAction::Tick => Ok(tick(state, now_ms)),
        MatchAction::RecordThrow { side } => record_throw(state, side, now_ms),
        MatchAction::RestoreBall { side } => restore_ball(state, side),
        MatchAction::AdjustScore { side, delta } => adjust_score(state, side, delta),
        MatchAction::SetEndScore { side, end, score } => set_end_score(state, side, end, score),
        MatchAction::ProposePenalty { side, kind } => {
            penalty::propose(state, PenaltyAction { side, kind }, now_ms)
        }
        MatchAction::ConfirmPenalty => penalty::confirm(state, now_ms),
        MatchAction::CancelPenalty => penalty::cancel(state),
        MatchAction::DecrementPenalty { side, counter } => {
            Ok(penalty::decrement(state, side, counter))
        }
        MatchAction::SetApproval { role, approved } => set_approval(state, role, approved),
        MatchAction::SetHighlight { side } => {
            state.progress.screen.active_highlight = side;
            Ok(Vec::new())
        }
        MatchAction::SetScoreAdjusting { value } => {
            state.progress.screen.score_adjusting = value;
            Ok(Vec::new())
        }
        MatchAction::SetColorConfirmed { value } => {
            state.progress.screen.color_confirmed = value;
            Ok(Vec::new())
        }
        MatchAction::UpdateSettings { patch } => update_settings(state, patch, now_ms),
        MatchAction::Rematch => Ok(rematch(state, now_ms)),
    }
}

fn clock_mut(state: &mut MatchState, target: ClockTarget) -> &mut Clock {
    let progress = &mut state.progress;
    match target {
        ClockTarget::Red => &mut progress.red.clock,
        ClockTarget::Blue => &mut progress.blue.clock,
        ClockTarget::Warmup => &mut progress.warmup,
        ClockTarget::Interval => &mut progress.interval,
    }
}

fn to_effect(clock: ClockTarget, event: ClockEvent) -> MatchEffect {
    match event {
        ClockEvent::Started { remaining_ms } => MatchEffect::ClockStarted { clock, remaining_ms },
        ClockEvent::Stopped { remaining_ms } => MatchEffect::ClockStopped { clock, remaining_ms },
        ClockEvent::Warning { threshold_ms } => MatchEffect::ClockWarning { clock, threshold_ms },
        ClockEvent::Expired => MatchEffect::ClockExpired { clock },
    }
}

fn clock_effect(clock: ClockTarget, event: Option<ClockEvent>) -> Vec<MatchEffect> {
    event.map(|e| to_effect(clock, e)).into_iter().collect()
}

/// Start a clock; starting one player clock stops the other.
fn start_clock(state: &mut MatchState, target: ClockTarget, now_ms: i64) -> Vec<MatchEffect> {
    let mut effects = Vec::new();
    if let Some(side) = target.side() {
        let other = side.opponent();
        let stopped = state.progress.side_mut(other).clock.stop(now_ms);
        effects.extend(clock_effect(other.into(), stopped));
    }

    let started = clock_mut(state, target).start(now_ms);
    if started.is_some() {
        if let Some(side) = target.side() {
            state.progress.screen.active_highlight = Some(side);
        }
    }
    effects.extend(clock_effect(target, started));
    effects
}

fn tick(state: &mut MatchState, now_ms: i64) -> Vec<MatchEffect> {
    let mut effects = Vec::new();

    for side in Side::BOTH {
        let events = state.progress.side_mut(side).clock.tick(now_ms);
        for event in events {
            effects.push(to_effect(side.into(), event));
            if event == ClockEvent::Expired {
                effects.extend(expire_player_clock(state, side));
            }
        }
    }

    let events = state.progress.warmup.tick(now_ms);
    effects.extend(events.into_iter().map(|e| to_effect(ClockTarget::Warmup, e)));

    let events = state.progress.interval.tick(now_ms);
    let interval_expired = events.contains(&ClockEvent::Expired);
    effects.extend(events.into_iter().map(|e| to_effect(ClockTarget::Interval, e)));
    if interval_expired
        && state.settings.rules.auto_advance_interval
        && state.progress.section == SectionId::Interval
    {
        if let Ok(entered) = sections::advance(state, now_ms) {
            effects.extend(entered);
        }
    }

    effects
}

/// A side that runs out of time loses its remaining balls; during a penalty throw
/// only the ball being thrown is lost.
fn expire_player_clock(state: &mut MatchState, side: Side) -> Vec<MatchEffect> {
    let entry = state.progress.side_mut(side);
    if entry.penalty_throw {
        entry.ball_count = entry.ball_count.saturating_sub(1);
        return penalty::consume_penalty_ball(state, side);
    }
    entry.ball_count = 0;
    penalty::refresh_penalty_throw(state)
}

fn record_throw(
    state: &mut MatchState,
    side: Side,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    let end_number = state.progress.end_number;
    if end_number == 0 {
        return Err(RuleError::NotInEnd(state.progress.section));
    }
    let entry = state.progress.side_mut(side);
    if entry.ball_count == 0 {
        return Err(RuleError::NoBallsLeft(side));
    }
    entry.ball_count -= 1;
    let in_penalty_throw = entry.penalty_throw;
    let mut effects = clock_effect(side.into(), entry.clock.stop(now_ms));

    state.progress.shot_log.entry(end_number).or_default().push(side);
    if in_penalty_throw {
        effects.extend(penalty::consume_penalty_ball(state, side));
    } else {
        effects.extend(penalty::refresh_penalty_throw(state));
    }
    Ok(effects)
}

fn restore_ball(state: &mut MatchState, side: Side) -> Result<Vec<MatchEffect>, RuleError> {
    let end_number = state.progress.end_number;
    let entry = state.progress.side_mut(side);
    if entry.ball_count >= MAX_BALLS {
        return Err(RuleError::BallLimit(side));
    }
    entry.ball_count += 1;
    if entry.penalty_throw {
        entry.penalty_ball_count += 1;
    }

    if let Some(log) = state.progress.shot_log.get_mut(&end_number) {
        if let Some(last) = log.iter().rposition(|thrower| *thrower == side) {
            log.remove(last);
        }
    }
    Ok(Vec::new())
}

fn adjust_score(
    state: &mut MatchState,
    side: Side,
    delta: i32,
) -> Result<Vec<MatchEffect>, RuleError> {
    let end_number = state.progress.end_number;
    if end_number == 0 {
        return Err(RuleError::NotInEnd(state.progress.section));
    }
    let entry = state.progress.side_mut(side);
    let before = entry
        .scores_by_end
        .get(&end_number)
        .map_or(0, |end| i64::from(end.score));
    let end_score = u32::try_from((before + i64::from(delta)).max(0))
        .map_err(|_| RuleError::ScoreOutOfRange(side))?;
    let total = u32::try_from((i64::from(entry.score) - before + i64::from(end_score)).max(0))
        .map_err(|_| RuleError::ScoreOutOfRange(side))?;

    entry.end_score_mut(end_number).score = end_score;
    entry.score = total;
    Ok(Vec::new())
}

fn set_end_score(
    state: &mut MatchState,
    side: Side,
    end: u32,
    score: u32,
) -> Result<Vec<MatchEffect>, RuleError> {
    if end == 0 || end > state.settings.total_ends + 1 {
        return Err(RuleError::UnknownEnd(end));
    }
    let entry = state.progress.side_mut(side);
    let before = entry.scores_by_end.get(&end).map_or(0, |slot| slot.score);
    let total = entry
        .score
        .saturating_sub(before)
        .checked_add(score)
        .ok_or(RuleError::ScoreOutOfRange(side))?;

    entry.end_score_mut(end).score = score;
    entry.score = total;
    Ok(Vec::new())
}

fn set_approval(
    state: &mut MatchState,
    role: ApprovalRole,
    approved: bool,
) -> Result<Vec<MatchEffect>, RuleError> {
    if !matches!(
        state.progress.section,
        SectionId::MatchFinished | SectionId::ResultApproval
    ) {
        return Err(RuleError::ApprovalUnavailable);
    }
    let approvals = &mut state.progress.approvals;
    let was_completed = approvals.completed();
    approvals.set(role, approved);
    if approvals.completed() && !was_completed {
        Ok(vec![MatchEffect::MatchCompleted])
    } else {
        Ok(Vec::new())
    }
}

fn validate_patch(patch: &SettingsPatch) -> Result<(), RuleError> {
    if let Some(total_ends) = patch.total_ends {
        if !(1..=MAX_ENDS).contains(&total_ends) {
            return Err(RuleError::InvalidSettings(format!(
                "totalEnds must be between 1 and {MAX_ENDS}, got {total_ends}"
            )));
        }
    }
    if let Some(clocks) = &patch.clocks {
        if clocks.player_ms == 0 || clocks.warmup_ms == 0 || clocks.interval_ms == 0 {
            return Err(RuleError::InvalidSettings("clock limits must be positive".into()));
        }
    }
    if let Some(rules) = &patch.rules {
        if rules.penalty_throw_ms == 0 || rules.final_shot_ms == 0 {
            return Err(RuleError::InvalidSettings("rule clock limits must be positive".into()));
        }
    }
    Ok(())
}

fn update_settings(
    state: &mut MatchState,
    patch: SettingsPatch,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    validate_patch(&patch)?;

    let settings = &mut state.settings;
    let shape_before = (
        settings.total_ends,
        settings.warmup,
        settings.interval_enabled,
        settings.result_approval,
    );
    let limits_before = (settings.clocks.clone(), settings.rules.clone());

    if let Some(name) = patch.red_name {
        settings.red_name = name;
    }
    if let Some(name) = patch.blue_name {
        settings.blue_name = name;
    }
    if let Some(classification) = patch.classification {
        settings.classification = classification;
    }
    if let Some(total_ends) = patch.total_ends {
        settings.total_ends = total_ends;
    }
    if let Some(warmup) = patch.warmup {
        settings.warmup = warmup;
    }
    if let Some(enabled) = patch.interval_enabled {
        settings.interval_enabled = enabled;
    }
    if let Some(enabled) = patch.result_approval {
        settings.result_approval = enabled;
    }
    if let Some(mode) = patch.tie_break {
        settings.tie_break = mode;
    }
    if let Some(rules) = patch.rules {
        settings.rules = rules;
    }
    if let Some(clocks) = patch.clocks {
        settings.clocks = clocks;
    }

    let mut effects = Vec::new();
    let shape_after = (
        settings.total_ends,
        settings.warmup,
        settings.interval_enabled,
        settings.result_approval,
    );
    if shape_after != shape_before {
        let previous = std::mem::take(&mut settings.sections);
        settings.regenerate_sections();
        effects.push(MatchEffect::ScheduleChanged);
        effects.extend(sections::relocate(state, &previous, now_ms));
    }

    if (state.settings.clocks.clone(), state.settings.rules.clone()) != limits_before {
        let player_limit = allocation(state.progress.section, &state.settings).clock_limit_ms;
        let progress = &mut state.progress;
        for side in Side::BOTH {
            let entry = progress.side_mut(side);
            if !entry.penalty_throw {
                entry.clock.set_limit(player_limit);
            }
        }
        progress.warmup.set_limit(state.settings.clocks.warmup_ms);
        progress.interval.set_limit(state.settings.clocks.interval_ms);
    }

    Ok(effects)
}

fn rematch(state: &mut MatchState, now_ms: i64) -> Vec<MatchEffect> {
    let previous = state.settings.sections.clone();
    state.settings.regenerate_sections();
    state.progress = MatchProgress::fresh(&state.settings);

    let mut effects = Vec::new();
    if previous != state.settings.sections {
        effects.push(MatchEffect::ScheduleChanged);
    }
    effects.extend(sections::enter_section(state, 0, now_ms));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        match_state::{MatchKey, MatchResult, MatchSettings},
        penalty::PendingAction,
    };

    fn fresh() -> MatchState {
        MatchState::new(MatchKey::new("ev", "c"), MatchSettings::default())
    }

    fn run(state: &MatchState, action: MatchAction, now_ms: i64) -> MatchState {
        reduce(state, action, now_ms).unwrap().state
    }

    fn at(section: SectionId) -> MatchState {
        let state = fresh();
        let index = state
            .settings
            .sections
            .iter()
            .position(|s| *s == section)
            .unwrap();
        run(&state, MatchAction::Jump { index }, 0)
    }

    #[test]
    fn effective_change_bumps_version_and_timestamp() {
        let state = fresh();
        let next = run(&state, MatchAction::Advance, 1_234);

        assert_eq!(next.version, state.version + 1);
        assert_eq!(next.last_updated_ms, 1_234);
        assert_eq!(next.section(), SectionId::Warmup);
    }

    #[test]
    fn no_op_keeps_version() {
        let state = fresh();
        let action = MatchAction::StopClock {
            clock: ClockTarget::Red,
        };
        let reduction = reduce(&state, action, 10).unwrap();

        assert!(!reduction.changed());
        assert_eq!(reduction.state.version, state.version);
        assert_eq!(reduction.state.last_updated_ms, state.last_updated_ms);
    }

    #[test]
    fn rejected_action_leaves_state_untouched() {
        let state = fresh();
        let before = state.clone();
        let err = reduce(&state, MatchAction::ConfirmPenalty, 0).unwrap_err();

        assert_eq!(err, RuleError::NothingPending);
        assert_eq!(state, before);
    }

    #[test]
    fn player_clocks_are_mutually_exclusive() {
        let state = at(SectionId::End(1));
        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Red }, 0);
        let action = MatchAction::StartClock {
            clock: ClockTarget::Blue,
        };
        let reduction = reduce(&state, action, 4_000).unwrap();
        let state = reduction.state;

        assert!(!state.progress.red.clock.is_running());
        assert!(state.progress.blue.clock.is_running());
        assert_eq!(state.progress.red.clock.remaining_ms(), 296_000);
        assert_eq!(state.progress.screen.active_highlight, Some(Side::Blue));
        assert_eq!(
            reduction.effects,
            vec![
                MatchEffect::ClockStopped {
                    clock: ClockTarget::Red,
                    remaining_ms: 296_000
                },
                MatchEffect::ClockStarted {
                    clock: ClockTarget::Blue,
                    remaining_ms: 300_000
                },
            ]
        );
    }

    #[test]
    fn ticks_without_crossings_do_not_change_content() {
        let state = at(SectionId::End(1));
        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Red }, 0);
        let reduction = reduce(&state, MatchAction::Tick, 1_000).unwrap();
        assert!(!reduction.changed());

        let reduction = reduce(&state, MatchAction::Tick, 240_100).unwrap();
        assert!(reduction.changed());
        assert_eq!(
            reduction.effects,
            vec![MatchEffect::ClockWarning {
                clock: ClockTarget::Red,
                threshold_ms: 60_000
            }]
        );
    }

    #[test]
    fn player_expiry_voids_remaining_balls() {
        let state = at(SectionId::End(1));
        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Blue }, 0);
        let reduction = reduce(&state, MatchAction::Tick, 301_000).unwrap();

        assert!(reduction.effects.contains(&MatchEffect::ClockExpired {
            clock: ClockTarget::Blue
        }));
        assert_eq!(reduction.state.progress.blue.ball_count, 0);
        assert_eq!(reduction.state.progress.red.ball_count, 7);
        assert_eq!(reduction.state.progress.blue.clock.remaining_ms(), 0);
    }

    #[test]
    fn interval_expiry_advances_when_enabled() {
        let state = at(SectionId::Interval);
        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Interval }, 0);
        let next = run(&state, MatchAction::Tick, 61_000);
        assert_eq!(next.section(), SectionId::End(2));

        let mut manual = state.clone();
        manual.settings.rules.auto_advance_interval = false;
        let next = run(&manual, MatchAction::Tick, 61_000);
        assert_eq!(next.section(), SectionId::Interval);
        assert!(next.progress.interval.is_expired());
    }

    #[test]
    fn throws_decrement_balls_and_log_shots() {
        let state = at(SectionId::End(1));
        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Red }, 0);
        let state = run(&state, MatchAction::RecordThrow { side: Side::Red }, 5_000);
        let state = run(&state, MatchAction::RecordThrow { side: Side::Blue }, 6_000);

        assert_eq!(state.progress.red.ball_count, 6);
        assert_eq!(state.progress.blue.ball_count, 5);
        assert!(!state.progress.red.clock.is_running());
        assert_eq!(state.progress.shot_log[&1], vec![Side::Red, Side::Blue]);

        let state = run(&state, MatchAction::RestoreBall { side: Side::Red }, 7_000);
        assert_eq!(state.progress.red.ball_count, 7);
        assert_eq!(state.progress.shot_log[&1], vec![Side::Blue]);
        assert_eq!(
            reduce(&state, MatchAction::RestoreBall { side: Side::Red }, 0).unwrap_err(),
            RuleError::BallLimit(Side::Red)
        );
    }

    #[test]
    fn throws_outside_ends_are_rejected() {
        let state = fresh();
        assert_eq!(
            reduce(&state, MatchAction::RecordThrow { side: Side::Red }, 0).unwrap_err(),
            RuleError::NotInEnd(SectionId::Standby)
        );
    }

    #[test]
    fn scores_accumulate_per_end_and_floor_at_zero() {
        let state = at(SectionId::End(1));
        let state = run(&state, MatchAction::AdjustScore { side: Side::Red, delta: 2 }, 0);
        let state = run(&state, MatchAction::AdjustScore { side: Side::Red, delta: -5 }, 0);
        assert_eq!(state.progress.red.score, 0);
        assert_eq!(state.progress.red.scores_by_end[&1].score, 0);

        let state = run(
            &state,
            MatchAction::SetEndScore {
                side: Side::Blue,
                end: 1,
                score: 3,
            },
            0,
        );
        let state = run(
            &state,
            MatchAction::SetEndScore {
                side: Side::Blue,
                end: 1,
                score: 1,
            },
            0,
        );
        assert_eq!(state.progress.blue.score, 1);
        assert_eq!(
            reduce(
                &state,
                MatchAction::SetEndScore {
                    side: Side::Blue,
                    end: 9,
                    score: 1
                },
                0
            )
            .unwrap_err(),
            RuleError::UnknownEnd(9)
        );
    }

    #[test]
    fn oversized_scores_are_rejected() {
        let state = at(SectionId::End(2));
        let state = run(&state, MatchAction::AdjustScore { side: Side::Red, delta: 1 }, 0);

        let huge = MatchAction::SetEndScore {
            side: Side::Red,
            end: 1,
            score: u32::MAX,
        };
        assert_eq!(
            reduce(&state, huge, 0).unwrap_err(),
            RuleError::ScoreOutOfRange(Side::Red)
        );

        let state = run(
            &state,
            MatchAction::SetEndScore {
                side: Side::Red,
                end: 1,
                score: u32::MAX - 1,
            },
            0,
        );
        assert_eq!(state.progress.red.score, u32::MAX);
        assert_eq!(
            reduce(&state, MatchAction::AdjustScore { side: Side::Red, delta: 1 }, 0).unwrap_err(),
            RuleError::ScoreOutOfRange(Side::Red)
        );
        let state = run(&state, MatchAction::AdjustScore { side: Side::Red, delta: -1 }, 0);
        assert_eq!(state.progress.red.score, u32::MAX - 1);
        assert_eq!(state.progress.red.scores_by_end[&2].score, 0);
    }

    #[test]
    fn full_match_reaches_completion() {
        let mut state = fresh();
        for _ in 0..2 {
            state = run(&state, MatchAction::Advance, 0);
        }
        assert_eq!(state.section(), SectionId::End(1));
        state = run(&state, MatchAction::AdjustScore { side: Side::Blue, delta: 3 }, 0);
        while state.section() != SectionId::MatchFinished {
            state = run(&state, MatchAction::Advance, 0);
        }
        assert_eq!(state.progress.blue.result, MatchResult::Win);
        assert_eq!(state.progress.red.result, MatchResult::Lose);

        assert_eq!(
            reduce(
                &at(SectionId::End(2)),
                MatchAction::SetApproval {
                    role: ApprovalRole::Referee,
                    approved: true
                },
                0
            )
            .unwrap_err(),
            RuleError::ApprovalUnavailable
        );

        state = run(&state, MatchAction::Advance, 0);
        assert_eq!(state.section(), SectionId::ResultApproval);
        for role in [ApprovalRole::Red, ApprovalRole::Blue] {
            state = run(&state, MatchAction::SetApproval { role, approved: true }, 0);
        }
        let reduction = reduce(
            &state,
            MatchAction::SetApproval {
                role: ApprovalRole::Referee,
                approved: true,
            },
            0,
        )
        .unwrap();
        assert_eq!(reduction.effects, vec![MatchEffect::MatchCompleted]);
        assert!(reduction.state.progress.approvals.completed());
    }

    #[test]
    fn forfeit_needs_confirmation_then_finishes_match() {
        let state = at(SectionId::End(2));
        let state = run(
            &state,
            MatchAction::ProposePenalty {
                side: Side::Red,
                kind: PenaltyKind::Forfeit,
            },
            0,
        );
        assert!(matches!(state.progress.pending, PendingAction::AwaitingConfirmation { .. }));
        assert_eq!(state.section(), SectionId::End(2));

        let state = run(&state, MatchAction::ConfirmPenalty, 0);
        assert_eq!(state.section(), SectionId::MatchFinished);
        assert_eq!(state.progress.red.score, 0);
        assert_eq!(state.progress.blue.score, 6);
        assert_eq!(state.progress.blue.result, MatchResult::Win);
    }

    #[test]
    fn penalty_throw_runs_through_throws_and_expiry() {
        let state = at(SectionId::End(1));
        let state = run(
            &state,
            MatchAction::ProposePenalty {
                side: Side::Blue,
                kind: PenaltyKind::PenaltyBall,
            },
            0,
        );
        let state = run(
            &state,
            MatchAction::ProposePenalty {
                side: Side::Blue,
                kind: PenaltyKind::PenaltyBall,
            },
            0,
        );
        assert_eq!(state.progress.red.penalty_ball_count, 2);

        let mut state = state;
        for _ in 0..7 {
            state = run(&state, MatchAction::RecordThrow { side: Side::Red }, 0);
        }
        assert!(state.progress.screen.penalty_throw_active);
        assert_eq!(state.progress.red.ball_count, 2);
        assert_eq!(state.progress.red.clock.remaining_ms(), 60_000);

        let state = run(&state, MatchAction::RecordThrow { side: Side::Red }, 0);
        assert_eq!(state.progress.red.penalty_ball_count, 1);
        assert_eq!(state.progress.red.ball_count, 1);

        let state = run(&state, MatchAction::StartClock { clock: ClockTarget::Red }, 0);
        let state = run(&state, MatchAction::Tick, 60_500);
        assert_eq!(state.progress.red.penalty_ball_count, 0);
        assert_eq!(state.progress.red.ball_count, 0);
        assert!(!state.progress.screen.penalty_throw_active);
    }

    #[test]
    fn removing_last_penalty_ball_after_opponent_threw_out_ends_penalty_throw() {
        let mut state = at(SectionId::End(1));
        for side in Side::BOTH {
            state = run(
                &state,
                MatchAction::ProposePenalty {
                    side,
                    kind: PenaltyKind::PenaltyBall,
                },
                0,
            );
        }
        assert_eq!(state.progress.red.penalty_ball_count, 1);
        assert_eq!(state.progress.blue.penalty_ball_count, 1);

        for _ in 0..6 {
            state = run(&state, MatchAction::RecordThrow { side: Side::Blue }, 0);
        }
        assert!(state.progress.screen.penalty_throw_active);
        assert_eq!(state.progress.blue.ball_count, 1);

        state = run(&state, MatchAction::RecordThrow { side: Side::Blue }, 0);
        assert_eq!(state.progress.blue.penalty_ball_count, 0);
        assert!(state.progress.screen.penalty_throw_active);

        let reduction = reduce(
            &state,
            MatchAction::DecrementPenalty {
                side: Side::Red,
                counter: PenaltyCounter::PenaltyBall,
            },
            0,
        )
        .unwrap();
        let state = reduction.state;
        assert_eq!(reduction.effects, vec![MatchEffect::PenaltyThrowFinished]);
        assert_eq!(state.progress.red.penalty_ball_count, 0);
        assert!(!state.progress.screen.penalty_throw_active);
        assert!(!state.progress.red.penalty_throw);
        assert!(!state.progress.blue.penalty_throw);
        assert_eq!(state.progress.red.ball_count, 7);
    }

    #[test]
    fn adjust_clock_requires_stopped_clock() {
        let state = at(SectionId::Warmup);
        let running = run(&state, MatchAction::StartClock { clock: ClockTarget::Warmup }, 0);
        assert_eq!(
            reduce(
                &running,
                MatchAction::AdjustClock {
                    clock: ClockTarget::Warmup,
                    remaining_ms: 5_000
                },
                0
            )
            .unwrap_err(),
            RuleError::ClockRunning(ClockTarget::Warmup)
        );

        let adjusted = run(
            &state,
            MatchAction::AdjustClock {
                clock: ClockTarget::Warmup,
                remaining_ms: 999_999,
            },
            0,
        );
        assert_eq!(adjusted.progress.warmup.remaining_ms(), 120_000);
    }

    #[test]
    fn settings_patch_rebuilds_schedule_and_keeps_position() {
        let state = at(SectionId::End(2));
        let patch = SettingsPatch {
            total_ends: Some(6),
            red_name: Some("Tokyo".into()),
            ..SettingsPatch::default()
        };
        let reduction = reduce(&state, MatchAction::UpdateSettings { patch }, 0).unwrap();

        assert!(reduction.settings_changed);
        assert_eq!(reduction.state.settings.red_name, "Tokyo");
        assert_eq!(sections::count_ends(&reduction.state.settings.sections), 6);
        assert_eq!(reduction.state.section(), SectionId::End(2));
        assert_eq!(
            reduction.state.settings.sections[reduction.state.progress.section_index],
            SectionId::End(2)
        );

        let patch = SettingsPatch {
            total_ends: Some(0),
            ..SettingsPatch::default()
        };
        assert!(matches!(
            reduce(&state, MatchAction::UpdateSettings { patch }, 0),
            Err(RuleError::InvalidSettings(_))
        ));
    }

    #[test]
    fn rematch_restores_configured_schedule() {
        let state = at(SectionId::End(4));
        let state = run(
            &state,
            MatchAction::SelectTieBreak {
                mode: TieBreakMode::FinalShot,
            },
            0,
        );
        assert!(state.settings.sections.contains(&SectionId::TieBreak));

        let state = run(&state, MatchAction::Rematch, 0);
        assert!(!state.settings.sections.contains(&SectionId::TieBreak));
        assert_eq!(state.section(), SectionId::Standby);
        assert_eq!(state.progress.red.score, 0);
        assert!(state.progress.shot_log.is_empty());
    }

    #[test]
    fn actions_deserialize_from_tagged_json() {
        let action: MatchAction =
            serde_json::from_str(r#"{"type":"adjustClock","clock":"red","remainingMs":1000}"#)
                .unwrap();
        assert_eq!(
            action,
            MatchAction::AdjustClock {
                clock: ClockTarget::Red,
                remaining_ms: 1_000
            }
        );
        let action: MatchAction = serde_json::from_str(r#"{"type":"advance"}"#).unwrap();
        assert_eq!(action, MatchAction::Advance);
    }
}
