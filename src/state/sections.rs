//! Match schedule and section transitions.
//!
//! The schedule is an ordered list of [`SectionId`]s. Whatever way a section is
//! reached (advance, direct jump, forfeit, tie-break selection) it goes through
//! [`enter_section`], so entry effects never depend on the path taken.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    ball_count::{STANDARD_BALLS, lead_ball_count},
    match_state::{MatchProgress, MatchResult, MatchSettings, MatchState, Screen, Side},
    penalty::PendingAction,
    reducer::{MatchEffect, RuleError},
};

/// A named phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum SectionId {
    /// Before the match.
    Standby,
    /// Joint warmup of both sides.
    Warmup,
    /// First of two separate warmups.
    Warmup1,
    /// Second of two separate warmups.
    Warmup2,
    /// Scoring end, numbered from 1.
    End(u32),
    /// Break between two ends.
    Interval,
    /// Extra end played after a draw.
    TieBreak,
    /// Result display.
    MatchFinished,
    /// Waiting for the three signatures.
    ResultApproval,
}

impl SectionId {
    /// Whether this is a scoring end.
    pub fn is_end(self) -> bool {
        matches!(self, SectionId::End(_))
    }

    /// Whether this is one of the warmup sections.
    pub fn is_warmup(self) -> bool {
        matches!(
            self,
            SectionId::Warmup | SectionId::Warmup1 | SectionId::Warmup2
        )
    }

    /// End number shown for this section: the end itself, `total_ends + 1` for the
    /// tie-break, 0 otherwise.
    pub fn end_number(self, total_ends: u32) -> u32 {
        match self {
            SectionId::End(n) => n,
            SectionId::TieBreak => total_ends + 1,
            _ => 0,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionId::Standby => f.write_str("standby"),
            SectionId::Warmup => f.write_str("warmup"),
            SectionId::Warmup1 => f.write_str("warmup1"),
            SectionId::Warmup2 => f.write_str("warmup2"),
            SectionId::End(n) => write!(f, "end{n}"),
            SectionId::Interval => f.write_str("interval"),
            SectionId::TieBreak => f.write_str("tieBreak"),
            SectionId::MatchFinished => f.write_str("matchFinished"),
            SectionId::ResultApproval => f.write_str("resultApproval"),
        }
    }
}

/// Error returned when a section name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown section `{0}`")]
pub struct UnknownSection(String);

impl FromStr for SectionId {
    type Err = UnknownSection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let section = match value {
            "standby" => SectionId::Standby,
            "warmup" => SectionId::Warmup,
            "warmup1" => SectionId::Warmup1,
            "warmup2" => SectionId::Warmup2,
            "interval" => SectionId::Interval,
            "tieBreak" => SectionId::TieBreak,
            "matchFinished" => SectionId::MatchFinished,
            "resultApproval" => SectionId::ResultApproval,
            other => match other.strip_prefix("end").map(str::parse::<u32>) {
                Some(Ok(n)) if n > 0 => SectionId::End(n),
                _ => return Err(UnknownSection(other.to_string())),
            },
        };
        Ok(section)
    }
}

/// How warmup is organised before the first end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum WarmupMode {
    /// No warmup section.
    None,
    /// Both sides warm up together.
    Simultaneous,
    /// Each side warms up in its own section.
    Separate,
}

/// Procedure used when the match is tied after the final end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TieBreakMode {
    /// A full additional end, preceded by an interval.
    ExtraEnd,
    /// One ball per side.
    FinalShot,
}

/// Deterministic schedule for the given match shape.
pub fn build_schedule(
    total_ends: u32,
    warmup: WarmupMode,
    interval_enabled: bool,
    result_approval: bool,
) -> Vec<SectionId> {
    let mut sections = vec![SectionId::Standby];
    match warmup {
        WarmupMode::None => {}
        WarmupMode::Simultaneous => sections.push(SectionId::Warmup),
        WarmupMode::Separate => sections.extend([SectionId::Warmup1, SectionId::Warmup2]),
    }
    for end in 1..=total_ends {
        if end > 1 && interval_enabled {
            sections.push(SectionId::Interval);
        }
        sections.push(SectionId::End(end));
    }
    sections.push(SectionId::MatchFinished);
    if result_approval {
        sections.push(SectionId::ResultApproval);
    }
    sections
}

/// Number of end sections present in a schedule.
pub fn count_ends(sections: &[SectionId]) -> u32 {
    sections.iter().filter(|section| section.is_end()).count() as u32
}

/// Whether the schedule agrees with the configured shape closely enough to be used.
pub fn schedule_is_consistent(settings: &MatchSettings) -> bool {
    let sections = &settings.sections;
    count_ends(sections) == settings.total_ends
        && sections.first() == Some(&SectionId::Standby)
        && sections.contains(&SectionId::MatchFinished)
        && sections
            .iter()
            .filter(|section| **section == SectionId::TieBreak)
            .count()
            <= 1
}

/// Index the match moves to when advancing from `current`, or `None` when terminal.
pub fn next_index(settings: &MatchSettings, current: usize) -> Option<usize> {
    let sections = &settings.sections;
    let section = *sections.get(current)?;
    let finished = || position(sections, SectionId::MatchFinished);

    match section {
        SectionId::End(n) if n >= settings.total_ends => {
            if tie_break_follows(sections, current) {
                following(settings, current)
            } else {
                finished()
            }
        }
        SectionId::TieBreak => finished(),
        SectionId::MatchFinished => sections[current + 1..]
            .iter()
            .position(|s| *s == SectionId::ResultApproval)
            .map(|offset| current + 1 + offset),
        SectionId::ResultApproval => None,
        _ => following(settings, current),
    }
}

fn following(settings: &MatchSettings, current: usize) -> Option<usize> {
    (current + 1..settings.sections.len())
        .find(|&index| settings.interval_enabled || settings.sections[index] != SectionId::Interval)
}

fn tie_break_follows(sections: &[SectionId], current: usize) -> bool {
    sections[current + 1..]
        .iter()
        .take_while(|s| **s != SectionId::MatchFinished)
        .any(|s| *s == SectionId::TieBreak)
}

fn position(sections: &[SectionId], target: SectionId) -> Option<usize> {
    sections.iter().position(|s| *s == target)
}

/// Ball counts and player clock limit a section starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub red_balls: u8,
    pub blue_balls: u8,
    pub clock_limit_ms: u64,
}

impl Allocation {
    pub fn balls(&self, side: Side) -> u8 {
        match side {
            Side::Red => self.red_balls,
            Side::Blue => self.blue_balls,
        }
    }
}

pub(crate) fn allocation(section: SectionId, settings: &MatchSettings) -> Allocation {
    match section {
        SectionId::End(n) => Allocation {
            red_balls: lead_ball_count(n, Side::Red),
            blue_balls: lead_ball_count(n, Side::Blue),
            clock_limit_ms: settings.clocks.player_ms,
        },
        SectionId::TieBreak if settings.tie_break == TieBreakMode::FinalShot => Allocation {
            red_balls: 1,
            blue_balls: 1,
            clock_limit_ms: settings.rules.final_shot_ms,
        },
        _ => Allocation {
            red_balls: STANDARD_BALLS,
            blue_balls: STANDARD_BALLS,
            clock_limit_ms: settings.clocks.player_ms,
        },
    }
}

/// Move to `index` and apply the per-section reset.
pub(crate) fn enter_section(state: &mut MatchState, index: usize, now_ms: i64) -> Vec<MatchEffect> {
    let section = state.settings.sections[index];
    let total_ends = state.settings.total_ends;
    let alloc = allocation(section, &state.settings);
    let warmup_ms = state.settings.clocks.warmup_ms;
    let interval_ms = state.settings.clocks.interval_ms;
    let progress = &mut state.progress;

    progress.section_index = index;
    progress.section = section;
    progress.end_number = section.end_number(total_ends);
    progress.pending = PendingAction::None;
    progress.screen = Screen::default();

    for side in Side::BOTH {
        let entry = progress.side_mut(side);
        entry.ball_count = alloc.balls(side);
        entry.penalty_ball_count = 0;
        entry.penalty_throw = false;
        entry.clock.reset(alloc.clock_limit_ms);
    }

    if section.is_warmup() {
        progress.warmup.reset(warmup_ms);
    } else {
        progress.warmup.stop(now_ms);
    }
    if section == SectionId::Interval {
        progress.interval.reset(interval_ms);
    } else {
        progress.interval.stop(now_ms);
    }

    let end_number = progress.end_number;
    if end_number > 0 {
        progress.shot_log.entry(end_number).or_default();
        for side in Side::BOTH {
            progress.side_mut(side).end_score_mut(end_number);
        }
    }

    let mut effects = vec![MatchEffect::SectionEntered { section, index }];
    match section {
        SectionId::MatchFinished | SectionId::ResultApproval => {
            let winner = determine_winner(progress);
            effects.push(MatchEffect::ResultDeclared { winner });
        }
        _ => {
            progress.approvals = Default::default();
            for side in Side::BOTH {
                progress.side_mut(side).result = MatchResult::Undecided;
            }
        }
    }
    effects
}

/// Advance to the next section of the schedule.
pub(crate) fn advance(state: &mut MatchState, now_ms: i64) -> Result<Vec<MatchEffect>, RuleError> {
    let next = next_index(&state.settings, state.progress.section_index)
        .ok_or(RuleError::TerminalSection(state.progress.section))?;
    Ok(enter_section(state, next, now_ms))
}

/// Jump directly to `index`.
pub(crate) fn jump(
    state: &mut MatchState,
    index: usize,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    let len = state.settings.sections.len();
    if index >= len {
        return Err(RuleError::SectionOutOfRange { index, len });
    }
    Ok(enter_section(state, index, now_ms))
}

/// Splice the tie-break after the final end and move into it.
pub(crate) fn select_tie_break(
    state: &mut MatchState,
    mode: TieBreakMode,
    now_ms: i64,
) -> Result<Vec<MatchEffect>, RuleError> {
    let sections = &state.settings.sections;
    if sections.contains(&SectionId::TieBreak) {
        return Err(RuleError::TieBreakAlreadyScheduled);
    }
    let last_end = sections
        .iter()
        .rposition(|s| s.is_end())
        .ok_or(RuleError::TieBreakUnavailable)?;

    let current = state.progress.section_index;
    let at_final_end = current == last_end;
    let after_final_end = state.progress.section == SectionId::MatchFinished;
    if !at_final_end && !after_final_end {
        return Err(RuleError::TieBreakUnavailable);
    }

    let (red, blue) = (state.progress.red.score, state.progress.blue.score);
    if red != blue {
        return Err(RuleError::NotTied { red, blue });
    }

    let inserted: &[SectionId] = match mode {
        TieBreakMode::ExtraEnd => &[SectionId::Interval, SectionId::TieBreak],
        TieBreakMode::FinalShot => &[SectionId::TieBreak],
    };
    let at = last_end + 1;
    state.settings.tie_break = mode;
    state
        .settings
        .sections
        .splice(at..at, inserted.iter().copied());
    if current >= at {
        state.progress.section_index = current + inserted.len();
    }

    let mut effects = vec![MatchEffect::ScheduleChanged];
    let target = next_index(&state.settings, last_end).ok_or(RuleError::TieBreakUnavailable)?;
    effects.extend(enter_section(state, target, now_ms));
    Ok(effects)
}

/// Decide the result from scores, falling back to the tie-break flags.
pub(crate) fn determine_winner(progress: &mut MatchProgress) -> Option<Side> {
    let (red, blue) = (progress.red.score, progress.blue.score);
    let winner = if red != blue {
        progress.red.tie_break_flag = false;
        progress.blue.tie_break_flag = false;
        Some(if red > blue { Side::Red } else { Side::Blue })
    } else {
        match (progress.red.tie_break_flag, progress.blue.tie_break_flag) {
            (true, false) => Some(Side::Red),
            (false, true) => Some(Side::Blue),
            _ => None,
        }
    };

    for side in Side::BOTH {
        progress.side_mut(side).result = match winner {
            Some(w) if w == side => MatchResult::Win,
            Some(_) => MatchResult::Lose,
            None => MatchResult::Draw,
        };
    }
    winner
}

/// Mark `side` as winner (or not) of the tie-break; only one side can hold the flag.
pub(crate) fn set_tie_break_flag(
    state: &mut MatchState,
    side: Side,
    value: bool,
) -> Vec<MatchEffect> {
    let progress = &mut state.progress;
    progress.side_mut(side).tie_break_flag = value;
    if value {
        progress.side_mut(side.opponent()).tie_break_flag = false;
    }

    if matches!(
        progress.section,
        SectionId::MatchFinished | SectionId::ResultApproval
    ) {
        let winner = determine_winner(progress);
        vec![MatchEffect::ResultDeclared { winner }]
    } else {
        Vec::new()
    }
}

/// Keep the match on a valid section after the schedule was rebuilt.
///
/// The current section is kept when it still exists; otherwise the match moves to
/// the first section that followed it in `previous` and survived the rebuild.
pub(crate) fn relocate(
    state: &mut MatchState,
    previous: &[SectionId],
    now_ms: i64,
) -> Vec<MatchEffect> {
    let sections = &state.settings.sections;
    let current = state.progress.section;
    if sections.get(state.progress.section_index) == Some(&current) {
        return Vec::new();
    }
    if let Some(index) = position(sections, current) {
        state.progress.section_index = index;
        return Vec::new();
    }

    let start = previous
        .iter()
        .position(|s| *s == current)
        .unwrap_or(state.progress.section_index);
    let target = previous
        .iter()
        .skip(start)
        .find_map(|s| position(sections, *s))
        .unwrap_or(sections.len().saturating_sub(1));
    enter_section(state, target, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::MatchKey;

    fn settings(
        total_ends: u32,
        warmup: WarmupMode,
        interval: bool,
        approval: bool,
    ) -> MatchSettings {
        MatchSettings {
            total_ends,
            warmup,
            interval_enabled: interval,
            result_approval: approval,
            sections: build_schedule(total_ends, warmup, interval, approval),
            ..MatchSettings::default()
        }
    }

    fn state_with(settings: MatchSettings) -> MatchState {
        MatchState::new(MatchKey::new("ev", "c1"), settings)
    }

    fn goto(state: &mut MatchState, section: SectionId) {
        let index = position(&state.settings.sections, section).unwrap();
        enter_section(state, index, 0);
    }

    #[test]
    fn section_names_roundtrip() {
        for name in ["standby", "warmup2", "end12", "interval", "tieBreak", "resultApproval"] {
            let section: SectionId = name.parse().unwrap();
            assert_eq!(section.to_string(), name);
        }
        assert!("end0".parse::<SectionId>().is_err());
        assert!("overtime".parse::<SectionId>().is_err());
    }

    #[test]
    fn schedule_shape_follows_configuration() {
        assert_eq!(
            build_schedule(2, WarmupMode::Separate, true, true),
            vec![
                SectionId::Standby,
                SectionId::Warmup1,
                SectionId::Warmup2,
                SectionId::End(1),
                SectionId::Interval,
                SectionId::End(2),
                SectionId::MatchFinished,
                SectionId::ResultApproval,
            ]
        );
        assert_eq!(
            build_schedule(2, WarmupMode::None, false, false),
            vec![
                SectionId::Standby,
                SectionId::End(1),
                SectionId::End(2),
                SectionId::MatchFinished,
            ]
        );
    }

    #[test]
    fn final_end_always_reaches_match_finished() {
        for total_ends in 1..=6 {
            for warmup in [WarmupMode::None, WarmupMode::Simultaneous, WarmupMode::Separate] {
                for interval in [true, false] {
                    for approval in [true, false] {
                        let mut state =
                            state_with(settings(total_ends, warmup, interval, approval));
                        goto(&mut state, SectionId::End(total_ends));
                        advance(&mut state, 0).unwrap();
                        assert_eq!(state.section(), SectionId::MatchFinished);
                    }
                }
            }
        }
    }

    #[test]
    fn disabled_interval_is_skipped() {
        let mut config = settings(3, WarmupMode::None, true, false);
        config.interval_enabled = false;
        let mut state = state_with(config);
        goto(&mut state, SectionId::End(1));

        advance(&mut state, 0).unwrap();
        assert_eq!(state.section(), SectionId::End(2));
    }

    #[test]
    fn result_approval_is_terminal() {
        let mut state = state_with(settings(1, WarmupMode::None, true, true));
        goto(&mut state, SectionId::MatchFinished);
        advance(&mut state, 0).unwrap();
        assert_eq!(state.section(), SectionId::ResultApproval);
        assert_eq!(
            advance(&mut state, 0),
            Err(RuleError::TerminalSection(SectionId::ResultApproval))
        );
    }

    #[test]
    fn entering_ends_applies_lead_ball_policy() {
        let mut state = state_with(settings(4, WarmupMode::Simultaneous, true, true));
        goto(&mut state, SectionId::End(1));
        assert_eq!(state.progress.red.ball_count, 7);
        assert_eq!(state.progress.blue.ball_count, 6);
        assert_eq!(state.progress.end_number, 1);

        advance(&mut state, 0).unwrap();
        assert_eq!(state.section(), SectionId::Interval);
        assert_eq!(state.progress.red.ball_count, 6);
        advance(&mut state, 0).unwrap();
        assert_eq!(state.section(), SectionId::End(2));
        assert_eq!(state.progress.red.ball_count, 6);
        assert_eq!(state.progress.blue.ball_count, 7);
    }

    #[test]
    fn jump_and_advance_produce_identical_entry_state() {
        let mut advanced = state_with(settings(4, WarmupMode::None, true, true));
        goto(&mut advanced, SectionId::End(1));
        advanced.progress.red.ball_count = 2;
        advanced.progress.red.penalty_ball_count = 3;
        advanced.progress.screen.score_adjusting = true;
        advanced.progress.red.clock.start(0);
        let mut jumped = advanced.clone();

        advance(&mut advanced, 5_000).unwrap();
        advance(&mut advanced, 5_000).unwrap();
        let target = position(&jumped.settings.sections, SectionId::End(2)).unwrap();
        jump(&mut jumped, target, 5_000).unwrap();

        assert_eq!(advanced.progress, jumped.progress);
        assert_eq!(jumped.progress.red.penalty_ball_count, 0);
        assert!(!jumped.progress.red.clock.is_running());
        assert_eq!(jumped.progress.red.clock.remaining_ms(), 300_000);
        assert!(!jumped.progress.screen.score_adjusting);
    }

    #[test]
    fn jump_rejects_out_of_range_index() {
        let mut state = state_with(settings(2, WarmupMode::None, false, false));
        assert_eq!(
            jump(&mut state, 99, 0),
            Err(RuleError::SectionOutOfRange { index: 99, len: 4 })
        );
    }

    #[test]
    fn final_shot_tie_break_is_spliced_after_final_end() {
        let mut state = state_with(settings(2, WarmupMode::None, true, false));
        goto(&mut state, SectionId::End(2));
        state.progress.red.score = 3;
        state.progress.blue.score = 3;

        select_tie_break(&mut state, TieBreakMode::FinalShot, 0).unwrap();

        assert_eq!(state.section(), SectionId::TieBreak);
        assert_eq!(
            state.settings.sections[4..],
            [SectionId::TieBreak, SectionId::MatchFinished]
        );
        assert_eq!(state.progress.red.ball_count, 1);
        assert_eq!(state.progress.blue.ball_count, 1);
        assert_eq!(state.progress.red.clock.limit_ms(), 60_000);
        assert_eq!(state.progress.blue.clock.limit_ms(), 60_000);
        assert_eq!(state.progress.end_number, 3);
        assert_eq!(count_ends(&state.settings.sections), 2);

        advance(&mut state, 0).unwrap();
        assert_eq!(state.section(), SectionId::MatchFinished);
    }

    #[test]
    fn extra_end_tie_break_uses_normal_allocation() {
        let mut state = state_with(settings(2, WarmupMode::None, true, false));
        goto(&mut state, SectionId::End(2));

        select_tie_break(&mut state, TieBreakMode::ExtraEnd, 0).unwrap();
        assert_eq!(state.section(), SectionId::Interval);
        advance(&mut state, 0).unwrap();

        assert_eq!(state.section(), SectionId::TieBreak);
        assert_eq!(state.progress.red.ball_count, 6);
        assert_eq!(state.progress.blue.ball_count, 6);
        assert_eq!(state.progress.red.clock.limit_ms(), 300_000);
    }

    #[test]
    fn tie_break_requires_tie_and_final_end() {
        let mut state = state_with(settings(2, WarmupMode::None, true, false));
        goto(&mut state, SectionId::End(1));
        assert_eq!(
            select_tie_break(&mut state, TieBreakMode::FinalShot, 0),
            Err(RuleError::TieBreakUnavailable)
        );

        goto(&mut state, SectionId::End(2));
        state.progress.red.score = 1;
        assert_eq!(
            select_tie_break(&mut state, TieBreakMode::FinalShot, 0),
            Err(RuleError::NotTied { red: 1, blue: 0 })
        );
    }

    #[test]
    fn tie_break_can_be_selected_from_match_finished() {
        let mut state = state_with(settings(2, WarmupMode::None, false, true));
        goto(&mut state, SectionId::MatchFinished);
        assert_eq!(state.progress.red.result, MatchResult::Draw);

        select_tie_break(&mut state, TieBreakMode::FinalShot, 0).unwrap();
        assert_eq!(state.section(), SectionId::TieBreak);
        assert_eq!(state.progress.red.result, MatchResult::Undecided);
        assert_eq!(
            select_tie_break(&mut state, TieBreakMode::FinalShot, 0),
            Err(RuleError::TieBreakAlreadyScheduled)
        );
    }

    #[test]
    fn winner_rules() {
        let mut state = state_with(settings(2, WarmupMode::None, false, false));

        state.progress.red.score = 7;
        state.progress.blue.score = 3;
        state.progress.blue.tie_break_flag = true;
        assert_eq!(determine_winner(&mut state.progress), Some(Side::Red));
        assert_eq!(state.progress.red.result, MatchResult::Win);
        assert_eq!(state.progress.blue.result, MatchResult::Lose);
        assert!(!state.progress.blue.tie_break_flag);

        state.progress.red.score = 4;
        state.progress.blue.score = 4;
        state.progress.red.tie_break_flag = true;
        assert_eq!(determine_winner(&mut state.progress), Some(Side::Red));

        state.progress.red.tie_break_flag = false;
        assert_eq!(determine_winner(&mut state.progress), None);
        assert_eq!(state.progress.red.result, MatchResult::Draw);
        assert_eq!(state.progress.blue.result, MatchResult::Draw);
    }

    #[test]
    fn tie_break_flag_is_exclusive_and_updates_result() {
        let mut state = state_with(settings(1, WarmupMode::None, false, false));
        goto(&mut state, SectionId::MatchFinished);

        set_tie_break_flag(&mut state, Side::Blue, true);
        assert_eq!(state.progress.blue.result, MatchResult::Win);
        set_tie_break_flag(&mut state, Side::Red, true);
        assert!(!state.progress.blue.tie_break_flag);
        assert_eq!(state.progress.red.result, MatchResult::Win);
    }

    #[test]
    fn relocate_moves_to_next_surviving_section() {
        let mut state = state_with(settings(4, WarmupMode::None, true, false));
        goto(&mut state, SectionId::End(4));
        let previous = state.settings.sections.clone();

        state.settings.total_ends = 2;
        state.settings.regenerate_sections();
        relocate(&mut state, &previous, 0);
        assert_eq!(state.section(), SectionId::MatchFinished);

        let mut state = state_with(settings(3, WarmupMode::None, true, false));
        goto(&mut state, SectionId::End(2));
        let previous = state.settings.sections.clone();
        state.settings.interval_enabled = false;
        state.settings.regenerate_sections();
        relocate(&mut state, &previous, 0);
        assert_eq!(state.section(), SectionId::End(2));
        assert_eq!(state.progress.section_index, 2);
    }
}
