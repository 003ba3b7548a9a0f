//! The match aggregate: settings, per-side progress and presentation flags.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    ball_count::STANDARD_BALLS,
    clock::{Clock, ClockKind},
    penalty::{PenaltyKind, PendingAction},
    sections::{SectionId, TieBreakMode, WarmupMode, build_schedule},
};

/// One of the two competing sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    /// Side throwing the red balls.
    Red,
    /// Side throwing the blue balls.
    Blue,
}

impl Side {
    /// Both sides, red first.
    pub const BOTH: [Side; 2] = [Side::Red, Side::Blue];

    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Red => f.write_str("red"),
            Side::Blue => f.write_str("blue"),
        }
    }
}

/// Address of a match: the tournament event and the court it is played on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchKey {
    /// Tournament event identifier.
    pub event_id: String,
    /// Court the match is played on.
    pub court_id: String,
}

impl MatchKey {
    /// Key for `event_id` and `court_id`.
    pub fn new(event_id: impl Into<String>, court_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            court_id: court_id.into(),
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.court_id)
    }
}

/// Final outcome for one side; empty until the match is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum MatchResult {
    /// Won the match.
    Win,
    /// Lost the match.
    Lose,
    /// Scores level at the end of the match.
    Draw,
    /// Not decided yet; serialized as an empty string.
    #[default]
    #[serde(rename = "")]
    Undecided,
}

/// Score and penalties recorded for one side in one end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndScore {
    /// Points scored in this end.
    pub score: u32,
    /// Penalties received in this end, in order.
    #[serde(default)]
    pub penalties: Vec<PenaltyKind>,
}

/// Configured clock limits in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockLimits {
    /// Player clock per end.
    pub player_ms: u64,
    /// Warmup clock.
    pub warmup_ms: u64,
    /// Break between ends.
    pub interval_ms: u64,
}

impl Default for ClockLimits {
    fn default() -> Self {
        Self {
            player_ms: 300_000,
            warmup_ms: 120_000,
            interval_ms: 60_000,
        }
    }
}

/// Rule constants that tournaments may override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSet {
    /// Score awarded to the opponent of a forfeiting side.
    pub forfeit_score: u32,
    /// Clock value for each penalty throw.
    pub penalty_throw_ms: u64,
    /// Clock limit for each side during a final-shot tie-break.
    pub final_shot_ms: u64,
    /// Advance automatically when the interval clock runs out.
    pub auto_advance_interval: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            forfeit_score: 6,
            penalty_throw_ms: 60_000,
            final_shot_ms: 60_000,
            auto_advance_interval: true,
        }
    }
}

/// Slow-changing configuration of a match; persisted as the `settings` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettings {
    /// Display name of the red side.
    pub red_name: String,
    /// Display name of the blue side.
    pub blue_name: String,
    /// Classification label, used to pick defaults.
    #[serde(default)]
    pub classification: String,
    /// Regular ends, tie-break excluded.
    pub total_ends: u32,
    /// Warmup organisation.
    pub warmup: WarmupMode,
    /// Whether a break separates consecutive ends.
    pub interval_enabled: bool,
    /// Whether the result needs signatures.
    pub result_approval: bool,
    /// How a draw is resolved.
    pub tie_break: TieBreakMode,
    /// Penalty and throw rules.
    #[serde(default)]
    pub rules: RuleSet,
    /// Clock durations.
    pub clocks: ClockLimits,
    /// Section schedule, derived from the fields above.
    #[schema(value_type = Vec<String>)]
    pub sections: Vec<SectionId>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        let mut settings = Self {
            red_name: "Red".into(),
            blue_name: "Blue".into(),
            classification: String::new(),
            total_ends: 4,
            warmup: WarmupMode::Simultaneous,
            interval_enabled: true,
            result_approval: true,
            tie_break: TieBreakMode::ExtraEnd,
            rules: RuleSet::default(),
            clocks: ClockLimits::default(),
            sections: Vec::new(),
        };
        settings.regenerate_sections();
        settings
    }
}

impl MatchSettings {
    /// Rebuild the schedule from the configured shape.
    pub fn regenerate_sections(&mut self) {
        self.sections = build_schedule(
            self.total_ends,
            self.warmup,
            self.interval_enabled,
            self.result_approval,
        );
    }

    /// Display name of `side`.
    pub fn name(&self, side: Side) -> &str {
        match side {
            Side::Red => &self.red_name,
            Side::Blue => &self.blue_name,
        }
    }
}

/// Fast-changing per-side state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SideProgress {
    /// Total over every end.
    pub score: u32,
    /// Per-end scores keyed by end number.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub scores_by_end: IndexMap<u32, EndScore>,
    /// Balls left to throw in the current section.
    pub ball_count: u8,
    /// Player clock.
    pub clock: Clock,
    /// Yellow cards received.
    pub yellow_card_count: u32,
    /// Red cards received.
    pub red_card_count: u32,
    /// Penalty balls still owed to this side.
    pub penalty_ball_count: u32,
    /// This side is currently throwing its penalty balls.
    #[serde(default)]
    pub penalty_throw: bool,
    /// Operator mark shown during a tie-break.
    pub tie_break_flag: bool,
    /// Outcome once the match is finished.
    #[serde(default)]
    pub result: MatchResult,
}

impl SideProgress {
    fn fresh(player_limit_ms: u64) -> Self {
        Self {
            score: 0,
            scores_by_end: IndexMap::new(),
            ball_count: STANDARD_BALLS,
            clock: Clock::new(ClockKind::Player, player_limit_ms),
            yellow_card_count: 0,
            red_card_count: 0,
            penalty_ball_count: 0,
            penalty_throw: false,
            tie_break_flag: false,
            result: MatchResult::Undecided,
        }
    }

    /// Entry for `end`, created on first access.
    pub fn end_score_mut(&mut self, end: u32) -> &mut EndScore {
        self.scores_by_end.entry(end).or_default()
    }
}

/// Presentation flags mirrored to every viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    /// Side highlighted on the scoreboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_highlight: Option<Side>,
    /// The operator is correcting scores.
    pub score_adjusting: bool,
    /// A penalty throw is in progress.
    pub penalty_throw_active: bool,
    /// Ball colours were confirmed before the start.
    pub color_confirmed: bool,
}

/// Who signs off the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalRole {
    /// Red side's signature.
    Red,
    /// Referee's signature.
    Referee,
    /// Blue side's signature.
    Blue,
}

/// Result approvals; the match is completed once all three are given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Approvals {
    /// Red signed.
    pub red: bool,
    /// Referee signed.
    pub referee: bool,
    /// Blue signed.
    pub blue: bool,
}

impl Approvals {
    /// Record or withdraw the signature of `role`.
    pub fn set(&mut self, role: ApprovalRole, approved: bool) {
        match role {
            ApprovalRole::Red => self.red = approved,
            ApprovalRole::Referee => self.referee = approved,
            ApprovalRole::Blue => self.blue = approved,
        }
    }

    /// All three signatures are present.
    pub fn completed(&self) -> bool {
        self.red && self.referee && self.blue
    }
}

/// Frequently changing match state; persisted as the `game` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchProgress {
    /// Position in the section schedule.
    pub section_index: usize,
    /// Section at `section_index`.
    #[schema(value_type = String)]
    pub section: SectionId,
    /// End shown for the current section, 0 outside ends.
    pub end_number: u32,
    /// Red side.
    pub red: SideProgress,
    /// Blue side.
    pub blue: SideProgress,
    /// Warmup clock.
    pub warmup: Clock,
    /// Interval clock.
    pub interval: Clock,
    /// Presentation flags.
    #[serde(default)]
    pub screen: Screen,
    /// Result signatures.
    #[serde(default)]
    pub approvals: Approvals,
    /// Throw order per end.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub shot_log: IndexMap<u32, Vec<Side>>,
    /// Penalty waiting for confirmation.
    #[serde(default)]
    pub pending: PendingAction,
}

impl MatchProgress {
    /// Progress for a match that has not started yet: first section, full clocks.
    pub fn fresh(settings: &MatchSettings) -> Self {
        Self {
            section_index: 0,
            section: settings
                .sections
                .first()
                .copied()
                .unwrap_or(SectionId::Standby),
            end_number: 0,
            red: SideProgress::fresh(settings.clocks.player_ms),
            blue: SideProgress::fresh(settings.clocks.player_ms),
            warmup: Clock::new(ClockKind::Warmup, settings.clocks.warmup_ms),
            interval: Clock::new(ClockKind::Interval, settings.clocks.interval_ms),
            screen: Screen::default(),
            approvals: Approvals::default(),
            shot_log: IndexMap::new(),
            pending: PendingAction::None,
        }
    }

    /// Progress of `side`.
    pub fn side(&self, side: Side) -> &SideProgress {
        match side {
            Side::Red => &self.red,
            Side::Blue => &self.blue,
        }
    }

    /// Mutable progress of `side`.
    pub fn side_mut(&mut self, side: Side) -> &mut SideProgress {
        match side {
            Side::Red => &mut self.red,
            Side::Blue => &mut self.blue,
        }
    }
}

/// The match aggregate owned by the controller and replicated to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Match address.
    pub key: MatchKey,
    /// Configuration partition.
    pub settings: MatchSettings,
    /// Progress partition.
    pub progress: MatchProgress,
    /// Incremented on every effective mutation; viewers order deliveries by it.
    pub version: u64,
    /// Wall-clock time (epoch milliseconds) of the last effective mutation.
    pub last_updated_ms: i64,
}

impl MatchState {
    /// Fresh match in its first section.
    pub fn new(key: MatchKey, settings: MatchSettings) -> Self {
        let progress = MatchProgress::fresh(&settings);
        Self {
            key,
            settings,
            progress,
            version: 0,
            last_updated_ms: 0,
        }
    }

    /// Current section.
    pub fn section(&self) -> SectionId {
        self.progress.section
    }

    /// Configured number of regular ends.
    pub fn total_ends(&self) -> u32 {
        self.settings.total_ends
    }

    /// True when settings and progress match, ignoring version bookkeeping.
    pub fn same_content(&self, other: &MatchState) -> bool {
        self.settings == other.settings && self.progress == other.progress
    }
}
