use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::{
    match_state::{ClockLimits, MatchProgress, MatchSettings, MatchState, RuleSet},
    sections::{TieBreakMode, WarmupMode},
};

/// Persisted `settings` document: the slow-changing partition of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    /// Match version at the time of writing.
    pub version: u64,
    pub last_updated_ms: i64,
    pub settings: MatchSettings,
}

impl SettingsDocument {
    pub fn from_state(state: &MatchState) -> Self {
        Self {
            version: state.version,
            last_updated_ms: state.last_updated_ms,
            settings: state.settings.clone(),
        }
    }
}

/// Persisted `game` document: the fast-changing partition of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDocument {
    pub version: u64,
    pub last_updated_ms: i64,
    pub progress: MatchProgress,
}

impl GameDocument {
    pub fn from_state(state: &MatchState) -> Self {
        Self {
            version: state.version,
            last_updated_ms: state.last_updated_ms,
            progress: state.progress.clone(),
        }
    }
}

/// Per-event tournament initialization document. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TournamentInit {
    pub total_ends: Option<u32>,
    pub warmup: Option<WarmupMode>,
    pub interval_enabled: Option<bool>,
    pub result_approval: Option<bool>,
    pub tie_break: Option<TieBreakMode>,
    pub rules: Option<RuleSet>,
    pub clocks: Option<ClockLimits>,
    /// Classification used by courts that do not name their own.
    pub classification: Option<String>,
    /// Line-up per court identifier.
    pub courts: IndexMap<String, CourtAssignment>,
}

/// Teams and classification scheduled on one court.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourtAssignment {
    pub red_name: Option<String>,
    pub blue_name: Option<String>,
    pub classification: Option<String>,
}

/// Defaults attached to a classification in the `classifications` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationDefaults {
    pub player_ms: Option<u64>,
    pub total_ends: Option<u32>,
}

/// Classification name to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationTable(pub IndexMap<String, ClassificationDefaults>);

impl ClassificationTable {
    pub fn get(&self, classification: &str) -> Option<&ClassificationDefaults> {
        self.0.get(classification)
    }
}

impl TournamentInit {
    /// Settings for `court_id`, layering the tournament defaults, the court line-up
    /// and the classification defaults over `base`.
    pub fn settings_for(
        &self,
        court_id: &str,
        base: &MatchSettings,
        classifications: Option<&ClassificationTable>,
    ) -> MatchSettings {
        let mut settings = base.clone();
        if let Some(total_ends) = self.total_ends {
            settings.total_ends = total_ends;
        }
        if let Some(warmup) = self.warmup {
            settings.warmup = warmup;
        }
        if let Some(enabled) = self.interval_enabled {
            settings.interval_enabled = enabled;
        }
        if let Some(enabled) = self.result_approval {
            settings.result_approval = enabled;
        }
        if let Some(mode) = self.tie_break {
            settings.tie_break = mode;
        }
        if let Some(rules) = &self.rules {
            settings.rules = rules.clone();
        }
        if let Some(clocks) = &self.clocks {
            settings.clocks = clocks.clone();
        }

        let court = self.courts.get(court_id);
        if let Some(name) = court.and_then(|c| c.red_name.clone()) {
            settings.red_name = name;
        }
        if let Some(name) = court.and_then(|c| c.blue_name.clone()) {
            settings.blue_name = name;
        }
        if let Some(classification) = court
            .and_then(|c| c.classification.clone())
            .or_else(|| self.classification.clone())
        {
            settings.classification = classification;
        }

        settings.apply_classification(classifications);
        settings.regenerate_sections();
        settings
    }
}

impl MatchSettings {
    /// Apply the defaults the lookup table defines for this match's classification.
    pub fn apply_classification(&mut self, classifications: Option<&ClassificationTable>) {
        let Some(defaults) = classifications.and_then(|table| table.get(&self.classification))
        else {
            return;
        };
        if let Some(player_ms) = defaults.player_ms {
            self.clocks.player_ms = player_ms;
        }
        if let Some(total_ends) = defaults.total_ends {
            self.total_ends = total_ends;
        }
    }
}
