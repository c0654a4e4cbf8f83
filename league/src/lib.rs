pub mod client;
pub mod docs;
pub mod locking;
pub mod matcher;
pub mod scoring;

pub use crate::matcher::{CategoryRole, ConfigError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Merge and final-three season tracks cap out at three picks each.
pub const MAX_TRACK_PICKS: usize = 3;

// ---------------------------------------------------------------------------
// Domain types — clean model, independent of the repository wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contestant {
    pub id: String,
    pub name: String,
    pub tribe: Option<String>,
    pub avatar_asset: Option<String>,
}

impl Contestant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), tribe: None, avatar_asset: None }
    }

    /// Resolve the contestant's avatar against a storage base URL.
    pub fn avatar_url(&self, storage_base: &str) -> Option<String> {
        let asset = self.avatar_asset.as_deref()?.trim();
        if asset.is_empty() {
            return None;
        }
        Some(format!("{}/avatars/{asset}", storage_base.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Episode {
    pub id: u32,
    pub air_date: Option<DateTime<Utc>>,
    pub title: String,
    pub is_merge_episode: bool,
}

impl Episode {
    /// Blank or missing titles fall back to "Week {id}".
    pub fn new(id: u32, title: Option<&str>, is_merge_episode: bool) -> Self {
        let resolved = title.map(str::trim).unwrap_or_default();
        let title = if resolved.is_empty() { format!("Week {id}") } else { resolved.to_string() };
        Self { id, air_date: None, title, is_merge_episode }
    }
}

/// Legacy two-era split of a season. Superseded by explicit phases, kept as
/// the fallback for point defaults when a phase carries no point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEra {
    PreMerge,
    PostMerge,
}

/// Explicit category role tag. `Custom` defers to name-based matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryKind {
    #[default]
    Custom,
    Immunity,
    VotedOut,
    Remain,
    Merge,
    FinalThree,
    Winner,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Immunity => "immunity",
            Self::VotedOut => "votedOut",
            Self::Remain => "remain",
            Self::Merge => "merge",
            Self::FinalThree => "finalThree",
            Self::Winner => "winner",
        }
    }

    /// Unknown tags decode as `Custom` so older documents stay readable.
    pub fn parse(s: &str) -> Self {
        match s {
            "immunity" => Self::Immunity,
            "votedOut" => Self::VotedOut,
            "remain" => Self::Remain,
            "merge" => Self::Merge,
            "finalThree" => Self::FinalThree,
            "winner" => Self::Winner,
            _ => Self::Custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// Short display/aggregation code, unique within a phase. Normalized to
    /// trimmed uppercase at construction; kept verbatim when the trimmed
    /// value is empty.
    pub column_id: String,
    pub total_picks: u32,
    pub points_per_correct_pick: Option<i32>,
    pub wager_points: Option<i32>,
    pub uses_wager: bool,
    pub auto_scores_remaining_contestants: bool,
    pub is_locked: bool,
    pub kind: CategoryKind,
}

impl Category {
    pub fn new(name: impl Into<String>, column_id: &str, total_picks: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            column_id: normalize_column_id(column_id),
            total_picks,
            points_per_correct_pick: None,
            wager_points: None,
            uses_wager: false,
            auto_scores_remaining_contestants: false,
            is_locked: false,
            kind: CategoryKind::Custom,
        }
    }

    pub fn with_points(mut self, points: i32) -> Self {
        self.points_per_correct_pick = Some(points);
        self
    }

    pub fn with_wager(mut self, points: i32) -> Self {
        self.wager_points = Some(points);
        self.uses_wager = true;
        self
    }

    pub fn with_kind(mut self, kind: CategoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn locked(mut self) -> Self {
        self.is_locked = true;
        self
    }

    pub fn auto_scoring(mut self) -> Self {
        self.auto_scores_remaining_contestants = true;
        self
    }

    /// The key this category aggregates under, or None when it has no
    /// usable column id.
    pub fn column_key(&self) -> Option<String> {
        let key = self.column_id.trim().to_uppercase();
        if key.is_empty() { None } else { Some(key) }
    }
}

pub(crate) fn normalize_column_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() { raw.to_string() } else { trimmed.to_uppercase() }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickPhase {
    pub id: Uuid,
    pub name: String,
    pub categories: Vec<Category>,
}

impl PickPhase {
    pub fn new(name: impl Into<String>, categories: Vec<Category>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), categories }
    }

    pub fn category(&self, category_id: &Uuid) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == category_id)
    }

    pub fn category_for_role(&self, role: CategoryRole) -> Option<&Category> {
        self.categories.iter().find(|c| c.role() == Some(role))
    }

    /// Positive per-pick point value configured for a role, if any.
    pub fn points_for_role(&self, role: CategoryRole) -> Option<i32> {
        self.category_for_role(role)
            .and_then(|c| c.points_per_correct_pick)
            .filter(|points| *points > 0)
    }

    /// The stock three-phase season template.
    pub fn preconfigured() -> Vec<PickPhase> {
        vec![
            PickPhase::new(
                "Pre-merge",
                vec![
                    Category::new("Mergers", "MG", 3)
                        .with_points(1)
                        .with_kind(CategoryKind::Merge)
                        .locked()
                        .auto_scoring(),
                    Category::new("Immunity", "IM", 3)
                        .with_points(3)
                        .with_kind(CategoryKind::Immunity),
                    Category::new("Voted out", "VO", 3)
                        .with_points(3)
                        .with_kind(CategoryKind::VotedOut),
                ],
            ),
            PickPhase::new(
                "Post-merge",
                vec![
                    Category::new("Immunity", "IM", 2)
                        .with_points(5)
                        .with_kind(CategoryKind::Immunity),
                    Category::new("Voted out", "VO", 2)
                        .with_points(5)
                        .with_kind(CategoryKind::VotedOut),
                ],
            ),
            PickPhase::new(
                "Finals",
                vec![
                    Category::new("Carried", "CA", 1).with_points(10),
                    Category::new("Fire", "FI", 2).with_points(10),
                    Category::new("Fire Winner", "FW", 1).with_points(15),
                    Category::new("Sole Survivor", "SS", 1)
                        .with_points(25)
                        .with_kind(CategoryKind::Winner),
                ],
            ),
        ]
    }
}

/// An admin-selectable starting point for a new category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPreset {
    pub name: &'static str,
    pub column_id: &'static str,
    pub total_picks: u32,
    pub points_per_correct_pick: Option<i32>,
    pub wager_points: Option<i32>,
    pub is_locked: bool,
    pub auto_scores_remaining_contestants: bool,
    pub kind: CategoryKind,
}

impl CategoryPreset {
    pub fn all() -> Vec<CategoryPreset> {
        let preset = |name, column_id, total_picks, points, kind| CategoryPreset {
            name,
            column_id,
            total_picks,
            points_per_correct_pick: points,
            wager_points: None,
            is_locked: false,
            auto_scores_remaining_contestants: false,
            kind,
        };
        vec![
            CategoryPreset {
                is_locked: true,
                auto_scores_remaining_contestants: true,
                ..preset("Mergers", "MG", 3, Some(1), CategoryKind::Merge)
            },
            preset("Immunity", "IM", 3, Some(1), CategoryKind::Immunity),
            preset("Voted Out", "VO", 3, Some(3), CategoryKind::VotedOut),
            preset("Reward Challenge", "RC", 2, Some(5), CategoryKind::Custom),
            CategoryPreset {
                auto_scores_remaining_contestants: true,
                ..preset("Remains", "RM", 3, Some(1), CategoryKind::Remain)
            },
            CategoryPreset {
                is_locked: true,
                auto_scores_remaining_contestants: true,
                ..preset("Final 3", "F3", 3, Some(5), CategoryKind::FinalThree)
            },
            preset("Carried", "CA", 1, Some(10), CategoryKind::Custom),
            preset("Fire", "FI", 2, Some(10), CategoryKind::Custom),
            preset("Fire Winner", "FW", 1, Some(15), CategoryKind::Custom),
            preset("Sole Survivor", "SS", 1, Some(30), CategoryKind::Winner),
        ]
    }

    pub fn to_category(&self) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: self.name.to_string(),
            column_id: normalize_column_id(self.column_id),
            total_picks: self.total_picks,
            points_per_correct_pick: self.points_per_correct_pick,
            wager_points: self.wager_points,
            uses_wager: self.wager_points.is_some(),
            auto_scores_remaining_contestants: self.auto_scores_remaining_contestants,
            is_locked: self.is_locked,
            kind: self.kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeResult {
    pub id: u32,
    /// Phase active when this week started. None on legacy records.
    pub phase_id: Option<Uuid>,
    /// Legacy mirrors of the immunity / voted-out category winners. The
    /// `category_winners` map is the source of truth; these are kept
    /// consistent by `set_winners`.
    pub immunity_winners: BTreeSet<String>,
    pub voted_out: BTreeSet<String>,
    pub category_winners: HashMap<Uuid, Vec<String>>,
}

impl EpisodeResult {
    pub fn new(id: u32, phase_id: Option<Uuid>) -> Self {
        Self { id, phase_id, ..Self::default() }
    }

    pub fn has_recorded_results(&self) -> bool {
        !self.immunity_winners.is_empty()
            || !self.voted_out.is_empty()
            || self.category_winners.values().any(|w| !w.is_empty())
    }

    pub fn winners(&self, category_id: &Uuid) -> &[String] {
        self.category_winners.get(category_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Record winners through the category path, keeping the legacy
    /// immunity / voted-out mirrors consistent.
    pub fn set_winners(&mut self, category: &Category, winners: Vec<String>) {
        match category.role() {
            Some(CategoryRole::Immunity) => {
                self.immunity_winners = winners.iter().cloned().collect();
            }
            Some(CategoryRole::VotedOut) => {
                self.voted_out = winners.iter().cloned().collect();
            }
            _ => {}
        }
        if winners.is_empty() {
            self.category_winners.remove(&category.id);
        } else {
            self.category_winners.insert(category.id, winners);
        }
    }
}

// ---------------------------------------------------------------------------
// Picks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyPicks {
    pub user_id: String,
    pub episode_id: u32,
    pub category_selections: HashMap<Uuid, BTreeSet<String>>,
    pub category_wagers: HashMap<Uuid, i32>,
    pub is_submitted: bool,
    /// Legacy mirrors of the well-known category selections, kept for
    /// documents written before phases existed.
    pub remain: BTreeSet<String>,
    pub voted_out: BTreeSet<String>,
    pub immunity: BTreeSet<String>,
}

impl WeeklyPicks {
    pub fn new(user_id: impl Into<String>, episode_id: u32) -> Self {
        Self { user_id: user_id.into(), episode_id, ..Self::default() }
    }

    pub fn selections(&self, category_id: &Uuid) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.category_selections.get(category_id).unwrap_or(&EMPTY)
    }

    /// Store a selection through the category path, mirroring well-known
    /// roles into the legacy fields.
    pub fn set_selections(&mut self, category: &Category, selections: BTreeSet<String>) {
        match category.role() {
            Some(CategoryRole::Remain) => self.remain = selections.clone(),
            Some(CategoryRole::VotedOut) => self.voted_out = selections.clone(),
            Some(CategoryRole::Immunity) => self.immunity = selections.clone(),
            _ => {}
        }
        if selections.is_empty() {
            self.category_selections.remove(&category.id);
        } else {
            self.category_selections.insert(category.id, selections);
        }
    }

    pub fn wager(&self, category_id: &Uuid) -> Option<i32> {
        self.category_wagers.get(category_id).copied()
    }

    pub fn set_wager(&mut self, category_id: Uuid, wager: Option<i32>) {
        match wager {
            Some(amount) => {
                self.category_wagers.insert(category_id, amount);
            }
            None => {
                self.category_wagers.remove(&category_id);
            }
        }
    }

    /// Selection for a well-known role: the phase's category entry when one
    /// is recorded, the legacy field otherwise.
    pub fn selections_for_role(
        &self,
        phase: Option<&PickPhase>,
        role: CategoryRole,
    ) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        if let Some(phase) = phase
            && let Some(category) = phase.category_for_role(role)
            && let Some(selection) = self.category_selections.get(&category.id)
            && !selection.is_empty()
        {
            return selection;
        }
        match role {
            CategoryRole::Remain => &self.remain,
            CategoryRole::VotedOut => &self.voted_out,
            CategoryRole::Immunity => &self.immunity,
            _ => &EMPTY,
        }
    }

    pub fn has_any_selection(&self) -> bool {
        !self.remain.is_empty()
            || !self.voted_out.is_empty()
            || !self.immunity.is_empty()
            || self.category_selections.values().any(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonPicks {
    pub user_id: String,
    pub winner_pick: Option<String>,
    merge_picks: BTreeSet<String>,
    final_three_picks: BTreeSet<String>,
}

impl SeasonPicks {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Self::default() }
    }

    pub fn merge_picks(&self) -> &BTreeSet<String> {
        &self.merge_picks
    }

    pub fn final_three_picks(&self) -> &BTreeSet<String> {
        &self.final_three_picks
    }

    /// Returns false (leaving the picks unchanged) when over the cap.
    pub fn set_merge_picks(&mut self, picks: BTreeSet<String>) -> bool {
        if picks.len() > MAX_TRACK_PICKS {
            return false;
        }
        self.merge_picks = picks;
        true
    }

    pub fn set_final_three_picks(&mut self, picks: BTreeSet<String>) -> bool {
        if picks.len() > MAX_TRACK_PICKS {
            return false;
        }
        self.final_three_picks = picks;
        true
    }
}

// ---------------------------------------------------------------------------
// Users and season configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_asset: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeeklyPickCaps {
    pub remain: Option<u32>,
    pub voted_out: Option<u32>,
    pub immunity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonConfig {
    pub season_id: String,
    pub name: String,
    pub contestants: Vec<Contestant>,
    pub episodes: Vec<Episode>,
    pub weekly_pick_caps_pre_merge: WeeklyPickCaps,
    pub weekly_pick_caps_post_merge: WeeklyPickCaps,
    pub lock_hour_utc: u8,
}

impl SeasonConfig {
    pub fn new(season_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            season_id: season_id.into(),
            name: name.into(),
            contestants: Vec::new(),
            episodes: Vec::new(),
            weekly_pick_caps_pre_merge: WeeklyPickCaps {
                remain: Some(3),
                voted_out: Some(3),
                immunity: Some(3),
            },
            weekly_pick_caps_post_merge: WeeklyPickCaps {
                remain: Some(3),
                voted_out: Some(3),
                immunity: None,
            },
            lock_hour_utc: 23,
        }
    }

    pub fn contestant(&self, contestant_id: &str) -> Option<&Contestant> {
        self.contestants.iter().find(|c| c.id == contestant_id)
    }

    pub fn episode(&self, episode_id: u32) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id == episode_id)
    }
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

// ---------------------------------------------------------------------------
// Score breakdowns (derived, never persisted)
// ---------------------------------------------------------------------------

/// Engine output for one user and one episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyScoreBreakdown {
    pub voted_out: i32,
    pub remain: i32,
    pub immunity: i32,
    /// Custom-category contributions keyed by column id.
    pub category_points: BTreeMap<String, i32>,
}

impl WeeklyScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.voted_out
            + self.remain
            + self.immunity
            + self.category_points.values().sum::<i32>()
    }
}

/// Season-aggregate totals for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserScoreBreakdown {
    pub user_id: String,
    pub weeks_participated: u32,
    pub voted_out_points: i32,
    pub remain_points: i32,
    pub immunity_points: i32,
    pub merge_track_points: i32,
    pub final_three_track_points: i32,
    pub winner_points: i32,
    pub category_points_by_column_id: BTreeMap<String, i32>,
}

impl UserScoreBreakdown {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Self::default() }
    }

    pub fn total(&self) -> i32 {
        self.voted_out_points
            + self.remain_points
            + self.immunity_points
            + self.merge_track_points
            + self.final_three_track_points
            + self.winner_points
            + self.category_points_by_column_id.values().sum::<i32>()
    }

    pub fn points_for_column(&self, column_id: &str) -> i32 {
        let normalized = column_id.trim().to_uppercase();
        self.category_points_by_column_id.get(&normalized).copied().unwrap_or(0)
    }
}
