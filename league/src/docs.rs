//! Repository wire documents — lenient serde shapes for persisted league
//! data. These map to the clean domain types via `model()`; a document that
//! fails to produce a model is dropped from its collection instead of
//! aborting the whole sync.

use crate::{
    Category, CategoryKind, Contestant, Episode, EpisodeResult, PickPhase, SeasonConfig,
    SeasonPicks, UserProfile, WeeklyPickCaps, WeeklyPicks, normalize_column_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn parse_uuid(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

// ---------------------------------------------------------------------------
// Season configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContestantDocument {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tribe: Option<String>,
    pub avatar_asset_name: Option<String>,
}

impl ContestantDocument {
    pub fn model(&self) -> Option<Contestant> {
        let id = self.id.as_ref().filter(|id| !id.trim().is_empty())?;
        Some(Contestant {
            id: id.clone(),
            name: self.name.clone().unwrap_or_default(),
            tribe: self.tribe.clone(),
            avatar_asset: self.avatar_asset_name.clone(),
        })
    }

    pub fn from_model(contestant: &Contestant) -> Self {
        Self {
            id: Some(contestant.id.clone()),
            name: Some(contestant.name.clone()),
            tribe: contestant.tribe.clone(),
            avatar_asset_name: contestant.avatar_asset.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EpisodeDocument {
    pub id: Option<u32>,
    pub air_date: Option<String>, // ISO 8601
    pub title: Option<String>,
    pub is_merge_episode: bool,
}

impl EpisodeDocument {
    pub fn model(&self) -> Option<Episode> {
        let id = self.id?;
        let mut episode = Episode::new(id, self.title.as_deref(), self.is_merge_episode);
        episode.air_date = self
            .air_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(episode)
    }

    pub fn from_model(episode: &Episode) -> Self {
        Self {
            id: Some(episode.id),
            air_date: episode.air_date.map(|dt| dt.to_rfc3339()),
            title: Some(episode.title.clone()),
            is_merge_episode: episode.is_merge_episode,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyPickCapsDocument {
    pub remain: Option<u32>,
    pub voted_out: Option<u32>,
    pub immunity: Option<u32>,
}

impl WeeklyPickCapsDocument {
    fn model(&self) -> WeeklyPickCaps {
        WeeklyPickCaps {
            remain: self.remain,
            voted_out: self.voted_out,
            immunity: self.immunity,
        }
    }

    fn from_model(caps: &WeeklyPickCaps) -> Self {
        Self { remain: caps.remain, voted_out: caps.voted_out, immunity: caps.immunity }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonConfigDocument {
    pub season_id: Option<String>,
    pub name: Option<String>,
    pub contestants: Vec<ContestantDocument>,
    pub episodes: Vec<EpisodeDocument>,
    pub weekly_pick_caps_pre_merge: Option<WeeklyPickCapsDocument>,
    pub weekly_pick_caps_post_merge: Option<WeeklyPickCapsDocument>,
    pub lock_hour_utc: Option<u8>,
}

impl SeasonConfigDocument {
    pub fn model(&self) -> Option<SeasonConfig> {
        let season_id = self.season_id.as_ref().filter(|id| !id.trim().is_empty())?;
        let mut config = SeasonConfig::new(season_id, self.name.clone().unwrap_or_default());
        config.contestants = self.contestants.iter().filter_map(ContestantDocument::model).collect();
        config.episodes = self.episodes.iter().filter_map(EpisodeDocument::model).collect();
        if let Some(caps) = &self.weekly_pick_caps_pre_merge {
            config.weekly_pick_caps_pre_merge = caps.model();
        }
        if let Some(caps) = &self.weekly_pick_caps_post_merge {
            config.weekly_pick_caps_post_merge = caps.model();
        }
        if let Some(hour) = self.lock_hour_utc {
            config.lock_hour_utc = hour;
        }
        Some(config)
    }

    pub fn from_model(config: &SeasonConfig) -> Self {
        Self {
            season_id: Some(config.season_id.clone()),
            name: Some(config.name.clone()),
            contestants: config.contestants.iter().map(ContestantDocument::from_model).collect(),
            episodes: config.episodes.iter().map(EpisodeDocument::from_model).collect(),
            weekly_pick_caps_pre_merge: Some(WeeklyPickCapsDocument::from_model(
                &config.weekly_pick_caps_pre_merge,
            )),
            weekly_pick_caps_post_merge: Some(WeeklyPickCapsDocument::from_model(
                &config.weekly_pick_caps_post_merge,
            )),
            lock_hour_utc: Some(config.lock_hour_utc),
        }
    }
}

// ---------------------------------------------------------------------------
// Season state and phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonStateDocument {
    pub active_phase_id: Option<String>,
    pub activated_phase_ids: Option<Vec<String>>,
}

impl SeasonStateDocument {
    pub fn active_phase(&self) -> Option<Uuid> {
        self.active_phase_id.as_deref().and_then(parse_uuid)
    }

    pub fn activated_phases(&self) -> Vec<Uuid> {
        self.activated_phase_ids
            .iter()
            .flatten()
            .filter_map(|id| parse_uuid(id))
            .collect()
    }

    pub fn from_state(active: Option<Uuid>, activated: &[Uuid]) -> Self {
        Self {
            active_phase_id: active.map(|id| id.to_string()),
            activated_phase_ids: Some(activated.iter().map(Uuid::to_string).collect()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseCategoryDocument {
    pub id: Option<String>,
    pub name: Option<String>,
    pub column_id: Option<String>,
    pub total_picks: Option<u32>,
    pub points_per_correct_pick: Option<i32>,
    pub wager_points: Option<i32>,
    pub uses_wager: bool,
    pub auto_scores_remaining_contestants: bool,
    pub is_locked: bool,
    pub kind: Option<String>,
}

impl PhaseCategoryDocument {
    pub fn model(&self) -> Option<Category> {
        let id = self.id.as_deref().and_then(parse_uuid)?;
        Some(Category {
            id,
            name: self.name.clone().unwrap_or_default(),
            column_id: normalize_column_id(self.column_id.as_deref().unwrap_or_default()),
            total_picks: self.total_picks.unwrap_or(1),
            points_per_correct_pick: self.points_per_correct_pick,
            wager_points: self.wager_points,
            uses_wager: self.uses_wager,
            auto_scores_remaining_contestants: self.auto_scores_remaining_contestants,
            is_locked: self.is_locked,
            kind: self.kind.as_deref().map(CategoryKind::parse).unwrap_or_default(),
        })
    }

    pub fn from_model(category: &Category) -> Self {
        Self {
            id: Some(category.id.to_string()),
            name: Some(category.name.clone()),
            column_id: Some(category.column_id.clone()),
            total_picks: Some(category.total_picks),
            points_per_correct_pick: category.points_per_correct_pick,
            wager_points: category.wager_points,
            uses_wager: category.uses_wager,
            auto_scores_remaining_contestants: category.auto_scores_remaining_contestants,
            is_locked: category.is_locked,
            kind: Some(category.kind.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseDocument {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sort_index: Option<i32>,
    pub categories: Vec<PhaseCategoryDocument>,
}

impl PhaseDocument {
    pub fn model(&self) -> Option<PickPhase> {
        let id = self.id.as_deref().and_then(parse_uuid)?;
        Some(PickPhase {
            id,
            name: self.name.clone().unwrap_or_default(),
            categories: self.categories.iter().filter_map(PhaseCategoryDocument::model).collect(),
        })
    }

    pub fn from_model(phase: &PickPhase, sort_index: i32) -> Self {
        Self {
            id: Some(phase.id.to_string()),
            name: Some(phase.name.clone()),
            sort_index: Some(sort_index),
            categories: phase.categories.iter().map(PhaseCategoryDocument::from_model).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EpisodeResultDocument {
    pub id: Option<u32>,
    pub phase_id: Option<String>,
    pub immunity_winners: Vec<String>,
    pub voted_out: Vec<String>,
    pub category_winners: Option<HashMap<String, Vec<String>>>,
}

impl EpisodeResultDocument {
    /// Both representations decode as written; entries keyed by an invalid
    /// category id are dropped.
    pub fn model(&self) -> Option<EpisodeResult> {
        let id = self.id?;
        let mut result = EpisodeResult::new(id, self.phase_id.as_deref().and_then(parse_uuid));
        result.immunity_winners = self.immunity_winners.iter().cloned().collect();
        result.voted_out = self.voted_out.iter().cloned().collect();
        for (key, winners) in self.category_winners.iter().flatten() {
            if let Some(category_id) = parse_uuid(key)
                && !winners.is_empty()
            {
                result.category_winners.insert(category_id, winners.clone());
            }
        }
        Some(result)
    }

    pub fn from_model(result: &EpisodeResult) -> Self {
        Self {
            id: Some(result.id),
            phase_id: result.phase_id.map(|id| id.to_string()),
            immunity_winners: result.immunity_winners.iter().cloned().collect(),
            voted_out: result.voted_out.iter().cloned().collect(),
            category_winners: Some(
                result
                    .category_winners
                    .iter()
                    .map(|(id, winners)| (id.to_string(), winners.clone()))
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Users and picks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDocument {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_asset_name: Option<String>,
}

impl UserDocument {
    pub fn model(&self) -> Option<UserProfile> {
        let id = self.id.as_ref().filter(|id| !id.trim().is_empty())?;
        Some(UserProfile {
            id: id.clone(),
            display_name: self.display_name.clone().unwrap_or_default(),
            avatar_asset: self.avatar_asset_name.clone(),
        })
    }

    pub fn from_model(user: &UserProfile) -> Self {
        Self {
            id: Some(user.id.clone()),
            display_name: Some(user.display_name.clone()),
            avatar_asset_name: user.avatar_asset.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonPicksDocument {
    pub user_id: Option<String>,
    pub merge_picks: Vec<String>,
    pub final_three_picks: Vec<String>,
    pub winner_pick: Option<String>,
}

impl SeasonPicksDocument {
    /// Oversized track picks make the document malformed; it is dropped
    /// rather than silently truncated.
    pub fn model(&self) -> Option<SeasonPicks> {
        let user_id = self.user_id.as_ref().filter(|id| !id.trim().is_empty())?;
        let mut picks = SeasonPicks::new(user_id);
        if !picks.set_merge_picks(self.merge_picks.iter().cloned().collect()) {
            return None;
        }
        if !picks.set_final_three_picks(self.final_three_picks.iter().cloned().collect()) {
            return None;
        }
        picks.winner_pick = self.winner_pick.clone();
        Some(picks)
    }

    pub fn from_model(picks: &SeasonPicks) -> Self {
        Self {
            user_id: Some(picks.user_id.clone()),
            merge_picks: picks.merge_picks().iter().cloned().collect(),
            final_three_picks: picks.final_three_picks().iter().cloned().collect(),
            winner_pick: picks.winner_pick.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyPicksDocument {
    pub user_id: Option<String>,
    pub episode_id: Option<u32>,
    pub remain: Vec<String>,
    pub voted_out: Vec<String>,
    pub immunity: Vec<String>,
    pub category_selections: HashMap<String, Vec<String>>,
    pub category_wagers: HashMap<String, i32>,
    pub is_submitted: bool,
}

impl WeeklyPicksDocument {
    pub fn model(&self) -> Option<WeeklyPicks> {
        let user_id = self.user_id.as_ref().filter(|id| !id.trim().is_empty())?;
        let episode_id = self.episode_id?;
        let mut picks = WeeklyPicks::new(user_id, episode_id);
        picks.remain = self.remain.iter().cloned().collect();
        picks.voted_out = self.voted_out.iter().cloned().collect();
        picks.immunity = self.immunity.iter().cloned().collect();
        for (key, selection) in &self.category_selections {
            if let Some(category_id) = parse_uuid(key)
                && !selection.is_empty()
            {
                picks
                    .category_selections
                    .insert(category_id, selection.iter().cloned().collect());
            }
        }
        for (key, wager) in &self.category_wagers {
            if let Some(category_id) = parse_uuid(key) {
                picks.category_wagers.insert(category_id, *wager);
            }
        }
        picks.is_submitted = self.is_submitted;
        Some(picks)
    }

    pub fn from_model(picks: &WeeklyPicks) -> Self {
        Self {
            user_id: Some(picks.user_id.clone()),
            episode_id: Some(picks.episode_id),
            remain: picks.remain.iter().cloned().collect(),
            voted_out: picks.voted_out.iter().cloned().collect(),
            immunity: picks.immunity.iter().cloned().collect(),
            category_selections: picks
                .category_selections
                .iter()
                .map(|(id, selection)| {
                    (id.to_string(), selection.iter().cloned().collect())
                })
                .collect(),
            category_wagers: picks
                .category_wagers
                .iter()
                .map(|(id, wager)| (id.to_string(), *wager))
                .collect(),
            is_submitted: picks.is_submitted,
        }
    }
}

// ---------------------------------------------------------------------------
// Full-league snapshot (local files and the embedded demo season)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeagueSnapshot {
    pub config: Option<SeasonConfigDocument>,
    pub state: SeasonStateDocument,
    pub phases: Vec<PhaseDocument>,
    pub results: Vec<EpisodeResultDocument>,
    pub users: Vec<UserDocument>,
    pub season_picks: Vec<SeasonPicksDocument>,
    pub weekly_picks: Vec<WeeklyPicksDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CategoryRole;
    use std::collections::BTreeSet;

    #[test]
    fn episode_result_round_trips_both_representations() {
        let voted = Category::new("Voted Out", "VO", 1).with_kind(CategoryKind::VotedOut);
        let reward = Category::new("Reward Challenge", "RC", 2).with_points(5);

        let mut result = EpisodeResult::new(3, Some(Uuid::new_v4()));
        result.set_winners(&voted, vec!["q".into()]);
        result.set_winners(&reward, vec!["eva_erickson".into(), "mitch_guerra".into()]);

        let json = serde_json::to_string(&EpisodeResultDocument::from_model(&result)).unwrap();
        let decoded: EpisodeResultDocument = serde_json::from_str(&json).unwrap();
        let restored = decoded.model().unwrap();

        assert_eq!(restored, result);
        // Legacy mirror still matches the category winners after the trip.
        let mirrored: BTreeSet<String> = restored.winners(&voted.id).iter().cloned().collect();
        assert_eq!(restored.voted_out, mirrored);
    }

    #[test]
    fn malformed_category_winner_keys_are_dropped() {
        let json = r#"{
            "id": 2,
            "votedOut": ["q"],
            "categoryWinners": {"not-a-uuid": ["q"], "": ["q"]}
        }"#;
        let decoded: EpisodeResultDocument = serde_json::from_str(json).unwrap();
        let result = decoded.model().unwrap();
        assert!(result.category_winners.is_empty());
        assert!(result.voted_out.contains("q"));
    }

    #[test]
    fn result_document_without_an_id_produces_no_model() {
        let decoded: EpisodeResultDocument =
            serde_json::from_str(r#"{"votedOut": ["q"]}"#).unwrap();
        assert!(decoded.model().is_none());
    }

    #[test]
    fn phase_document_round_trips_category_configuration() {
        let phase = PickPhase::preconfigured().remove(0);
        let json = serde_json::to_string(&PhaseDocument::from_model(&phase, 0)).unwrap();
        let decoded: PhaseDocument = serde_json::from_str(&json).unwrap();
        let restored = decoded.model().unwrap();

        assert_eq!(restored, phase);
        assert_eq!(
            restored.category_for_role(CategoryRole::Merge).map(|c| c.column_id.as_str()),
            Some("MG")
        );
    }

    #[test]
    fn unknown_category_kind_decodes_as_custom() {
        let doc = PhaseCategoryDocument {
            id: Some(Uuid::new_v4().to_string()),
            name: Some("Mystery".into()),
            kind: Some("somethingNew".into()),
            ..Default::default()
        };
        assert_eq!(doc.model().unwrap().kind, CategoryKind::Custom);
    }

    #[test]
    fn weekly_picks_round_trip_preserves_wagers_and_legacy_sets() {
        let fire = Category::new("Fire Bet", "FB", 1).with_wager(30);
        let mut picks = WeeklyPicks::new("u1", 5);
        picks.remain = ["boston_rob".to_string()].into();
        picks.set_selections(&fire, ["parvati_shallow".to_string()].into());
        picks.set_wager(fire.id, Some(20));
        picks.is_submitted = true;

        let json = serde_json::to_string(&WeeklyPicksDocument::from_model(&picks)).unwrap();
        let decoded: WeeklyPicksDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.model().unwrap(), picks);
    }

    #[test]
    fn oversized_season_picks_document_is_dropped() {
        let doc = SeasonPicksDocument {
            user_id: Some("u1".into()),
            merge_picks: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..Default::default()
        };
        assert!(doc.model().is_none());
    }

    #[test]
    fn season_state_document_skips_unparseable_phase_ids() {
        let doc = SeasonStateDocument {
            active_phase_id: Some("garbage".into()),
            activated_phase_ids: Some(vec![Uuid::nil().to_string(), "nope".into()]),
        };
        assert_eq!(doc.active_phase(), None);
        assert_eq!(doc.activated_phases(), vec![Uuid::nil()]);
    }
}
