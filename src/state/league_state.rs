use crate::standings::{StandingsRow, StandingsTable};
use crate::state::messages::SyncRequest;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use survivor_league::docs::LeagueSnapshot;
use survivor_league::locking::{apply_locked_selections, is_category_editable};
use survivor_league::matcher::validate_phase;
use survivor_league::scoring::ScoringEngine;
use survivor_league::{
    Category, ConfigError, EpisodeResult, Episode, PickPhase, SeasonConfig, SeasonPicks,
    UserProfile, UserScoreBreakdown, WeeklyPicks,
};
use thiserror::Error;
use uuid::Uuid;

/// Rejections from the store's mutation boundary. Nothing here is fatal;
/// the state is unchanged whenever one of these comes back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("phase {0} has been activated and can no longer be edited")]
    PhaseImmutable(Uuid),
    #[error("unknown phase {0}")]
    UnknownPhase(Uuid),
    #[error("no result exists for episode {0}")]
    UnknownEpisode(u32),
    #[error("unknown category {0}")]
    UnknownCategory(Uuid),
    #[error("no category with column id \"{0}\" governs that episode")]
    UnknownColumn(String),
    #[error("category \"{category}\" allows at most {cap} picks")]
    TooManyPicks { category: String, cap: u32 },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// Whether the store is currently applying a remote snapshot. Mutations
/// made in that mode never republish to the repository, which is what
/// keeps inbound sync from echoing back out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SyncMode {
    #[default]
    Idle,
    ApplyingRemoteSnapshot,
}

/// The league's single mutable aggregate. Owned by the store actor; all
/// reads and writes are serialized there.
#[derive(Debug, Default)]
pub struct LeagueState {
    pub config: SeasonConfig,
    pub phases: Vec<PickPhase>,
    pub active_phase_id: Option<Uuid>,
    pub activated_phase_ids: BTreeSet<Uuid>,
    /// Keyed by episode id: upsert semantics, at most one result per week.
    pub results: BTreeMap<u32, EpisodeResult>,
    pub users: Vec<UserProfile>,
    pub season_picks: HashMap<String, SeasonPicks>,
    pub weekly_picks: HashMap<String, HashMap<u32, WeeklyPicks>>,
    sync_mode: SyncMode,
    outbox: Vec<SyncRequest>,
}

impl LeagueState {
    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    pub fn active_phase(&self) -> Option<&PickPhase> {
        let id = self.active_phase_id?;
        self.phases.iter().find(|p| p.id == id)
    }

    /// A phase becomes immutable the moment it is activated for a week or
    /// any recorded result references it.
    pub fn has_phase_ever_been_active(&self, phase_id: Uuid) -> bool {
        self.activated_phase_ids.contains(&phase_id)
            || self.results.values().any(|r| r.phase_id == Some(phase_id))
    }

    /// The phase governing an episode: the result's recorded phase when
    /// present, the active phase otherwise.
    pub fn phase_context(&self, episode_id: u32) -> Option<&PickPhase> {
        if let Some(result) = self.results.get(&episode_id)
            && let Some(phase_id) = result.phase_id
            && let Some(phase) = self.phases.iter().find(|p| p.id == phase_id)
        {
            return Some(phase);
        }
        self.active_phase()
    }

    /// Episodes belonging to a phase, ascending.
    pub fn phase_episode_ids(&self, phase_id: Uuid) -> Vec<u32> {
        self.results
            .values()
            .filter(|r| r.phase_id == Some(phase_id))
            .map(|r| r.id)
            .collect()
    }

    fn engine(&self) -> ScoringEngine<'_> {
        ScoringEngine::new(&self.config, &self.results, self.phases.iter())
    }

    pub fn standings(&self) -> Vec<UserScoreBreakdown> {
        let engine = self.engine();
        let active_phase = self.active_phase();
        let empty = HashMap::new();
        let mut rows: Vec<UserScoreBreakdown> = self
            .users
            .iter()
            .map(|user| {
                let weekly = self.weekly_picks.get(&user.id).unwrap_or(&empty);
                engine.season_breakdown(
                    &user.id,
                    weekly,
                    self.season_picks.get(&user.id),
                    active_phase,
                )
            })
            .collect();
        rows.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.user_id.cmp(&b.user_id)));
        rows
    }

    pub fn standings_table(&self) -> StandingsTable {
        let rows = self
            .standings()
            .into_iter()
            .map(|breakdown| {
                let display_name = self
                    .users
                    .iter()
                    .find(|u| u.id == breakdown.user_id)
                    .map(|u| u.display_name.clone())
                    .unwrap_or_else(|| breakdown.user_id.clone());
                StandingsRow { display_name, breakdown }
            })
            .collect();
        StandingsTable { season: self.config.name.clone(), rows }
    }

    pub fn is_category_editable_for(
        &self,
        user_id: &str,
        episode_id: u32,
        category_id: Uuid,
    ) -> bool {
        let Some(phase) = self.phase_context(episode_id) else {
            return true;
        };
        let Some(category) = phase.category(&category_id) else {
            return true;
        };
        let episode_ids = self.phase_episode_ids(phase.id);
        let empty = HashMap::new();
        let user_picks = self.weekly_picks.get(user_id).unwrap_or(&empty);
        is_category_editable(category, episode_id, &episode_ids, user_picks)
    }

    // -----------------------------------------------------------------------
    // Admin mutations
    // -----------------------------------------------------------------------

    /// Insert or replace a phase. Activated phases are frozen to protect
    /// score history.
    pub fn save_phase(&mut self, phase: PickPhase) -> Result<(), StoreError> {
        validate_phase(&phase)?;
        match self.phases.iter().position(|p| p.id == phase.id) {
            Some(index) => {
                if self.has_phase_ever_been_active(phase.id) {
                    return Err(StoreError::PhaseImmutable(phase.id));
                }
                self.phases[index] = phase;
            }
            None => self.phases.push(phase),
        }
        self.publish(SyncRequest::SavePhases(self.phases.clone()));
        Ok(())
    }

    /// Delete a phase that was never activated.
    pub fn delete_phase(&mut self, phase_id: Uuid) -> Result<(), StoreError> {
        if !self.phases.iter().any(|p| p.id == phase_id) {
            return Err(StoreError::UnknownPhase(phase_id));
        }
        if self.has_phase_ever_been_active(phase_id) {
            return Err(StoreError::PhaseImmutable(phase_id));
        }
        self.phases.retain(|p| p.id != phase_id);
        if self.active_phase_id == Some(phase_id) {
            self.active_phase_id = None;
        }
        self.publish(SyncRequest::DeletePhase(phase_id));
        self.publish_season_state();
        Ok(())
    }

    pub fn activate_phase(&mut self, phase_id: Uuid) -> Result<(), StoreError> {
        if !self.phases.iter().any(|p| p.id == phase_id) {
            return Err(StoreError::UnknownPhase(phase_id));
        }
        self.active_phase_id = Some(phase_id);
        self.activated_phase_ids.insert(phase_id);
        self.publish_season_state();
        Ok(())
    }

    /// Open the next week: append the episode and create its empty result
    /// bound to the active phase. The previous week is considered closed
    /// once it has recorded results.
    pub fn start_new_week(&mut self) -> Result<u32, StoreError> {
        let last_episode = self.config.episodes.iter().map(|e| e.id).max().unwrap_or(0);
        let last_result = self.results.keys().next_back().copied().unwrap_or(0);
        let next_id = last_episode.max(last_result) + 1;

        self.config.episodes.push(Episode::new(next_id, None, false));
        let result = EpisodeResult::new(next_id, self.active_phase_id);
        self.results.insert(next_id, result.clone());
        if let Some(phase_id) = self.active_phase_id {
            self.activated_phase_ids.insert(phase_id);
        }

        self.publish(SyncRequest::SaveConfig(self.config.clone()));
        self.publish(SyncRequest::SaveResult(result));
        self.publish_season_state();
        Ok(next_id)
    }

    /// Record category winners for an episode. Goes through the category
    /// path so the legacy immunity/voted-out mirrors stay consistent.
    pub fn record_winners(
        &mut self,
        episode_id: u32,
        category_id: Uuid,
        winners: Vec<String>,
    ) -> Result<(), StoreError> {
        if !self.results.contains_key(&episode_id) {
            return Err(StoreError::UnknownEpisode(episode_id));
        }
        let category = self
            .phase_context(episode_id)
            .and_then(|phase| phase.category(&category_id))
            .or_else(|| self.phases.iter().find_map(|p| p.category(&category_id)))
            .cloned()
            .ok_or(StoreError::UnknownCategory(category_id))?;

        let result = self
            .results
            .get_mut(&episode_id)
            .ok_or(StoreError::UnknownEpisode(episode_id))?;
        result.set_winners(&category, winners);
        let result = result.clone();
        self.publish(SyncRequest::SaveResult(result));
        Ok(())
    }

    /// Console-friendly variant of [`Self::record_winners`], resolving the
    /// category by its column id within the episode's governing phase.
    pub fn record_winners_by_column(
        &mut self,
        episode_id: u32,
        column_id: &str,
        winners: Vec<String>,
    ) -> Result<(), StoreError> {
        let category_id = self
            .category_by_column(episode_id, column_id)
            .map(|c| c.id)
            .ok_or_else(|| StoreError::UnknownColumn(column_id.to_string()))?;
        self.record_winners(episode_id, category_id, winners)
    }

    // -----------------------------------------------------------------------
    // Pick mutations
    // -----------------------------------------------------------------------

    /// Store a user's weekly picks. Selection caps are enforced, then
    /// locked categories are snapped back to their canonical selection.
    /// Returns whether locking changed anything.
    pub fn save_weekly_picks(&mut self, mut picks: WeeklyPicks) -> Result<bool, StoreError> {
        let mut changed = false;
        if let Some(phase) = self.phase_context(picks.episode_id).cloned() {
            for category in &phase.categories {
                let selected = picks.selections(&category.id).len() as u32;
                if selected > category.total_picks {
                    return Err(StoreError::TooManyPicks {
                        category: category.name.clone(),
                        cap: category.total_picks,
                    });
                }
            }
            let episode_ids = self.phase_episode_ids(phase.id);
            let empty = HashMap::new();
            let user_picks = self.weekly_picks.get(&picks.user_id).unwrap_or(&empty);
            changed = apply_locked_selections(&mut picks, &phase, &episode_ids, user_picks);
        }
        self.weekly_picks
            .entry(picks.user_id.clone())
            .or_default()
            .insert(picks.episode_id, picks.clone());
        self.publish(SyncRequest::SaveWeeklyPicks(picks));
        Ok(changed)
    }

    pub fn save_season_picks(&mut self, picks: SeasonPicks) {
        self.season_picks.insert(picks.user_id.clone(), picks.clone());
        self.publish(SyncRequest::SaveSeasonPicks(picks));
    }

    // -----------------------------------------------------------------------
    // Remote snapshot application — full replacement, never republished
    // -----------------------------------------------------------------------

    fn applying_remote<F: FnOnce(&mut Self)>(&mut self, apply: F) {
        self.sync_mode = SyncMode::ApplyingRemoteSnapshot;
        apply(self);
        self.sync_mode = SyncMode::Idle;
    }

    pub fn apply_config(&mut self, config: SeasonConfig) {
        self.applying_remote(|state| state.config = config);
    }

    pub fn apply_phases(&mut self, phases: Vec<PickPhase>) {
        self.applying_remote(|state| state.phases = phases);
    }

    pub fn apply_season_state(&mut self, active: Option<Uuid>, activated: Vec<Uuid>) {
        self.applying_remote(|state| {
            state.active_phase_id = active;
            state.activated_phase_ids = activated.into_iter().collect();
        });
    }

    pub fn apply_results(&mut self, results: Vec<EpisodeResult>) {
        self.applying_remote(|state| {
            state.results = results.into_iter().map(|r| (r.id, r)).collect();
        });
    }

    pub fn apply_users(&mut self, users: Vec<UserProfile>) {
        self.applying_remote(|state| {
            state.users = users;
            for user in &state.users {
                state.season_picks.entry(user.id.clone()).or_insert_with(|| {
                    SeasonPicks::new(&user.id)
                });
                state.weekly_picks.entry(user.id.clone()).or_default();
            }
        });
    }

    pub fn apply_season_picks(&mut self, picks: Vec<SeasonPicks>) {
        self.applying_remote(|state| {
            state.season_picks = picks.into_iter().map(|p| (p.user_id.clone(), p)).collect();
        });
    }

    pub fn apply_weekly_picks(&mut self, picks: Vec<WeeklyPicks>) {
        self.applying_remote(|state| {
            state.weekly_picks.clear();
            for p in picks {
                state
                    .weekly_picks
                    .entry(p.user_id.clone())
                    .or_default()
                    .insert(p.episode_id, p);
            }
        });
    }

    /// Apply a whole-league snapshot (local file or embedded demo).
    pub fn apply_snapshot(&mut self, snapshot: &LeagueSnapshot) {
        if let Some(config) = snapshot.config.as_ref().and_then(|c| c.model()) {
            self.apply_config(config);
        }
        self.apply_phases(snapshot.phases.iter().filter_map(|p| p.model()).collect());
        self.apply_season_state(
            snapshot.state.active_phase(),
            snapshot.state.activated_phases(),
        );
        self.apply_results(snapshot.results.iter().filter_map(|r| r.model()).collect());
        self.apply_users(snapshot.users.iter().filter_map(|u| u.model()).collect());
        self.apply_season_picks(
            snapshot.season_picks.iter().filter_map(|p| p.model()).collect(),
        );
        self.apply_weekly_picks(
            snapshot.weekly_picks.iter().filter_map(|p| p.model()).collect(),
        );
    }

    // -----------------------------------------------------------------------
    // Outbound sync
    // -----------------------------------------------------------------------

    fn publish(&mut self, request: SyncRequest) {
        if self.sync_mode == SyncMode::Idle {
            self.outbox.push(request);
        }
    }

    fn publish_season_state(&mut self) {
        let activated = self.activated_phase_ids.iter().copied().collect();
        self.publish(SyncRequest::SaveSeasonState {
            active: self.active_phase_id,
            activated,
        });
    }

    pub fn take_outbox(&mut self) -> Vec<SyncRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Find a category in the episode's governing phase by its column id.
    pub fn category_by_column(&self, episode_id: u32, column_id: &str) -> Option<&Category> {
        let key = column_id.trim().to_uppercase();
        self.phase_context(episode_id)?
            .categories
            .iter()
            .find(|c| c.column_key().as_deref() == Some(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use survivor_league::client::demo_snapshot;
    use survivor_league::{Category, CategoryKind};

    fn phase_with_voted_out() -> PickPhase {
        PickPhase::new(
            "Pre-merge",
            vec![
                Category::new("Voted out", "VO", 3)
                    .with_points(3)
                    .with_kind(CategoryKind::VotedOut),
                Category::new("Mergers", "MG", 3)
                    .with_points(1)
                    .with_kind(CategoryKind::Merge)
                    .locked(),
            ],
        )
    }

    fn selection(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn activated_phase_can_no_longer_be_edited() {
        let mut state = LeagueState::default();
        let mut phase = phase_with_voted_out();
        let phase_id = phase.id;
        state.save_phase(phase.clone()).expect("initial save");

        state.activate_phase(phase_id).expect("activate");
        phase.name = "Renamed".into();
        assert_eq!(state.save_phase(phase), Err(StoreError::PhaseImmutable(phase_id)));
        assert_eq!(state.phases[0].name, "Pre-merge");
    }

    #[test]
    fn phase_referenced_by_a_result_is_immutable_too() {
        let mut state = LeagueState::default();
        let mut phase = phase_with_voted_out();
        let phase_id = phase.id;
        state.save_phase(phase.clone()).expect("initial save");
        state.results.insert(1, EpisodeResult::new(1, Some(phase_id)));

        phase.categories.clear();
        assert_eq!(state.save_phase(phase), Err(StoreError::PhaseImmutable(phase_id)));
        assert_eq!(state.delete_phase(phase_id), Err(StoreError::PhaseImmutable(phase_id)));
    }

    #[test]
    fn unactivated_phase_can_be_deleted() {
        let mut state = LeagueState::default();
        let phase = phase_with_voted_out();
        let phase_id = phase.id;
        state.save_phase(phase).expect("save");
        assert!(state.delete_phase(phase_id).is_ok());
        assert!(state.phases.is_empty());
    }

    #[test]
    fn invalid_phase_configuration_is_rejected_at_save() {
        let mut state = LeagueState::default();
        let phase = PickPhase::new(
            "Broken",
            vec![
                Category::new("Immunity", "IM", 1).with_points(3),
                Category::new("Immunity Again", "IM", 1).with_points(3),
            ],
        );
        assert!(matches!(
            state.save_phase(phase),
            Err(StoreError::InvalidConfig(ConfigError::DuplicateColumnId { .. }))
        ));
        assert!(state.phases.is_empty());
    }

    #[test]
    fn start_new_week_binds_the_active_phase() {
        let mut state = LeagueState::default();
        let phase = phase_with_voted_out();
        let phase_id = phase.id;
        state.save_phase(phase).expect("save");
        state.activate_phase(phase_id).expect("activate");

        let week = state.start_new_week().expect("start week");
        assert_eq!(week, 1);
        assert_eq!(state.results[&1].phase_id, Some(phase_id));
        assert_eq!(state.config.episodes.len(), 1);
        assert!(state.has_phase_ever_been_active(phase_id));

        let next = state.start_new_week().expect("second week");
        assert_eq!(next, 2);
    }

    #[test]
    fn record_winners_keeps_the_legacy_mirror_consistent() {
        let mut state = LeagueState::default();
        let phase = phase_with_voted_out();
        let phase_id = phase.id;
        let voted_id = phase.categories[0].id;
        state.save_phase(phase).expect("save");
        state.activate_phase(phase_id).expect("activate");
        state.start_new_week().expect("week");

        state
            .record_winners(1, voted_id, vec!["boston_rob".into()])
            .expect("record");
        let result = &state.results[&1];
        assert!(result.voted_out.contains("boston_rob"));
        assert_eq!(result.winners(&voted_id), ["boston_rob".to_string()]);
        assert!(result.has_recorded_results());
    }

    #[test]
    fn weekly_picks_snap_back_to_the_locked_selection() {
        let mut state = LeagueState::default();
        let phase = phase_with_voted_out();
        let phase_id = phase.id;
        let mergers = phase.categories[1].clone();
        state.save_phase(phase).expect("save");
        state.activate_phase(phase_id).expect("activate");
        state.start_new_week().expect("week 1");
        state.start_new_week().expect("week 2");

        let mut week1 = WeeklyPicks::new("u1", 1);
        week1.set_selections(&mergers, selection(&["boston_rob"]));
        assert_eq!(state.save_weekly_picks(week1), Ok(false));

        let mut week2 = WeeklyPicks::new("u1", 2);
        week2.set_selections(&mergers, selection(&["russell_hantz"]));
        assert_eq!(state.save_weekly_picks(week2), Ok(true));

        let stored = &state.weekly_picks["u1"][&2];
        assert_eq!(stored.selections(&mergers.id), &selection(&["boston_rob"]));
        assert!(!state.is_category_editable_for("u1", 2, mergers.id));
        assert!(state.is_category_editable_for("u1", 1, mergers.id));
    }

    #[test]
    fn weekly_picks_over_the_category_cap_are_rejected() {
        let mut state = LeagueState::default();
        let phase = phase_with_voted_out();
        let phase_id = phase.id;
        let voted = phase.categories[0].clone();
        state.save_phase(phase).expect("save");
        state.activate_phase(phase_id).expect("activate");
        state.start_new_week().expect("week");

        let mut picks = WeeklyPicks::new("u1", 1);
        picks.set_selections(&voted, selection(&["a", "b", "c", "d"]));
        assert!(matches!(
            state.save_weekly_picks(picks),
            Err(StoreError::TooManyPicks { cap: 3, .. })
        ));
    }

    #[test]
    fn applying_remote_snapshots_never_republishes() {
        let mut state = LeagueState::default();
        state.apply_snapshot(&demo_snapshot().expect("demo"));
        assert!(state.take_outbox().is_empty());

        // A local mutation immediately afterwards does publish.
        let picks = WeeklyPicks::new("u-zac", 1);
        state.save_weekly_picks(picks).expect("save");
        assert!(!state.take_outbox().is_empty());
    }

    #[test]
    fn results_upsert_by_episode_id() {
        let mut state = LeagueState::default();
        state.apply_results(vec![EpisodeResult::new(1, None), EpisodeResult::new(1, None)]);
        assert_eq!(state.results.len(), 1);
    }

    #[test]
    fn demo_snapshot_standings_are_ranked_and_totaled() {
        let mut state = LeagueState::default();
        state.apply_snapshot(&demo_snapshot().expect("demo"));

        let standings = state.standings();
        assert_eq!(standings.len(), 2);
        // Zac: 6 voted-out + 6 immunity + 9 merge track + 9 final-three.
        assert_eq!(standings[0].user_id, "u-zac");
        assert_eq!(standings[0].total(), 30);
        // Sam: 6 + 6 + 8 + 9 — Russell's exit costs a merge-track point.
        assert_eq!(standings[1].user_id, "u-sam");
        assert_eq!(standings[1].total(), 29);

        let table = state.standings_table();
        assert_eq!(table.rows[0].display_name, "Zac");
    }
}
