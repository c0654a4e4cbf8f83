//! The scoring engine: pure computation from picks + configuration +
//! recorded results to point breakdowns. No side effects, total over
//! well-formed input — missing data scores zero, never errors.

use crate::matcher::CategoryRole;
use crate::{
    CategoryKind, Episode, EpisodeResult, PhaseEra, PickPhase, SeasonConfig, SeasonPicks,
    UserScoreBreakdown, WeeklyPicks, WeeklyScoreBreakdown,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Fixed award for calling the sole survivor.
pub const WINNER_POINTS: i32 = 5;

/// Per-pick point defaults by era, used when the active phase carries no
/// point value for a well-known role.
fn era_default_points(era: PhaseEra, role: CategoryRole) -> i32 {
    match (era, role) {
        (_, CategoryRole::VotedOut) => 3,
        (_, CategoryRole::Remain) => 1,
        (PhaseEra::PreMerge, CategoryRole::Immunity) => 1,
        (PhaseEra::PostMerge, CategoryRole::Immunity) => 3,
        _ => 0,
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine<'a> {
    config: &'a SeasonConfig,
    results: &'a BTreeMap<u32, EpisodeResult>,
    phases: HashMap<Uuid, &'a PickPhase>,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(
        config: &'a SeasonConfig,
        results: &'a BTreeMap<u32, EpisodeResult>,
        phases: impl IntoIterator<Item = &'a PickPhase>,
    ) -> Self {
        Self {
            config,
            results,
            phases: phases.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// Legacy era signal: the episode itself, or any earlier episode,
    /// being flagged as the merge puts us post-merge.
    pub fn era(&self, episode: &Episode) -> PhaseEra {
        if episode.is_merge_episode {
            return PhaseEra::PostMerge;
        }
        let merged = self
            .config
            .episodes
            .iter()
            .any(|e| e.id <= episode.id && e.is_merge_episode);
        if merged { PhaseEra::PostMerge } else { PhaseEra::PreMerge }
    }

    /// Era for point defaults: a phase named "pre…merge"/"post…merge"
    /// decides directly, anything else falls back to the episode signal.
    fn era_for_phase(&self, phase: Option<&PickPhase>, episode: &Episode) -> PhaseEra {
        if let Some(phase) = phase {
            let name = phase.name.to_lowercase();
            if name.contains("merge") {
                if name.contains("pre") {
                    return PhaseEra::PreMerge;
                }
                if name.contains("post") {
                    return PhaseEra::PostMerge;
                }
            }
        }
        self.era(episode)
    }

    /// Contestants eliminated strictly before this episode. A contestant
    /// voted out in week N still counts for week-N scoring itself.
    pub fn prior_eliminations(&self, episode_id: u32) -> BTreeSet<String> {
        self.results
            .range(..episode_id)
            .flat_map(|(_, result)| result.voted_out.iter().cloned())
            .collect()
    }

    /// The phase governing a result: its recorded phase first, the
    /// currently active phase as the fallback.
    fn resolve_phase(
        &self,
        result: &EpisodeResult,
        active_phase: Option<&'a PickPhase>,
    ) -> Option<&'a PickPhase> {
        result
            .phase_id
            .and_then(|id| self.phases.get(&id).copied())
            .or(active_phase)
    }

    /// Score one user's picks for one episode. Returns an all-zero
    /// breakdown when no result has been recorded yet.
    pub fn score(
        &self,
        weekly: &WeeklyPicks,
        episode: &Episode,
        active_phase: Option<&'a PickPhase>,
    ) -> WeeklyScoreBreakdown {
        let Some(result) = self.results.get(&episode.id) else {
            return WeeklyScoreBreakdown::default();
        };

        let phase = self.resolve_phase(result, active_phase);
        let era = self.era_for_phase(phase, episode);
        let prior = self.prior_eliminations(episode.id);

        let points_for = |role: CategoryRole| {
            phase
                .and_then(|p| p.points_for_role(role))
                .unwrap_or_else(|| era_default_points(era, role))
        };
        let award = |hits: i32, value: i32| if value > 0 { hits * value } else { 0 };

        let voted_out_hits = weekly
            .selections_for_role(phase, CategoryRole::VotedOut)
            .iter()
            .filter(|c| result.voted_out.contains(*c))
            .count() as i32;

        // Remain picks only count while the contestant is actually still in:
        // not eliminated in a prior week, and not going home this week.
        let remain_hits = weekly
            .selections_for_role(phase, CategoryRole::Remain)
            .iter()
            .filter(|c| !prior.contains(*c) && !result.voted_out.contains(*c))
            .count() as i32;

        let immunity_hits = weekly
            .selections_for_role(phase, CategoryRole::Immunity)
            .iter()
            .filter(|c| result.immunity_winners.contains(*c))
            .count() as i32;

        let mut breakdown = WeeklyScoreBreakdown {
            voted_out: award(voted_out_hits, points_for(CategoryRole::VotedOut)),
            remain: award(remain_hits, points_for(CategoryRole::Remain)),
            immunity: award(immunity_hits, points_for(CategoryRole::Immunity)),
            category_points: BTreeMap::new(),
        };

        // Everything else scores through its column id, restricted to the
        // governing phase's category list. The well-known roles above are
        // excluded here even when they also appear in category_winners.
        if let Some(phase) = phase {
            for category in &phase.categories {
                if matches!(
                    category.role(),
                    Some(CategoryRole::Remain | CategoryRole::VotedOut | CategoryRole::Immunity)
                ) {
                    continue;
                }
                let winners = result.winners(&category.id);
                if winners.is_empty() {
                    continue;
                }
                let Some(column) = category.column_key() else {
                    continue;
                };

                let contribution = if category.uses_wager {
                    let Some(pick) = weekly.selections(&category.id).iter().next() else {
                        continue;
                    };
                    let amount = weekly
                        .wager(&category.id)
                        .or(category.wager_points)
                        .unwrap_or(0);
                    if amount <= 0 {
                        continue;
                    }
                    if winners.contains(pick) { amount } else { -amount }
                } else {
                    let Some(points) =
                        category.points_per_correct_pick.filter(|p| *p > 0)
                    else {
                        continue;
                    };
                    let hits = weekly
                        .selections(&category.id)
                        .iter()
                        .filter(|c| winners.contains(*c))
                        .count() as i32;
                    if hits == 0 {
                        continue;
                    }
                    hits * points
                };

                *breakdown.category_points.entry(column).or_insert(0) += contribution;
            }
        }

        breakdown
    }

    /// Season-track scoring: one point per picked contestant still alive
    /// per recorded episode, through the cutoff. An elimination takes
    /// effect in its own episode.
    fn track_points(&self, picks: &BTreeSet<String>, up_to: u32) -> i32 {
        if picks.is_empty() {
            return 0;
        }
        let mut eliminated: BTreeSet<&str> = BTreeSet::new();
        let mut points = 0;
        for (_, result) in self.results.range(..=up_to) {
            eliminated.extend(result.voted_out.iter().map(String::as_str));
            points += picks.iter().filter(|c| !eliminated.contains(c.as_str())).count() as i32;
        }
        points
    }

    pub fn merge_track_points(&self, season_picks: &SeasonPicks, up_to: u32) -> i32 {
        self.track_points(season_picks.merge_picks(), up_to)
    }

    pub fn final_three_track_points(&self, season_picks: &SeasonPicks, up_to: u32) -> i32 {
        self.track_points(season_picks.final_three_picks(), up_to)
    }

    /// The sole survivor, derived from the most recent recorded winner
    /// category. Explicitly tagged winner categories win over name-matched
    /// ones, so a "Fire Winner" side category can't decide the season.
    pub fn sole_survivor_id(&self) -> Option<String> {
        for (_, result) in self.results.iter().rev() {
            let Some(phase) = result.phase_id.and_then(|id| self.phases.get(&id)) else {
                continue;
            };
            let category = phase
                .categories
                .iter()
                .find(|c| c.kind == CategoryKind::Winner)
                .or_else(|| {
                    phase
                        .categories
                        .iter()
                        .find(|c| c.role() == Some(CategoryRole::Winner))
                });
            if let Some(category) = category
                && let Some(winner) = result.winners(&category.id).first()
            {
                return Some(winner.clone());
            }
        }
        None
    }

    pub fn winner_points(&self, season_picks: &SeasonPicks) -> i32 {
        match (self.sole_survivor_id(), season_picks.winner_pick.as_deref()) {
            (Some(survivor), Some(pick)) if survivor == pick => WINNER_POINTS,
            _ => 0,
        }
    }

    /// Full season aggregate for one user.
    pub fn season_breakdown(
        &self,
        user_id: &str,
        weekly_by_episode: &HashMap<u32, WeeklyPicks>,
        season_picks: Option<&SeasonPicks>,
        active_phase: Option<&'a PickPhase>,
    ) -> UserScoreBreakdown {
        let mut breakdown = UserScoreBreakdown::new(user_id);

        for episode in &self.config.episodes {
            let Some(weekly) = weekly_by_episode.get(&episode.id) else {
                continue;
            };
            let week = self.score(weekly, episode, active_phase);
            breakdown.voted_out_points += week.voted_out;
            breakdown.remain_points += week.remain;
            breakdown.immunity_points += week.immunity;
            for (column, points) in week.category_points {
                *breakdown.category_points_by_column_id.entry(column).or_insert(0) += points;
            }

            let recorded = self
                .results
                .get(&episode.id)
                .is_some_and(EpisodeResult::has_recorded_results);
            if recorded && weekly.has_any_selection() {
                breakdown.weeks_participated += 1;
            }
        }

        let cutoff = self
            .results
            .iter()
            .rev()
            .find(|(_, r)| r.has_recorded_results())
            .map(|(id, _)| *id);
        if let Some(cutoff) = cutoff
            && let Some(season_picks) = season_picks
        {
            breakdown.merge_track_points = self.merge_track_points(season_picks, cutoff);
            breakdown.final_three_track_points =
                self.final_three_track_points(season_picks, cutoff);
            breakdown.winner_points = self.winner_points(season_picks);
        }

        breakdown
    }
}
