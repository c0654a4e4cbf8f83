//! Weekly pick locking: a locked category's first-ever selection within a
//! phase is frozen and carried forward to every later episode of that
//! phase. The store resolves the governing phase and its episode ids;
//! everything here is pure.

use crate::{Category, PickPhase, WeeklyPicks};
use std::collections::{BTreeSet, HashMap};

/// The canonical locked selection for a category: the first non-empty
/// selection across the phase's episodes, with the episode it lives in.
/// `phase_episode_ids` must be sorted ascending.
pub fn locked_origin<'a>(
    category: &Category,
    phase_episode_ids: &[u32],
    picks_by_episode: &'a HashMap<u32, WeeklyPicks>,
) -> Option<(u32, &'a BTreeSet<String>)> {
    for &episode_id in phase_episode_ids {
        let Some(picks) = picks_by_episode.get(&episode_id) else {
            continue;
        };
        let selection = picks.selections(&category.id);
        if !selection.is_empty() {
            return Some((episode_id, selection));
        }
    }
    None
}

pub fn locked_selection(
    category: &Category,
    phase_episode_ids: &[u32],
    picks_by_episode: &HashMap<u32, WeeklyPicks>,
) -> Option<BTreeSet<String>> {
    locked_origin(category, phase_episode_ids, picks_by_episode)
        .map(|(_, selection)| selection.clone())
}

/// Enforce locked categories on a week's picks, overwriting any selection
/// that differs from the canonical one. Returns whether anything changed;
/// applying twice in a row never changes anything the second time.
pub fn apply_locked_selections(
    picks: &mut WeeklyPicks,
    phase: &PickPhase,
    phase_episode_ids: &[u32],
    picks_by_episode: &HashMap<u32, WeeklyPicks>,
) -> bool {
    let mut changed = false;
    for category in phase.categories.iter().filter(|c| c.is_locked) {
        let Some(canonical) = locked_selection(category, phase_episode_ids, picks_by_episode)
        else {
            continue;
        };
        if picks.selections(&category.id) != &canonical {
            picks.set_selections(category, canonical);
            changed = true;
        }
    }
    changed
}

/// A locked category may only be edited before any selection exists, or in
/// the episode the canonical selection originated from.
pub fn is_category_editable(
    category: &Category,
    episode_id: u32,
    phase_episode_ids: &[u32],
    picks_by_episode: &HashMap<u32, WeeklyPicks>,
) -> bool {
    if !category.is_locked {
        return true;
    }
    match locked_origin(category, phase_episode_ids, picks_by_episode) {
        None => true,
        Some((origin, _)) => origin == episode_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked_category() -> Category {
        Category::new("Mergers", "MG", 3).with_points(1).locked()
    }

    fn selection(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn picks_with(category: &Category, episode_id: u32, ids: &[&str]) -> WeeklyPicks {
        let mut picks = WeeklyPicks::new("user", episode_id);
        picks.set_selections(category, selection(ids));
        picks
    }

    #[test]
    fn first_non_empty_selection_becomes_canonical() {
        let category = locked_category();
        let by_episode: HashMap<u32, WeeklyPicks> = [
            (1, WeeklyPicks::new("user", 1)),
            (2, picks_with(&category, 2, &["boston_rob"])),
            (3, picks_with(&category, 3, &["parvati_shallow"])),
        ]
        .into_iter()
        .collect();

        let (origin, canonical) =
            locked_origin(&category, &[1, 2, 3], &by_episode).expect("canonical selection");
        assert_eq!(origin, 2);
        assert_eq!(canonical, &selection(&["boston_rob"]));
    }

    #[test]
    fn later_episodes_are_overwritten_with_the_canonical_selection() {
        let category = locked_category();
        let phase = PickPhase::new("Pre-merge", vec![category.clone()]);
        let by_episode: HashMap<u32, WeeklyPicks> =
            [(1, picks_with(&category, 1, &["boston_rob"]))].into_iter().collect();

        let mut week3 = picks_with(&category, 3, &["russell_hantz"]);
        let changed = apply_locked_selections(&mut week3, &phase, &[1, 2, 3], &by_episode);

        assert!(changed);
        assert_eq!(week3.selections(&category.id), &selection(&["boston_rob"]));
    }

    #[test]
    fn applying_twice_changes_nothing_the_second_time() {
        let category = locked_category();
        let phase = PickPhase::new("Pre-merge", vec![category.clone()]);
        let by_episode: HashMap<u32, WeeklyPicks> =
            [(1, picks_with(&category, 1, &["boston_rob"]))].into_iter().collect();

        let mut week2 = picks_with(&category, 2, &["russell_hantz"]);
        assert!(apply_locked_selections(&mut week2, &phase, &[1, 2], &by_episode));
        assert!(!apply_locked_selections(&mut week2, &phase, &[1, 2], &by_episode));
    }

    #[test]
    fn no_enforcement_before_the_first_selection() {
        let category = locked_category();
        let phase = PickPhase::new("Pre-merge", vec![category.clone()]);
        let by_episode = HashMap::new();

        let mut week1 = picks_with(&category, 1, &["boston_rob"]);
        assert!(!apply_locked_selections(&mut week1, &phase, &[1, 2], &by_episode));
        assert_eq!(week1.selections(&category.id), &selection(&["boston_rob"]));
    }

    #[test]
    fn unlocked_categories_are_left_alone() {
        let category = Category::new("Voted Out", "VO", 1).with_points(3);
        let phase = PickPhase::new("Pre-merge", vec![category.clone()]);
        let by_episode: HashMap<u32, WeeklyPicks> =
            [(1, picks_with(&category, 1, &["boston_rob"]))].into_iter().collect();

        let mut week2 = picks_with(&category, 2, &["russell_hantz"]);
        assert!(!apply_locked_selections(&mut week2, &phase, &[1, 2], &by_episode));
        assert_eq!(week2.selections(&category.id), &selection(&["russell_hantz"]));
    }

    #[test]
    fn editable_only_in_the_origin_episode() {
        let category = locked_category();
        let by_episode: HashMap<u32, WeeklyPicks> =
            [(2, picks_with(&category, 2, &["boston_rob"]))].into_iter().collect();

        assert!(is_category_editable(&category, 2, &[1, 2, 3], &by_episode));
        assert!(!is_category_editable(&category, 1, &[1, 2, 3], &by_episode));
        assert!(!is_category_editable(&category, 3, &[1, 2, 3], &by_episode));
    }

    #[test]
    fn everything_is_editable_before_a_canonical_selection_exists() {
        let category = locked_category();
        let by_episode = HashMap::new();
        assert!(is_category_editable(&category, 1, &[1, 2], &by_episode));
        assert!(is_category_editable(&category, 2, &[1, 2], &by_episode));
    }
}
