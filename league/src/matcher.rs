//! Category role classification and category-save validation.
//!
//! A category's explicit `kind` tag is authoritative. Name-based matching
//! survives as a fallback for categories authored before kinds existed.

use crate::{Category, CategoryKind, PickPhase};
use std::collections::HashSet;
use thiserror::Error;

/// Semantic role a category plays in scoring. Well-known roles get special
/// engine treatment; everything else scores through its column id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryRole {
    Remain,
    VotedOut,
    Immunity,
    Merge,
    FinalThree,
    Winner,
}

impl CategoryRole {
    pub fn label(&self) -> &'static str {
        match self {
            CategoryRole::Remain => "remain",
            CategoryRole::VotedOut => "voted out",
            CategoryRole::Immunity => "immunity",
            CategoryRole::Merge => "merge",
            CategoryRole::FinalThree => "final three",
            CategoryRole::Winner => "winner",
        }
    }
}

fn kind_role(kind: CategoryKind) -> Option<CategoryRole> {
    match kind {
        CategoryKind::Custom => None,
        CategoryKind::Immunity => Some(CategoryRole::Immunity),
        CategoryKind::VotedOut => Some(CategoryRole::VotedOut),
        CategoryKind::Remain => Some(CategoryRole::Remain),
        CategoryKind::Merge => Some(CategoryRole::Merge),
        CategoryKind::FinalThree => Some(CategoryRole::FinalThree),
        CategoryKind::Winner => Some(CategoryRole::Winner),
    }
}

/// Every role the trimmed, lowercased name matches. Final three has no name
/// fallback; it is only ever reached through an explicit kind.
pub fn name_roles(name: &str) -> Vec<CategoryRole> {
    let normalized = name.trim().to_lowercase();
    let mut roles = Vec::new();
    if normalized.contains("immunity") {
        roles.push(CategoryRole::Immunity);
    }
    if normalized.contains("voted") {
        roles.push(CategoryRole::VotedOut);
    }
    if normalized.contains("remain") || normalized.contains("safe") {
        roles.push(CategoryRole::Remain);
    }
    if normalized.contains("merg") {
        roles.push(CategoryRole::Merge);
    }
    if normalized.contains("sole survivor") || normalized.contains("winner") {
        roles.push(CategoryRole::Winner);
    }
    roles
}

impl Category {
    /// Classify this category. The explicit kind wins; otherwise the first
    /// name-based match applies. Ambiguous names are rejected at save time
    /// by [`validate_category`], so a validated category matches at most
    /// one role.
    pub fn role(&self) -> Option<CategoryRole> {
        if let Some(role) = kind_role(self.kind) {
            return Some(role);
        }
        name_roles(&self.name).into_iter().next()
    }
}

/// Configuration errors rejected when the admin saves a category or phase.
/// None of these can reach the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("category \"{name}\" matches more than one scoring role ({roles}); set an explicit kind")]
    AmbiguousRole { name: String, roles: String },
    #[error("column id \"{column_id}\" is used by more than one category in this phase")]
    DuplicateColumnId { column_id: String },
    #[error("wager category \"{name}\" must not also set points per correct pick")]
    WagerPointsConflict { name: String },
    #[error("category \"{name}\" must allow at least one pick")]
    InvalidTotalPicks { name: String },
}

pub fn validate_category(category: &Category) -> Result<(), ConfigError> {
    if category.total_picks < 1 {
        return Err(ConfigError::InvalidTotalPicks { name: category.name.clone() });
    }
    if category.uses_wager && category.points_per_correct_pick.is_some_and(|p| p > 0) {
        return Err(ConfigError::WagerPointsConflict { name: category.name.clone() });
    }
    if category.kind == CategoryKind::Custom {
        let roles = name_roles(&category.name);
        if roles.len() > 1 {
            let roles = roles.iter().map(|r| r.label()).collect::<Vec<_>>().join(", ");
            return Err(ConfigError::AmbiguousRole { name: category.name.clone(), roles });
        }
    }
    Ok(())
}

/// Validate every category plus the phase-level column-id uniqueness
/// invariant that keeps per-column aggregation unambiguous.
pub fn validate_phase(phase: &PickPhase) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for category in &phase.categories {
        validate_category(category)?;
        if let Some(key) = category.column_key()
            && !seen.insert(key.clone())
        {
            return Err(ConfigError::DuplicateColumnId { column_id: key });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_kind_takes_precedence_over_the_name() {
        let category = Category::new("Totally Safe Bet", "SB", 1).with_kind(CategoryKind::Winner);
        assert_eq!(category.role(), Some(CategoryRole::Winner));
    }

    #[test]
    fn name_heuristics_classify_known_categories() {
        let role = |name: &str| Category::new(name, "XX", 1).role();
        assert_eq!(role("Immunity"), Some(CategoryRole::Immunity));
        assert_eq!(role("Voted Out"), Some(CategoryRole::VotedOut));
        assert_eq!(role("  remain SAFE "), Some(CategoryRole::Remain));
        assert_eq!(role("Mergers"), Some(CategoryRole::Merge));
        assert_eq!(role("Sole Survivor"), Some(CategoryRole::Winner));
        assert_eq!(role("Reward Challenge"), None);
    }

    #[test]
    fn final_three_is_only_reached_through_kind() {
        assert_eq!(Category::new("Final 3", "F3", 3).role(), None);
        assert_eq!(
            Category::new("Final 3", "F3", 3).with_kind(CategoryKind::FinalThree).role(),
            Some(CategoryRole::FinalThree)
        );
    }

    #[test]
    fn ambiguous_name_without_kind_is_rejected() {
        // "remain" and "safe" are one role; adding "voted" makes it two.
        let category = Category::new("Voted to remain", "VR", 1);
        let err = validate_category(&category).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousRole { .. }));

        // An explicit kind disambiguates the same name.
        let tagged = Category::new("Voted to remain", "VR", 1).with_kind(CategoryKind::Remain);
        assert!(validate_category(&tagged).is_ok());
    }

    #[test]
    fn duplicate_column_ids_within_a_phase_are_rejected() {
        let phase = PickPhase::new(
            "Week 1",
            vec![
                Category::new("Reward Challenge", "RC", 1).with_points(5),
                Category::new("Rice Count", "rc ", 1).with_points(2),
            ],
        );
        assert_eq!(
            validate_phase(&phase),
            Err(ConfigError::DuplicateColumnId { column_id: "RC".into() })
        );
    }

    #[test]
    fn wager_category_with_fixed_points_is_rejected() {
        let mut category = Category::new("Fire Bet", "FB", 1).with_wager(30);
        category.points_per_correct_pick = Some(5);
        assert!(matches!(
            validate_category(&category).unwrap_err(),
            ConfigError::WagerPointsConflict { .. }
        ));
    }

    #[test]
    fn zero_total_picks_is_rejected() {
        let category = Category::new("Immunity", "IM", 0);
        assert!(matches!(
            validate_category(&category).unwrap_err(),
            ConfigError::InvalidTotalPicks { .. }
        ));
    }

    #[test]
    fn unscored_informational_category_validates() {
        // No points, no wager: allowed, scores nothing.
        assert!(validate_category(&Category::new("Reward Challenge", "RC", 3)).is_ok());
    }
}
