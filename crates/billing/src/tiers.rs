//! Tier catalog
//!
//! Static lookup over the fixed plan table. String-level lookups are
//! case-insensitive and fail closed: an unknown tier id grants capacity 0
//! rather than erroring, so a corrupt stored tier can never widen a limit.

use coachdesk_shared::Tier;
use serde::Serialize;

/// Catalog entry for one plan, as displayed by clients
#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    pub id: Tier,
    pub name: &'static str,
    pub max_trainees: u32,
    pub price: f64,
}

/// All tiers in catalog order (ascending capacity and price)
pub fn all_tiers() -> [Tier; 5] {
    [
        Tier::Starter,
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Olympian,
    ]
}

/// Trainee capacity for a tier id; 0 for an unknown id
pub fn capacity_of(tier_id: &str) -> u32 {
    tier_id
        .parse::<Tier>()
        .map(|t| t.max_trainees())
        .unwrap_or(0)
}

/// Catalog entry for a tier id, or None if the id is unknown
pub fn info_of(tier_id: &str) -> Option<TierInfo> {
    let tier: Tier = tier_id.parse().ok()?;
    Some(TierInfo {
        id: tier,
        name: tier.display_name(),
        max_trainees: tier.max_trainees(),
        price: tier.price(),
    })
}

/// Whether the id names a tier in the catalog (case-insensitive)
pub fn is_valid_tier(tier_id: &str) -> bool {
    tier_id.parse::<Tier>().is_ok()
}

/// Cheapest tier whose capacity covers `trainee_count`, in catalog order;
/// the top tier if none qualify
pub fn suggest_upgrade(trainee_count: u32) -> Tier {
    all_tiers()
        .into_iter()
        .find(|t| t.max_trainees() >= trainee_count)
        .unwrap_or(Tier::Olympian)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_values() {
        assert_eq!(capacity_of("starter"), 1);
        assert_eq!(capacity_of("bronze"), 4);
        assert_eq!(capacity_of("silver"), 10);
        assert_eq!(capacity_of("gold"), 25);
        assert_eq!(capacity_of("olympian"), 999);
    }

    #[test]
    fn test_catalog_prices() {
        assert_eq!(info_of("starter").unwrap().price, 0.0);
        assert_eq!(info_of("bronze").unwrap().price, 9.99);
        assert_eq!(info_of("silver").unwrap().price, 19.99);
        assert_eq!(info_of("gold").unwrap().price, 39.99);
        assert_eq!(info_of("olympian").unwrap().price, 99.99);
    }

    #[test]
    fn test_unknown_tier_fails_closed() {
        assert_eq!(capacity_of("platinum"), 0);
        assert_eq!(capacity_of(""), 0);
        assert!(info_of("platinum").is_none());
        assert!(!is_valid_tier("platinum"));
    }

    #[test]
    fn test_lookup_case_insensitive() {
        assert!(is_valid_tier("GOLD"));
        assert!(is_valid_tier("gold"));
        assert_eq!(capacity_of("Bronze"), 4);
        assert_eq!(info_of("OLYMPIAN").unwrap().id, Tier::Olympian);
    }

    #[test]
    fn test_suggest_upgrade_picks_cheapest_covering_tier() {
        assert_eq!(suggest_upgrade(0), Tier::Starter);
        assert_eq!(suggest_upgrade(1), Tier::Starter);
        assert_eq!(suggest_upgrade(2), Tier::Bronze);
        assert_eq!(suggest_upgrade(4), Tier::Bronze);
        assert_eq!(suggest_upgrade(5), Tier::Silver);
        assert_eq!(suggest_upgrade(10), Tier::Silver);
        assert_eq!(suggest_upgrade(11), Tier::Gold);
        assert_eq!(suggest_upgrade(25), Tier::Gold);
        assert_eq!(suggest_upgrade(26), Tier::Olympian);
        assert_eq!(suggest_upgrade(999), Tier::Olympian);
    }

    #[test]
    fn test_suggest_upgrade_tops_out_at_olympian() {
        assert_eq!(suggest_upgrade(1000), Tier::Olympian);
        assert_eq!(suggest_upgrade(u32::MAX), Tier::Olympian);
    }

    #[test]
    fn test_suggested_tier_always_covers_count_up_to_sentinel() {
        for n in 0..=999u32 {
            let tier = suggest_upgrade(n);
            assert!(
                tier.max_trainees() >= n,
                "suggested {} cannot hold {} trainees",
                tier,
                n
            );
        }
    }
}
