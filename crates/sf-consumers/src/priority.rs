//! Priority tiers and content signatures.
//!
//! Priorities are floats; consumers whose priorities differ by less than
//! [`PRIORITY_TOLERANCE`] form one tier. Cache validity is decided by SHA-256
//! signatures over the consumer fields that matter, never by object identity.

use sha2::{Digest, Sha256};
use sf_core::numeric::Real;

use crate::consumer::Consumer;

/// Priorities closer than this belong to the same tier.
pub const PRIORITY_TOLERANCE: Real = 0.01;

/// True when two priorities fall into the same tier.
pub fn same_tier(a: Real, b: Real) -> bool {
    (a - b).abs() < PRIORITY_TOLERANCE
}

/// Tier representative of each priority, in input order.
///
/// A priority joins the first representative opened so far that lies within
/// tolerance, otherwise it opens a tier of its own, so merging does not
/// chain. Non-positive and non-finite priorities map to `None`.
pub fn assign_tiers(priorities: impl IntoIterator<Item = Real>) -> Vec<Option<Real>> {
    let mut opened: Vec<Real> = Vec::new();
    priorities
        .into_iter()
        .map(|priority| {
            if !(priority.is_finite() && priority > 0.0) {
                return None;
            }
            let existing = opened.iter().copied().find(|&tier| same_tier(tier, priority));
            if existing.is_none() {
                opened.push(priority);
            }
            Some(existing.unwrap_or(priority))
        })
        .collect()
}

/// Distinct tier representatives, ascending.
pub fn merge_priorities(priorities: impl IntoIterator<Item = Real>) -> Vec<Real> {
    let mut tiers: Vec<Real> = assign_tiers(priorities).into_iter().flatten().collect();
    tiers.sort_by(Real::total_cmp);
    tiers.dedup();
    tiers
}

/// Hex SHA-256 over the sorted `(id, enabled, priority)` tuples.
pub fn priority_signature<'a>(entries: impl IntoIterator<Item = (&'a str, bool, Real)>) -> String {
    let mut tuples: Vec<(&str, bool, u64)> = entries
        .into_iter()
        .filter(|(id, _, _)| !id.is_empty())
        .map(|(id, enabled, priority)| (id, enabled, priority.to_bits()))
        .collect();
    tuples.sort_unstable();

    let mut hasher = Sha256::new();
    let json = serde_json::to_string(&tuples).unwrap_or_default();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 over every field of every consumer, in list order.
pub fn list_fingerprint(consumers: &[Consumer]) -> String {
    let mut hasher = Sha256::new();
    let json = serde_json::to_string(consumers).unwrap_or_default();
    hasher.update(json.as_bytes());
    hasher.update(consumers.len().to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_equal_priorities_merge() {
        assert_eq!(merge_priorities([5.0, 5.005]), vec![5.0]);
        assert_eq!(merge_priorities([5.0, 5.02]), vec![5.0, 5.02]);
    }

    #[test]
    fn non_positive_priorities_are_dropped() {
        assert_eq!(merge_priorities([0.0, -1.0, 2.0, Real::NAN]), vec![2.0]);
    }

    #[test]
    fn tiers_are_sorted_and_first_seen_wins() {
        assert_eq!(merge_priorities([3.0, 1.0, 1.004, 2.0]), vec![1.0, 2.0, 3.0]);
        // 1.012 joins the 1.004 tier but would not join a 1.0 tier.
        assert_eq!(merge_priorities([1.004, 1.0, 1.012]), vec![1.004]);
        assert_eq!(merge_priorities([1.0, 1.004, 1.012]), vec![1.0, 1.012]);
    }

    #[test]
    fn each_priority_joins_the_tier_it_was_merged_into() {
        let priorities = [1.016, 1.008, 1.0];
        assert_eq!(merge_priorities(priorities), vec![1.0, 1.016]);
        // 1.008 is within tolerance of both representatives; it stays with
        // 1.016, which was opened first.
        assert_eq!(
            assign_tiers(priorities),
            vec![Some(1.016), Some(1.016), Some(1.0)]
        );
        assert_eq!(assign_tiers([0.0, 2.0]), vec![None, Some(2.0)]);
    }

    #[test]
    fn signature_ignores_order_but_not_content() {
        let a = priority_signature([("a", true, 1.0), ("b", true, 2.0)]);
        let b = priority_signature([("b", true, 2.0), ("a", true, 1.0)]);
        let c = priority_signature([("a", false, 1.0), ("b", true, 2.0)]);
        let d = priority_signature([("a", true, 1.5), ("b", true, 2.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn fingerprint_tracks_any_field() {
        let base = vec![Consumer::controlled("a", 1.0, 2000.0)];
        let mut changed = base.clone();
        changed[0].step_w = Some(250.0);
        assert_eq!(list_fingerprint(&base), list_fingerprint(&base.clone()));
        assert_ne!(list_fingerprint(&base), list_fingerprint(&changed));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tiers_cover_every_positive_priority(
            priorities in prop::collection::vec(-5.0_f64..20.0, 0..40),
        ) {
            let tiers = merge_priorities(priorities.iter().copied());
            for window in tiers.windows(2) {
                prop_assert!(window[0] < window[1]);
                prop_assert!(window[1] - window[0] >= PRIORITY_TOLERANCE);
            }
            for p in priorities.iter().copied().filter(|p| *p > 0.0) {
                prop_assert!(tiers.iter().any(|&tier| same_tier(tier, p)));
            }
        }
    }
}
