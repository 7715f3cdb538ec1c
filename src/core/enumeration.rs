//! Bounded enumeration of the worldline space.
//!
//! The space over `k` uncertain branches is a binary tree of depth `k` whose left
//! child at depth `d` excludes branch `d` and whose right child includes it.
//! Leaves are visited depth-first, left before right, so the all-excluded leaf is
//! always first. Both the candidate generator and the tree layout consume the
//! [`Enumeration`] produced here; neither derives the order on its own.

use super::error::PlanError;

/// Largest number of uncertain branches a `u64` mask can address.
pub const MAX_DECISIONS: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Number of decision points.
    pub decisions: usize,
    /// Materialized leaves in visit order; bit `d` set means branch `d` is included.
    pub masks: Vec<u64>,
    /// Leaves of the full space that were not materialized.
    pub clipped: u64,
}

impl Enumeration {
    pub fn is_clipped(&self) -> bool {
        self.clipped > 0
    }

    /// Included/excluded choice for branch `depth` in leaf `mask`.
    pub fn includes(mask: u64, depth: usize) -> bool {
        mask & (1 << depth) != 0
    }
}

/// Enumerates at most `cap` leaves of the `decisions`-deep binary tree.
///
/// Subtrees past the cap are never descended into; they only contribute to
/// [`Enumeration::clipped`].
pub fn enumerate(decisions: usize, cap: usize) -> Result<Enumeration, PlanError> {
    if decisions > MAX_DECISIONS {
        return Err(PlanError::TooManyBranches(decisions));
    }

    let mut masks = Vec::with_capacity(cap.min(1 << decisions.min(16)));
    visit(0, 0, decisions, cap, &mut masks);

    let total = 1_u64 << decisions;
    Ok(Enumeration {
        decisions,
        clipped: total - masks.len() as u64,
        masks,
    })
}

fn visit(depth: usize, mask: u64, decisions: usize, cap: usize, out: &mut Vec<u64>) {
    if out.len() >= cap {
        return;
    }
    if depth == decisions {
        out.push(mask);
        return;
    }
    visit(depth + 1, mask, decisions, cap, out);
    visit(depth + 1, mask | (1 << depth), decisions, cap, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    #[test]
    fn zero_decisions_yield_single_baseline_leaf() {
        let e = enumerate(0, 5).expect("valid");
        assert_eq!(e.masks, vec![0]);
        assert_eq!(e.clipped, 0);
    }

    #[test]
    fn three_decisions_visit_exclude_before_include() {
        let e = enumerate(3, 5).expect("valid");
        // Branch 0 is the root decision, so it flips last.
        assert_eq!(e.masks, vec![0b000, 0b100, 0b010, 0b110, 0b001]);
        assert_eq!(e.clipped, 3);
    }

    #[test]
    fn two_decisions_fit_under_the_cap() {
        let e = enumerate(2, 5).expect("valid");
        assert_eq!(e.masks, vec![0b00, 0b10, 0b01, 0b11]);
        assert!(!e.is_clipped());
    }

    #[test]
    fn five_decisions_clip_twenty_seven_leaves() {
        let e = enumerate(5, 5).expect("valid");
        assert_eq!(e.masks.len(), 5);
        assert_eq!(e.clipped, 27);
    }

    #[test]
    fn rejects_more_decisions_than_mask_bits() {
        assert_eq!(enumerate(64, 5), Err(PlanError::TooManyBranches(64)));
    }

    #[test]
    fn large_spaces_stay_bounded() {
        let e = enumerate(MAX_DECISIONS, 5).expect("valid");
        assert_eq!(e.masks.len(), 5);
        assert_eq!(e.clipped, (1_u64 << 63) - 5);
    }

    proptest! {
        #[test]
        fn prop_leaf_count_is_min_of_space_and_cap(k in 0_usize..12, cap in 1_usize..40) {
            let e = enumerate(k, cap).expect("valid");
            let total = 1_u64 << k;
            prop_assert_eq!(e.masks.len() as u64, total.min(cap as u64));
            prop_assert_eq!(e.masks.len() as u64 + e.clipped, total);
            prop_assert_eq!(e.masks[0], 0);
        }

        #[test]
        fn prop_leaves_are_distinct_and_in_range(k in 0_usize..10, cap in 1_usize..64) {
            let e = enumerate(k, cap).expect("valid");
            let mut seen = e.masks.clone();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), e.masks.len());
            prop_assert!(e.masks.iter().all(|m| *m < (1_u64 << k)));
        }
    }
}
