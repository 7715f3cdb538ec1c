use std::collections::HashSet;

use tracing::debug;

use super::enumeration::{Enumeration, enumerate};
use super::error::PlanError;
use super::types::{Branch, MAX_WORLDLINES, WorldlineCandidate};

pub const BASELINE_LABEL: &str = "baseline";

/// Branch selection split into the fixed part and the decision points.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub certain: Vec<Branch>,
    pub uncertain: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub candidates: Vec<WorldlineCandidate>,
    pub clipped_count: u64,
}

/// Splits the selection, preserving selection order.
///
/// A default overridden by a certain branch is dropped here. One overridden by an
/// uncertain branch stays certain and is only dropped from the candidates that
/// include its replacement.
pub fn partition(selected: &[Branch]) -> Result<Partition, PlanError> {
    let mut ids = HashSet::with_capacity(selected.len());
    for branch in selected {
        if !ids.insert(branch.id.as_str()) {
            return Err(PlanError::DuplicateBranch(branch.id.clone()));
        }
    }

    let overridden: HashSet<&str> = selected
        .iter()
        .filter(|b| !b.is_decision_point())
        .filter_map(|b| b.overrides.as_deref())
        .collect();

    let (uncertain, certain): (Vec<Branch>, Vec<Branch>) = selected
        .iter()
        .filter(|b| !overridden.contains(b.id.as_str()))
        .cloned()
        .partition(Branch::is_decision_point);

    Ok(Partition { certain, uncertain })
}

/// Enumerates the selection with the shared worldline order and cap.
pub fn enumerate_partition(partition: &Partition) -> Result<Enumeration, PlanError> {
    enumerate(partition.uncertain.len(), MAX_WORLDLINES)
}

pub fn generate_candidates(selected: &[Branch]) -> Result<CandidateSet, PlanError> {
    let partition = partition(selected)?;
    let enumeration = enumerate_partition(&partition)?;

    let candidates = enumeration
        .masks
        .iter()
        .enumerate()
        .map(|(position, &mask)| build_candidate(&partition, position, mask))
        .collect::<Vec<_>>();

    debug!(
        certain = partition.certain.len(),
        uncertain = partition.uncertain.len(),
        materialized = candidates.len(),
        clipped = enumeration.clipped,
        "generated worldline candidates"
    );

    Ok(CandidateSet {
        candidates,
        clipped_count: enumeration.clipped,
    })
}

fn build_candidate(partition: &Partition, position: usize, mask: u64) -> WorldlineCandidate {
    let included = partition
        .uncertain
        .iter()
        .enumerate()
        .filter(|(depth, _)| Enumeration::includes(mask, *depth))
        .map(|(_, branch)| branch)
        .collect::<Vec<_>>();

    let label = if included.is_empty() {
        BASELINE_LABEL.to_string()
    } else {
        included
            .iter()
            .map(|b| b.label.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    };
    let id = if included.is_empty() {
        format!("wl:{BASELINE_LABEL}")
    } else {
        let mut keys = included.iter().map(|b| b.id.as_str()).collect::<Vec<_>>();
        keys.sort_unstable();
        // Length prefixes keep ids containing the separator unambiguous.
        let keys = keys
            .iter()
            .map(|k| format!("{}:{k}", k.len()))
            .collect::<Vec<_>>();
        format!("wl:{}", keys.join("+"))
    };

    let replaced: HashSet<&str> = included
        .iter()
        .filter_map(|b| b.overrides.as_deref())
        .collect();
    let mut branches = partition
        .certain
        .iter()
        .filter(|b| !replaced.contains(b.id.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    branches.extend(included.iter().map(|b| (*b).clone()));

    WorldlineCandidate {
        id,
        label,
        position,
        branches,
        included: included.iter().map(|b| b.id.clone()).collect(),
        score: None,
        result: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::Certainty;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    pub(crate) fn branch(id: &str, certainty: Certainty, template: &str) -> Branch {
        Branch {
            id: id.to_string(),
            label: id.replace('-', " "),
            certainty,
            auto: false,
            templates: vec![template.to_string()],
            age: None,
            amount: None,
            duration: None,
            overrides: None,
        }
    }

    pub(crate) fn uncertain(n: usize) -> Vec<Branch> {
        (0..n)
            .map(|i| branch(&format!("option-{i}"), Certainty::Uncertain, "income_increase"))
            .collect()
    }

    #[test]
    fn empty_selection_yields_only_baseline() {
        let set = generate_candidates(&[]).expect("valid");
        assert_eq!(set.candidates.len(), 1);
        assert_eq!(set.candidates[0].label, BASELINE_LABEL);
        assert!(set.candidates[0].branches.is_empty());
        assert_eq!(set.clipped_count, 0);
    }

    #[test]
    fn single_uncertain_branch_yields_baseline_then_inclusion() {
        let mut home = branch("buy-home", Certainty::Uncertain, "housing_purchase");
        home.label = "buy a home at 38".to_string();
        home.age = Some(38);
        let set = generate_candidates(&[home]).expect("valid");

        assert_eq!(set.candidates.len(), 2);
        assert_eq!(set.candidates[0].label, BASELINE_LABEL);
        assert!(set.candidates[0].included.is_empty());
        assert_eq!(set.candidates[1].label, "buy a home at 38");
        assert_eq!(set.candidates[1].included, vec!["buy-home".to_string()]);
        assert_eq!(set.clipped_count, 0);
    }

    #[test]
    fn certain_and_auto_branches_appear_in_every_candidate() {
        let mut auto = branch("auto-raise", Certainty::Uncertain, "income_increase");
        auto.auto = true;
        let mut selected = vec![
            branch("job", Certainty::Confirmed, "income_increase"),
            branch("move", Certainty::Planned, "expense_increase"),
            auto,
        ];
        selected.extend(uncertain(2));

        let set = generate_candidates(&selected).expect("valid");
        assert_eq!(set.candidates.len(), 4);
        for candidate in &set.candidates {
            let ids = candidate
                .branches
                .iter()
                .map(|b| b.id.as_str())
                .collect::<Vec<_>>();
            assert!(ids.contains(&"job"));
            assert!(ids.contains(&"move"));
            assert!(ids.contains(&"auto-raise"));
        }
    }

    #[test]
    fn three_uncertain_branches_are_capped_at_five() {
        let set = generate_candidates(&uncertain(3)).expect("valid");
        assert_eq!(set.candidates.len(), 5);
        assert_eq!(set.clipped_count, 3);
        let included = set
            .candidates
            .iter()
            .map(|c| c.included.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            included,
            vec![
                vec![],
                vec!["option-2".to_string()],
                vec!["option-1".to_string()],
                vec!["option-1".to_string(), "option-2".to_string()],
                vec!["option-0".to_string()],
            ]
        );
        assert_eq!(set.candidates[3].label, "option 1 + option 2");
    }

    #[test]
    fn five_uncertain_branches_clip_twenty_seven() {
        let set = generate_candidates(&uncertain(5)).expect("valid");
        assert_eq!(set.candidates.len(), 5);
        assert_eq!(set.clipped_count, 32 - 5);
        for (idx, candidate) in set.candidates.iter().enumerate() {
            assert_eq!(candidate.position, idx);
        }
    }

    fn branch_ids(candidate: &WorldlineCandidate) -> Vec<&str> {
        candidate.branches.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn uncertain_override_replaces_default_only_where_included() {
        let default = branch("default-job", Certainty::Planned, "income_increase");
        let mut replacement = branch("new-job", Certainty::Uncertain, "income_increase");
        replacement.overrides = Some("default-job".to_string());

        let set = generate_candidates(&[default, replacement]).expect("valid");
        assert_eq!(set.candidates.len(), 2);
        assert_eq!(branch_ids(&set.candidates[0]), vec!["default-job"]);
        assert_eq!(branch_ids(&set.candidates[1]), vec!["new-job"]);
    }

    #[test]
    fn certain_override_removes_default_everywhere() {
        let default = branch("default-job", Certainty::Planned, "income_increase");
        let mut replacement = branch("new-job", Certainty::Confirmed, "income_increase");
        replacement.overrides = Some("default-job".to_string());
        let mut selected = vec![default, replacement];
        selected.extend(uncertain(1));

        let set = generate_candidates(&selected).expect("valid");
        assert_eq!(set.candidates.len(), 2);
        assert_eq!(branch_ids(&set.candidates[0]), vec!["new-job"]);
        assert_eq!(branch_ids(&set.candidates[1]), vec!["new-job", "option-0"]);
    }

    #[test]
    fn oversized_selection_is_rejected_before_generation() {
        let set = generate_candidates(&uncertain(63)).expect("valid");
        assert_eq!(set.candidates.len(), MAX_WORLDLINES);
        assert_eq!(set.clipped_count, (1_u64 << 63) - MAX_WORLDLINES as u64);
        assert_eq!(
            generate_candidates(&uncertain(64)),
            Err(PlanError::TooManyBranches(64))
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = branch("same", Certainty::Uncertain, "income_increase");
        let b = branch("same", Certainty::Confirmed, "expense_increase");
        assert_eq!(
            generate_candidates(&[a, b]),
            Err(PlanError::DuplicateBranch("same".to_string()))
        );
    }

    #[test]
    fn candidate_ids_distinguish_ids_containing_the_separator() {
        let joined = generate_candidates(&[branch("a+b", Certainty::Uncertain, "income_increase")])
            .expect("valid");
        let split = generate_candidates(&[
            branch("a", Certainty::Uncertain, "income_increase"),
            branch("b", Certainty::Uncertain, "income_increase"),
        ])
        .expect("valid");
        assert_eq!(joined.candidates[1].id, "wl:3:a+b");
        assert_eq!(split.candidates[3].id, "wl:1:a+1:b");
        assert!(split.candidates.iter().all(|c| c.id != joined.candidates[1].id));
    }

    #[test]
    fn candidate_ids_ignore_selection_order() {
        let forward = generate_candidates(&uncertain(2)).expect("valid");
        let mut reversed_input = uncertain(2);
        reversed_input.reverse();
        let reversed = generate_candidates(&reversed_input).expect("valid");
        assert_eq!(forward.candidates[3].id, reversed.candidates[3].id);
    }

    proptest! {
        #[test]
        fn prop_candidate_count_is_capped_power_of_two(k in 0_usize..9, certain in 0_usize..4) {
            let mut selected = uncertain(k);
            for i in 0..certain {
                selected.push(branch(
                    &format!("fixed-{i}"),
                    Certainty::Confirmed,
                    "expense_increase",
                ));
            }
            let set = generate_candidates(&selected).expect("valid");
            let expected = (1_usize << k).min(MAX_WORLDLINES);
            prop_assert_eq!(set.candidates.len(), expected);
            prop_assert_eq!(set.clipped_count, (1_u64 << k) - expected as u64);
            prop_assert!(set.candidates[0].included.is_empty());
            prop_assert!(set.candidates.iter().all(|c| c.branches.len() >= certain));
        }
    }
}
