use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::assumptions::Assumptions;
use super::engine::{derive_seed, simulate_with, validate_profile};
use super::error::PlanError;
use super::generator::generate_candidates;
use super::projector::project_profile;
use super::types::{Branch, Profile, SimulationConfig, SimulationResult, WorldlineCandidate};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldlineReport {
    /// The profile simulated without any branch applied.
    pub baseline: SimulationResult,
    pub candidates: Vec<WorldlineCandidate>,
    /// Resolved profiles in candidate order.
    #[serde(skip)]
    pub profiles: Vec<Profile>,
    pub clipped_count: u64,
}

impl WorldlineReport {
    /// Highest scoring candidate; ties go to the earlier position.
    pub fn best(&self) -> Option<&WorldlineCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.score.is_some())
            .fold(None, |best: Option<&WorldlineCandidate>, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            })
    }
}

/// Evaluates every worldline of `selected` with the default tax and pension collaborators.
pub fn evaluate_worldlines<F>(
    profile: &Profile,
    selected: &[Branch],
    config: &SimulationConfig,
    progress: F,
) -> Result<WorldlineReport, PlanError>
where
    F: Fn(usize, usize) + Sync,
{
    evaluate_worldlines_with(profile, selected, config, Assumptions::default(), progress)
}

/// Generates, projects and simulates every worldline of `selected`.
///
/// All candidates are resolved before the first simulation, so an invalid branch
/// aborts the batch without partial results. `progress` receives `(finished, total)`
/// once per completed simulation, baseline included. Results keep candidate order
/// whatever order the simulations finish in.
pub fn evaluate_worldlines_with<F>(
    profile: &Profile,
    selected: &[Branch],
    config: &SimulationConfig,
    assumptions: Assumptions<'_>,
    progress: F,
) -> Result<WorldlineReport, PlanError>
where
    F: Fn(usize, usize) + Sync,
{
    validate_profile(profile)?;
    if config.trials == 0 {
        return Err(PlanError::ZeroTrials);
    }

    let set = generate_candidates(selected)?;
    let profiles = set
        .candidates
        .iter()
        .map(|c| project_profile(profile, &c.branches))
        .collect::<Result<Vec<_>, _>>()?;
    for resolved in &profiles {
        validate_profile(resolved)?;
    }

    let batch_seed = config.seed.unwrap_or_else(rand::random);
    let total = profiles.len() + 1;
    info!(
        candidates = profiles.len(),
        clipped = set.clipped_count,
        trials = config.trials,
        "evaluating worldlines"
    );

    let finished = AtomicUsize::new(0);
    let tick = || {
        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
        progress(done, total);
    };

    let baseline = simulate_with(
        profile,
        &SimulationConfig {
            trials: config.trials,
            seed: Some(derive_seed(batch_seed, 0, 0)),
        },
        assumptions,
    )?;
    tick();

    let results = set
        .candidates
        .par_iter()
        .zip(profiles.par_iter())
        .enumerate()
        .map(|(index, (candidate, resolved))| {
            let run = SimulationConfig {
                trials: config.trials,
                seed: Some(derive_seed(batch_seed, index as u32 + 1, 0)),
            };
            let result = simulate_with(resolved, &run, assumptions).map_err(|source| {
                PlanError::CandidateFailed {
                    index,
                    label: candidate.label.clone(),
                    source: Box::new(source),
                }
            });
            debug!(index, label = %candidate.label, ok = result.is_ok(), "worldline simulated");
            tick();
            result
        })
        .collect::<Result<Vec<_>, _>>()?;

    let candidates = set
        .candidates
        .into_iter()
        .zip(results)
        .map(|(mut candidate, result)| {
            candidate.score = Some(result.score.overall);
            candidate.result = Some(result);
            candidate
        })
        .collect::<Vec<_>>();

    info!(
        baseline_score = baseline.score.overall,
        best = candidates.iter().filter_map(|c| c.score).max(),
        "worldlines evaluated"
    );

    Ok(WorldlineReport {
        baseline,
        candidates,
        profiles,
        clipped_count: set.clipped_count,
    })
}
