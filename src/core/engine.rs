use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal};
use rayon::prelude::*;
use tracing::debug;

use super::assumptions::{Assumptions, PENSION_START_AGE};
use super::error::PlanError;
use super::types::{
    CashFlowEffect, CashFlowYear, HORIZON_AGE, HouseholdMode, Metrics, Paths, Profile, Score,
    ScoreLevel, SimulationConfig, SimulationResult, YearlyPoint,
};

pub const SURVIVAL_WEIGHT: u32 = 55;
pub const LIFESTYLE_WEIGHT: u32 = 20;
pub const RISK_WEIGHT: u32 = 15;
pub const LIQUIDITY_WEIGHT: u32 = 10;

const _: () = assert!(SURVIVAL_WEIGHT + LIFESTYLE_WEIGHT + RISK_WEIGHT + LIQUIDITY_WEIGHT == 100);

const SAFE_WITHDRAWAL_RATE: f64 = 0.04;
const EMERGENCY_FUND_MONTHS: f64 = 6.0;
const RISK_VOLATILITY_CEILING: f64 = 0.30;
const RISK_VOLATILITY_SHARE: f64 = 0.7;
/// Share of trials that must be solvent at a candidate FIRE age.
pub const FIRE_MIN_SOLVENT_RATE: f64 = 0.8;

/// Deterministic cash flow for one age, shared by every trial.
#[derive(Debug, Clone, Copy)]
struct YearPlan {
    age: u32,
    retired: bool,
    employment_net: f64,
    passive: f64,
    /// Benefit payable if retired at this age.
    pension: f64,
    working_expenses: f64,
    retired_expenses: f64,
}

impl YearPlan {
    fn income(self) -> f64 {
        if self.retired {
            self.retired_income()
        } else {
            self.employment_net
        }
    }

    fn retired_income(self) -> f64 {
        self.passive + self.pension
    }

    fn expenses(self) -> f64 {
        if self.retired {
            self.retired_expenses
        } else {
            self.working_expenses
        }
    }

    fn net_cash_flow(self) -> f64 {
        self.income() - self.expenses()
    }
}

/// Per-year gross return `1 + r`, lognormal with `E[r]` and `SD[r]` matched to the profile.
#[derive(Debug)]
struct ReturnModel {
    expected: f64,
    distribution: Option<LogNormal<f64>>,
}

impl ReturnModel {
    fn new(expected: f64, volatility: f64) -> Result<Self, PlanError> {
        if volatility <= 0.0 {
            return Ok(Self {
                expected,
                distribution: None,
            });
        }
        let gross_mean = 1.0 + expected;
        let sigma_sq = (1.0 + (volatility * volatility) / (gross_mean * gross_mean)).ln();
        let mu = gross_mean.ln() - sigma_sq / 2.0;
        let distribution = LogNormal::new(mu, sigma_sq.sqrt())
            .map_err(|e| PlanError::invalid("volatility", e.to_string()))?;
        Ok(Self {
            expected,
            distribution: Some(distribution),
        })
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        match &self.distribution {
            Some(distribution) => distribution.sample(rng) - 1.0,
            None => self.expected,
        }
    }
}

#[derive(Debug)]
struct TrialPath {
    balances: Vec<f64>,
    failed: bool,
}

/// Runs the Monte Carlo engine with the default tax and pension collaborators.
pub fn simulate(
    profile: &Profile,
    config: &SimulationConfig,
) -> Result<SimulationResult, PlanError> {
    simulate_with(profile, config, Assumptions::default())
}

/// Runs `config.trials` independent trials of `profile` from its current age to 100.
///
/// Every trial owns a ChaCha20 stream seeded from the run seed and the trial index,
/// so a seeded run is bit-identical however rayon schedules the trials. Unseeded runs
/// draw a fresh seed and report it in [`SimulationResult::seed`].
pub fn simulate_with(
    profile: &Profile,
    config: &SimulationConfig,
    assumptions: Assumptions<'_>,
) -> Result<SimulationResult, PlanError> {
    validate_profile(profile)?;
    if config.trials == 0 {
        return Err(PlanError::ZeroTrials);
    }

    let seed = config.seed.unwrap_or_else(rand::random);
    let schedule = build_schedule(profile, assumptions);
    let returns = ReturnModel::new(profile.expected_return, profile.volatility)?;
    let start_balance = profile.total_assets();

    let trials = (0..config.trials)
        .into_par_iter()
        .map(|trial_id| {
            let mut rng = ChaCha20Rng::seed_from_u64(derive_seed(seed, 0, trial_id));
            run_trial(start_balance, &schedule, &returns, &mut rng)
        })
        .collect::<Vec<_>>();

    let result = aggregate(profile, &schedule, &trials, config.trials, seed);
    debug!(
        trials = config.trials,
        seed,
        survival_rate = result.metrics.survival_rate,
        overall = result.score.overall,
        "simulation finished"
    );
    Ok(result)
}

pub fn validate_profile(profile: &Profile) -> Result<(), PlanError> {
    if profile.current_age >= HORIZON_AGE {
        return Err(PlanError::AgeAtHorizon(profile.current_age));
    }

    for (name, value) in [
        ("grossIncome", profile.gross_income),
        ("partnerGrossIncome", profile.partner_gross_income),
        ("sideIncome", profile.side_income),
        ("equityIncome", profile.equity_income),
        ("livingCost", profile.living_cost),
        ("cash", profile.cash),
        ("invested", profile.invested),
        ("taxAdvantaged", profile.tax_advantaged),
        ("retirementIncome", profile.retirement_income),
        ("dividendYield", profile.dividend_yield),
        ("retirementSpendingMultiplier", profile.retirement_spending_multiplier),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(PlanError::invalid(name, format!("must be finite and >= 0, got {value}")));
        }
    }

    for (name, value) in [
        ("expectedReturn", profile.expected_return),
        ("inflationRate", profile.inflation_rate),
    ] {
        if !value.is_finite() || value <= -1.0 {
            return Err(PlanError::invalid(name, format!("must be finite and > -1, got {value}")));
        }
    }

    if !profile.volatility.is_finite() || profile.volatility < 0.0 {
        return Err(PlanError::invalid("volatility", "must be finite and >= 0"));
    }

    if let Some(rate) = profile.effective_tax_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(PlanError::invalid("effectiveTaxRate", "must be between 0 and 1"));
        }
    }

    if profile.pension_override.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(PlanError::invalid("pensionOverride", "must be finite and >= 0"));
    }

    if let Some(event) = profile
        .events
        .iter()
        .find(|e| !e.magnitude.is_finite() || e.magnitude < 0.0)
    {
        return Err(PlanError::invalid(
            "events",
            format!(
                "{} at age {} has magnitude {}",
                event.kind.label(),
                event.age,
                event.magnitude
            ),
        ));
    }

    Ok(())
}

fn build_schedule(profile: &Profile, assumptions: Assumptions<'_>) -> Vec<YearPlan> {
    let benefit = assumptions.pension.annual_benefit(profile);
    let multiplier = profile.retirement_spending_multiplier;

    (profile.current_age..=HORIZON_AGE)
        .map(|age| {
            let mut income_adjustment = 0.0;
            let mut expense_adjustment = 0.0;
            for event in profile.events.iter().filter(|e| e.is_active_at(age)) {
                match event.kind.effect() {
                    CashFlowEffect::Income(sign) => income_adjustment += sign * event.magnitude,
                    CashFlowEffect::Expense(sign) => expense_adjustment += sign * event.magnitude,
                }
            }

            let equity = match profile.equity_vest_end_age {
                Some(end) if age >= end => 0.0,
                _ => profile.equity_income,
            };
            let primary_gross =
                (profile.gross_income + profile.side_income + equity + income_adjustment).max(0.0);
            let mut employment_net = assumptions.net_income(profile, primary_gross);
            if profile.household == HouseholdMode::Couple {
                employment_net += assumptions.net_income(profile, profile.partner_gross_income);
            }

            let inflation = (1.0 + profile.inflation_rate).powi((age - profile.current_age) as i32);
            let working_expenses =
                ((profile.living_cost + expense_adjustment) * inflation).max(0.0);

            YearPlan {
                age,
                retired: age >= profile.target_retire_age,
                employment_net,
                passive: profile.retirement_income,
                pension: if age >= PENSION_START_AGE { benefit } else { 0.0 },
                working_expenses,
                retired_expenses: working_expenses * multiplier,
            }
        })
        .collect()
}

/// `balance <- balance + (income - expenses) + balance * r`, never floored.
fn run_trial(
    start_balance: f64,
    schedule: &[YearPlan],
    returns: &ReturnModel,
    rng: &mut impl Rng,
) -> TrialPath {
    let mut balance = start_balance;
    let mut failed = false;
    let mut balances = Vec::with_capacity(schedule.len());

    for plan in schedule {
        let trial_return = returns.sample(rng);
        let growth = balance * trial_return;
        balance += plan.net_cash_flow() + growth;
        if balance < 0.0 {
            failed = true;
        }
        balances.push(balance);
    }

    TrialPath { balances, failed }
}

fn aggregate(
    profile: &Profile,
    schedule: &[YearPlan],
    trials: &[TrialPath],
    trial_count: u32,
    seed: u64,
) -> SimulationResult {
    let n = trials.len() as f64;
    let mut yearly_data = Vec::with_capacity(schedule.len());
    let mut column = Vec::with_capacity(trials.len());

    for (idx, plan) in schedule.iter().enumerate() {
        column.clear();
        column.extend(trials.iter().map(|t| t.balances[idx]));
        column.sort_by(|a, b| a.total_cmp(b));
        let solvent = column.iter().filter(|b| **b >= 0.0).count() as f64;

        yearly_data.push(YearlyPoint {
            age: plan.age,
            p10: percentile_sorted(&column, 10.0),
            p25: percentile_sorted(&column, 25.0),
            median: percentile_sorted(&column, 50.0),
            p75: percentile_sorted(&column, 75.0),
            p90: percentile_sorted(&column, 90.0),
            solvent_rate: solvent / n,
        });
    }

    let survived = trials.iter().filter(|t| !t.failed).count() as f64;
    let survival_rate = survived / n * 100.0;
    let median = yearly_data.iter().map(|y| y.median).collect::<Vec<_>>();

    let fire_age = find_fire_age(profile, schedule, &yearly_data);
    let asset_at_100 = median.last().copied().unwrap_or(0.0);

    let score = composite_score(
        survival_rate / 100.0,
        lifestyle_coverage(profile, schedule, &median),
        risk_rating(profile),
        liquidity_coverage(profile),
    );

    let cash_flow = schedule
        .iter()
        .enumerate()
        .map(|(idx, plan)| {
            let prior = prior_balance(profile, &median, idx);
            let pension = if plan.retired { plan.pension } else { 0.0 };
            let income = plan.income() - pension;
            CashFlowYear {
                age: plan.age,
                income,
                pension,
                dividends: prior.max(0.0) * profile.dividend_yield,
                expenses: plan.expenses(),
                net_cash_flow: plan.net_cash_flow(),
            }
        })
        .collect();

    SimulationResult {
        score,
        metrics: Metrics {
            fire_age,
            years_to_fire: fire_age.map(|age| age - profile.current_age),
            survival_rate,
            asset_at_100,
        },
        paths: Paths {
            p10: yearly_data.iter().map(|y| y.p10).collect(),
            p25: yearly_data.iter().map(|y| y.p25).collect(),
            median,
            p75: yearly_data.iter().map(|y| y.p75).collect(),
            p90: yearly_data.iter().map(|y| y.p90).collect(),
            yearly_data,
        },
        cash_flow,
        trials: trial_count,
        seed,
    }
}

fn prior_balance(profile: &Profile, median: &[f64], idx: usize) -> f64 {
    if idx == 0 {
        profile.total_assets()
    } else {
        median[idx - 1]
    }
}

/// Earliest age whose median balance carries retired-only cash flows to 100 at the
/// expected return, gated on [`FIRE_MIN_SOLVENT_RATE`] of trials being solvent there.
fn find_fire_age(profile: &Profile, schedule: &[YearPlan], yearly: &[YearlyPoint]) -> Option<u32> {
    schedule.iter().enumerate().find_map(|(idx, plan)| {
        let point = &yearly[idx];
        if point.median < 0.0 || point.solvent_rate < FIRE_MIN_SOLVENT_RATE {
            return None;
        }
        let mut balance = point.median;
        let sustainable = schedule[idx + 1..].iter().all(|later| {
            let growth = balance * profile.expected_return;
            balance += later.retired_income() - later.retired_expenses + growth;
            balance >= 0.0
        });
        sustainable.then_some(plan.age)
    })
}

fn lifestyle_coverage(profile: &Profile, schedule: &[YearPlan], median: &[f64]) -> f64 {
    let mut total = 0.0;
    let mut years = 0_u32;
    for (idx, plan) in schedule.iter().enumerate().filter(|(_, p)| p.retired) {
        let expenses = plan.retired_expenses;
        let coverage = if expenses <= 0.0 {
            1.0
        } else {
            let drawdown = prior_balance(profile, median, idx).max(0.0) * SAFE_WITHDRAWAL_RATE;
            ((plan.retired_income() + drawdown) / expenses).min(1.0)
        };
        total += coverage;
        years += 1;
    }
    if years == 0 { 1.0 } else { total / years as f64 }
}

fn risk_rating(profile: &Profile) -> f64 {
    let volatility_component = (1.0 - profile.volatility / RISK_VOLATILITY_CEILING).clamp(0.0, 1.0);
    let total_income = profile.gross_income + profile.side_income + profile.equity_income;
    let concentration = if total_income > 0.0 {
        (profile.equity_income / total_income).clamp(0.0, 1.0)
    } else {
        0.0
    };
    RISK_VOLATILITY_SHARE * volatility_component
        + (1.0 - RISK_VOLATILITY_SHARE) * (1.0 - concentration)
}

fn liquidity_coverage(profile: &Profile) -> f64 {
    let benchmark = profile.living_cost * EMERGENCY_FUND_MONTHS / 12.0;
    if benchmark <= 0.0 {
        return 1.0;
    }
    (profile.cash / benchmark).clamp(0.0, 1.0)
}

/// Builds the readiness score from sub-score ratios in `[0, 1]`.
pub fn composite_score(survival: f64, lifestyle: f64, risk: f64, liquidity: f64) -> Score {
    let to_points = |ratio: f64| (ratio.clamp(0.0, 1.0) * 100.0).round() as u32;
    let survival = to_points(survival);
    let lifestyle = to_points(lifestyle);
    let risk = to_points(risk);
    let liquidity = to_points(liquidity);

    let weighted = SURVIVAL_WEIGHT * survival
        + LIFESTYLE_WEIGHT * lifestyle
        + RISK_WEIGHT * risk
        + LIQUIDITY_WEIGHT * liquidity;
    let overall = ((weighted as f64) / 100.0).round().clamp(0.0, 100.0) as u32;

    Score {
        overall,
        survival,
        lifestyle,
        risk,
        liquidity,
        level: ScoreLevel::from_overall(overall),
    }
}

/// Mixes a base seed with a stream and an index into an independent 64-bit seed.
pub(crate) fn derive_seed(base_seed: u64, stream: u32, index: u32) -> u64 {
    let mixed = base_seed ^ ((stream as u64) << 32) ^ index as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Linear interpolation between closest ranks of an ascending slice.
fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
