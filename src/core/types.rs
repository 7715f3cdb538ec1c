use serde::{Deserialize, Serialize};

/// Final age of every simulated trajectory.
pub const HORIZON_AGE: u32 = 100;

/// Upper bound on the number of worldlines materialized from one branch selection.
pub const MAX_WORLDLINES: usize = 5;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HouseholdMode {
    #[default]
    Single,
    Couple,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeEventKind {
    IncomeIncrease,
    IncomeDecrease,
    ExpenseIncrease,
    ExpenseDecrease,
    HousingPurchase,
    Childcare,
    Education,
}

/// How an event kind moves the yearly cash flow.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CashFlowEffect {
    Income(f64),
    Expense(f64),
}

impl LifeEventKind {
    /// Signed unit contribution of this kind, scaled later by the event magnitude.
    pub fn effect(self) -> CashFlowEffect {
        match self {
            LifeEventKind::IncomeIncrease => CashFlowEffect::Income(1.0),
            LifeEventKind::IncomeDecrease => CashFlowEffect::Income(-1.0),
            LifeEventKind::ExpenseIncrease
            | LifeEventKind::HousingPurchase
            | LifeEventKind::Childcare
            | LifeEventKind::Education => CashFlowEffect::Expense(1.0),
            LifeEventKind::ExpenseDecrease => CashFlowEffect::Expense(-1.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LifeEventKind::IncomeIncrease => "income increase",
            LifeEventKind::IncomeDecrease => "income decrease",
            LifeEventKind::ExpenseIncrease => "expense increase",
            LifeEventKind::ExpenseDecrease => "expense decrease",
            LifeEventKind::HousingPurchase => "housing purchase",
            LifeEventKind::Childcare => "childcare",
            LifeEventKind::Education => "education",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEvent {
    pub kind: LifeEventKind,
    pub age: u32,
    /// Annual amount in today's money.
    pub magnitude: f64,
    /// Number of years the event stays active; `None` is open-ended.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Branch that produced this event, if any.
    #[serde(default)]
    pub source_branch: Option<String>,
}

impl LifeEvent {
    pub fn is_active_at(&self, age: u32) -> bool {
        if age < self.age {
            return false;
        }
        match self.duration {
            Some(years) => age < self.age.saturating_add(years),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub current_age: u32,
    pub household: HouseholdMode,
    pub gross_income: f64,
    pub partner_gross_income: f64,
    pub side_income: f64,
    /// Annual value of vesting equity compensation.
    pub equity_income: f64,
    pub equity_vest_end_age: Option<u32>,
    /// User-supplied effective tax rate; estimated from income when absent.
    pub effective_tax_rate: Option<f64>,
    pub living_cost: f64,
    pub cash: f64,
    pub invested: f64,
    pub tax_advantaged: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub inflation_rate: f64,
    pub dividend_yield: f64,
    pub target_retire_age: u32,
    pub retirement_spending_multiplier: f64,
    /// Passive income received from the target retirement age on.
    pub retirement_income: f64,
    /// Annual pension benefit; computed from earnings when absent.
    pub pension_override: Option<f64>,
    pub owns_home: bool,
    pub events: Vec<LifeEvent>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            current_age: 30,
            household: HouseholdMode::Single,
            gross_income: 60_000.0,
            partner_gross_income: 0.0,
            side_income: 0.0,
            equity_income: 0.0,
            equity_vest_end_age: None,
            effective_tax_rate: None,
            living_cost: 36_000.0,
            cash: 20_000.0,
            invested: 50_000.0,
            tax_advantaged: 30_000.0,
            expected_return: 0.05,
            volatility: 0.15,
            inflation_rate: 0.02,
            dividend_yield: 0.02,
            target_retire_age: 65,
            retirement_spending_multiplier: 0.8,
            retirement_income: 0.0,
            pension_override: None,
            owns_home: false,
            events: Vec::new(),
        }
    }
}

impl Profile {
    pub fn total_assets(&self) -> f64 {
        self.cash + self.invested + self.tax_advantaged
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Confirmed,
    Planned,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Opaque key; never compared by event payload.
    pub id: String,
    pub label: String,
    pub certainty: Certainty,
    /// Always applied, never a decision point.
    #[serde(default)]
    pub auto: bool,
    /// One or two template keys resolved by the projector.
    pub templates: Vec<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub duration: Option<u32>,
    /// Id of a default branch this one replaces when selected.
    #[serde(default)]
    pub overrides: Option<String>,
}

impl Branch {
    /// Whether the branch splits the worldline space in two.
    pub fn is_decision_point(&self) -> bool {
        self.certainty == Certainty::Uncertain && !self.auto
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreLevel {
    pub fn from_overall(overall: u32) -> Self {
        match overall {
            80.. => ScoreLevel::Excellent,
            65..=79 => ScoreLevel::Good,
            50..=64 => ScoreLevel::Fair,
            _ => ScoreLevel::Poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub overall: u32,
    pub survival: u32,
    pub lifestyle: u32,
    pub risk: u32,
    pub liquidity: u32,
    pub level: ScoreLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub fire_age: Option<u32>,
    pub years_to_fire: Option<u32>,
    /// Percentage of trials never negative through age 100.
    pub survival_rate: f64,
    pub asset_at_100: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyPoint {
    pub age: u32,
    pub p10: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    /// Fraction of trials with a non-negative balance at this age.
    pub solvent_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paths {
    pub yearly_data: Vec<YearlyPoint>,
    pub p10: Vec<f64>,
    pub p25: Vec<f64>,
    pub median: Vec<f64>,
    pub p75: Vec<f64>,
    pub p90: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowYear {
    pub age: u32,
    pub income: f64,
    pub pension: f64,
    pub dividends: f64,
    pub expenses: f64,
    pub net_cash_flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub score: Score,
    pub metrics: Metrics,
    pub paths: Paths,
    pub cash_flow: Vec<CashFlowYear>,
    pub trials: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldlineCandidate {
    pub id: String,
    pub label: String,
    pub position: usize,
    /// Every branch applied in this worldline, certain ones first.
    pub branches: Vec<Branch>,
    /// Ids of the uncertain branches assumed to occur.
    pub included: Vec<String>,
    pub score: Option<u32>,
    pub result: Option<SimulationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedScenario {
    pub name: String,
    pub candidate_id: String,
    pub label: String,
    pub profile: Profile,
    pub result: SimulationResult,
}

impl SavedScenario {
    /// Captures a simulated candidate together with the profile it was resolved into.
    /// Returns `None` for candidates that were never simulated.
    pub fn promote(name: &str, candidate: &WorldlineCandidate, profile: &Profile) -> Option<Self> {
        let result = candidate.result.clone()?;
        Some(Self {
            name: name.to_string(),
            candidate_id: candidate.id.clone(),
            label: candidate.label.clone(),
            profile: profile.clone(),
            result,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub trials: u32,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: 1_000,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_move_income_or_expenses_with_a_sign() {
        assert_eq!(LifeEventKind::IncomeIncrease.effect(), CashFlowEffect::Income(1.0));
        assert_eq!(LifeEventKind::IncomeDecrease.effect(), CashFlowEffect::Income(-1.0));
        assert_eq!(LifeEventKind::Education.effect(), CashFlowEffect::Expense(1.0));
        assert_eq!(LifeEventKind::ExpenseDecrease.effect(), CashFlowEffect::Expense(-1.0));
        assert_ne!(CashFlowEffect::Income(1.0), CashFlowEffect::Expense(1.0));
    }

    #[test]
    fn open_ended_events_stay_active_and_durations_saturate() {
        let event = LifeEvent {
            kind: LifeEventKind::Childcare,
            age: 40,
            magnitude: 1.0,
            duration: Some(u32::MAX),
            source_branch: None,
        };
        assert!(!event.is_active_at(39));
        assert!(event.is_active_at(100));
        let open = LifeEvent {
            duration: None,
            ..event
        };
        assert!(open.is_active_at(u32::MAX));
    }
}
