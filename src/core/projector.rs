//! Expansion of branches into concrete life events.

use super::error::PlanError;
use super::types::{Branch, HORIZON_AGE, HouseholdMode, LifeEvent, LifeEventKind, Profile};

pub const CHILDCARE_YEARS: u32 = 6;
pub const EDUCATION_START_OFFSET: u32 = 6;
pub const EDUCATION_YEARS: u32 = 16;
pub const EDUCATION_MULTIPLIER: f64 = 1.5;

const DEFAULT_CHILDCARE_COST: f64 = 10_000.0;
const DEFAULT_HOME_PRICE: f64 = 400_000.0;
const DOWN_PAYMENT_SHARE: f64 = 0.20;
const MORTGAGE_YEARS: u32 = 35;
const MORTGAGE_RATE: f64 = 0.02;
const DEFAULT_CAREER_BREAK_YEARS: u32 = 2;
const DEFAULT_MARRIAGE_COST: f64 = 6_000.0;

/// Closed set of rules a branch template key can resolve to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BranchTemplate {
    IncomeIncrease,
    IncomeDecrease,
    ExpenseIncrease,
    ExpenseDecrease,
    HousingPurchase,
    NewChild,
    Marriage,
    CareerBreak,
}

impl BranchTemplate {
    pub fn resolve(key: &str) -> Option<Self> {
        let template = match key {
            "income_increase" => BranchTemplate::IncomeIncrease,
            "income_decrease" => BranchTemplate::IncomeDecrease,
            "expense_increase" => BranchTemplate::ExpenseIncrease,
            "expense_decrease" => BranchTemplate::ExpenseDecrease,
            "housing_purchase" => BranchTemplate::HousingPurchase,
            "new_child" => BranchTemplate::NewChild,
            "marriage" => BranchTemplate::Marriage,
            "career_break" => BranchTemplate::CareerBreak,
            _ => return None,
        };
        Some(template)
    }
}

/// Resolves every template key of `branch`, failing on the first unknown one.
pub fn resolve_templates(branch: &Branch) -> Result<Vec<BranchTemplate>, PlanError> {
    if branch.templates.is_empty() {
        return Err(PlanError::EmptyBranch(branch.id.clone()));
    }
    if let Some(age) = branch.age.filter(|age| *age > HORIZON_AGE) {
        return Err(PlanError::invalid(
            "age",
            format!("branch {} starts at {age}, past the horizon of {HORIZON_AGE}", branch.id),
        ));
    }
    branch
        .templates
        .iter()
        .map(|key| {
            BranchTemplate::resolve(key).ok_or_else(|| PlanError::UnknownTemplate {
                branch_id: branch.id.clone(),
                template: key.clone(),
            })
        })
        .collect()
}

/// Returns a new profile with every branch expanded; `profile` is left untouched.
///
/// All branches are resolved before any event is added, so a single bad branch
/// rejects the whole projection.
pub fn project_profile(profile: &Profile, branches: &[Branch]) -> Result<Profile, PlanError> {
    let resolved = branches
        .iter()
        .map(|branch| resolve_templates(branch).map(|templates| (branch, templates)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut projected = profile.clone();
    for (branch, templates) in resolved {
        apply_branch(&mut projected, branch, &templates);
    }
    Ok(projected)
}

/// Removes every event produced by `branch_id`.
pub fn remove_branch_events(profile: &Profile, branch_id: &str) -> Profile {
    let mut updated = profile.clone();
    updated
        .events
        .retain(|e| e.source_branch.as_deref() != Some(branch_id));
    updated
}

/// Re-expands an edited branch in place of the events it produced before.
pub fn replace_branch_events(profile: &Profile, branch: &Branch) -> Result<Profile, PlanError> {
    let templates = resolve_templates(branch)?;
    let mut updated = remove_branch_events(profile, &branch.id);
    apply_branch(&mut updated, branch, &templates);
    Ok(updated)
}

/// Concrete events for one branch, without touching any profile.
pub fn expand_branch(profile: &Profile, branch: &Branch) -> Result<Vec<LifeEvent>, PlanError> {
    let templates = resolve_templates(branch)?;
    Ok(templates
        .iter()
        .flat_map(|t| expand_template(profile, branch, *t))
        .collect())
}

fn apply_branch(profile: &mut Profile, branch: &Branch, templates: &[BranchTemplate]) {
    for template in templates {
        let events = expand_template(profile, branch, *template);
        profile.events.extend(events);
        match template {
            BranchTemplate::HousingPurchase => profile.owns_home = true,
            BranchTemplate::Marriage => profile.household = HouseholdMode::Couple,
            BranchTemplate::IncomeIncrease
            | BranchTemplate::IncomeDecrease
            | BranchTemplate::ExpenseIncrease
            | BranchTemplate::ExpenseDecrease
            | BranchTemplate::NewChild
            | BranchTemplate::CareerBreak => {}
        }
    }
}

fn expand_template(profile: &Profile, branch: &Branch, template: BranchTemplate) -> Vec<LifeEvent> {
    let age = branch.age.unwrap_or(profile.current_age);
    let event = |kind, age, magnitude: f64, duration| LifeEvent {
        kind,
        age,
        magnitude: magnitude.max(0.0),
        duration,
        source_branch: Some(branch.id.clone()),
    };

    match template {
        BranchTemplate::IncomeIncrease => vec![event(
            LifeEventKind::IncomeIncrease,
            age,
            branch.amount.unwrap_or(0.0),
            branch.duration,
        )],
        BranchTemplate::IncomeDecrease => vec![event(
            LifeEventKind::IncomeDecrease,
            age,
            branch.amount.unwrap_or(0.0),
            branch.duration,
        )],
        BranchTemplate::ExpenseIncrease => vec![event(
            LifeEventKind::ExpenseIncrease,
            age,
            branch.amount.unwrap_or(0.0),
            branch.duration,
        )],
        BranchTemplate::ExpenseDecrease => vec![event(
            LifeEventKind::ExpenseDecrease,
            age,
            branch.amount.unwrap_or(0.0),
            branch.duration,
        )],
        BranchTemplate::HousingPurchase => {
            let price = branch.amount.unwrap_or(DEFAULT_HOME_PRICE);
            let loan = price * (1.0 - DOWN_PAYMENT_SHARE);
            let years = branch.duration.unwrap_or(MORTGAGE_YEARS);
            vec![
                event(
                    LifeEventKind::HousingPurchase,
                    age,
                    price * DOWN_PAYMENT_SHARE,
                    Some(1),
                ),
                event(
                    LifeEventKind::ExpenseIncrease,
                    age,
                    annual_loan_payment(loan, MORTGAGE_RATE, years),
                    Some(years),
                ),
            ]
        }
        BranchTemplate::NewChild => {
            let childcare = branch.amount.unwrap_or(DEFAULT_CHILDCARE_COST);
            vec![
                event(
                    LifeEventKind::Childcare,
                    age,
                    childcare,
                    Some(CHILDCARE_YEARS),
                ),
                event(
                    LifeEventKind::Education,
                    age.saturating_add(EDUCATION_START_OFFSET),
                    childcare * EDUCATION_MULTIPLIER,
                    Some(EDUCATION_YEARS),
                ),
            ]
        }
        BranchTemplate::Marriage => vec![event(
            LifeEventKind::ExpenseIncrease,
            age,
            branch.amount.unwrap_or(DEFAULT_MARRIAGE_COST),
            branch.duration,
        )],
        BranchTemplate::CareerBreak => {
            let lost = branch
                .amount
                .unwrap_or(profile.gross_income + profile.side_income);
            vec![event(
                LifeEventKind::IncomeDecrease,
                age,
                lost,
                Some(branch.duration.unwrap_or(DEFAULT_CAREER_BREAK_YEARS)),
            )]
        }
    }
}

/// Level annual payment repaying `principal` over `years` at `rate`.
fn annual_loan_payment(principal: f64, rate: f64, years: u32) -> f64 {
    let n = years.max(1) as f64;
    if principal <= 0.0 {
        return 0.0;
    }
    if rate.abs() < 1e-9 {
        return principal / n;
    }
    principal * rate / (1.0 - (1.0 + rate).powf(-n))
}
