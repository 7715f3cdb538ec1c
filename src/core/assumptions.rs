//! Tax and pension collaborators consumed by the simulation engine.

use super::types::Profile;

pub const PENSION_START_AGE: u32 = 65;

pub trait TaxEstimator: Send + Sync {
    /// Effective income tax rate in `[0, 1]` for one earner's annual gross income.
    fn effective_rate(&self, gross_income: f64) -> f64;
}

pub trait PensionCalculator: Send + Sync {
    /// Annual benefit in today's money paid from [`PENSION_START_AGE`].
    fn annual_benefit(&self, profile: &Profile) -> f64;
}

/// Personal allowance followed by basic, higher and additional bands.
#[derive(Debug, Clone, Copy)]
pub struct ProgressiveTaxEstimator {
    pub personal_allowance: f64,
    pub basic_rate_limit: f64,
    pub higher_rate_limit: f64,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
}

impl Default for ProgressiveTaxEstimator {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProgressiveTaxEstimator {
    pub const fn standard() -> Self {
        Self {
            personal_allowance: 12_570.0,
            basic_rate_limit: 50_270.0,
            higher_rate_limit: 125_140.0,
            basic_rate: 0.20,
            higher_rate: 0.40,
            additional_rate: 0.45,
        }
    }

    pub fn tax_due(&self, gross_income: f64) -> f64 {
        let gross = gross_income.max(0.0);
        let allowance = self.personal_allowance.max(0.0);
        let taxable_income = (gross - allowance).max(0.0);

        let basic_limit = self.basic_rate_limit.max(allowance);
        let higher_limit = self.higher_rate_limit.max(basic_limit);
        let basic_band_width = basic_limit - allowance;
        let higher_band_width = higher_limit - basic_limit;

        let basic_taxable = taxable_income.min(basic_band_width);
        let higher_taxable = (taxable_income - basic_taxable)
            .min(higher_band_width)
            .max(0.0);
        let additional_taxable = (taxable_income - basic_taxable - higher_taxable).max(0.0);

        basic_taxable * self.basic_rate.clamp(0.0, 1.0)
            + higher_taxable * self.higher_rate.clamp(0.0, 1.0)
            + additional_taxable * self.additional_rate.clamp(0.0, 1.0)
    }
}

impl TaxEstimator for ProgressiveTaxEstimator {
    fn effective_rate(&self, gross_income: f64) -> f64 {
        if gross_income <= 0.0 {
            return 0.0;
        }
        (self.tax_due(gross_income) / gross_income).clamp(0.0, 1.0)
    }
}

/// Flat base plus an accrual on earnings for each contribution year before retirement.
#[derive(Debug, Clone, Copy)]
pub struct EarningsLinkedPension {
    pub flat_base: f64,
    pub accrual_rate: f64,
    pub career_start_age: u32,
    pub max_contribution_years: u32,
}

impl Default for EarningsLinkedPension {
    fn default() -> Self {
        Self::standard()
    }
}

impl EarningsLinkedPension {
    pub const fn standard() -> Self {
        Self {
            flat_base: 8_000.0,
            accrual_rate: 0.005,
            career_start_age: 22,
            max_contribution_years: 45,
        }
    }
}

impl PensionCalculator for EarningsLinkedPension {
    fn annual_benefit(&self, profile: &Profile) -> f64 {
        if let Some(benefit) = profile.pension_override {
            return benefit.max(0.0);
        }
        let years = profile
            .target_retire_age
            .min(PENSION_START_AGE)
            .saturating_sub(self.career_start_age)
            .min(self.max_contribution_years);
        self.flat_base.max(0.0) + profile.gross_income.max(0.0) * self.accrual_rate * years as f64
    }
}

/// Collaborators handed to one simulation run.
#[derive(Clone, Copy)]
pub struct Assumptions<'a> {
    pub tax: &'a dyn TaxEstimator,
    pub pension: &'a dyn PensionCalculator,
}

static DEFAULT_TAX: ProgressiveTaxEstimator = ProgressiveTaxEstimator::standard();
static DEFAULT_PENSION: EarningsLinkedPension = EarningsLinkedPension::standard();

impl Default for Assumptions<'static> {
    fn default() -> Self {
        Self {
            tax: &DEFAULT_TAX,
            pension: &DEFAULT_PENSION,
        }
    }
}

impl Assumptions<'_> {
    /// Net income for one earner, honouring a user-supplied effective rate.
    pub fn net_income(&self, profile: &Profile, gross_income: f64) -> f64 {
        let gross = gross_income.max(0.0);
        let rate = match profile.effective_tax_rate {
            Some(rate) => rate.clamp(0.0, 1.0),
            None => self.tax.effective_rate(gross),
        };
        gross * (1.0 - rate)
    }
}
