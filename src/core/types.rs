use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::error::{PlannerError, PlannerResult, ensure_non_negative};

/// Amount in the single base currency (pounds).
pub type Money = f64;

/// Tax thresholds, rates and allowances for one tax year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxYear {
    pub label: &'static str,
    pub personal_allowance: Money,
    pub basic_rate_limit: Money,
    pub allowance_taper_start: Money,
    pub higher_rate_limit: Money,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
    pub ni_primary_threshold: Money,
    pub ni_upper_earnings_limit: Money,
    pub ni_main_rate: f64,
    pub ni_upper_rate: f64,
    pub isa_annual_allowance: Money,
    pub pension_annual_allowance: Money,
}

impl TaxYear {
    pub const fn uk_2024_25() -> Self {
        Self {
            label: "2024/25",
            personal_allowance: 12_570.0,
            basic_rate_limit: 50_270.0,
            allowance_taper_start: 100_000.0,
            higher_rate_limit: 125_140.0,
            basic_rate: 0.20,
            higher_rate: 0.40,
            additional_rate: 0.45,
            ni_primary_threshold: 12_570.0,
            ni_upper_earnings_limit: 50_270.0,
            ni_main_rate: 0.08,
            ni_upper_rate: 0.02,
            isa_annual_allowance: 20_000.0,
            pension_annual_allowance: 60_000.0,
        }
    }

    /// Width of the basic-rate band at the full personal allowance.
    pub fn basic_band_width(&self) -> Money {
        self.basic_rate_limit - self.personal_allowance
    }
}

impl Default for TaxYear {
    fn default() -> Self {
        Self::uk_2024_25()
    }
}

/// One marginal slice of a bracket table. `upper == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBand {
    pub lower: Money,
    pub upper: Option<Money>,
    pub rate: f64,
}

/// Calendar position used as the start of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> PlannerResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(PlannerError::invalid(
                "startMonth",
                format!("must be between 1 and 12, got {month}"),
            ));
        }
        Ok(Self { year, month })
    }

    pub fn current() -> Self {
        let today = chrono::Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    /// Calendar position of a 1-based month index counted from January of
    /// `self.year`. Index 13 is January of the following year.
    pub(crate) fn from_index(self, index: u32) -> Self {
        let zero_based = index.saturating_sub(1);
        Self {
            year: self.year + (zero_based / 12) as i32,
            month: zero_based % 12 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub gross_income: Money,
    pub income_tax: Money,
    pub ni_contribution: Money,
    pub total_tax: Money,
    pub net_income: Money,
    pub effective_tax_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PensionRelief {
    pub government_relief: Money,
    pub extra_tax_relief: Money,
    pub total_tax_relief: Money,
    pub total_pension_amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharityRelief {
    pub gift_aid_amount: Money,
    pub charity_tax_relief: Money,
    pub total_tax_relief: Money,
}

/// Sparse calendar-year to lump-sum overpayment map. Amounts are validated
/// on construction; absent years contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<i32, f64>")]
pub struct ExtraPayments(BTreeMap<i32, Money>);

impl ExtraPayments {
    pub fn new(by_year: BTreeMap<i32, Money>) -> PlannerResult<Self> {
        for (year, amount) in &by_year {
            ensure_non_negative(&format!("extraPayments[{year}]"), *amount)?;
        }
        Ok(Self(by_year))
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_year(&self, year: i32) -> Option<Money> {
        self.0.get(&year).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> Money {
        self.0.values().sum()
    }
}

impl TryFrom<BTreeMap<i32, f64>> for ExtraPayments {
    type Error = PlannerError;

    fn try_from(value: BTreeMap<i32, f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MortgageTerms {
    pub principal: Money,
    pub annual_rate: f64,
    pub term_years: u32,
    pub extra_payments: ExtraPayments,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEntry {
    pub month: u32,
    pub year: i32,
    pub scheduled_payment: Money,
    pub extra_payment: Money,
    pub capital_portion: Money,
    pub interest_portion: Money,
    pub remaining_balance: Money,
}

impl MonthlyEntry {
    pub fn total_payment(&self) -> Money {
        self.scheduled_payment + self.extra_payment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub monthly_payment: Money,
    pub entries: Vec<MonthlyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverpaymentSummary {
    pub total_interest_saved: Money,
    pub total_interest_saved_percentage: f64,
    pub total_overpayments: Money,
    pub overpayment_rate_of_return_yoy: f64,
    pub baseline_months: u32,
    pub overpaid_months: u32,
    pub months_saved: u32,
    pub years_saved: u32,
    pub remaining_months_saved: u32,
    pub time_saved: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionInputs {
    pub principal: Money,
    pub isa_monthly: Money,
    pub pension_monthly: Money,
    pub savings_monthly: Money,
    pub contribution_years: u32,
    pub projection_years: u32,
    pub isa_annual_rate: f64,
    pub pension_annual_rate: f64,
    pub savings_annual_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBalance {
    pub month: u32,
    pub projection_year: i32,
    pub total_balance: Money,
    pub principal: Money,
    pub isa_balance: Money,
    pub pension_balance: Money,
    pub savings_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSchedule {
    pub blended_monthly_rate: f64,
    pub balances: Vec<MonthlyBalance>,
}

impl ProjectionSchedule {
    pub fn first(&self) -> Option<&MonthlyBalance> {
        self.balances.first()
    }

    pub fn last(&self) -> Option<&MonthlyBalance> {
        self.balances.last()
    }
}
