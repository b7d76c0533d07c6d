use log::{debug, warn};

use super::error::{
    MAX_HORIZON_YEARS, PlannerError, PlannerResult, ensure_growth_rate, ensure_horizon,
    ensure_non_negative,
};
use super::types::{Money, MonthlyBalance, ProjectionInputs, ProjectionSchedule, YearMonth};

#[derive(Debug, Clone, Copy)]
struct Buckets {
    principal: Money,
    isa: Money,
    pension: Money,
    savings: Money,
}

impl Buckets {
    fn total(self) -> Money {
        self.principal + self.isa + self.pension + self.savings
    }
}

#[derive(Debug, Clone, Copy)]
struct MonthlyRates {
    isa: f64,
    pension: f64,
    savings: f64,
    blended: f64,
}

/// Equivalent monthly rate for an annual compound rate.
pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

/// Contribution-weighted average of the three account rates, applied to the
/// uncategorised principal. Zero contributions give zero growth.
pub fn blended_monthly_rate(inputs: &ProjectionInputs) -> f64 {
    let total = inputs.isa_monthly + inputs.pension_monthly + inputs.savings_monthly;
    if total <= 0.0 {
        return 0.0;
    }
    monthly_rate(inputs.isa_annual_rate) * (inputs.isa_monthly / total)
        + monthly_rate(inputs.pension_annual_rate) * (inputs.pension_monthly / total)
        + monthly_rate(inputs.savings_annual_rate) * (inputs.savings_monthly / total)
}

fn validate(inputs: &ProjectionInputs) -> PlannerResult<()> {
    ensure_non_negative("principal", inputs.principal)?;
    ensure_non_negative("isaMonthly", inputs.isa_monthly)?;
    ensure_non_negative("pensionMonthly", inputs.pension_monthly)?;
    ensure_non_negative("savingsMonthly", inputs.savings_monthly)?;
    ensure_growth_rate("isaAnnualRate", inputs.isa_annual_rate)?;
    ensure_growth_rate("pensionAnnualRate", inputs.pension_annual_rate)?;
    ensure_growth_rate("savingsAnnualRate", inputs.savings_annual_rate)?;
    ensure_horizon("projectionYears", inputs.projection_years)?;
    if inputs.contribution_years > MAX_HORIZON_YEARS {
        return Err(PlannerError::LimitExceeded {
            field: "contributionYears".to_string(),
            limit: MAX_HORIZON_YEARS,
        });
    }
    Ok(())
}

/// Month-by-month balances for the ISA, pension and savings accounts plus an
/// existing principal pot, starting the month after `start`.
///
/// The first month holds one contribution per account and the untouched
/// principal. Later months grow every bucket and, until `contribution_years`
/// have elapsed from January of the start year, add the monthly contribution.
pub fn project(inputs: &ProjectionInputs, start: YearMonth) -> PlannerResult<ProjectionSchedule> {
    validate(inputs)?;
    let start = YearMonth::new(start.year, start.month)?;

    let rates = MonthlyRates {
        isa: monthly_rate(inputs.isa_annual_rate),
        pension: monthly_rate(inputs.pension_annual_rate),
        savings: monthly_rate(inputs.savings_annual_rate),
        blended: blended_monthly_rate(inputs),
    };
    if inputs.principal > 0.0
        && inputs.isa_monthly + inputs.pension_monthly + inputs.savings_monthly <= 0.0
    {
        warn!("no monthly contributions; principal of {:.2} is held without growth", inputs.principal);
    }

    let first_month = start.month + 1;
    let last_month = inputs.projection_years * 12 + start.month;
    let contribution_cutoff = inputs.contribution_years * 12 + start.month;

    let seed = Buckets {
        principal: inputs.principal,
        isa: inputs.isa_monthly,
        pension: inputs.pension_monthly,
        savings: inputs.savings_monthly,
    };

    let balances: Vec<MonthlyBalance> = (first_month..=last_month)
        .scan(None::<Buckets>, |state, month| {
            let next = match *state {
                None => seed,
                Some(prev) => grow(prev, &rates, inputs, month <= contribution_cutoff),
            };
            *state = Some(next);
            let calendar = start.from_index(month);
            Some(MonthlyBalance {
                month: calendar.month,
                projection_year: calendar.year,
                total_balance: next.total(),
                principal: next.principal,
                isa_balance: next.isa,
                pension_balance: next.pension,
                savings_balance: next.savings,
            })
        })
        .collect();

    debug!(
        "projected {} months from {start}: blended monthly rate {:.6}, final total {:.2}",
        balances.len(),
        rates.blended,
        balances.last().map_or(0.0, |b| b.total_balance)
    );

    Ok(ProjectionSchedule {
        blended_monthly_rate: rates.blended,
        balances,
    })
}

fn grow(prev: Buckets, rates: &MonthlyRates, inputs: &ProjectionInputs, contributing: bool) -> Buckets {
    let (isa_in, pension_in, savings_in) = if contributing {
        (inputs.isa_monthly, inputs.pension_monthly, inputs.savings_monthly)
    } else {
        (0.0, 0.0, 0.0)
    };
    Buckets {
        principal: prev.principal * (1.0 + rates.blended),
        isa: prev.isa * (1.0 + rates.isa) + isa_in,
        pension: prev.pension * (1.0 + rates.pension) + pension_in,
        savings: prev.savings * (1.0 + rates.savings) + savings_in,
    }
}
