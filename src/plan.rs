//! Composition of the calculation engine into a yearly financial plan: tax
//! position, relief, mortgage comparison, allocation check and the savings
//! projection fed by relief-adjusted contributions.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;

use crate::core::{
    AmortizationSchedule, CharityRelief, ExtraPayments, Money, MortgageTerms, OverpaymentSummary,
    PensionRelief, PlannerError, PlannerResult, ProjectionInputs, ProjectionSchedule, ReliefCalculator,
    TaxEngine, TaxResult, TaxYear, YearMonth, amortize, ensure_non_negative,
    interest_saved_by_year, project, summarize_overpayment,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanInputs {
    pub annual_salary: Money,
    pub annual_bonus: Money,
    pub additional_income: Money,
    pub monthly_expenses: Money,
    pub mortgage: Option<MortgageTerms>,
    pub current_savings: Money,
    pub current_isa: Money,
    pub current_pension: Money,
    pub annual_charity_donation: Money,
    pub annual_isa_allocation: Money,
    pub annual_pension_allocation: Money,
    pub annual_savings_allocation: Money,
    pub isa_growth_rate: f64,
    pub pension_growth_rate: f64,
    pub savings_growth_rate: f64,
    pub years_to_retirement: u32,
    pub projection_years: u32,
}

impl PlanInputs {
    fn validate(&self) -> PlannerResult<()> {
        ensure_non_negative("annualSalary", self.annual_salary)?;
        ensure_non_negative("annualBonus", self.annual_bonus)?;
        ensure_non_negative("additionalIncome", self.additional_income)?;
        ensure_non_negative("monthlyExpenses", self.monthly_expenses)?;
        ensure_non_negative("currentSavings", self.current_savings)?;
        ensure_non_negative("currentIsa", self.current_isa)?;
        ensure_non_negative("currentPension", self.current_pension)?;
        ensure_non_negative("annualIsaAllocation", self.annual_isa_allocation)?;
        ensure_non_negative("annualSavingsAllocation", self.annual_savings_allocation)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AllocationStatus {
    Balanced,
    /// Income left over after expenses and allocations.
    UnderAllocated { by: Money },
    /// Expenses and allocations exceed net income.
    OverAllocated { by: Money },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationCheck {
    pub net_income: Money,
    pub expenses: Money,
    pub total_allocation: Money,
    pub difference: Money,
    pub outcome: AllocationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MortgageComparison {
    pub baseline: AmortizationSchedule,
    pub overpaid: AmortizationSchedule,
    pub summary: OverpaymentSummary,
    pub interest_saved_by_year: BTreeMap<i32, Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub tax_year: &'static str,
    pub tax: TaxResult,
    pub pension_relief: PensionRelief,
    pub charity_relief: CharityRelief,
    pub annual_mortgage_payment: Money,
    pub allocation: AllocationCheck,
    pub net_savings: Money,
    pub net_savings_with_tax_relief: Money,
    pub total_tax_relief: Money,
    pub projection_inputs: ProjectionContributions,
    pub projection: ProjectionSchedule,
    pub mortgage: Option<MortgageComparison>,
    pub warnings: Vec<String>,
}

/// Monthly amounts fed into the projection after relief is folded in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionContributions {
    pub principal: Money,
    pub isa_monthly: Money,
    pub pension_monthly: Money,
    pub savings_monthly: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetInputs {
    pub annual_income: Money,
    pub annual_base_salary: Money,
    pub monthly_expenses: Money,
    pub annual_charity_donation: Money,
    pub annual_mortgage_overpayment: Money,
    pub mortgage: Option<MortgageTerms>,
    /// Share of base salary paid into a workplace pension, e.g. 0.09.
    pub paye_pension_rate: f64,
    pub annual_isa_amount: Money,
    pub annual_sipp_amount: Money,
}

impl BudgetInputs {
    fn validate(&self) -> PlannerResult<()> {
        ensure_non_negative("annualBaseSalary", self.annual_base_salary)?;
        ensure_non_negative("monthlyExpenses", self.monthly_expenses)?;
        ensure_non_negative("annualMortgageOverpayment", self.annual_mortgage_overpayment)?;
        ensure_non_negative("annualIsaAmount", self.annual_isa_amount)?;
        if !(0.0..=1.0).contains(&self.paye_pension_rate) {
            return Err(PlannerError::invalid(
                "payePensionRate",
                format!("must be between 0 and 1, got {}", self.paye_pension_rate),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBudget {
    pub monthly_net_income: Money,
    pub monthly_expenses: Money,
    pub monthly_mortgage_payment: Money,
    pub monthly_mortgage_overpayment: Money,
    pub monthly_paye_pension_contribution: Money,
    pub monthly_charity_donation: Money,
    pub monthly_charity_tax_relief: Money,
    pub monthly_isa_contribution: Money,
    pub monthly_sipp_contribution: Money,
    pub monthly_pension_tax_relief: Money,
    pub monthly_net_savings: Money,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    tax: TaxEngine,
    relief: ReliefCalculator,
}

impl Planner {
    pub fn new(year: TaxYear) -> Self {
        Self {
            tax: TaxEngine::new(year),
            relief: ReliefCalculator::new(year),
        }
    }

    pub fn tax_engine(&self) -> &TaxEngine {
        &self.tax
    }

    pub fn relief_calculator(&self) -> &ReliefCalculator {
        &self.relief
    }

    pub fn tax_year(&self) -> &TaxYear {
        self.tax.tax_year()
    }

    pub fn build_plan(&self, inputs: &PlanInputs, start: YearMonth) -> PlannerResult<PlanReport> {
        inputs.validate()?;
        let gross = inputs.annual_salary + inputs.annual_bonus;
        let tax = self.tax.compute_tax(gross, inputs.additional_income)?;
        let pension_relief = self
            .relief
            .pension_relief(inputs.annual_pension_allocation, tax.gross_income)?;
        let charity_relief = self
            .relief
            .charity_relief(inputs.annual_charity_donation, tax.gross_income)?;

        let mortgage = match &inputs.mortgage {
            Some(terms) => Some(compare_mortgage(terms, start)?),
            None => None,
        };
        let annual_mortgage_payment = mortgage
            .as_ref()
            .map_or(0.0, |m| m.baseline.mean_monthly_payment() * 12.0);

        let allocation = check_allocation(inputs, &tax, annual_mortgage_payment);

        let net_savings = tax.net_income
            - inputs.monthly_expenses * 12.0
            - annual_mortgage_payment
            - inputs.annual_charity_donation;
        let net_savings_with_tax_relief = net_savings
            + pension_relief.extra_tax_relief
            + charity_relief.charity_tax_relief
            + pension_relief.government_relief;

        let contributions = ProjectionContributions {
            principal: inputs.current_savings + inputs.current_isa + inputs.current_pension,
            isa_monthly: (inputs.annual_isa_allocation
                + pension_relief.extra_tax_relief
                + charity_relief.charity_tax_relief)
                / 12.0,
            pension_monthly: pension_relief.total_pension_amount / 12.0,
            savings_monthly: inputs.annual_savings_allocation / 12.0,
        };
        let projection = project(
            &ProjectionInputs {
                principal: contributions.principal,
                isa_monthly: contributions.isa_monthly,
                pension_monthly: contributions.pension_monthly,
                savings_monthly: contributions.savings_monthly,
                contribution_years: inputs.years_to_retirement,
                projection_years: inputs.projection_years,
                isa_annual_rate: inputs.isa_growth_rate,
                pension_annual_rate: inputs.pension_growth_rate,
                savings_annual_rate: inputs.savings_growth_rate,
            },
            start,
        )?;

        let warnings = self.allowance_warnings(inputs, &pension_relief);
        for warning in &warnings {
            warn!("{warning}");
        }
        debug!(
            "plan for {}: net income {:.2}, allocation {:?}",
            self.tax_year().label, tax.net_income, allocation.outcome
        );

        Ok(PlanReport {
            tax_year: self.tax_year().label,
            tax,
            pension_relief,
            charity_relief,
            annual_mortgage_payment,
            allocation,
            net_savings,
            net_savings_with_tax_relief,
            total_tax_relief: net_savings_with_tax_relief - net_savings,
            projection_inputs: contributions,
            projection,
            mortgage,
            warnings,
        })
    }

    pub fn monthly_budget(&self, inputs: &BudgetInputs, start: YearMonth) -> PlannerResult<MonthlyBudget> {
        inputs.validate()?;
        let tax = self.tax.compute_tax(inputs.annual_income, 0.0)?;
        let charity = self
            .relief
            .charity_relief(inputs.annual_charity_donation, inputs.annual_income)?;
        let sipp = self
            .relief
            .pension_relief(inputs.annual_sipp_amount, inputs.annual_income)?;

        let monthly_mortgage_payment = match &inputs.mortgage {
            Some(terms) => {
                let baseline = MortgageTerms {
                    extra_payments: ExtraPayments::none(),
                    ..terms.clone()
                };
                amortize(&baseline, start)?.mean_monthly_payment()
            }
            None => 0.0,
        };

        let monthly_net_income = tax.net_income / 12.0;
        let monthly_mortgage_overpayment = inputs.annual_mortgage_overpayment / 12.0;
        let monthly_paye_pension_contribution =
            inputs.paye_pension_rate * inputs.annual_base_salary / 12.0;
        let monthly_charity_donation = inputs.annual_charity_donation / 12.0;
        let monthly_charity_tax_relief = charity.charity_tax_relief / 12.0;
        let monthly_pension_tax_relief = sipp.extra_tax_relief / 12.0;

        let monthly_net_savings = monthly_net_income
            - inputs.monthly_expenses
            - monthly_mortgage_payment
            - monthly_mortgage_overpayment
            - monthly_paye_pension_contribution
            - monthly_charity_donation
            + monthly_charity_tax_relief
            + monthly_pension_tax_relief;

        Ok(MonthlyBudget {
            monthly_net_income,
            monthly_expenses: inputs.monthly_expenses,
            monthly_mortgage_payment,
            monthly_mortgage_overpayment,
            monthly_paye_pension_contribution,
            monthly_charity_donation,
            monthly_charity_tax_relief,
            monthly_isa_contribution: inputs.annual_isa_amount / 12.0,
            monthly_sipp_contribution: sipp.total_pension_amount / 12.0,
            monthly_pension_tax_relief,
            monthly_net_savings,
        })
    }

    fn allowance_warnings(&self, inputs: &PlanInputs, pension: &PensionRelief) -> Vec<String> {
        let year = self.tax_year();
        let mut warnings = Vec::new();
        if inputs.annual_isa_allocation > year.isa_annual_allowance {
            warnings.push(format!(
                "ISA allocation of {:.0} exceeds the annual allowance of {:.0}",
                inputs.annual_isa_allocation, year.isa_annual_allowance
            ));
        }
        if pension.total_pension_amount > year.pension_annual_allowance {
            warnings.push(format!(
                "Gross pension contribution of {:.0} exceeds the annual allowance of {:.0}",
                pension.total_pension_amount, year.pension_annual_allowance
            ));
        }
        warnings
    }
}

/// Amortize `terms` with and without its extra payments and summarise the difference.
pub fn compare_mortgage(terms: &MortgageTerms, start: YearMonth) -> PlannerResult<MortgageComparison> {
    let baseline_terms = MortgageTerms {
        extra_payments: ExtraPayments::none(),
        ..terms.clone()
    };
    let baseline = amortize(&baseline_terms, start)?;
    let overpaid = amortize(terms, start)?;
    let summary = summarize_overpayment(&baseline, &overpaid)?;
    let interest_saved_by_year = interest_saved_by_year(&baseline, &overpaid);
    Ok(MortgageComparison {
        baseline,
        overpaid,
        summary,
        interest_saved_by_year,
    })
}

fn check_allocation(inputs: &PlanInputs, tax: &TaxResult, annual_mortgage_payment: Money) -> AllocationCheck {
    let expenses =
        inputs.monthly_expenses * 12.0 + annual_mortgage_payment + inputs.annual_charity_donation;
    let total_allocation = inputs.annual_isa_allocation
        + inputs.annual_pension_allocation
        + inputs.annual_savings_allocation;
    let difference = tax.net_income - expenses - total_allocation;

    // Whole pounds: pennies of rounding are not an imbalance.
    let rounded = difference.round();
    let outcome = if rounded < 0.0 {
        AllocationStatus::OverAllocated { by: difference.abs() }
    } else if rounded > 0.0 {
        AllocationStatus::UnderAllocated { by: difference }
    } else {
        AllocationStatus::Balanced
    };

    AllocationCheck {
        net_income: tax.net_income,
        expenses,
        total_allocation,
        difference,
        outcome,
    }
}
