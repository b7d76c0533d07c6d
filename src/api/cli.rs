use std::collections::BTreeMap;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::core::{ExtraPayments, MortgageTerms, ProjectionInputs, YearMonth, amortize, project};
use crate::plan::{BudgetInputs, PlanInputs, Planner, compare_mortgage};

#[derive(Parser, Debug)]
#[command(
    name = "ukplan",
    about = "UK personal finance planner (income tax + NI, pension/Gift Aid relief, mortgage overpayments, ISA/pension/savings projections)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Income tax and National Insurance for one year's income
    Tax(TaxArgs),
    /// Pension and Gift Aid relief
    Relief(ReliefArgs),
    /// Mortgage repayment schedule, with overpayment comparison when extras are given
    Mortgage(MortgageArgs),
    /// ISA, pension and savings growth projection
    Project(ProjectArgs),
    /// Full yearly plan combining all of the above
    Plan(PlanArgs),
    /// Monthly cash-flow budget after tax, mortgage, pension and relief
    Budget(BudgetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TaxArgs {
    #[arg(long)]
    pub gross_income: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "One-off income taxed in the same year, e.g. vested RSUs"
    )]
    pub additional_income: f64,
}

#[derive(Args, Debug, Clone)]
pub struct ReliefArgs {
    #[arg(long)]
    pub gross_income: f64,
    #[arg(long, default_value_t = 0.0, help = "Net annual pension contribution")]
    pub pension_contribution: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual charity donation under Gift Aid")]
    pub charity_donation: f64,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct StartArgs {
    #[arg(long, help = "Calendar year the simulation starts in, defaults to today")]
    pub start_year: Option<i32>,
    #[arg(long, help = "Calendar month (1-12) the simulation starts in, defaults to today")]
    pub start_month: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct MortgageArgs {
    #[arg(long)]
    pub principal: f64,
    #[arg(long, help = "Annual interest rate in percent, e.g. 4.1")]
    pub rate: f64,
    #[arg(long)]
    pub term_years: u32,
    #[arg(
        long = "extra-payment",
        value_parser = parse_extra_payment,
        help = "Lump-sum overpayment as YEAR=AMOUNT, spread over that calendar year; repeatable"
    )]
    pub extra_payments: Vec<(i32, f64)>,
    #[command(flatten)]
    pub start: StartArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = 0.0)]
    pub principal: f64,
    #[arg(long, default_value_t = 0.0)]
    pub isa_monthly: f64,
    #[arg(long, default_value_t = 0.0)]
    pub pension_monthly: f64,
    #[arg(long, default_value_t = 0.0)]
    pub savings_monthly: f64,
    #[arg(long)]
    pub contribution_years: u32,
    #[arg(long)]
    pub projection_years: u32,
    #[arg(long, help = "Expected annual ISA growth in percent, e.g. 7")]
    pub isa_growth_rate: f64,
    #[arg(long, help = "Expected annual pension growth in percent")]
    pub pension_growth_rate: f64,
    #[arg(long, help = "Expected annual savings interest in percent")]
    pub savings_growth_rate: f64,
    #[command(flatten)]
    pub start: StartArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long, default_value_t = 50_000.0)]
    pub annual_salary: f64,
    #[arg(long, default_value_t = 5_000.0)]
    pub annual_bonus: f64,
    #[arg(long, default_value_t = 0.0)]
    pub additional_income: f64,
    #[arg(long, default_value_t = 800.0, help = "Monthly expenses excluding the mortgage")]
    pub monthly_expenses: f64,
    #[arg(long, default_value_t = 345_000.0, help = "Mortgage balance; 0 for no mortgage")]
    pub mortgage_principal: f64,
    #[arg(long, default_value_t = 4.1, help = "Mortgage interest rate in percent")]
    pub mortgage_rate: f64,
    #[arg(long, default_value_t = 27)]
    pub mortgage_years: u32,
    #[arg(long = "extra-payment", value_parser = parse_extra_payment)]
    pub extra_payments: Vec<(i32, f64)>,
    #[arg(long, default_value_t = 20_000.0)]
    pub current_savings: f64,
    #[arg(long, default_value_t = 20_000.0)]
    pub current_isa: f64,
    #[arg(long, default_value_t = 15_000.0)]
    pub current_pension: f64,
    #[arg(long, default_value_t = 0.0)]
    pub annual_charity_donation: f64,
    #[arg(long, default_value_t = 1_000.0)]
    pub annual_isa_allocation: f64,
    #[arg(long, default_value_t = 1_000.0)]
    pub annual_pension_allocation: f64,
    #[arg(long, default_value_t = 1_000.0)]
    pub annual_savings_allocation: f64,
    #[arg(long, default_value_t = 6.0, help = "ISA growth in percent")]
    pub isa_growth_rate: f64,
    #[arg(long, default_value_t = 7.0, help = "Pension growth in percent")]
    pub pension_growth_rate: f64,
    #[arg(long, default_value_t = 3.0, help = "Savings interest in percent")]
    pub savings_growth_rate: f64,
    #[arg(long, default_value_t = 10)]
    pub years_to_retirement: u32,
    #[arg(long, default_value_t = 20)]
    pub projection_years: u32,
    #[command(flatten)]
    pub start: StartArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BudgetArgs {
    #[arg(long, default_value_t = 55_000.0, help = "Total annual taxable income")]
    pub annual_income: f64,
    #[arg(long, default_value_t = 50_000.0, help = "Base salary the workplace pension rate applies to")]
    pub annual_base_salary: f64,
    #[arg(long, default_value_t = 800.0)]
    pub monthly_expenses: f64,
    #[arg(long, default_value_t = 0.0)]
    pub annual_charity_donation: f64,
    #[arg(long, default_value_t = 0.0)]
    pub annual_mortgage_overpayment: f64,
    #[arg(long, default_value_t = 345_000.0, help = "Mortgage balance; 0 for no mortgage")]
    pub mortgage_principal: f64,
    #[arg(long, default_value_t = 4.1, help = "Mortgage interest rate in percent")]
    pub mortgage_rate: f64,
    #[arg(long, default_value_t = 27)]
    pub mortgage_years: u32,
    #[arg(long, default_value_t = 9.0, help = "Workplace pension contribution in percent of base salary")]
    pub paye_pension_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    pub annual_isa_amount: f64,
    #[arg(long, default_value_t = 0.0, help = "Net annual SIPP contribution")]
    pub annual_sipp_amount: f64,
    #[command(flatten)]
    pub start: StartArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReliefResponse {
    pub pension: crate::core::PensionRelief,
    pub charity: crate::core::CharityRelief,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MortgageResponse {
    pub schedule: crate::core::AmortizationSchedule,
    pub total_interest: f64,
    pub comparison: Option<MortgageComparisonResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MortgageComparisonResponse {
    pub summary: crate::core::OverpaymentSummary,
    pub baseline_total_interest: f64,
    pub interest_saved_by_year: BTreeMap<i32, f64>,
}

fn parse_extra_payment(raw: &str) -> Result<(i32, f64), String> {
    let (year, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected YEAR=AMOUNT, got {raw:?}"))?;
    let year = year
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid year in {raw:?}: {e}"))?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount in {raw:?}: {e}"))?;
    Ok((year, amount))
}

pub(crate) fn resolve_start(start: StartArgs) -> Result<YearMonth, String> {
    let now = YearMonth::current();
    YearMonth::new(
        start.start_year.unwrap_or(now.year),
        start.start_month.unwrap_or(now.month),
    )
    .map_err(|e| e.to_string())
}

fn extra_payments_from_pairs(pairs: &[(i32, f64)]) -> Result<ExtraPayments, String> {
    let mut by_year = BTreeMap::new();
    for (year, amount) in pairs {
        if by_year.insert(*year, *amount).is_some() {
            return Err(format!("--extra-payment given twice for {year}"));
        }
    }
    ExtraPayments::new(by_year).map_err(|e| e.to_string())
}

pub(crate) fn build_mortgage_terms(args: &MortgageArgs) -> Result<MortgageTerms, String> {
    if !args.rate.is_finite() || args.rate < 0.0 {
        return Err("--rate must be >= 0".to_string());
    }
    Ok(MortgageTerms {
        principal: args.principal,
        annual_rate: args.rate / 100.0,
        term_years: args.term_years,
        extra_payments: extra_payments_from_pairs(&args.extra_payments)?,
    })
}

pub(crate) fn build_projection_inputs(args: &ProjectArgs) -> Result<ProjectionInputs, String> {
    if args.contribution_years > args.projection_years {
        log::warn!(
            "contribution years ({}) exceed projection years ({}); contributions run to the end",
            args.contribution_years,
            args.projection_years
        );
    }
    Ok(ProjectionInputs {
        principal: args.principal,
        isa_monthly: args.isa_monthly,
        pension_monthly: args.pension_monthly,
        savings_monthly: args.savings_monthly,
        contribution_years: args.contribution_years,
        projection_years: args.projection_years,
        isa_annual_rate: args.isa_growth_rate / 100.0,
        pension_annual_rate: args.pension_growth_rate / 100.0,
        savings_annual_rate: args.savings_growth_rate / 100.0,
    })
}

pub(crate) fn build_plan_inputs(args: &PlanArgs) -> Result<PlanInputs, String> {
    if !args.mortgage_principal.is_finite() || args.mortgage_principal < 0.0 {
        return Err("--mortgage-principal must be >= 0".to_string());
    }
    if args.mortgage_principal == 0.0 && !args.extra_payments.is_empty() {
        return Err("--extra-payment requires --mortgage-principal > 0".to_string());
    }
    let mortgage = if args.mortgage_principal > 0.0 {
        Some(build_mortgage_terms(&MortgageArgs {
            principal: args.mortgage_principal,
            rate: args.mortgage_rate,
            term_years: args.mortgage_years,
            extra_payments: args.extra_payments.clone(),
            start: args.start,
        })?)
    } else {
        None
    };

    Ok(PlanInputs {
        annual_salary: args.annual_salary,
        annual_bonus: args.annual_bonus,
        additional_income: args.additional_income,
        monthly_expenses: args.monthly_expenses,
        mortgage,
        current_savings: args.current_savings,
        current_isa: args.current_isa,
        current_pension: args.current_pension,
        annual_charity_donation: args.annual_charity_donation,
        annual_isa_allocation: args.annual_isa_allocation,
        annual_pension_allocation: args.annual_pension_allocation,
        annual_savings_allocation: args.annual_savings_allocation,
        isa_growth_rate: args.isa_growth_rate / 100.0,
        pension_growth_rate: args.pension_growth_rate / 100.0,
        savings_growth_rate: args.savings_growth_rate / 100.0,
        years_to_retirement: args.years_to_retirement,
        projection_years: args.projection_years,
    })
}

pub(crate) fn build_budget_inputs(args: &BudgetArgs) -> Result<BudgetInputs, String> {
    if !args.mortgage_principal.is_finite() || args.mortgage_principal < 0.0 {
        return Err("--mortgage-principal must be >= 0".to_string());
    }
    let mortgage = if args.mortgage_principal > 0.0 {
        Some(build_mortgage_terms(&MortgageArgs {
            principal: args.mortgage_principal,
            rate: args.mortgage_rate,
            term_years: args.mortgage_years,
            extra_payments: Vec::new(),
            start: args.start,
        })?)
    } else {
        None
    };

    Ok(BudgetInputs {
        annual_income: args.annual_income,
        annual_base_salary: args.annual_base_salary,
        monthly_expenses: args.monthly_expenses,
        annual_charity_donation: args.annual_charity_donation,
        annual_mortgage_overpayment: args.annual_mortgage_overpayment,
        mortgage,
        paye_pension_rate: args.paye_pension_rate / 100.0,
        annual_isa_amount: args.annual_isa_amount,
        annual_sipp_amount: args.annual_sipp_amount,
    })
}

pub(crate) fn default_budget_args() -> BudgetArgs {
    let plan = default_plan_args();
    BudgetArgs {
        annual_income: plan.annual_salary + plan.annual_bonus,
        annual_base_salary: plan.annual_salary,
        monthly_expenses: plan.monthly_expenses,
        annual_charity_donation: 0.0,
        annual_mortgage_overpayment: 0.0,
        mortgage_principal: plan.mortgage_principal,
        mortgage_rate: plan.mortgage_rate,
        mortgage_years: plan.mortgage_years,
        paye_pension_rate: 9.0,
        annual_isa_amount: 0.0,
        annual_sipp_amount: 0.0,
        start: plan.start,
    }
}

pub(crate) fn default_mortgage_args() -> MortgageArgs {
    let plan = default_plan_args();
    MortgageArgs {
        principal: plan.mortgage_principal,
        rate: plan.mortgage_rate,
        term_years: plan.mortgage_years,
        extra_payments: Vec::new(),
        start: plan.start,
    }
}

pub(crate) fn default_project_args() -> ProjectArgs {
    let plan = default_plan_args();
    ProjectArgs {
        principal: 0.0,
        isa_monthly: 0.0,
        pension_monthly: 0.0,
        savings_monthly: 0.0,
        contribution_years: plan.years_to_retirement,
        projection_years: plan.projection_years,
        isa_growth_rate: plan.isa_growth_rate,
        pension_growth_rate: plan.pension_growth_rate,
        savings_growth_rate: plan.savings_growth_rate,
        start: plan.start,
    }
}

pub(crate) fn default_plan_args() -> PlanArgs {
    PlanArgs {
        annual_salary: 50_000.0,
        annual_bonus: 5_000.0,
        additional_income: 0.0,
        monthly_expenses: 800.0,
        mortgage_principal: 345_000.0,
        mortgage_rate: 4.1,
        mortgage_years: 27,
        extra_payments: Vec::new(),
        current_savings: 20_000.0,
        current_isa: 20_000.0,
        current_pension: 15_000.0,
        annual_charity_donation: 0.0,
        annual_isa_allocation: 1_000.0,
        annual_pension_allocation: 1_000.0,
        annual_savings_allocation: 1_000.0,
        isa_growth_rate: 6.0,
        pension_growth_rate: 7.0,
        savings_growth_rate: 3.0,
        years_to_retirement: 10,
        projection_years: 20,
        start: StartArgs {
            start_year: None,
            start_month: None,
        },
    }
}

pub(crate) fn mortgage_response(
    terms: &MortgageTerms,
    start: YearMonth,
) -> Result<MortgageResponse, String> {
    let schedule = amortize(terms, start).map_err(|e| e.to_string())?;
    let comparison = if terms.extra_payments.is_empty() {
        None
    } else {
        let comparison = compare_mortgage(terms, start).map_err(|e| e.to_string())?;
        Some(MortgageComparisonResponse {
            baseline_total_interest: comparison.baseline.total_interest(),
            summary: comparison.summary,
            interest_saved_by_year: comparison.interest_saved_by_year,
        })
    };
    Ok(MortgageResponse {
        total_interest: schedule.total_interest(),
        schedule,
        comparison,
    })
}

/// Run a one-shot subcommand and return its JSON output.
pub fn run_command(command: Command) -> Result<String, String> {
    let planner = Planner::default();
    let json = match command {
        Command::Serve { .. } => return Err("serve is handled by the HTTP server".to_string()),
        Command::Tax(args) => {
            let result = planner
                .tax_engine()
                .compute_tax(args.gross_income, args.additional_income)
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&result)
        }
        Command::Relief(args) => {
            let relief = planner.relief_calculator();
            let response = ReliefResponse {
                pension: relief
                    .pension_relief(args.pension_contribution, args.gross_income)
                    .map_err(|e| e.to_string())?,
                charity: relief
                    .charity_relief(args.charity_donation, args.gross_income)
                    .map_err(|e| e.to_string())?,
            };
            serde_json::to_string_pretty(&response)
        }
        Command::Mortgage(args) => {
            let terms = build_mortgage_terms(&args)?;
            let start = resolve_start(args.start)?;
            serde_json::to_string_pretty(&mortgage_response(&terms, start)?)
        }
        Command::Project(args) => {
            let inputs = build_projection_inputs(&args)?;
            let start = resolve_start(args.start)?;
            let schedule = project(&inputs, start).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&schedule)
        }
        Command::Plan(args) => {
            let inputs = build_plan_inputs(&args)?;
            let start = resolve_start(args.start)?;
            let report = planner.build_plan(&inputs, start).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&report)
        }
        Command::Budget(args) => {
            let inputs = build_budget_inputs(&args)?;
            let start = resolve_start(args.start)?;
            let budget = planner.monthly_budget(&inputs, start).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&budget)
        }
    };
    json.map_err(|e| format!("failed to serialize output: {e}"))
}
