use std::collections::BTreeMap;

use log::debug;

use super::error::{PlannerError, PlannerResult, ensure_horizon, ensure_non_negative, ensure_positive};
use super::types::{
    AmortizationSchedule, ExtraPayments, Money, MonthlyEntry, MortgageTerms, OverpaymentSummary,
    YearMonth,
};

/// Fixed per-schedule quantities shared by every month of the recurrence.
#[derive(Debug, Clone, Copy)]
struct ScheduleContext<'a> {
    start: YearMonth,
    monthly_rate: f64,
    monthly_payment: Money,
    last_month: u32,
    extra_payments: &'a ExtraPayments,
}

/// Outcome of one month: either the loan carries on, or this month settles it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MonthStep {
    Continue(MonthlyEntry),
    Settle(MonthlyEntry),
}

/// Month-by-month repayment schedule from the month after `start` until the
/// balance reaches zero.
///
/// The term is counted from January of the start year, so the payment is
/// solved over `term_years * 12 + start.month` months and the first
/// `start.month` of them are treated as already elapsed. An extra annual
/// payment is spread as twelve equal monthly instalments across its calendar
/// year, including when the schedule starts part-way through that year.
///
/// Only `term_years * 12` payments are scheduled, so the final entry's
/// `scheduled_payment` settles the whole residual balance: roughly
/// `start.month` regular payments rolled into one.
pub fn amortize(terms: &MortgageTerms, start: YearMonth) -> PlannerResult<AmortizationSchedule> {
    let principal = ensure_positive("principal", terms.principal)?;
    let annual_rate = ensure_non_negative("annualRate", terms.annual_rate)?;
    let term_years = ensure_horizon("termYears", terms.term_years)?;
    let start = YearMonth::new(start.year, start.month)?;

    let monthly_rate = annual_rate / 12.0;
    let total_months = term_years * 12 + start.month;
    let monthly_payment = annuity_payment(principal, monthly_rate, total_months);

    let ctx = ScheduleContext {
        start,
        monthly_rate,
        monthly_payment,
        last_month: total_months,
        extra_payments: &terms.extra_payments,
    };

    let entries: Vec<MonthlyEntry> = (start.month + 1..=total_months)
        .scan(Some(principal), |balance, month| {
            let opening = (*balance)?;
            match step_month(&ctx, opening, month) {
                MonthStep::Continue(entry) => {
                    *balance = Some(entry.remaining_balance);
                    Some(entry)
                }
                MonthStep::Settle(entry) => {
                    *balance = None;
                    Some(entry)
                }
            }
        })
        .collect();

    debug!(
        "amortized {principal:.2} at {annual_rate:.4} over {total_months} months: payment {monthly_payment:.2}, {} entries",
        entries.len()
    );

    Ok(AmortizationSchedule {
        principal,
        monthly_payment,
        entries,
    })
}

/// Level payment that clears `principal` over `months` at `monthly_rate`.
/// A zero rate repays in straight-line instalments.
pub fn annuity_payment(principal: Money, monthly_rate: f64, months: u32) -> Money {
    if months == 0 {
        return principal;
    }
    if monthly_rate == 0.0 {
        return principal / months as f64;
    }
    let growth = (1.0 + monthly_rate).powi(months as i32);
    principal * monthly_rate * growth / (growth - 1.0)
}

fn step_month(ctx: &ScheduleContext<'_>, balance: Money, month: u32) -> MonthStep {
    let calendar = ctx.start.from_index(month);
    let extra_payment = ctx
        .extra_payments
        .for_year(calendar.year)
        .map_or(0.0, |annual| annual / 12.0);
    let interest_portion = balance * ctx.monthly_rate;

    if balance - (ctx.monthly_payment + extra_payment) <= 0.0 || month == ctx.last_month {
        return MonthStep::Settle(MonthlyEntry {
            month: calendar.month,
            year: calendar.year,
            scheduled_payment: balance + interest_portion,
            extra_payment: 0.0,
            capital_portion: balance,
            interest_portion,
            remaining_balance: 0.0,
        });
    }

    let capital_portion = ctx.monthly_payment + extra_payment - interest_portion;
    MonthStep::Continue(MonthlyEntry {
        month: calendar.month,
        year: calendar.year,
        scheduled_payment: ctx.monthly_payment,
        extra_payment,
        capital_portion,
        interest_portion,
        remaining_balance: balance - capital_portion,
    })
}

impl AmortizationSchedule {
    pub fn total_interest(&self) -> Money {
        self.entries.iter().map(|e| e.interest_portion).sum()
    }

    pub fn total_capital(&self) -> Money {
        self.entries.iter().map(|e| e.capital_portion).sum()
    }

    pub fn total_extra(&self) -> Money {
        self.entries.iter().map(|e| e.extra_payment).sum()
    }

    pub fn months(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Month in which the final payment is made.
    pub fn payoff(&self) -> Option<YearMonth> {
        self.entries.last().map(|e| YearMonth {
            year: e.year,
            month: e.month,
        })
    }

    /// Average outgoing per month, extras included.
    pub fn mean_monthly_payment(&self) -> Money {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(MonthlyEntry::total_payment).sum::<Money>() / self.entries.len() as f64
    }

    pub fn interest_by_year(&self) -> BTreeMap<i32, Money> {
        let mut by_year = BTreeMap::new();
        for entry in &self.entries {
            *by_year.entry(entry.year).or_insert(0.0) += entry.interest_portion;
        }
        by_year
    }
}

/// Interest saved in each calendar year by the overpaid schedule. Years in
/// which only one schedule has payments count the other side as zero.
pub fn interest_saved_by_year(
    baseline: &AmortizationSchedule,
    overpaid: &AmortizationSchedule,
) -> BTreeMap<i32, Money> {
    let overpaid_by_year = overpaid.interest_by_year();
    let mut saved = baseline.interest_by_year();
    for (year, interest) in saved.iter_mut() {
        *interest -= overpaid_by_year.get(year).copied().unwrap_or(0.0);
    }
    for (year, interest) in overpaid_by_year {
        saved.entry(year).or_insert(-interest);
    }
    saved
}

/// Compare a schedule with the extra payments in `terms` against the same
/// loan without them.
pub fn overpayment_summary(terms: &MortgageTerms, start: YearMonth) -> PlannerResult<OverpaymentSummary> {
    let baseline_terms = MortgageTerms {
        extra_payments: ExtraPayments::none(),
        ..terms.clone()
    };
    let baseline = amortize(&baseline_terms, start)?;
    let overpaid = amortize(terms, start)?;
    summarize_overpayment(&baseline, &overpaid)
}

pub fn summarize_overpayment(
    baseline: &AmortizationSchedule,
    overpaid: &AmortizationSchedule,
) -> PlannerResult<OverpaymentSummary> {
    if overpaid.months() > baseline.months() {
        return Err(PlannerError::invalid(
            "extraPayments",
            "overpaid schedule must not run longer than the baseline",
        ));
    }

    let baseline_interest = baseline.total_interest();
    let total_interest_saved = baseline_interest - overpaid.total_interest();
    let total_overpayments = overpaid.total_extra();

    let total_interest_saved_percentage = if baseline_interest > 0.0 {
        total_interest_saved / baseline_interest * 100.0
    } else {
        0.0
    };

    let payoff_years = overpaid.months() as f64 / 12.0;
    let overpayment_rate_of_return_yoy = if total_overpayments > 0.0 && payoff_years > 0.0 {
        total_interest_saved / total_overpayments / payoff_years * 100.0
    } else {
        0.0
    };

    let months_saved = baseline.months() - overpaid.months();
    let years_saved = months_saved / 12;
    let remaining_months_saved = months_saved % 12;

    Ok(OverpaymentSummary {
        total_interest_saved,
        total_interest_saved_percentage,
        total_overpayments,
        overpayment_rate_of_return_yoy,
        baseline_months: baseline.months(),
        overpaid_months: overpaid.months(),
        months_saved,
        years_saved,
        remaining_months_saved,
        time_saved: format!("{years_saved} years and {remaining_months_saved} months"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn start() -> YearMonth {
        YearMonth { year: 2025, month: 10 }
    }

    fn terms(extra: &[(i32, f64)]) -> MortgageTerms {
        MortgageTerms {
            principal: 345_000.0,
            annual_rate: 0.041,
            term_years: 27,
            extra_payments: ExtraPayments::new(extra.iter().copied().collect()).expect("valid extras"),
        }
    }

    fn assert_schedule_invariants(schedule: &AmortizationSchedule) {
        let mut previous = schedule.principal;
        for entry in &schedule.entries {
            assert!(entry.remaining_balance >= 0.0, "negative balance {entry:?}");
            assert!(entry.remaining_balance <= previous + EPS, "balance rose at {entry:?}");
            assert_approx_tol(
                entry.capital_portion + entry.interest_portion,
                entry.total_payment(),
                EPS,
            );
            previous = entry.remaining_balance;
        }
        let last = schedule.entries.last().expect("non-empty schedule");
        assert_eq!(last.remaining_balance, 0.0);
        assert_approx_tol(schedule.total_capital(), schedule.principal, 1e-4);
    }

    #[test]
    fn annuity_payment_matches_known_mortgage() {
        let schedule = amortize(&terms(&[]), YearMonth { year: 2025, month: 1 }).expect("valid");
        // 27 years plus the elapsed January.
        let expected = annuity_payment(345_000.0, 0.041 / 12.0, 325);
        assert_approx_tol(schedule.monthly_payment, expected, EPS);
        assert_approx_tol(schedule.monthly_payment, 1_759.5, 1.0);
    }

    #[test]
    fn final_scheduled_month_settles_the_residual_balance() {
        let schedule = amortize(&terms(&[]), start()).expect("valid");
        let last = schedule.entries.last().expect("non-empty");
        let before_last = schedule.entries[schedule.entries.len() - 2];
        assert_approx_tol(last.capital_portion, before_last.remaining_balance, EPS);
        assert!(last.scheduled_payment > schedule.monthly_payment);
    }

    #[test]
    fn december_start_rolls_a_year_of_payments_into_the_last_month() {
        let schedule = amortize(&terms(&[]), YearMonth { year: 2025, month: 12 }).expect("valid");
        assert_eq!(schedule.months(), 27 * 12);
        let last = schedule.entries.last().expect("non-empty");
        let multiple = last.scheduled_payment / schedule.monthly_payment;
        assert!((11.0..14.0).contains(&multiple), "final payment was {multiple}x");
        assert_approx_tol(last.scheduled_payment, 22_012.0, 1.0);
        assert_schedule_invariants(&schedule);
    }

    #[test]
    fn baseline_schedule_runs_full_term_and_clears_balance() {
        let schedule = amortize(&terms(&[]), start()).expect("valid");
        assert_eq!(schedule.months(), 27 * 12);
        assert_eq!(schedule.payoff(), Some(YearMonth { year: 2052, month: 10 }));
        assert_schedule_invariants(&schedule);

        let first = schedule.entries[0];
        assert_eq!((first.year, first.month), (2025, 11));
        assert_approx_tol(first.interest_portion, 345_000.0 * 0.041 / 12.0, EPS);
    }

    #[test]
    fn entries_are_in_chronological_order() {
        let schedule = amortize(&terms(&[]), start()).expect("valid");
        for pair in schedule.entries.windows(2) {
            assert!((pair[0].year, pair[0].month) < (pair[1].year, pair[1].month));
        }
    }

    #[test]
    fn extra_payment_is_spread_across_twelve_months_of_its_year() {
        let schedule = amortize(&terms(&[(2026, 12_000.0)]), start()).expect("valid");
        let in_2026: Vec<_> = schedule.entries.iter().filter(|e| e.year == 2026).collect();
        assert_eq!(in_2026.len(), 12);
        for entry in in_2026 {
            assert_approx_tol(entry.extra_payment, 1_000.0, EPS);
        }
        assert!(schedule.entries.iter().filter(|e| e.year == 2027).all(|e| e.extra_payment == 0.0));
    }

    #[test]
    fn partial_start_year_receives_only_its_remaining_instalments() {
        let schedule = amortize(&terms(&[(2025, 12_000.0)]), start()).expect("valid");
        assert_approx_tol(schedule.total_extra(), 2_000.0, EPS);
    }

    #[test]
    fn large_overpayment_pays_off_sooner_with_less_interest() {
        let baseline = amortize(&terms(&[]), start()).expect("valid");
        let overpaid = amortize(&terms(&[(2026, 100_000.0)]), start()).expect("valid");
        assert!(overpaid.months() < baseline.months());
        assert!(overpaid.total_interest() < baseline.total_interest());
        assert_schedule_invariants(&overpaid);
    }

    #[test]
    fn overpayment_larger_than_balance_settles_without_going_negative() {
        let small = MortgageTerms {
            principal: 10_000.0,
            annual_rate: 0.05,
            term_years: 5,
            extra_payments: ExtraPayments::new(BTreeMap::from([(2026, 120_000.0)])).expect("valid"),
        };
        let schedule = amortize(&small, start()).expect("valid");
        assert_schedule_invariants(&schedule);
        let last = schedule.entries.last().expect("non-empty");
        assert_eq!(last.year, 2026);
        assert_eq!(last.extra_payment, 0.0);
        assert_approx_tol(last.scheduled_payment, last.capital_portion + last.interest_portion, EPS);
    }

    #[test]
    fn zero_rate_repays_in_straight_line() {
        let interest_free = MortgageTerms {
            principal: 12_000.0,
            annual_rate: 0.0,
            term_years: 1,
            extra_payments: ExtraPayments::none(),
        };
        let schedule = amortize(&interest_free, YearMonth { year: 2025, month: 12 }).expect("valid");
        assert_approx_tol(schedule.monthly_payment, 12_000.0 / 24.0, EPS);
        assert_eq!(schedule.total_interest(), 0.0);
        assert_schedule_invariants(&schedule);
    }

    #[test]
    fn invalid_terms_are_rejected() {
        let mut bad = terms(&[]);
        bad.term_years = 0;
        assert_eq!(amortize(&bad, start()).expect_err("zero term").field(), "termYears");

        let mut bad = terms(&[]);
        bad.principal = 0.0;
        assert_eq!(amortize(&bad, start()).expect_err("zero principal").field(), "principal");

        let mut bad = terms(&[]);
        bad.annual_rate = -0.01;
        assert_eq!(amortize(&bad, start()).expect_err("negative rate").field(), "annualRate");

        let err = amortize(&terms(&[]), YearMonth { year: 2025, month: 13 }).expect_err("bad month");
        assert_eq!(err.field(), "startMonth");
    }

    #[test]
    fn overpayment_summary_reports_savings_and_time() {
        let summary = overpayment_summary(&terms(&[(2026, 100_000.0)]), start()).expect("valid");
        assert!(summary.total_interest_saved > 0.0);
        assert!(summary.total_interest_saved_percentage > 0.0);
        assert!(summary.total_interest_saved_percentage < 100.0);
        assert_approx_tol(summary.total_overpayments, 100_000.0, 1e-4);
        assert!(summary.overpayment_rate_of_return_yoy > 0.0);
        assert_eq!(summary.baseline_months, 324);
        assert_eq!(summary.months_saved, summary.baseline_months - summary.overpaid_months);
        assert_eq!(summary.years_saved * 12 + summary.remaining_months_saved, summary.months_saved);
        assert_eq!(
            summary.time_saved,
            format!("{} years and {} months", summary.years_saved, summary.remaining_months_saved)
        );
    }

    #[test]
    fn overpayment_summary_without_extras_is_all_zero() {
        let summary = overpayment_summary(&terms(&[]), start()).expect("valid");
        assert_eq!(summary.total_interest_saved, 0.0);
        assert_eq!(summary.total_overpayments, 0.0);
        assert_eq!(summary.overpayment_rate_of_return_yoy, 0.0);
        assert_eq!(summary.time_saved, "0 years and 0 months");
    }

    #[test]
    fn interest_saved_by_year_sums_to_total_saving() {
        let baseline = amortize(&terms(&[]), start()).expect("valid");
        let overpaid = amortize(&terms(&[(2026, 50_000.0), (2027, 5_000.0)]), start()).expect("valid");
        let by_year = interest_saved_by_year(&baseline, &overpaid);

        assert_eq!(by_year.keys().next(), Some(&2025));
        assert_eq!(by_year.keys().last(), Some(&2052));
        assert_approx_tol(by_year[&2025], 0.0, EPS);
        assert!(by_year[&2027] > 0.0);
        assert_approx_tol(
            by_year.values().sum::<f64>(),
            baseline.total_interest() - overpaid.total_interest(),
            1e-4,
        );
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_schedule_reconciles_and_clears_principal(
            principal in 1_000u32..1_000_000,
            rate_bp in 0u32..1_500,
            term_years in 1u32..40,
            start_month in 1u32..13,
            extra_year_offset in 0i32..5,
            extra in 0u32..200_000
        ) {
            let terms = MortgageTerms {
                principal: principal as f64,
                annual_rate: rate_bp as f64 / 10_000.0,
                term_years,
                extra_payments: ExtraPayments::new(BTreeMap::from([(2025 + extra_year_offset, extra as f64)]))
                    .expect("valid"),
            };
            let start = YearMonth { year: 2025, month: start_month };
            let schedule = amortize(&terms, start).expect("valid");

            prop_assert!(!schedule.entries.is_empty());
            prop_assert!(schedule.months() <= term_years * 12);
            prop_assert_eq!(schedule.entries.last().map(|e| e.remaining_balance), Some(0.0));
            let tol = 1e-6 * principal as f64;
            prop_assert!((schedule.total_capital() - principal as f64).abs() <= tol);

            let mut previous = principal as f64;
            for entry in &schedule.entries {
                prop_assert!(entry.remaining_balance >= 0.0);
                prop_assert!(entry.remaining_balance <= previous + tol);
                prop_assert!((entry.capital_portion + entry.interest_portion - entry.total_payment()).abs() <= tol);
                previous = entry.remaining_balance;
            }
        }
    }
}
