mod error;
mod mortgage;
mod projection;
mod relief;
mod tax;
mod types;

pub use error::{MAX_HORIZON_YEARS, PlannerError, PlannerResult};
pub(crate) use error::ensure_non_negative;
pub use mortgage::{
    amortize, annuity_payment, interest_saved_by_year, overpayment_summary, summarize_overpayment,
};
pub use projection::{blended_monthly_rate, monthly_rate, project};
pub use relief::ReliefCalculator;
pub use tax::{TaxEngine, evaluate_bands};
pub use types::{
    AmortizationSchedule, CharityRelief, ExtraPayments, Money, MonthlyBalance, MonthlyEntry,
    MortgageTerms, OverpaymentSummary, PensionRelief, ProjectionInputs, ProjectionSchedule,
    TaxBand, TaxResult, TaxYear, YearMonth,
};
