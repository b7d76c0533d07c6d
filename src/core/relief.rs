use super::error::{PlannerResult, ensure_non_negative};
use super::types::{CharityRelief, Money, PensionRelief, TaxYear};

/// Pension and Gift Aid relief. Relief at source is the basic rate; higher
/// and additional rate taxpayers reclaim the gap to their marginal rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReliefCalculator {
    year: TaxYear,
}

impl ReliefCalculator {
    pub fn new(year: TaxYear) -> Self {
        Self { year }
    }

    pub fn pension_relief(&self, contribution: Money, gross_income: Money) -> PlannerResult<PensionRelief> {
        let contribution = ensure_non_negative("contribution", contribution)?;
        let gross_income = ensure_non_negative("grossIncome", gross_income)?;

        let total_pension_amount = self.gross_up(contribution);
        let government_relief = total_pension_amount - contribution;
        let extra_tax_relief = total_pension_amount * self.reclaimable_rate(gross_income);

        Ok(PensionRelief {
            government_relief,
            extra_tax_relief,
            total_tax_relief: government_relief + extra_tax_relief,
            total_pension_amount,
        })
    }

    pub fn charity_relief(&self, donation: Money, gross_income: Money) -> PlannerResult<CharityRelief> {
        let donation = ensure_non_negative("donation", donation)?;
        let gross_income = ensure_non_negative("grossIncome", gross_income)?;

        let gift_aid_amount = self.gross_up(donation);
        let charity_tax_relief = gift_aid_amount * self.reclaimable_rate(gross_income);

        Ok(CharityRelief {
            gift_aid_amount,
            charity_tax_relief,
            total_tax_relief: charity_tax_relief + gift_aid_amount - donation,
        })
    }

    /// Net amount grossed up by basic-rate relief added at source.
    fn gross_up(&self, net: Money) -> Money {
        net / (1.0 - self.year.basic_rate)
    }

    /// Marginal rate above basic that is reclaimed through self-assessment.
    /// Basic-rate taxpayers reclaim nothing.
    fn reclaimable_rate(&self, gross_income: Money) -> f64 {
        let y = &self.year;
        if gross_income <= y.basic_rate_limit {
            0.0
        } else if gross_income < y.higher_rate_limit {
            y.higher_rate - y.basic_rate
        } else {
            y.additional_rate - y.basic_rate
        }
    }
}
