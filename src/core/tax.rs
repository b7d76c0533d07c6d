use log::debug;

use super::error::{PlannerResult, ensure_non_negative};
use super::types::{Money, TaxBand, TaxResult, TaxYear};

/// Income tax and National Insurance for a single tax year.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxEngine {
    year: TaxYear,
}

impl TaxEngine {
    pub fn new(year: TaxYear) -> Self {
        Self { year }
    }

    pub fn tax_year(&self) -> &TaxYear {
        &self.year
    }

    /// Tax position for `gross_income` plus any one-off `additional_income`
    /// (bonus, vested shares) taxed in the same year.
    pub fn compute_tax(&self, gross_income: Money, additional_income: Money) -> PlannerResult<TaxResult> {
        let gross = ensure_non_negative("grossIncome", gross_income)?
            + ensure_non_negative("additionalIncome", additional_income)?;

        let income_tax = self.income_tax(gross);
        let ni_contribution = self.national_insurance(gross);
        let total_tax = income_tax + ni_contribution;
        let effective_tax_rate = if gross > 0.0 { total_tax / gross } else { 0.0 };

        debug!(
            "tax on {gross:.2}: income tax {income_tax:.2}, NI {ni_contribution:.2}, effective {effective_tax_rate:.4}"
        );

        Ok(TaxResult {
            gross_income: gross,
            income_tax,
            ni_contribution,
            total_tax,
            net_income: gross - total_tax,
            effective_tax_rate,
        })
    }

    fn income_tax(&self, income: Money) -> Money {
        let y = &self.year;
        let basic_width = y.basic_band_width();
        let full_basic_tax = basic_width * y.basic_rate;

        if income <= y.personal_allowance {
            0.0
        } else if income <= y.basic_rate_limit {
            (income - y.personal_allowance) * y.basic_rate
        } else if income <= y.allowance_taper_start {
            full_basic_tax + (income - y.basic_rate_limit) * y.higher_rate
        } else if income <= y.higher_rate_limit {
            // £1 of allowance is withdrawn for every £2 above the taper start.
            let tapered_allowance = y.personal_allowance - (income - y.allowance_taper_start) / 2.0;
            full_basic_tax + (income - tapered_allowance - basic_width) * y.higher_rate
        } else {
            full_basic_tax
                + (y.higher_rate_limit - basic_width) * y.higher_rate
                + (income - y.higher_rate_limit) * y.additional_rate
        }
    }

    fn national_insurance(&self, income: Money) -> Money {
        evaluate_bands(&self.year.ni_bands(), income)
    }
}

impl TaxYear {
    /// Effective marginal income-tax rates by gross income. The taper region
    /// between the taper start and the higher-rate limit is its own band: the
    /// higher rate plus half of it again for the allowance being withdrawn.
    pub fn income_tax_bands(&self) -> Vec<TaxBand> {
        let taper_rate = self.higher_rate * 1.5;
        vec![
            TaxBand { lower: 0.0, upper: Some(self.personal_allowance), rate: 0.0 },
            TaxBand {
                lower: self.personal_allowance,
                upper: Some(self.basic_rate_limit),
                rate: self.basic_rate,
            },
            TaxBand {
                lower: self.basic_rate_limit,
                upper: Some(self.allowance_taper_start),
                rate: self.higher_rate,
            },
            TaxBand {
                lower: self.allowance_taper_start,
                upper: Some(self.higher_rate_limit),
                rate: taper_rate,
            },
            TaxBand { lower: self.higher_rate_limit, upper: None, rate: self.additional_rate },
        ]
    }

    pub fn ni_bands(&self) -> Vec<TaxBand> {
        vec![
            TaxBand { lower: 0.0, upper: Some(self.ni_primary_threshold), rate: 0.0 },
            TaxBand {
                lower: self.ni_primary_threshold,
                upper: Some(self.ni_upper_earnings_limit),
                rate: self.ni_main_rate,
            },
            TaxBand { lower: self.ni_upper_earnings_limit, upper: None, rate: self.ni_upper_rate },
        ]
    }
}

/// Sum of each band's rate applied to the slice of `income` inside it.
pub fn evaluate_bands(bands: &[TaxBand], income: Money) -> Money {
    bands
        .iter()
        .map(|band| {
            let top = band.upper.map_or(income, |upper| income.min(upper));
            (top - band.lower).max(0.0) * band.rate
        })
        .sum()
}
