//! UK personal-finance projections: income tax and National Insurance,
//! pension and Gift Aid relief, mortgage amortization with overpayments and
//! multi-account growth projections.

pub mod api;
pub mod core;
pub mod plan;
