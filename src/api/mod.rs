use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::{PlannerError, project};
use crate::plan::Planner;

mod cli;

pub use cli::{
    BudgetArgs, Cli, Command, MortgageArgs, PlanArgs, ProjectArgs, ReliefArgs, StartArgs, TaxArgs,
    run_command,
};
use cli::{
    build_budget_inputs, build_mortgage_terms, build_plan_inputs, build_projection_inputs,
    default_budget_args, default_mortgage_args, default_plan_args, default_project_args,
    mortgage_response, resolve_start,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxPayload {
    gross_income: Option<f64>,
    additional_income: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PensionReliefPayload {
    gross_income: Option<f64>,
    /// Net amount paid in by the saver.
    contribution: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CharityReliefPayload {
    gross_income: Option<f64>,
    donation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MortgagePayload {
    principal: Option<f64>,
    rate: Option<f64>,
    term_years: Option<u32>,
    extra_payments: Option<BTreeMap<i32, f64>>,
    start_year: Option<i32>,
    start_month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    principal: Option<f64>,
    isa_monthly: Option<f64>,
    pension_monthly: Option<f64>,
    savings_monthly: Option<f64>,
    contribution_years: Option<u32>,
    projection_years: Option<u32>,
    isa_growth_rate: Option<f64>,
    pension_growth_rate: Option<f64>,
    savings_growth_rate: Option<f64>,
    start_year: Option<i32>,
    start_month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    annual_salary: Option<f64>,
    annual_bonus: Option<f64>,
    additional_income: Option<f64>,
    monthly_expenses: Option<f64>,

    mortgage_principal: Option<f64>,
    mortgage_rate: Option<f64>,
    mortgage_years: Option<u32>,
    extra_payments: Option<BTreeMap<i32, f64>>,

    current_savings: Option<f64>,
    current_isa: Option<f64>,
    current_pension: Option<f64>,

    annual_charity_donation: Option<f64>,
    annual_isa_allocation: Option<f64>,
    annual_pension_allocation: Option<f64>,
    annual_savings_allocation: Option<f64>,

    isa_growth_rate: Option<f64>,
    pension_growth_rate: Option<f64>,
    savings_growth_rate: Option<f64>,
    years_to_retirement: Option<u32>,
    projection_years: Option<u32>,

    start_year: Option<i32>,
    start_month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BudgetPayload {
    annual_income: Option<f64>,
    annual_base_salary: Option<f64>,
    monthly_expenses: Option<f64>,
    annual_charity_donation: Option<f64>,
    annual_mortgage_overpayment: Option<f64>,
    mortgage_principal: Option<f64>,
    mortgage_rate: Option<f64>,
    mortgage_years: Option<u32>,
    /// Percent of base salary, e.g. 9.
    paye_pension_rate: Option<f64>,
    annual_isa_amount: Option<f64>,
    annual_sipp_amount: Option<f64>,
    start_year: Option<i32>,
    start_month: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/tax", get(tax_get_handler).post(tax_post_handler))
        .route(
            "/api/relief/pension",
            get(pension_relief_get_handler).post(pension_relief_post_handler),
        )
        .route(
            "/api/relief/charity",
            get(charity_relief_get_handler).post(charity_relief_post_handler),
        )
        .route("/api/mortgage", post(mortgage_handler))
        .route("/api/projection", post(projection_handler))
        .route("/api/plan", post(plan_handler))
        .route("/api/budget", post(budget_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("ukplan HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/plan");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn tax_get_handler(Query(payload): Query<TaxPayload>) -> Response {
    tax_handler_impl(payload)
}

async fn tax_post_handler(Json(payload): Json<TaxPayload>) -> Response {
    tax_handler_impl(payload)
}

fn tax_handler_impl(payload: TaxPayload) -> Response {
    let Some(gross_income) = payload.gross_income else {
        return error_response(StatusCode::BAD_REQUEST, "Missing field: grossIncome");
    };
    let result = Planner::default()
        .tax_engine()
        .compute_tax(gross_income, payload.additional_income.unwrap_or(0.0));
    planner_response(result)
}

async fn pension_relief_get_handler(Query(payload): Query<PensionReliefPayload>) -> Response {
    pension_relief_impl(payload)
}

async fn pension_relief_post_handler(Json(payload): Json<PensionReliefPayload>) -> Response {
    pension_relief_impl(payload)
}

fn pension_relief_impl(payload: PensionReliefPayload) -> Response {
    let Some(gross_income) = payload.gross_income else {
        return error_response(StatusCode::BAD_REQUEST, "Missing field: grossIncome");
    };
    let result = Planner::default()
        .relief_calculator()
        .pension_relief(payload.contribution.unwrap_or(0.0), gross_income);
    planner_response(result)
}

async fn charity_relief_get_handler(Query(payload): Query<CharityReliefPayload>) -> Response {
    charity_relief_impl(payload)
}

async fn charity_relief_post_handler(Json(payload): Json<CharityReliefPayload>) -> Response {
    charity_relief_impl(payload)
}

fn charity_relief_impl(payload: CharityReliefPayload) -> Response {
    let Some(gross_income) = payload.gross_income else {
        return error_response(StatusCode::BAD_REQUEST, "Missing field: grossIncome");
    };
    let result = Planner::default()
        .relief_calculator()
        .charity_relief(payload.donation.unwrap_or(0.0), gross_income);
    planner_response(result)
}

async fn mortgage_handler(Json(payload): Json<MortgagePayload>) -> Response {
    let args = mortgage_args_from_payload(payload);
    let response = build_mortgage_terms(&args)
        .and_then(|terms| mortgage_response(&terms, resolve_start(args.start)?));
    string_response(response)
}

async fn projection_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    let args = project_args_from_payload(payload);
    let response = build_projection_inputs(&args).and_then(|inputs| {
        project(&inputs, resolve_start(args.start)?).map_err(|e| e.to_string())
    });
    string_response(response)
}

async fn plan_handler(Json(payload): Json<PlanPayload>) -> Response {
    let args = plan_args_from_payload(payload);
    let response = build_plan_inputs(&args).and_then(|inputs| {
        Planner::default()
            .build_plan(&inputs, resolve_start(args.start)?)
            .map_err(|e| e.to_string())
    });
    string_response(response)
}

async fn budget_handler(Json(payload): Json<BudgetPayload>) -> Response {
    let args = budget_args_from_payload(payload);
    let response = build_budget_inputs(&args).and_then(|inputs| {
        Planner::default()
            .monthly_budget(&inputs, resolve_start(args.start)?)
            .map_err(|e| e.to_string())
    });
    string_response(response)
}

fn planner_response<T: Serialize>(result: Result<T, PlannerError>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => {
            warn!("rejected request: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

fn string_response<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => {
            warn!("rejected request: {msg}");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn start_from_payload(start_year: Option<i32>, start_month: Option<u32>) -> StartArgs {
    StartArgs {
        start_year,
        start_month,
    }
}

fn mortgage_args_from_payload(payload: MortgagePayload) -> MortgageArgs {
    let mut args = default_mortgage_args();
    if let Some(v) = payload.principal {
        args.principal = v;
    }
    if let Some(v) = payload.rate {
        args.rate = v;
    }
    if let Some(v) = payload.term_years {
        args.term_years = v;
    }
    if let Some(v) = payload.extra_payments {
        args.extra_payments = v.into_iter().collect();
    }
    args.start = start_from_payload(payload.start_year, payload.start_month);
    args
}

fn project_args_from_payload(payload: ProjectionPayload) -> ProjectArgs {
    let mut args = default_project_args();
    if let Some(v) = payload.principal {
        args.principal = v;
    }
    if let Some(v) = payload.isa_monthly {
        args.isa_monthly = v;
    }
    if let Some(v) = payload.pension_monthly {
        args.pension_monthly = v;
    }
    if let Some(v) = payload.savings_monthly {
        args.savings_monthly = v;
    }
    if let Some(v) = payload.contribution_years {
        args.contribution_years = v;
    }
    if let Some(v) = payload.projection_years {
        args.projection_years = v;
    }
    if let Some(v) = payload.isa_growth_rate {
        args.isa_growth_rate = v;
    }
    if let Some(v) = payload.pension_growth_rate {
        args.pension_growth_rate = v;
    }
    if let Some(v) = payload.savings_growth_rate {
        args.savings_growth_rate = v;
    }
    args.start = start_from_payload(payload.start_year, payload.start_month);
    args
}

fn plan_args_from_payload(payload: PlanPayload) -> PlanArgs {
    let mut args = default_plan_args();

    if let Some(v) = payload.annual_salary {
        args.annual_salary = v;
    }
    if let Some(v) = payload.annual_bonus {
        args.annual_bonus = v;
    }
    if let Some(v) = payload.additional_income {
        args.additional_income = v;
    }
    if let Some(v) = payload.monthly_expenses {
        args.monthly_expenses = v;
    }

    if let Some(v) = payload.mortgage_principal {
        args.mortgage_principal = v;
    }
    if let Some(v) = payload.mortgage_rate {
        args.mortgage_rate = v;
    }
    if let Some(v) = payload.mortgage_years {
        args.mortgage_years = v;
    }
    if let Some(v) = payload.extra_payments {
        args.extra_payments = v.into_iter().collect();
    }

    if let Some(v) = payload.current_savings {
        args.current_savings = v;
    }
    if let Some(v) = payload.current_isa {
        args.current_isa = v;
    }
    if let Some(v) = payload.current_pension {
        args.current_pension = v;
    }

    if let Some(v) = payload.annual_charity_donation {
        args.annual_charity_donation = v;
    }
    if let Some(v) = payload.annual_isa_allocation {
        args.annual_isa_allocation = v;
    }
    if let Some(v) = payload.annual_pension_allocation {
        args.annual_pension_allocation = v;
    }
    if let Some(v) = payload.annual_savings_allocation {
        args.annual_savings_allocation = v;
    }

    if let Some(v) = payload.isa_growth_rate {
        args.isa_growth_rate = v;
    }
    if let Some(v) = payload.pension_growth_rate {
        args.pension_growth_rate = v;
    }
    if let Some(v) = payload.savings_growth_rate {
        args.savings_growth_rate = v;
    }
    if let Some(v) = payload.years_to_retirement {
        args.years_to_retirement = v;
    }
    if let Some(v) = payload.projection_years {
        args.projection_years = v;
    }

    args.start = start_from_payload(payload.start_year, payload.start_month);
    args
}

fn budget_args_from_payload(payload: BudgetPayload) -> BudgetArgs {
    let mut args = default_budget_args();
    if let Some(v) = payload.annual_income {
        args.annual_income = v;
    }
    if let Some(v) = payload.annual_base_salary {
        args.annual_base_salary = v;
    }
    if let Some(v) = payload.monthly_expenses {
        args.monthly_expenses = v;
    }
    if let Some(v) = payload.annual_charity_donation {
        args.annual_charity_donation = v;
    }
    if let Some(v) = payload.annual_mortgage_overpayment {
        args.annual_mortgage_overpayment = v;
    }
    if let Some(v) = payload.mortgage_principal {
        args.mortgage_principal = v;
    }
    if let Some(v) = payload.mortgage_rate {
        args.mortgage_rate = v;
    }
    if let Some(v) = payload.mortgage_years {
        args.mortgage_years = v;
    }
    if let Some(v) = payload.paye_pension_rate {
        args.paye_pension_rate = v;
    }
    if let Some(v) = payload.annual_isa_amount {
        args.annual_isa_amount = v;
    }
    if let Some(v) = payload.annual_sipp_amount {
        args.annual_sipp_amount = v;
    }
    args.start = start_from_payload(payload.start_year, payload.start_month);
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn body_json<T: Serialize>(body: &T) -> serde_json::Value {
        serde_json::to_value(body).expect("serializable")
    }

    #[test]
    fn plan_payload_overlays_only_supplied_fields() {
        let payload: PlanPayload = serde_json::from_str(
            r#"{
                "annualSalary": 80000,
                "mortgageRate": 5.25,
                "extraPayments": {"2026": 10000},
                "startYear": 2025,
                "startMonth": 10
            }"#,
        )
        .expect("valid payload");
        let args = plan_args_from_payload(payload);
        let defaults = default_plan_args();

        assert_approx(args.annual_salary, 80_000.0);
        assert_approx(args.annual_bonus, defaults.annual_bonus);
        assert_approx(args.mortgage_rate, 5.25);
        assert_eq!(args.mortgage_years, defaults.mortgage_years);
        assert_eq!(args.extra_payments, vec![(2026, 10_000.0)]);
        assert_eq!(args.start.start_year, Some(2025));

        let inputs = build_plan_inputs(&args).expect("valid inputs");
        let mortgage = inputs.mortgage.expect("mortgage");
        assert_approx(mortgage.annual_rate, 0.0525);
        assert_eq!(mortgage.extra_payments.for_year(2026), Some(10_000.0));
    }

    #[test]
    fn empty_payload_uses_planner_defaults() {
        let payload: PlanPayload = serde_json::from_str("{}").expect("valid payload");
        let args = plan_args_from_payload(payload);
        assert_approx(args.annual_salary, 50_000.0);
        assert_approx(args.mortgage_principal, 345_000.0);
        assert_eq!(args.projection_years, 20);
        assert_eq!(args.start.start_year, None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let payload: TaxPayload =
            serde_json::from_str(r#"{"grossIncome": 40000, "notes": "ignored"}"#).expect("valid");
        assert_eq!(payload.gross_income, Some(40_000.0));
    }

    #[test]
    fn negative_extra_payment_is_rejected_by_terms() {
        let payload: MortgagePayload = serde_json::from_str(
            r#"{"principal": 200000, "rate": 4, "termYears": 25, "extraPayments": {"2026": -5}}"#,
        )
        .expect("valid shape");
        let err = build_mortgage_terms(&mortgage_args_from_payload(payload)).expect_err("negative");
        assert!(err.contains("extraPayments[2026]"));
    }

    #[test]
    fn mortgage_response_serializes_camel_case() {
        let payload: MortgagePayload = serde_json::from_str(
            r#"{"principal": 150000, "rate": 3.5, "termYears": 15,
                "extraPayments": {"2027": 5000}, "startYear": 2025, "startMonth": 1}"#,
        )
        .expect("valid payload");
        let args = mortgage_args_from_payload(payload);
        let terms = build_mortgage_terms(&args).expect("valid terms");
        let response =
            mortgage_response(&terms, resolve_start(args.start).expect("valid start")).expect("valid");
        let json = body_json(&response);

        assert!(json["schedule"]["monthlyPayment"].as_f64().expect("number") > 0.0);
        let first = &json["schedule"]["entries"][0];
        assert!(first.get("remainingBalance").is_some());
        assert!(first.get("interestPortion").is_some());
        let comparison = &json["comparison"];
        assert!(comparison["summary"]["monthsSaved"].as_u64().expect("integer") > 0);
        assert!(comparison["interestSavedByYear"].get("2027").is_some());
    }

    #[test]
    fn plan_report_serializes_allocation_status_tag() {
        let args = plan_args_from_payload(PlanPayload {
            start_year: Some(2025),
            start_month: Some(10),
            ..PlanPayload::default()
        });
        let inputs = build_plan_inputs(&args).expect("valid inputs");
        let report = Planner::default()
            .build_plan(&inputs, resolve_start(args.start).expect("valid"))
            .expect("valid plan");
        let json = body_json(&report);

        assert_eq!(json["taxYear"], "2024/25");
        assert!(json["allocation"]["outcome"]["status"].is_string());
        assert!(json["projection"]["balances"][0].get("projectionYear").is_some());
        assert!(json["tax"].get("niContribution").is_some());
    }

    #[test]
    fn budget_payload_serializes_monthly_budget() {
        let payload: BudgetPayload = serde_json::from_str(
            r#"{"annualIncome": 80000, "annualBaseSalary": 70000, "payePensionRate": 5,
                "mortgagePrincipal": 0, "annualSippAmount": 2400,
                "startYear": 2025, "startMonth": 10}"#,
        )
        .expect("valid payload");
        let args = budget_args_from_payload(payload);
        assert_approx(args.monthly_expenses, default_budget_args().monthly_expenses);

        let inputs = build_budget_inputs(&args).expect("valid inputs");
        assert_approx(inputs.paye_pension_rate, 0.05);
        let budget = Planner::default()
            .monthly_budget(&inputs, resolve_start(args.start).expect("valid"))
            .expect("valid budget");
        let json = body_json(&budget);

        assert_approx(
            json["monthlyPayePensionContribution"].as_f64().expect("number"),
            0.05 * 70_000.0 / 12.0,
        );
        assert_approx(json["monthlySippContribution"].as_f64().expect("number"), 250.0);
        assert_eq!(json["monthlyMortgagePayment"].as_f64(), Some(0.0));
    }

    #[test]
    fn json_response_sets_no_store() {
        let response = json_response(StatusCode::OK, ErrorResponse { error: "x".to_string() });
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[test]
    fn planner_errors_become_bad_requests() {
        let result = Planner::default().tax_engine().compute_tax(-1.0, 0.0);
        let response = planner_response(result);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = string_response::<()>(Err("startMonth out of range".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_gross_income_is_a_bad_request() {
        let response = tax_handler_impl(TaxPayload::default());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = tax_handler_impl(TaxPayload {
            gross_income: Some(30_000.0),
            additional_income: None,
        });
        assert_eq!(response.status(), StatusCode::OK);
    }
}
