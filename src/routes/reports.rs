use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use crate::{
    dto::reports::{FileReportRequest, ReportList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Report,
    response::ApiResponse,
    routes::params::ReportListQuery,
    services::report_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(file_report))
        .route("/", get(list_my_reports))
}

#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = FileReportRequest,
    responses(
        (status = 201, description = "Report filed as open", body = ApiResponse<Report>)
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn file_report(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<FileReportRequest>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let resp = report_service::file_report(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/reports",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status")
    ),
    responses(
        (status = 200, description = "List own reports", body = ApiResponse<ReportList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn list_my_reports(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportListQuery>,
) -> AppResult<Json<ApiResponse<ReportList>>> {
    let resp = report_service::list_my_reports(&state, &user, query).await?;
    Ok(Json(resp))
}
