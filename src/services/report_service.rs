use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    dto::reports::{FileReportRequest, ReportList, UpdateReportStatusRequest},
    entity::reports::{ActiveModel as ReportActive, Column as ReportCol, Entity as Reports, Model as ReportModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Report,
    response::{ApiResponse, Meta},
    routes::params::ReportListQuery,
    state::AppState,
    status::ReportStatus,
};

pub async fn file_report(
    state: &AppState,
    user: &AuthUser,
    payload: FileReportRequest,
) -> AppResult<ApiResponse<Report>> {
    if payload.report_type.trim().is_empty() {
        return Err(AppError::BadRequest("report_type must not be empty".into()));
    }

    let report = ReportActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        report_type: Set(payload.report_type),
        description: Set(payload.description),
        status: Set(ReportStatus::Open.as_str().to_owned()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(report_id = %report.id, user_id = %user.user_id, "report filed");

    Ok(ApiResponse::success(
        "Report filed",
        report_from_entity(report)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_my_reports(
    state: &AppState,
    user: &AuthUser,
    query: ReportListQuery,
) -> AppResult<ApiResponse<ReportList>> {
    list_reports_filtered(state, query, Some(user.user_id)).await
}

pub async fn list_all_reports(
    state: &AppState,
    user: &AuthUser,
    query: ReportListQuery,
) -> AppResult<ApiResponse<ReportList>> {
    ensure_admin(user)?;
    list_reports_filtered(state, query, None).await
}

/// Moderation workflow: open -> reviewing -> resolved | rejected, via
/// compare-and-set. Resolved and rejected are terminal.
pub async fn update_report_status(
    state: &AppState,
    user: &AuthUser,
    report_id: Uuid,
    payload: UpdateReportStatusRequest,
) -> AppResult<ApiResponse<Report>> {
    ensure_admin(user)?;
    let UpdateReportStatusRequest { from, to } = payload;
    if !from.can_transition(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let exists = Reports::find_by_id(report_id).one(&state.orm).await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    let result = Reports::update_many()
        .col_expr(ReportCol::Status, Expr::value(to.as_str()))
        .col_expr(ReportCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(ReportCol::Id.eq(report_id))
        .filter(ReportCol::Status.eq(from.as_str()))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::Conflict);
    }

    let updated = Reports::find_by_id(report_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("report vanished mid-update")))?;

    tracing::info!(report_id = %report_id, from = %from, to = %to, "report status updated");

    Ok(ApiResponse::success(
        "Report updated",
        report_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

async fn list_reports_filtered(
    state: &AppState,
    query: ReportListQuery,
    user_id: Option<Uuid>,
) -> AppResult<ApiResponse<ReportList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(user_id) = user_id {
        condition = condition.add(ReportCol::UserId.eq(user_id));
    }
    if let Some(status) = query.status {
        condition = condition.add(ReportCol::Status.eq(status.as_str()));
    }

    let finder = Reports::find()
        .filter(condition)
        .order_by_desc(ReportCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(report_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Reports", ReportList { items }, Some(meta)))
}

pub fn report_from_entity(model: ReportModel) -> AppResult<Report> {
    let status = ReportStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unrecognized report status `{}`",
            model.status
        ))
    })?;
    Ok(Report {
        id: model.id,
        user_id: model.user_id,
        report_type: model.report_type,
        description: model.description,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
