use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_admin_action,
    dto::orders::OrderList,
    entity::{
        admin_actions::{ActiveModel as ActionActive, Column as ActionCol, Entity as AdminActions, Model as ActionModel},
        orders::{Column as OrderCol, Entity as Orders},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::AdminAction,
    response::{ApiResponse, Meta},
    routes::admin::{ActionList, RecordActionRequest, UserList},
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::{auth_service::user_from_entity, order_service::order_from_entity},
    state::AppState,
};

/// Write-once audit record. Target ids are weak references and stay on
/// the row even after the target is deleted.
pub async fn record_action(
    state: &AppState,
    user: &AuthUser,
    payload: RecordActionRequest,
) -> AppResult<ApiResponse<AdminAction>> {
    ensure_admin(user)?;
    if payload.action_type.trim().is_empty() {
        return Err(AppError::BadRequest("action_type must not be empty".into()));
    }

    let action = ActionActive {
        id: Set(Uuid::new_v4()),
        admin_id: Set(user.user_id),
        action_type: Set(payload.action_type),
        target_user_id: Set(payload.target_user_id),
        target_store_id: Set(payload.target_store_id),
        description: Set(payload.description),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Action recorded",
        action_from_entity(action),
        Some(Meta::empty()),
    ))
}

pub async fn list_actions(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ActionList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = AdminActions::find().order_by_desc(ActionCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(action_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Actions", ActionList { items }, Some(meta)))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

/// Hard delete. Audit rows referencing this user keep their id as a
/// dangling weak reference.
pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_admin_action(
        &state.pool,
        user.user_id,
        "user_delete",
        Some(id),
        None,
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "admin action log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub fn action_from_entity(model: ActionModel) -> AdminAction {
    AdminAction {
        id: model.id,
        admin_id: model.admin_id,
        action_type: model.action_type,
        target_user_id: model.target_user_id,
        target_store_id: model.target_store_id,
        description: model.description,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
