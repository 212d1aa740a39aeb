use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    audit::log_admin_action,
    dto::stores::{CreateStoreRequest, StoreList, UpdateStoreRequest},
    entity::stores::{ActiveModel as StoreActive, Column as StoreCol, Entity as Stores, Model as StoreModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_seller},
    models::Store,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
    status::{StoreStatus, UserRole},
};

pub async fn create_store(
    state: &AppState,
    user: &AuthUser,
    payload: CreateStoreRequest,
) -> AppResult<ApiResponse<Store>> {
    ensure_seller(user)?;
    let store = StoreActive {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.user_id),
        name: Set(payload.name),
        description: Set(payload.description),
        status: Set(StoreStatus::Active.as_str().to_owned()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Store created",
        store_from_entity(store)?,
        Some(Meta::empty()),
    ))
}

pub async fn get_store(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Store>> {
    let store = Stores::find_by_id(id).one(&state.orm).await?;
    let store = match store {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Store", store_from_entity(store)?, None))
}

pub async fn list_stores(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<StoreList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Stores::find().order_by_desc(StoreCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(store_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Stores", StoreList { items }, Some(meta)))
}

pub async fn update_store(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateStoreRequest,
) -> AppResult<ApiResponse<Store>> {
    let existing = Stores::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    if user.role != UserRole::Admin && existing.owner_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    // Owners toggle active/inactive; blocking is an admin moderation act.
    if let Some(status) = payload.status {
        if status == StoreStatus::Blocked && user.role != UserRole::Admin {
            return Err(AppError::Forbidden);
        }
    }

    let mut active: StoreActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(status) = payload.status {
        active.status = Set(status.as_str().to_owned());
    }
    let store = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Store updated",
        store_from_entity(store)?,
        Some(Meta::empty()),
    ))
}

pub async fn block_store(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Store>> {
    ensure_admin(user)?;
    let existing = Stores::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };

    let mut active: StoreActive = existing.into();
    active.status = Set(StoreStatus::Blocked.as_str().to_owned());
    let store = active.update(&state.orm).await?;

    if let Err(err) = log_admin_action(
        &state.pool,
        user.user_id,
        "store_block",
        None,
        Some(store.id),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "admin action log failed");
    }

    Ok(ApiResponse::success(
        "Store blocked",
        store_from_entity(store)?,
        Some(Meta::empty()),
    ))
}

pub fn store_from_entity(model: StoreModel) -> AppResult<Store> {
    let status = StoreStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unrecognized store status `{}`", model.status))
    })?;
    Ok(Store {
        id: model.id,
        owner_id: model.owner_id,
        name: model.name,
        description: model.description,
        status,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
