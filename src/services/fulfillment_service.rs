use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::shipments::{
        AdvanceSubOrderRequest, CreateShipmentRequest, SubOrderList, UpdateShipmentStatusRequest,
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Entity as Orders},
        payments::{Column as PaymentCol, Entity as Payments},
        products::{Column as ProdCol, Entity as Products},
        shipments::{ActiveModel as ShipmentActive, Column as ShipmentCol, Entity as Shipments, Model as ShipmentModel},
        stores::{Column as StoreCol, Entity as Stores},
        sub_orders::{Column as SubOrderCol, Entity as SubOrders},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    models::{Shipment, SubOrder},
    response::{ApiResponse, Meta},
    routes::params::SubOrderListQuery,
    services::order_service::{parse_order_status, sub_order_from_entity},
    state::AppState,
    status::{OrderStatus, PaymentStatus, ProductStatus, ShipmentStatus, UserRole},
};

/// Advance one sub-order one step. The transition is compare-and-set
/// against the status the caller last read; a miss means someone else
/// moved the row first and the caller must re-read.
pub async fn advance_sub_order(
    state: &AppState,
    user: &AuthUser,
    sub_order_id: Uuid,
    payload: AdvanceSubOrderRequest,
) -> AppResult<ApiResponse<SubOrder>> {
    let AdvanceSubOrderRequest { from, to } = payload;
    if !from.can_transition(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let txn = state.orm.begin().await?;

    let sub_order = SubOrders::find_by_id(sub_order_id).one(&txn).await?;
    let sub_order = match sub_order {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    ensure_manages_store(&txn, user, sub_order.store_id).await?;

    // Lock the parent order before touching sub-orders; every transition
    // path takes locks in this order.
    let order = Orders::find_by_id(sub_order.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "sub-order {} has no parent order",
                sub_order.id
            ))
        })?;

    match to {
        // Payment drives the exit from pending.
        OrderStatus::Paid => {
            let payment = Payments::find()
                .filter(PaymentCol::OrderId.eq(order.id))
                .one(&txn)
                .await?;
            let paid = payment
                .map(|p| PaymentStatus::parse(&p.status) == Some(PaymentStatus::Paid))
                .unwrap_or(false);
            if !paid {
                return Err(AppError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        // A sub-order does not ship without a shipment record.
        OrderStatus::Shipped => {
            let shipment = Shipments::find()
                .filter(ShipmentCol::SubOrderId.eq(sub_order.id))
                .one(&txn)
                .await?;
            if shipment.is_none() {
                return Err(AppError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        _ => {}
    }

    let result = SubOrders::update_many()
        .col_expr(SubOrderCol::Status, Expr::value(to.as_str()))
        .col_expr(SubOrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(SubOrderCol::Id.eq(sub_order.id))
        .filter(SubOrderCol::Status.eq(from.as_str()))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::Conflict);
    }

    if to == OrderStatus::Cancelled {
        restock_sub_order_items(&txn, sub_order.id).await?;
    }

    rollup_order_status(&txn, order).await?;

    let updated = SubOrders::find_by_id(sub_order.id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("sub-order vanished mid-update")))?;

    txn.commit().await?;

    tracing::info!(
        sub_order_id = %sub_order_id,
        from = %from,
        to = %to,
        "sub-order status advanced"
    );

    Ok(ApiResponse::success(
        "Sub-order updated",
        sub_order_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

/// Seller dashboard: the sub-orders routed to stores this user owns.
pub async fn list_store_sub_orders(
    state: &AppState,
    user: &AuthUser,
    query: SubOrderListQuery,
) -> AppResult<ApiResponse<SubOrderList>> {
    ensure_seller(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if user.role != UserRole::Admin {
        let store_ids: Vec<Uuid> = Stores::find()
            .filter(StoreCol::OwnerId.eq(user.user_id))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        condition = condition.add(SubOrderCol::StoreId.is_in(store_ids));
    }
    if let Some(store_id) = query.store_id {
        condition = condition.add(SubOrderCol::StoreId.eq(store_id));
    }
    if let Some(status) = query.status {
        condition = condition.add(SubOrderCol::Status.eq(status.as_str()));
    }

    let finder = SubOrders::find()
        .filter(condition)
        .order_by_desc(SubOrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(sub_order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Sub-orders",
        SubOrderList { items },
        Some(meta),
    ))
}

/// Create the shipment for a sub-order the seller has started fulfilling.
pub async fn create_shipment(
    state: &AppState,
    user: &AuthUser,
    sub_order_id: Uuid,
    payload: CreateShipmentRequest,
) -> AppResult<ApiResponse<Shipment>> {
    let txn = state.orm.begin().await?;

    let sub_order = SubOrders::find_by_id(sub_order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let sub_order = match sub_order {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    ensure_manages_store(&txn, user, sub_order.store_id).await?;

    let status = parse_order_status(&sub_order.status)?;
    if !matches!(status, OrderStatus::Paid | OrderStatus::Processing) {
        return Err(AppError::SubOrderNotReady);
    }

    let existing = Shipments::find()
        .filter(ShipmentCol::SubOrderId.eq(sub_order.id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(AppError::AlreadyShipped);
    }

    let shipment = ShipmentActive {
        id: Set(Uuid::new_v4()),
        sub_order_id: Set(sub_order.id),
        tracking_number: Set(payload.tracking_number),
        status: Set(ShipmentStatus::Preparing.as_str().to_owned()),
        shipped_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(sub_order_id = %sub_order_id, shipment_id = %shipment.id, "shipment created");

    Ok(ApiResponse::success(
        "Shipment created",
        shipment_from_entity(shipment)?,
        Some(Meta::empty()),
    ))
}

/// Move a shipment along its lifecycle via compare-and-set. Entering
/// transit stamps the shipment date.
pub async fn update_shipment_status(
    state: &AppState,
    user: &AuthUser,
    shipment_id: Uuid,
    payload: UpdateShipmentStatusRequest,
) -> AppResult<ApiResponse<Shipment>> {
    let UpdateShipmentStatusRequest { from, to } = payload;
    if !from.can_transition(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let txn = state.orm.begin().await?;

    let shipment = Shipments::find_by_id(shipment_id).one(&txn).await?;
    let shipment = match shipment {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    let sub_order = SubOrders::find_by_id(shipment.sub_order_id)
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "shipment {} has no sub-order",
                shipment.id
            ))
        })?;
    ensure_manages_store(&txn, user, sub_order.store_id).await?;

    let mut update = Shipments::update_many()
        .col_expr(ShipmentCol::Status, Expr::value(to.as_str()))
        .col_expr(ShipmentCol::UpdatedAt, Expr::value(Utc::now()));
    if to == ShipmentStatus::InTransit {
        update = update.col_expr(ShipmentCol::ShippedAt, Expr::value(Utc::now()));
    }
    let result = update
        .filter(ShipmentCol::Id.eq(shipment.id))
        .filter(ShipmentCol::Status.eq(from.as_str()))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::Conflict);
    }

    let updated = Shipments::find_by_id(shipment.id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("shipment vanished mid-update")))?;

    txn.commit().await?;

    tracing::info!(shipment_id = %shipment_id, from = %from, to = %to, "shipment status updated");

    Ok(ApiResponse::success(
        "Shipment updated",
        shipment_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

/// Recompute the denormalized order status from the current sub-order
/// statuses. Callers hold the order row lock.
pub(crate) async fn rollup_order_status<C: ConnectionTrait>(
    conn: &C,
    order: crate::entity::orders::Model,
) -> AppResult<()> {
    let sub_orders = SubOrders::find()
        .filter(SubOrderCol::OrderId.eq(order.id))
        .all(conn)
        .await?;
    let statuses = sub_orders
        .iter()
        .map(|s| parse_order_status(&s.status))
        .collect::<AppResult<Vec<_>>>()?;
    let rolled = OrderStatus::rollup(&statuses);

    if rolled.as_str() != order.status {
        let mut active: OrderActive = order.into();
        active.status = Set(rolled.as_str().to_owned());
        active.updated_at = Set(Utc::now().into());
        active.update(conn).await?;
    }
    Ok(())
}

/// Return a cancelled sub-order's quantities to stock. Products that
/// sold out and regained stock become purchasable again.
pub(crate) async fn restock_sub_order_items<C: ConnectionTrait>(
    conn: &C,
    sub_order_id: Uuid,
) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::SubOrderId.eq(sub_order_id))
        .all(conn)
        .await?;

    for item in items {
        Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::col(ProdCol::Stock).add(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(conn)
            .await?;

        Products::update_many()
            .col_expr(
                ProdCol::Status,
                Expr::value(ProductStatus::Published.as_str()),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .filter(ProdCol::Status.eq(ProductStatus::OutOfStock.as_str()))
            .filter(ProdCol::Stock.gt(0))
            .exec(conn)
            .await?;
    }
    Ok(())
}

async fn ensure_manages_store<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    store_id: Uuid,
) -> AppResult<()> {
    if user.role == UserRole::Admin {
        return Ok(());
    }
    let store = Stores::find_by_id(store_id).one(conn).await?;
    match store {
        Some(s) if s.owner_id == user.user_id => Ok(()),
        Some(_) => Err(AppError::Forbidden),
        None => Err(AppError::Internal(anyhow::anyhow!(
            "sub-order references missing store {}",
            store_id
        ))),
    }
}

pub fn shipment_from_entity(model: ShipmentModel) -> AppResult<Shipment> {
    let status = ShipmentStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unrecognized shipment status `{}`",
            model.status
        ))
    })?;
    Ok(Shipment {
        id: model.id,
        sub_order_id: model.sub_order_id,
        tracking_number: model.tracking_number,
        status,
        shipped_at: model.shipped_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
