use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderDetail, OrderLine, OrderList, PlaceOrderRequest, SubOrderWithItems},
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payments::{Column as PaymentCol, Entity as Payments},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products, Model as ProductModel},
        shipments::{Column as ShipmentCol, Entity as Shipments},
        stores::{Column as StoreCol, Entity as Stores},
        sub_orders::{ActiveModel as SubOrderActive, Column as SubOrderCol, Entity as SubOrders, Model as SubOrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, SubOrder},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        fulfillment_service::{restock_sub_order_items, shipment_from_entity},
        payment_service::payment_from_entity,
    },
    state::AppState,
    status::{OrderStatus, ProductStatus, StoreStatus},
};

/// Split a buyer's cart into one sub-order per store, snapshot prices,
/// decrement stock, and create the whole aggregate in one transaction.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let wanted = merge_lines(&payload.items)?;

    let txn = state.orm.begin().await?;

    // Lock product rows in id order; concurrent buyers of the same
    // products serialize here instead of deadlocking.
    let ids: Vec<Uuid> = wanted.keys().copied().collect();
    let products = Products::find()
        .filter(ProdCol::Id.is_in(ids.clone()))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    let mut by_id: BTreeMap<Uuid, ProductModel> = BTreeMap::new();
    for product in products {
        by_id.insert(product.id, product);
    }
    for id in &ids {
        if !by_id.contains_key(id) {
            return Err(AppError::UnknownProduct(*id));
        }
    }

    let store_ids: Vec<Uuid> = by_id.values().map(|p| p.store_id).collect();
    let stores = Stores::find()
        .filter(StoreCol::Id.is_in(store_ids))
        .all(&txn)
        .await?;
    let active_stores: BTreeMap<Uuid, bool> = stores
        .iter()
        .map(|s| (s.id, StoreStatus::parse(&s.status) == Some(StoreStatus::Active)))
        .collect();

    for (id, qty) in &wanted {
        let product = &by_id[id];
        let status = ProductStatus::parse(&product.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unrecognized product status `{}`",
                product.status
            ))
        })?;
        let store_is_active = active_stores.get(&product.store_id).copied().unwrap_or(false);
        if status != ProductStatus::Published || !store_is_active {
            return Err(AppError::ProductUnavailable(*id));
        }
        if product.stock < *qty {
            return Err(AppError::InsufficientStock(*id));
        }
    }

    // Fan out: one group per store, prices snapshotted from the locked rows.
    let mut groups: BTreeMap<Uuid, Vec<(ProductModel, i32)>> = BTreeMap::new();
    for (id, qty) in &wanted {
        let product = by_id[id].clone();
        groups.entry(product.store_id).or_default().push((product, *qty));
    }

    let total_price: i64 = groups
        .values()
        .flatten()
        .map(|(product, qty)| product.price * i64::from(*qty))
        .sum();

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        buyer_id: Set(user.user_id),
        total_price: Set(total_price),
        status: Set(OrderStatus::Pending.as_str().to_owned()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut sub_orders: Vec<SubOrderWithItems> = Vec::new();
    for (store_id, lines) in &groups {
        let sub_total: i64 = lines
            .iter()
            .map(|(product, qty)| product.price * i64::from(*qty))
            .sum();

        let sub_order = SubOrderActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            store_id: Set(*store_id),
            sub_total: Set(sub_total),
            status: Set(OrderStatus::Pending.as_str().to_owned()),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&txn)
        .await?;

        let mut items: Vec<OrderItem> = Vec::new();
        for (product, qty) in lines {
            let item = OrderItemActive {
                id: Set(Uuid::new_v4()),
                sub_order_id: Set(sub_order.id),
                product_id: Set(product.id),
                quantity: Set(*qty),
                price: Set(product.price),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
            items.push(order_item_from_entity(item));

            let new_stock = product.stock - qty;
            let mut active: ProductActive = product.clone().into();
            active.stock = Set(new_stock);
            if new_stock == 0 {
                active.status = Set(ProductStatus::OutOfStock.as_str().to_owned());
            }
            active.update(&txn).await?;
        }

        sub_orders.push(SubOrderWithItems {
            sub_order: sub_order_from_entity(sub_order)?,
            items,
            shipment: None,
        });
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        buyer_id = %user.user_id,
        stores = sub_orders.len(),
        total = total_price,
        "order placed"
    );

    Ok(ApiResponse::success(
        "Order placed",
        OrderDetail {
            order: order_from_entity(order)?,
            sub_orders,
            payment: None,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::BuyerId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::BuyerId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let detail = load_order_detail(state, order).await?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Buyer cancellation. Legal only while every sub-order is still pending
/// or paid; cancels them all and restores stock in one transaction.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::BuyerId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let sub_orders = SubOrders::find()
        .filter(SubOrderCol::OrderId.eq(order.id))
        .order_by_asc(SubOrderCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    for sub_order in &sub_orders {
        let status = parse_order_status(&sub_order.status)?;
        if !status.can_transition(OrderStatus::Cancelled) {
            return Err(AppError::InvalidTransition {
                from: status.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            });
        }
    }

    for sub_order in &sub_orders {
        let mut active: SubOrderActive = sub_order.clone().into();
        active.status = Set(OrderStatus::Cancelled.as_str().to_owned());
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        restock_sub_order_items(&txn, sub_order.id).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().to_owned());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, "order cancelled by buyer");

    let detail = load_order_detail(state, order).await?;
    Ok(ApiResponse::success("Order cancelled", detail, Some(Meta::empty())))
}

/// Assemble an order with its sub-orders, items, shipments, and payment.
pub async fn load_order_detail(state: &AppState, order: OrderModel) -> AppResult<OrderDetail> {
    let sub_orders = SubOrders::find()
        .filter(SubOrderCol::OrderId.eq(order.id))
        .order_by_asc(SubOrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let sub_order_ids: Vec<Uuid> = sub_orders.iter().map(|s| s.id).collect();
    let items = OrderItems::find()
        .filter(OrderItemCol::SubOrderId.is_in(sub_order_ids.clone()))
        .all(&state.orm)
        .await?;
    let shipments = Shipments::find()
        .filter(ShipmentCol::SubOrderId.is_in(sub_order_ids))
        .all(&state.orm)
        .await?;

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?
        .map(payment_from_entity)
        .transpose()?;

    let mut detail_subs: Vec<SubOrderWithItems> = Vec::new();
    for sub_order in sub_orders {
        let sub_items = items
            .iter()
            .filter(|i| i.sub_order_id == sub_order.id)
            .cloned()
            .map(order_item_from_entity)
            .collect();
        let shipment = shipments
            .iter()
            .find(|s| s.sub_order_id == sub_order.id)
            .cloned()
            .map(shipment_from_entity)
            .transpose()?;
        detail_subs.push(SubOrderWithItems {
            sub_order: sub_order_from_entity(sub_order)?,
            items: sub_items,
            shipment,
        });
    }

    Ok(OrderDetail {
        order: order_from_entity(order)?,
        sub_orders: detail_subs,
        payment,
    })
}

/// Validate and merge cart lines. Duplicate product ids are summed up
/// front so a repeated line cannot slip past the stock check.
fn merge_lines(lines: &[OrderLine]) -> AppResult<BTreeMap<Uuid, i32>> {
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }
    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        if line.quantity < 1 {
            return Err(AppError::BadRequest(
                "quantity must be at least 1".to_string(),
            ));
        }
        *wanted.entry(line.product_id).or_insert(0) += line.quantity;
    }
    Ok(wanted)
}

pub fn parse_order_status(value: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(value).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unrecognized order status `{}`", value))
    })
}

pub fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        buyer_id: model.buyer_id,
        total_price: model.total_price,
        status: parse_order_status(&model.status)?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn sub_order_from_entity(model: SubOrderModel) -> AppResult<SubOrder> {
    Ok(SubOrder {
        id: model.id,
        order_id: model.order_id,
        store_id: model.store_id,
        sub_total: model.sub_total,
        status: parse_order_status(&model.status)?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        sub_order_id: model.sub_order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(merge_lines(&[]), Err(AppError::EmptyCart)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let lines = [OrderLine {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }];
        assert!(matches!(merge_lines(&lines), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn duplicate_lines_merge_before_stock_checks() {
        let product = Uuid::new_v4();
        let other = Uuid::new_v4();
        let lines = [
            OrderLine {
                product_id: product,
                quantity: 1,
            },
            OrderLine {
                product_id: other,
                quantity: 5,
            },
            OrderLine {
                product_id: product,
                quantity: 2,
            },
        ];
        let wanted = merge_lines(&lines).unwrap();
        assert_eq!(wanted[&product], 3);
        assert_eq!(wanted[&other], 5);
        assert_eq!(wanted.len(), 2);
    }
}
