use marketplace_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{OrderLine, PlaceOrderRequest},
    dto::payments::{RecordPaymentRequest, UpdatePaymentStatusRequest},
    dto::shipments::{AdvanceSubOrderRequest, CreateShipmentRequest, UpdateShipmentStatusRequest},
    entity::{
        products::{ActiveModel as ProductActive, Entity as Products},
        stores::ActiveModel as StoreActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    routes::admin::RecordActionRequest,
    routes::params::Pagination,
    services::{admin_service, fulfillment_service, order_service, payment_service},
    state::AppState,
    status::{OrderStatus, PaymentMethod, PaymentStatus, ProductStatus, ShipmentStatus, UserRole},
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: a cart spanning two stores fans out into two
// sub-orders, payment releases the order from pending, each seller
// fulfills independently, and the order status stays the roll-up of its
// sub-orders. Finishes with cancellation/restock and the audit-trail
// persistence checks.
#[tokio::test]
async fn split_order_fulfillment_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    // Seed users
    let buyer_id = create_user(&state, "buyer", "buyer@example.com", "customer").await?;
    let seller_a_id = create_user(&state, "seller_a", "seller_a@example.com", "seller").await?;
    let seller_b_id = create_user(&state, "seller_b", "seller_b@example.com", "seller").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com", "admin").await?;

    let store_a = create_store(&state, seller_a_id, "Store A").await?;
    let store_b = create_store(&state, seller_b_id, "Store B").await?;

    // Store A sells two products at 10, store B one product at 5.
    let prod_a1 = create_product(&state, store_a, "Widget", 10, 8).await?;
    let prod_a2 = create_product(&state, store_a, "Gadget", 10, 8).await?;
    let prod_b1 = create_product(&state, store_b, "Sticker", 5, 3).await?;

    let buyer = AuthUser {
        user_id: buyer_id,
        role: UserRole::Customer,
    };
    let seller_a = AuthUser {
        user_id: seller_a_id,
        role: UserRole::Seller,
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: UserRole::Admin,
    };

    // Place an order across both stores.
    let placed = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            items: vec![
                OrderLine {
                    product_id: prod_a1,
                    quantity: 1,
                },
                OrderLine {
                    product_id: prod_a2,
                    quantity: 1,
                },
                OrderLine {
                    product_id: prod_b1,
                    quantity: 1,
                },
            ],
        },
    )
    .await?;
    let detail = placed.data.unwrap();

    assert_eq!(detail.order.total_price, 25);
    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.sub_orders.len(), 2);

    let total_items: usize = detail.sub_orders.iter().map(|s| s.items.len()).sum();
    assert_eq!(total_items, 3);

    // Sub-totals match their stores, and every item belongs to the
    // sub-order's store.
    let sub_a = detail
        .sub_orders
        .iter()
        .find(|s| s.sub_order.store_id == store_a)
        .expect("sub-order for store A");
    let sub_b = detail
        .sub_orders
        .iter()
        .find(|s| s.sub_order.store_id == store_b)
        .expect("sub-order for store B");
    assert_eq!(sub_a.sub_order.sub_total, 20);
    assert_eq!(sub_b.sub_order.sub_total, 5);
    assert!(sub_a
        .items
        .iter()
        .all(|i| i.product_id == prod_a1 || i.product_id == prod_a2));
    assert!(sub_b.items.iter().all(|i| i.product_id == prod_b1));
    assert_eq!(
        detail.order.total_price,
        detail.sub_orders.iter().map(|s| s.sub_order.sub_total).sum::<i64>()
    );

    // Stock was decremented inside the same transaction.
    assert_eq!(product_stock(&state, prod_a1).await?, 7);
    assert_eq!(product_stock(&state, prod_b1).await?, 2);

    // Over-ordering is rejected before any write.
    let too_many = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            items: vec![OrderLine {
                product_id: prod_b1,
                quantity: 99,
            }],
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::InsufficientStock(_))));
    assert_eq!(product_stock(&state, prod_b1).await?, 2);

    // Sub-orders cannot jump ahead: pending -> shipped is not an edge.
    let jump = fulfillment_service::advance_sub_order(
        &state,
        &seller_a,
        sub_a.sub_order.id,
        AdvanceSubOrderRequest {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped,
        },
    )
    .await;
    assert!(matches!(jump, Err(AppError::InvalidTransition { .. })));

    // Nor can they leave pending before the payment is confirmed.
    let premature = fulfillment_service::advance_sub_order(
        &state,
        &seller_a,
        sub_a.sub_order.id,
        AdvanceSubOrderRequest {
            from: OrderStatus::Pending,
            to: OrderStatus::Paid,
        },
    )
    .await;
    assert!(matches!(premature, Err(AppError::InvalidTransition { .. })));

    // Payment amount must match the order total exactly.
    let short_paid = payment_service::record_payment(
        &state,
        &buyer,
        detail.order.id,
        RecordPaymentRequest {
            method: PaymentMethod::BankTransfer,
            amount: 24,
        },
    )
    .await;
    assert!(matches!(short_paid, Err(AppError::AmountMismatch { .. })));

    let payment = payment_service::record_payment(
        &state,
        &buyer,
        detail.order.id,
        RecordPaymentRequest {
            method: PaymentMethod::BankTransfer,
            amount: 25,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, 25);

    // Confirming the payment releases every sub-order from pending and
    // the roll-up follows.
    let confirmed = payment_service::update_payment_status(
        &state,
        &buyer,
        payment.id,
        UpdatePaymentStatusRequest {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Paid,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Paid);

    let order = order_service::get_order(&state, &buyer, detail.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(order.order.status, OrderStatus::Paid);
    assert!(order
        .sub_orders
        .iter()
        .all(|s| s.sub_order.status == OrderStatus::Paid));

    // Store A fulfills: shipment exists before the sub-order may ship.
    let shipment = fulfillment_service::create_shipment(
        &state,
        &seller_a,
        sub_a.sub_order.id,
        CreateShipmentRequest {
            tracking_number: Some("TRK-001".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Preparing);

    let duplicate = fulfillment_service::create_shipment(
        &state,
        &seller_a,
        sub_a.sub_order.id,
        CreateShipmentRequest {
            tracking_number: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::AlreadyShipped)));

    // Shipments cannot jump straight to delivered.
    let skip_transit = fulfillment_service::update_shipment_status(
        &state,
        &seller_a,
        shipment.id,
        UpdateShipmentStatusRequest {
            from: ShipmentStatus::Preparing,
            to: ShipmentStatus::Delivered,
        },
    )
    .await;
    assert!(matches!(skip_transit, Err(AppError::InvalidTransition { .. })));

    let in_transit = fulfillment_service::update_shipment_status(
        &state,
        &seller_a,
        shipment.id,
        UpdateShipmentStatusRequest {
            from: ShipmentStatus::Preparing,
            to: ShipmentStatus::InTransit,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(in_transit.status, ShipmentStatus::InTransit);
    assert!(in_transit.shipped_at.is_some());

    for (from, to) in [
        (OrderStatus::Paid, OrderStatus::Processing),
        (OrderStatus::Processing, OrderStatus::Shipped),
        (OrderStatus::Shipped, OrderStatus::Completed),
    ] {
        fulfillment_service::advance_sub_order(
            &state,
            &seller_a,
            sub_a.sub_order.id,
            AdvanceSubOrderRequest { from, to },
        )
        .await?;
    }

    // A compare-and-set against a stale status misses.
    let stale = fulfillment_service::advance_sub_order(
        &state,
        &seller_a,
        sub_a.sub_order.id,
        AdvanceSubOrderRequest {
            from: OrderStatus::Shipped,
            to: OrderStatus::Completed,
        },
    )
    .await;
    assert!(matches!(stale, Err(AppError::Conflict)));

    // Store B has not moved, so the order shows the least advanced status.
    let order = order_service::get_order(&state, &buyer, detail.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(order.order.status, OrderStatus::Paid);

    // Cancellation is no longer available to the buyer once fulfillment
    // has begun anywhere.
    let late_cancel = order_service::cancel_order(&state, &buyer, detail.order.id).await;
    assert!(matches!(late_cancel, Err(AppError::InvalidTransition { .. })));

    // A fresh pending order can still be cancelled, and stock comes back.
    let second = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            items: vec![OrderLine {
                product_id: prod_b1,
                quantity: 2,
            }],
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(product_stock(&state, prod_b1).await?, 0);

    let cancelled = order_service::cancel_order(&state, &buyer, second.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(product_stock(&state, prod_b1).await?, 2);

    // Snapshot prices survive later catalog changes.
    set_product_price(&state, prod_b1, 999).await?;
    let order = order_service::get_order(&state, &buyer, detail.order.id)
        .await?
        .data
        .unwrap();
    let item_b = &order
        .sub_orders
        .iter()
        .find(|s| s.sub_order.store_id == store_b)
        .unwrap()
        .items[0];
    assert_eq!(item_b.price, 5);
    assert_eq!(order.order.total_price, 25);

    // Admin actions outlive their targets.
    let target_id = create_user(&state, "banned", "banned@example.com", "customer").await?;
    let action = admin_service::record_action(
        &state,
        &admin,
        RecordActionRequest {
            action_type: "user_ban".into(),
            target_user_id: Some(target_id),
            target_store_id: None,
            description: Some("spam".into()),
        },
    )
    .await?
    .data
    .unwrap();

    admin_service::delete_user(&state, &admin, target_id).await?;

    let actions = admin_service::list_actions(
        &state,
        &admin,
        Pagination {
            page: Some(1),
            per_page: Some(50),
        },
    )
    .await?
    .data
    .unwrap();
    let kept = actions
        .items
        .iter()
        .find(|a| a.id == action.id)
        .expect("action survives target deletion");
    assert_eq!(kept.admin_id, admin_id);
    assert_eq!(kept.target_user_id, Some(target_id));
    assert_eq!(kept.action_type, "user_ban");

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(database_url).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE admin_actions, reports, payments, shipments, order_items, sub_orders, orders, products, categories, stores, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState { pool, orm })
}

async fn create_user(
    state: &AppState,
    username: &str,
    email: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        phone: Set(None),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_store(state: &AppState, owner_id: Uuid, name: &str) -> anyhow::Result<Uuid> {
    let store = StoreActive {
        id: Set(Uuid::new_v4()),
        owner_id: Set(owner_id),
        name: Set(name.to_string()),
        description: Set(None),
        status: Set("active".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(store.id)
}

async fn create_product(
    state: &AppState,
    store_id: Uuid,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        store_id: Set(store_id),
        category_id: Set(None),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        status: Set(ProductStatus::Published.as_str().to_owned()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}

async fn set_product_price(state: &AppState, id: Uuid, price: i64) -> anyhow::Result<()> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    let mut active: ProductActive = product.into();
    active.price = Set(price);
    active.update(&state.orm).await?;
    Ok(())
}
