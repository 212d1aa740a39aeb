use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::payments::{RecordPaymentRequest, UpdatePaymentStatusRequest},
    entity::{
        orders::Entity as Orders,
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments, Model as PaymentModel},
        sub_orders::{Column as SubOrderCol, Entity as SubOrders},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Payment,
    response::{ApiResponse, Meta},
    services::fulfillment_service::rollup_order_status,
    state::AppState,
    status::{OrderStatus, PaymentMethod, PaymentStatus, UserRole},
};

/// Attach the payment to an order. One payment per order: a failed
/// payment is reset in place, never replaced.
pub async fn record_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: RecordPaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    if user.role != UserRole::Admin && order.buyer_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let existing = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&txn)
        .await?;
    if let Some(payment) = existing {
        if PaymentStatus::parse(&payment.status) == Some(PaymentStatus::Paid) {
            return Err(AppError::AlreadyPaid);
        }
        return Err(AppError::BadRequest(
            "Order already has a payment; reset the failed payment instead".to_string(),
        ));
    }

    if payload.amount != order.total_price {
        return Err(AppError::AmountMismatch {
            expected: order.total_price,
            actual: payload.amount,
        });
    }

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        amount: Set(payload.amount),
        method: Set(payload.method.as_str().to_owned()),
        status: Set(PaymentStatus::Pending.as_str().to_owned()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(order_id = %order_id, payment_id = %payment.id, "payment recorded");

    Ok(ApiResponse::success(
        "Payment recorded",
        payment_from_entity(payment)?,
        Some(Meta::empty()),
    ))
}

/// Compare-and-set payment transition. Confirming a payment releases the
/// order from pending: every still-pending sub-order advances to paid and
/// the order roll-up is recomputed in the same transaction.
pub async fn update_payment_status(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
    payload: UpdatePaymentStatusRequest,
) -> AppResult<ApiResponse<Payment>> {
    let UpdatePaymentStatusRequest { from, to } = payload;
    if !from.can_transition(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let txn = state.orm.begin().await?;

    let payment = Payments::find_by_id(payment_id).one(&txn).await?;
    let payment = match payment {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let order = Orders::find_by_id(payment.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("payment {} has no order", payment.id))
        })?;
    if user.role != UserRole::Admin && order.buyer_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let result = Payments::update_many()
        .col_expr(PaymentCol::Status, Expr::value(to.as_str()))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(PaymentCol::Id.eq(payment.id))
        .filter(PaymentCol::Status.eq(from.as_str()))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::Conflict);
    }

    if to == PaymentStatus::Paid {
        SubOrders::update_many()
            .col_expr(SubOrderCol::Status, Expr::value(OrderStatus::Paid.as_str()))
            .col_expr(SubOrderCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(SubOrderCol::OrderId.eq(order.id))
            .filter(SubOrderCol::Status.eq(OrderStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        rollup_order_status(&txn, order).await?;
    }

    let updated = Payments::find_by_id(payment.id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment vanished mid-update")))?;

    txn.commit().await?;

    tracing::info!(payment_id = %payment_id, from = %from, to = %to, "payment status updated");

    Ok(ApiResponse::success(
        "Payment updated",
        payment_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

pub fn payment_from_entity(model: PaymentModel) -> AppResult<Payment> {
    let status = PaymentStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unrecognized payment status `{}`",
            model.status
        ))
    })?;
    let method = PaymentMethod::parse(&model.method).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unrecognized payment method `{}`",
            model.method
        ))
    })?;
    Ok(Payment {
        id: model.id,
        order_id: model.order_id,
        amount: model.amount,
        method,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
