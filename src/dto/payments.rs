use serde::Deserialize;
use utoipa::ToSchema;

use crate::status::{PaymentMethod, PaymentStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub method: PaymentMethod,
    pub amount: i64,
}

/// Compare-and-set: `from` is the status the caller last read.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}
