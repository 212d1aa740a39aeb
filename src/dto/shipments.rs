use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    models::SubOrder,
    status::{OrderStatus, ShipmentStatus},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShipmentRequest {
    pub tracking_number: Option<String>,
}

/// Compare-and-set: `from` is the status the caller last read.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateShipmentStatusRequest {
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

/// Compare-and-set: `from` is the status the caller last read.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceSubOrderRequest {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubOrderList {
    pub items: Vec<SubOrder>,
}
