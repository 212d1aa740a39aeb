use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle shared by orders and sub-orders. Sub-orders advance one step
/// at a time; the order-level value is always the roll-up of its sub-orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Completed => 4,
            // Cancelled sits outside the forward progression.
            OrderStatus::Cancelled => 5,
        }
    }

    /// Legal single-step transitions. Cancellation is only reachable while
    /// the seller has not begun fulfillment; anything later goes through a
    /// return flow, not a status edge.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Paid)
                | (Paid, Processing)
                | (Processing, Shipped)
                | (Shipped, Completed)
                | (Pending, Cancelled)
                | (Paid, Cancelled)
        )
    }

    /// Derive the order-level status from its sub-order statuses.
    ///
    /// All cancelled -> cancelled. Otherwise cancelled sub-orders are
    /// excluded and the least-advanced remaining status wins, so the order
    /// reads completed only once every live sub-order is completed.
    pub fn rollup(statuses: &[OrderStatus]) -> OrderStatus {
        let mut lowest: Option<OrderStatus> = None;
        for &status in statuses {
            if status == OrderStatus::Cancelled {
                continue;
            }
            lowest = Some(match lowest {
                Some(current) if current.rank() <= status.rank() => current,
                _ => status,
            });
        }
        lowest.unwrap_or(OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// A failed payment is reset on the same row, never replaced: the
    /// payment is unique per order.
    pub fn can_transition(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Pending, Paid) | (Pending, Failed) | (Failed, Pending) | (Paid, Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    CreditCard,
    BankTransfer,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::EWallet => "e_wallet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cod" => Some(PaymentMethod::Cod),
            "credit_card" => Some(PaymentMethod::CreditCard),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "e_wallet" => Some(PaymentMethod::EWallet),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Preparing,
    InTransit,
    Delivered,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Preparing => "preparing",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preparing" => Some(ShipmentStatus::Preparing),
            "in_transit" => Some(ShipmentStatus::InTransit),
            "delivered" => Some(ShipmentStatus::Delivered),
            "returned" => Some(ShipmentStatus::Returned),
            _ => None,
        }
    }

    pub fn can_transition(self, to: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        matches!(
            (self, to),
            (Preparing, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Returned)
                | (Delivered, Returned)
        )
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Reviewing,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ReportStatus::Open),
            "reviewing" => Some(ReportStatus::Reviewing),
            "resolved" => Some(ReportStatus::Resolved),
            "rejected" => Some(ReportStatus::Rejected),
            _ => None,
        }
    }

    pub fn can_transition(self, to: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, to),
            (Open, Reviewing) | (Reviewing, Resolved) | (Reviewing, Rejected)
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Published,
    Hidden,
    OutOfStock,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Published => "published",
            ProductStatus::Hidden => "hidden",
            ProductStatus::OutOfStock => "out_of_stock",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ProductStatus::Draft),
            "published" => Some(ProductStatus::Published),
            "hidden" => Some(ProductStatus::Hidden),
            "out_of_stock" => Some(ProductStatus::OutOfStock),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Active,
    Inactive,
    Blocked,
}

impl StoreStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreStatus::Active => "active",
            StoreStatus::Inactive => "inactive",
            StoreStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(StoreStatus::Active),
            "inactive" => Some(StoreStatus::Inactive),
            "blocked" => Some(StoreStatus::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Seller,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Seller => "seller",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(UserRole::Customer),
            "seller" => Some(UserRole::Seller),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_order_advances_one_step_at_a_time() {
        use OrderStatus::*;
        assert!(Pending.can_transition(Paid));
        assert!(Paid.can_transition(Processing));
        assert!(Processing.can_transition(Shipped));
        assert!(Shipped.can_transition(Completed));

        assert!(!Pending.can_transition(Shipped));
        assert!(!Pending.can_transition(Processing));
        assert!(!Paid.can_transition(Shipped));
        assert!(!Completed.can_transition(Pending));
    }

    #[test]
    fn cancellation_allowed_only_before_fulfillment() {
        use OrderStatus::*;
        assert!(Pending.can_transition(Cancelled));
        assert!(Paid.can_transition(Cancelled));
        assert!(!Processing.can_transition(Cancelled));
        assert!(!Shipped.can_transition(Cancelled));
        assert!(!Completed.can_transition(Cancelled));
        assert!(!Cancelled.can_transition(Pending));
    }

    #[test]
    fn rollup_takes_least_advanced_live_status() {
        use OrderStatus::*;
        assert_eq!(OrderStatus::rollup(&[Shipped, Processing]), Processing);
        assert_eq!(OrderStatus::rollup(&[Pending, Completed]), Pending);
        assert_eq!(OrderStatus::rollup(&[Paid]), Paid);
    }

    #[test]
    fn rollup_terminal_states() {
        use OrderStatus::*;
        assert_eq!(OrderStatus::rollup(&[Completed, Completed]), Completed);
        assert_eq!(OrderStatus::rollup(&[Cancelled, Cancelled]), Cancelled);
        // A cancelled sub-order does not hold the rest of the order back.
        assert_eq!(OrderStatus::rollup(&[Cancelled, Shipped]), Shipped);
        assert_eq!(OrderStatus::rollup(&[Cancelled, Completed]), Completed);
    }

    #[test]
    fn failed_payment_resets_in_place() {
        use PaymentStatus::*;
        assert!(Pending.can_transition(Failed));
        assert!(Failed.can_transition(Pending));
        assert!(!Failed.can_transition(Paid));
        assert!(Paid.can_transition(Refunded));
        assert!(!Refunded.can_transition(Pending));
    }

    #[test]
    fn shipment_returns_from_transit_or_delivery() {
        use ShipmentStatus::*;
        assert!(Preparing.can_transition(InTransit));
        assert!(InTransit.can_transition(Returned));
        assert!(Delivered.can_transition(Returned));
        assert!(!Preparing.can_transition(Delivered));
        assert!(!Returned.can_transition(InTransit));
    }

    #[test]
    fn report_workflow_is_terminal_once_reviewed() {
        use ReportStatus::*;
        assert!(Open.can_transition(Reviewing));
        assert!(Reviewing.can_transition(Resolved));
        assert!(Reviewing.can_transition(Rejected));
        assert!(!Resolved.can_transition(Reviewing));
        assert!(!Rejected.can_transition(Open));
        assert!(!Open.can_transition(Resolved));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
        assert_eq!(
            ShipmentStatus::parse("in_transit"),
            Some(ShipmentStatus::InTransit)
        );
        assert_eq!(
            PaymentMethod::parse("bank_transfer"),
            Some(PaymentMethod::BankTransfer)
        );
    }
}
