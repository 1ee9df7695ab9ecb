use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{CustomerId, DomainError, DomainResult, Entity, OrderId, ProductId, ValueObject};

use crate::state_machine::{OrderStateMachine, OrderStatus};

const ORDER_NO_PREFIX: &str = "ORD";
const ORDER_NO_MAX_LEN: usize = 64;

/// Globally unique, human-facing order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNo(String);

impl OrderNo {
    /// `ORD` + order-time epoch millis + an opaque unique token.
    pub fn generate(order_time: DateTime<Utc>, token: &str) -> Self {
        Self(format!(
            "{ORDER_NO_PREFIX}{}{token}",
            order_time.timestamp_millis()
        ))
    }

    /// Accept a caller-supplied order number (used as an idempotency key).
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("order_no cannot be empty"));
        }
        if trimmed.len() > ORDER_NO_MAX_LEN {
            return Err(DomainError::validation(format!(
                "order_no cannot exceed {ORDER_NO_MAX_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(DomainError::validation(
                "order_no may only contain ASCII letters, digits, '-' and '_'",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for OrderNo {}

impl core::fmt::Display for OrderNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A requested line before pricing: product + quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Validate requested lines and bring them into lock order.
///
/// Duplicate products are merged by summing quantities; the result is sorted by
/// ascending product id so every order acquires per-product locks in the same
/// sequence.
pub fn normalize_lines(lines: &[OrderLineRequest]) -> DomainResult<Vec<OrderLineRequest>> {
    if lines.is_empty() {
        return Err(DomainError::validation("order items cannot be empty"));
    }

    let mut merged: BTreeMap<ProductId, i64> = BTreeMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        let entry = merged.entry(line.product_id).or_insert(0);
        *entry = entry
            .checked_add(line.quantity)
            .ok_or_else(|| DomainError::validation("quantity overflows"))?;
    }

    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| OrderLineRequest {
            product_id,
            quantity,
        })
        .collect())
}

/// A priced line item. `unit_price` is snapshotted when the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub item_amount: u64,
}

impl OrderItem {
    pub fn priced(
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
        unit_price: u64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let item_amount = unit_price
            .checked_mul(quantity as u64)
            .ok_or_else(|| DomainError::validation("item amount overflows"))?;
        Ok(Self {
            order_id,
            product_id,
            quantity,
            unit_price,
            item_amount,
        })
    }
}

impl ValueObject for OrderItem {}

/// Order record with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_no: OrderNo,
    customer_id: CustomerId,
    order_time: DateTime<Utc>,
    total_amount: u64,
    status: OrderStatus,
    items: Vec<OrderItem>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order in CREATED status. The total is derived from the items.
    pub fn create(
        id: OrderId,
        order_no: OrderNo,
        customer_id: CustomerId,
        order_time: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("order items cannot be empty"));
        }
        if let Some(stray) = items.iter().find(|item| item.order_id != id) {
            return Err(DomainError::validation(format!(
                "item for product {} belongs to another order",
                stray.product_id
            )));
        }
        let total_amount = total_of(&items)?;
        Ok(Self {
            id,
            order_no,
            customer_id,
            order_time,
            total_amount,
            status: OrderStatus::Created,
            items,
            updated_at: order_time,
        })
    }

    /// Rebuild an order from persisted rows.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        order_no: OrderNo,
        customer_id: CustomerId,
        order_time: DateTime<Utc>,
        total_amount: u64,
        status: OrderStatus,
        items: Vec<OrderItem>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_no,
            customer_id,
            order_time,
            total_amount,
            status,
            items,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_no(&self) -> &OrderNo {
        &self.order_no
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn order_time(&self) -> DateTime<Utc> {
        self.order_time
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fail with `AlreadyTerminal` if nothing may happen to this order any more.
    pub fn ensure_not_terminal(&self) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::already_terminal(self.id, self.status));
        }
        Ok(())
    }

    /// Apply a validated status transition. Returns the previous status.
    pub fn transition_to(&mut self, requested: OrderStatus, at: DateTime<Utc>) -> DomainResult<OrderStatus> {
        let previous = self.status;
        self.status = OrderStateMachine::transition(previous, requested)?;
        self.updated_at = at;
        Ok(previous)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn total_of(items: &[OrderItem]) -> DomainResult<u64> {
    items.iter().try_fold(0u64, |acc, item| {
        acc.checked_add(item.item_amount)
            .ok_or_else(|| DomainError::validation("order total overflows"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn test_order(items: &[(ProductId, i64, u64)]) -> Order {
        let order_id = OrderId::new();
        let items = items
            .iter()
            .map(|(p, q, price)| OrderItem::priced(order_id, *p, *q, *price).unwrap())
            .collect();
        Order::create(
            order_id,
            OrderNo::generate(test_time(), "1"),
            CustomerId::new(),
            test_time(),
            items,
        )
        .unwrap()
    }

    #[test]
    fn order_no_embeds_time_and_token() {
        let no = OrderNo::generate(test_time(), "000042");
        assert_eq!(no.as_str(), format!("ORD{}000042", test_time().timestamp_millis()));
    }

    #[test]
    fn order_no_parse_validates_shape() {
        assert!(OrderNo::parse("ORD-abc_1").is_ok());
        assert!(OrderNo::parse("  ").is_err());
        assert!(OrderNo::parse("ORD 1").is_err());
        assert!(OrderNo::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn total_is_sum_of_snapshotted_line_amounts() {
        let order = test_order(&[(ProductId::new(), 2, 150), (ProductId::new(), 3, 1_000)]);
        assert_eq!(order.total_amount(), 2 * 150 + 3 * 1_000);
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.items()[0].item_amount, 300);
    }

    #[test]
    fn empty_orders_are_rejected() {
        let err = Order::create(
            OrderId::new(),
            OrderNo::generate(test_time(), "1"),
            CustomerId::new(),
            test_time(),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn items_from_another_order_are_rejected() {
        let item = OrderItem::priced(OrderId::new(), ProductId::new(), 1, 10).unwrap();
        let err = Order::create(
            OrderId::new(),
            OrderNo::generate(test_time(), "1"),
            CustomerId::new(),
            test_time(),
            vec![item],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("another order")));
    }

    #[test]
    fn price_overflow_is_a_validation_error() {
        let err = OrderItem::priced(OrderId::new(), ProductId::new(), 3, u64::MAX / 2).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn normalize_merges_duplicates_and_sorts_by_product() {
        let a = ProductId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ProductId::new();
        let lines = normalize_lines(&[
            OrderLineRequest { product_id: b, quantity: 1 },
            OrderLineRequest { product_id: a, quantity: 2 },
            OrderLineRequest { product_id: b, quantity: 4 },
        ])
        .unwrap();
        assert_eq!(
            lines,
            vec![
                OrderLineRequest { product_id: a, quantity: 2 },
                OrderLineRequest { product_id: b, quantity: 5 },
            ]
        );
    }

    #[test]
    fn normalize_rejects_empty_and_non_positive() {
        assert!(normalize_lines(&[]).is_err());
        let err = normalize_lines(&[OrderLineRequest {
            product_id: ProductId::new(),
            quantity: 0,
        }])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must be positive")));
    }

    #[test]
    fn transition_to_goes_through_state_machine() {
        let mut order = test_order(&[(ProductId::new(), 1, 10)]);
        assert!(order.transition_to(OrderStatus::Shipping, test_time()).is_err());
        assert_eq!(order.status(), OrderStatus::Created);

        let previous = order.transition_to(OrderStatus::Paid, test_time()).unwrap();
        assert_eq!(previous, OrderStatus::Created);
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn terminal_orders_report_already_terminal() {
        let mut order = test_order(&[(ProductId::new(), 1, 10)]);
        order.transition_to(OrderStatus::Cancelled, test_time()).unwrap();
        let err = order.ensure_not_terminal().unwrap_err();
        assert!(matches!(err, DomainError::AlreadyTerminal { status, .. } if status == "CANCELLED"));
    }
}
