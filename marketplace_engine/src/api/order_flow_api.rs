use std::fmt::Debug;

use chrono::Utc;
use log::*;
use mp_common::Cents;

use crate::{
    api::{
        errors::OrderFlowError,
        order_objects::{OrderHistory, OrderQueryFilter, OrderStats, OrderWithItems},
    },
    db_types::{NewOrder, Order, OrderNumber, OrderStatus},
    events::{EventProducers, OrderStatusChangedEvent},
    helpers::{generate_order_number, DeliveryEstimator},
    traits::{LedgerError, MarketplaceDatabase},
};

/// How many fresh order numbers to try before giving up on a clash streak.
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// `OrderFlowApi` is the primary API for placing orders and moving them along the fulfilment state machine.
pub struct OrderFlowApi<B, E> {
    db: B,
    estimator: E,
    producers: EventProducers,
}

impl<B, E> Debug for OrderFlowApi<B, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, E> OrderFlowApi<B, E> {
    pub fn new(db: B, estimator: E, producers: EventProducers) -> Self {
        Self { db, estimator, producers }
    }
}

impl<B, E> OrderFlowApi<B, E>
where
    B: MarketplaceDatabase,
    E: DeliveryEstimator,
{
    /// Places a brand-new order.
    ///
    /// Validation happens up front: at least one line item, positive quantities, non-negative amounts, and a
    /// total that equals `subtotal + delivery_fee + tax_amount` by construction. The order, its items, and the
    /// initial `pending` tracking event are written in one transaction, so a mid-flight failure leaves nothing
    /// behind. An order-number clash (unique-constraint violation) is retried with a fresh number.
    pub async fn create_order(&self, order: NewOrder) -> Result<OrderWithItems, OrderFlowError> {
        validate_new_order(&order)?;
        let estimated_delivery_at = self.estimator.estimate(Utc::now());
        let mut attempts = 0;
        let inserted = loop {
            let order_number = generate_order_number();
            match self.db.insert_full_order(order.clone(), order_number, estimated_delivery_at).await {
                Ok(o) => break o,
                Err(LedgerError::OrderNumberClash(n)) => {
                    attempts += 1;
                    if attempts >= MAX_ORDER_NUMBER_ATTEMPTS {
                        error!("🔄️📦️ Gave up generating a unique order number after {attempts} attempts");
                        return Err(OrderFlowError::OrderNumberExhausted);
                    }
                    debug!("🔄️📦️ Order number {n} clashed, retrying with a fresh one");
                },
                Err(e) => return Err(e.into()),
            }
        };
        let items = self.db.fetch_order_items(inserted.id).await?;
        debug!(
            "🔄️📦️ Order {} created for customer {} at vendor {}. Total: {}",
            inserted.order_number, inserted.customer_id, inserted.vendor_id, inserted.total_amount
        );
        Ok(OrderWithItems { order: inserted, items })
    }

    /// Moves an order one step along the state machine.
    ///
    /// The transition must be a legal edge of the state graph, checked against the order's current status
    /// before the write. Shortcutting is not allowed: a `confirmed` order cannot jump to `delivered` without
    /// passing through the intermediate states. Exactly one tracking event is appended with the transition.
    pub async fn transition_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        message: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        let from = order.status;
        if !from.can_transition_to(new_status) {
            info!("🔄️📦️ Rejecting illegal transition {from} → {new_status} on order {}", order.order_number);
            return Err(OrderFlowError::InvalidTransition { from, to: new_status });
        }
        let message = message.unwrap_or_else(|| format!("Order status changed to {new_status}"));
        let updated = self.db.transition_order_status(order_id, from, new_status, message).await?;
        debug!("🔄️📦️ Order {} moved {from} → {new_status}", updated.order_number);
        self.call_status_changed_hook(&updated, from).await;
        Ok(updated)
    }

    /// Cancels an order. Only `pending` and `confirmed` orders can be cancelled.
    pub async fn cancel_order(&self, order_id: i64, reason: Option<String>) -> Result<Order, OrderFlowError> {
        let message = reason.unwrap_or_else(|| "Order cancelled".to_string());
        self.transition_status(order_id, OrderStatus::Cancelled, Some(message)).await
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<OrderWithItems>, OrderFlowError> {
        let Some(order) = self.db.fetch_order(order_id).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    pub async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<OrderWithItems>, OrderFlowError> {
        let Some(order) = self.db.fetch_order_by_number(number).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// The order together with its full tracking history, oldest event first.
    pub async fn order_history(&self, order_id: i64) -> Result<OrderHistory, OrderFlowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        let events = self.db.tracking_for_order(order_id).await?;
        Ok(OrderHistory { order, events })
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let orders = self.db.search_orders(query).await?;
        Ok(orders)
    }

    pub async fn order_stats(&self, query: OrderQueryFilter) -> Result<OrderStats, OrderFlowError> {
        let stats = self.db.order_stats(query).await?;
        Ok(stats)
    }

    async fn call_status_changed_hook(&self, order: &Order, old_status: OrderStatus) {
        for emitter in &self.producers.status_changed_producer {
            trace!("🔄️📦️ Notifying status changed hook subscribers");
            let event = OrderStatusChangedEvent::new(order.clone(), old_status);
            emitter.publish_event(event).await;
        }
    }
}

fn validate_new_order(order: &NewOrder) -> Result<(), OrderFlowError> {
    if order.items.is_empty() {
        return Err(OrderFlowError::Validation("An order must contain at least one item".to_string()));
    }
    for item in &order.items {
        if item.quantity < 1 {
            return Err(OrderFlowError::Validation(format!(
                "Item {} has an invalid quantity ({})",
                item.catalog_item_id, item.quantity
            )));
        }
        if item.unit_price.is_negative() {
            return Err(OrderFlowError::Validation(format!("Item {} has a negative unit price", item.catalog_item_id)));
        }
        if item.total_price != item.unit_price * item.quantity {
            return Err(OrderFlowError::Validation(format!(
                "Item {} total does not match quantity × unit price",
                item.catalog_item_id
            )));
        }
    }
    if order.delivery_fee.is_negative() || order.tax_amount.is_negative() {
        return Err(OrderFlowError::Validation("Fees may not be negative".to_string()));
    }
    let item_sum = order.items.iter().map(|i| i.total_price).sum::<Cents>();
    if order.subtotal != item_sum {
        return Err(OrderFlowError::Validation(format!(
            "Subtotal {} does not match the sum of item totals {item_sum}",
            order.subtotal
        )));
    }
    if order.delivery_address.trim().is_empty() {
        return Err(OrderFlowError::Validation("A delivery address is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use mp_common::Cents;

    use super::validate_new_order;
    use crate::db_types::{NewOrder, NewOrderItem};

    fn valid_order() -> NewOrder {
        NewOrder::new(1, 2, "12 Harbour Rd")
            .with_item(NewOrderItem::new(10, 2, Cents::from_major(125)))
            .with_fees(Cents::from_major(20), Cents::from(1350))
    }

    #[test]
    fn accepts_a_well_formed_order() {
        assert!(validate_new_order(&valid_order()).is_ok());
    }

    #[test]
    fn rejects_empty_orders() {
        let order = NewOrder::new(1, 2, "12 Harbour Rd");
        assert!(validate_new_order(&order).is_err());
    }

    #[test]
    fn rejects_zero_quantity() {
        let mut order = valid_order();
        order.items[0].quantity = 0;
        assert!(validate_new_order(&order).is_err());
    }

    #[test]
    fn rejects_tampered_subtotal() {
        let mut order = valid_order();
        order.subtotal = order.subtotal + Cents::from(1);
        assert!(validate_new_order(&order).is_err());
    }
}
