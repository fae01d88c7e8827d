//! The Action Dispatcher: a name-to-handler table invoked inside a step's
//! success commit (§4.7). Built once at process startup as an immutable
//! table — the dynamic-action-table design note this repo is grounded on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;
use workflow_model::OrderStatus;
use workflow_storage::{StoreError, StoreTransaction, WorkflowStore};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("order {0} is not in the expected predecessor state for this transition")]
    InvalidOrderState(Uuid),

    #[error("order {0} has non-positive amount {1}, cannot validate")]
    InvalidAmount(Uuid, f64),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// One named side effect. Handlers read committed state through `store`
/// (the precondition check) and write through `tx`, the same open
/// transaction the Step Executor will commit alongside the step's
/// `completed` status — an `Err` here aborts that commit.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(
        &self,
        store: &dyn WorkflowStore,
        tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError>;
}

struct ValidateOrder;

#[async_trait]
impl ActionHandler for ValidateOrder {
    async fn invoke(
        &self,
        store: &dyn WorkflowStore,
        tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError> {
        let order = store.get_order(order_id).await?;
        if order.amount <= 0.0 {
            return Err(ActionError::InvalidAmount(order_id, order.amount));
        }
        if order.status != OrderStatus::Pending {
            return Err(ActionError::InvalidOrderState(order_id));
        }
        tx.update_order_status(order_id, OrderStatus::Validated)
            .await?;
        Ok(())
    }
}

struct ChargePayment;

#[async_trait]
impl ActionHandler for ChargePayment {
    async fn invoke(
        &self,
        store: &dyn WorkflowStore,
        tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError> {
        let order = store.get_order(order_id).await?;
        if order.status != OrderStatus::Validated {
            return Err(ActionError::InvalidOrderState(order_id));
        }
        tx.update_order_status(order_id, OrderStatus::Charged)
            .await?;
        Ok(())
    }
}

struct ShipOrder;

#[async_trait]
impl ActionHandler for ShipOrder {
    async fn invoke(
        &self,
        store: &dyn WorkflowStore,
        tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError> {
        let order = store.get_order(order_id).await?;
        if order.status != OrderStatus::Charged {
            return Err(ActionError::InvalidOrderState(order_id));
        }
        tx.update_order_status(order_id, OrderStatus::Shipped)
            .await?;
        Ok(())
    }
}

/// No-op logger. Never touches the order or the transaction.
struct SendNotification;

#[async_trait]
impl ActionHandler for SendNotification {
    async fn invoke(
        &self,
        _store: &dyn WorkflowStore,
        _tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError> {
        info!(%order_id, "notification sent");
        Ok(())
    }
}

/// Immutable name-to-handler table.
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// The demo domain's four actions (§6): `validate_order`,
    /// `charge_payment`, `ship_order`, `send_notification`.
    pub fn with_demo_actions() -> Self {
        let mut registry = Self::new();
        registry.register("validate_order", Arc::new(ValidateOrder));
        registry.register("charge_payment", Arc::new(ChargePayment));
        registry.register("ship_order", Arc::new(ShipOrder));
        registry.register("send_notification", Arc::new(SendNotification));
        registry
    }

    /// No-op when `action` is unregistered — by design (§7).
    pub async fn dispatch(
        &self,
        action: &str,
        store: &dyn WorkflowStore,
        tx: &mut dyn StoreTransaction,
        order_id: Uuid,
    ) -> Result<(), ActionError> {
        match self.handlers.get(action) {
            Some(handler) => handler.invoke(store, tx, order_id).await,
            None => {
                debug!(action, "no handler registered for action, no-op");
                Ok(())
            }
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_demo_actions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_storage::memory::InMemoryStore;

    #[tokio::test]
    async fn validate_charge_ship_happy_path() {
        let store = InMemoryStore::new();
        let order_id = store.create_order(100.0).await.unwrap();
        let registry = ActionRegistry::with_demo_actions();

        let mut tx = store.begin().await.unwrap();
        registry
            .dispatch("validate_order", &store, &mut *tx, order_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_order(order_id).await.unwrap().status, OrderStatus::Validated);

        let mut tx = store.begin().await.unwrap();
        registry
            .dispatch("charge_payment", &store, &mut *tx, order_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_order(order_id).await.unwrap().status, OrderStatus::Charged);

        let mut tx = store.begin().await.unwrap();
        registry
            .dispatch("ship_order", &store, &mut *tx, order_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_order(order_id).await.unwrap().status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn validate_rejects_non_positive_amount() {
        let store = InMemoryStore::new();
        let order_id = store.create_order(0.0).await.unwrap();
        let registry = ActionRegistry::with_demo_actions();

        let mut tx = store.begin().await.unwrap();
        let err = registry
            .dispatch("validate_order", &store, &mut *tx, order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidAmount(_, _)));
    }

    #[tokio::test]
    async fn charge_rejects_wrong_predecessor_state() {
        let store = InMemoryStore::new();
        let order_id = store.create_order(100.0).await.unwrap();
        let registry = ActionRegistry::with_demo_actions();

        let mut tx = store.begin().await.unwrap();
        let err = registry
            .dispatch("charge_payment", &store, &mut *tx, order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidOrderState(_)));
    }

    #[tokio::test]
    async fn unregistered_action_is_a_no_op() {
        let store = InMemoryStore::new();
        let order_id = store.create_order(100.0).await.unwrap();
        let registry = ActionRegistry::with_demo_actions();

        let mut tx = store.begin().await.unwrap();
        registry
            .dispatch("delete_universe", &store, &mut *tx, order_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_order(order_id).await.unwrap().status, OrderStatus::Pending);
    }
}
