//! # Application State
//!
//! What every command gets access to.
//!
//! ## State Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           AppState                                      │
//! │                                                                         │
//! │  ┌──────────────────────┐   lifecycle only: start, watch_order,        │
//! │  │ Mutex<ShopAgent>     │   shutdown, status                           │
//! │  └──────────────────────┘                                              │
//! │                                                                         │
//! │  Service handles (cheap clones sharing the agent's state):             │
//! │  ┌──────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐ ┌───────┐ ┌────────┐ │
//! │  │ stock    │ │ checkout │ │ tracker │ │ proofs │ │ queue │ │actuator│ │
//! │  └──────────┘ └──────────┘ └─────────┘ └────────┘ └───────┘ └────────┘ │
//! │                                                                         │
//! │  Commands never hold the agent lock while talking to the backend.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;

use vitrina_sync::{
    AgentStatus, Checkout, ConfirmationActuator, OrderTracker, PendingPaymentQueue, ProofChannel,
    ShopAgent, ShopConfig, StockSync, SyncResult,
};

pub struct AppState {
    agent: Mutex<ShopAgent>,
    config: Arc<ShopConfig>,
    pub stock: StockSync,
    pub checkout: Checkout,
    pub tracker: OrderTracker,
    pub proofs: ProofChannel,
    pub queue: PendingPaymentQueue,
    pub actuator: ConfirmationActuator,
}

impl AppState {
    pub fn new(agent: ShopAgent) -> Self {
        AppState {
            config: Arc::new(agent.config().clone()),
            stock: agent.stock().clone(),
            checkout: agent.checkout().clone(),
            tracker: agent.tracker().clone(),
            proofs: agent.proofs().clone(),
            queue: agent.queue().clone(),
            actuator: agent.actuator().clone(),
            agent: Mutex::new(agent),
        }
    }

    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    /// Starts the background tasks for the configured role.
    pub async fn start(&self) -> SyncResult<()> {
        self.agent.lock().await.start().await
    }

    pub async fn watch_order(&self, order_number: &str) -> SyncResult<()> {
        self.agent.lock().await.watch_order(order_number).await
    }

    pub async fn status(&self) -> AgentStatus {
        self.agent.lock().await.status()
    }

    pub async fn shutdown(&self) {
        self.agent.lock().await.shutdown().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vitrina_core::{ContactFields, ProductSnapshot};
    use vitrina_db::{Database, DbConfig};
    use vitrina_sync::testing::FakeBackend;
    use vitrina_sync::{DeviceRole, NoOpEmitter, ShopAgent, ShopConfig};

    use super::AppState;

    pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    async fn state_for(backend: Arc<FakeBackend>, role: DeviceRole) -> AppState {
        let mut config = ShopConfig::default();
        config.device.role = role;
        config.store.utc_offset_minutes = Some(0);

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AppState::new(ShopAgent::new(config, db, backend, Arc::new(NoOpEmitter)))
    }

    /// A customer device over a fresh backend holding `products` at 10.00.
    pub async fn customer_state(products: &[(&str, i64)]) -> (AppState, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new());
        backend.set_products(
            products
                .iter()
                .map(|(id, stock)| ProductSnapshot::new(*id, format!("Product {id}"), 1000, Decimal::from(*stock)))
                .collect(),
        );
        (state_for(backend.clone(), DeviceRole::Customer).await, backend)
    }

    /// A staff desk sharing `backend`.
    pub async fn staff_state(backend: &Arc<FakeBackend>) -> AppState {
        state_for(backend.clone(), DeviceRole::Staff).await
    }

    pub fn contact() -> ContactFields {
        ContactFields {
            name: "Ana Quispe".into(),
            phone: "+51 987 654 321".into(),
            address: "Av. Arequipa 123".into(),
            document_id: None,
            notes: None,
        }
    }
}
