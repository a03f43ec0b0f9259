//! # Shop Agent
//!
//! Wires the protocol services for one device and runs the background tasks
//! its role needs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ShopAgent                                      │
//! │                                                                         │
//! │  shared: Backend · Database · ConfirmationBus · ShopEventEmitter       │
//! │                                                                         │
//! │  role = customer                    role = staff                       │
//! │  ───────────────                    ────────────                       │
//! │  StockSync timer                    PendingPaymentQueue timer          │
//! │  ProofOutboxProcessor timer                                            │
//! │  ConfirmationPoller per order                                          │
//! │   (resumed on start, added by watch_order)                             │
//! │                                                                         │
//! │  Every service is available in both roles for direct calls.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::actuator::ConfirmationActuator;
use crate::backend::Backend;
use crate::bus::ConfirmationBus;
use crate::checkout::Checkout;
use crate::config::{DeviceRole, ShopConfig};
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, ShopEventEmitter};
use crate::http::HttpBackend;
use crate::poller::{resume_pending, ConfirmationPoller};
use crate::proof_channel::{ProofChannel, ProofOutboxProcessor};
use crate::queue::PendingPaymentQueue;
use crate::stock_sync::StockSync;
use crate::task::TaskHandle;
use crate::tracker::OrderTracker;
use vitrina_db::Database;

/// Snapshot of what the agent is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub device_id: String,
    pub role: DeviceRole,
    pub running_tasks: Vec<&'static str>,
}

pub struct ShopAgent {
    config: Arc<ShopConfig>,
    backend: Arc<dyn Backend>,
    bus: ConfirmationBus,
    stock: StockSync,
    checkout: Checkout,
    tracker: OrderTracker,
    proofs: ProofChannel,
    outbox: ProofOutboxProcessor,
    queue: PendingPaymentQueue,
    actuator: ConfirmationActuator,
    tasks: Vec<TaskHandle>,
}

impl ShopAgent {
    pub fn new(
        config: ShopConfig,
        db: Database,
        backend: Arc<dyn Backend>,
        emitter: Arc<dyn ShopEventEmitter>,
    ) -> Self {
        let bus = ConfirmationBus::default();
        let tracker = OrderTracker::new(db.clone(), emitter.clone());
        let stock = StockSync::new(
            backend.clone(),
            db.clone(),
            config.device_id(),
            emitter.clone(),
        );
        let checkout = Checkout::new(backend.clone(), stock.clone(), tracker.clone());
        let proofs = ProofChannel::new(
            backend.clone(),
            db.clone(),
            tracker.clone(),
            config.proof.max_bytes,
        );
        let outbox = ProofOutboxProcessor::new(backend.clone(), db.clone(), emitter.clone());
        let queue =
            PendingPaymentQueue::new(backend.clone(), db, config.store.offset(), emitter);
        let actuator = ConfirmationActuator::new(backend.clone(), tracker.clone(), bus.clone());

        ShopAgent {
            config: Arc::new(config),
            backend,
            bus,
            stock,
            checkout,
            tracker,
            proofs,
            outbox,
            queue,
            actuator,
            tasks: Vec::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the background tasks for the configured role.
    pub async fn start(&mut self) -> SyncResult<()> {
        self.config.validate()?;
        let polling = &self.config.polling;

        info!(
            device_id = %self.config.device_id(),
            role = %self.config.role(),
            "Starting shop agent"
        );

        match self.config.role() {
            DeviceRole::Customer => {
                self.tasks.push(self.stock.spawn(polling.stock_refresh()));
                self.tasks.push(self.outbox.spawn(polling.proof_retry()));
                let pollers = resume_pending(
                    self.backend.clone(),
                    self.tracker.clone(),
                    &self.bus,
                    polling.confirmation_poll(),
                )
                .await?;
                debug!(count = pollers.len(), "Resumed confirmation pollers");
                self.tasks.extend(pollers);
            }
            DeviceRole::Staff => {
                self.tasks.push(self.queue.spawn(polling.queue_refresh()));
            }
        }

        info!(tasks = self.tasks.len(), "Shop agent started");
        Ok(())
    }

    /// Starts polling `order_number` for a staff decision.
    pub async fn watch_order(&mut self, order_number: &str) -> SyncResult<()> {
        let poller = ConfirmationPoller::start(
            self.backend.clone(),
            self.tracker.clone(),
            &self.bus,
            order_number,
        )
        .await?;
        self.tasks
            .push(poller.spawn(self.config.polling.confirmation_poll()));
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down shop agent");
        for task in self.tasks.drain(..) {
            match task.shutdown().await {
                Ok(()) => task.stopped().await,
                // Already finished on its own.
                Err(SyncError::ChannelError(_)) => {}
                Err(e) => debug!(task = task.name(), error = %e, "Task shutdown failed"),
            }
        }
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            device_id: self.config.device_id().to_string(),
            role: self.config.role(),
            running_tasks: self
                .tasks
                .iter()
                .filter(|t| t.is_running())
                .map(TaskHandle::name)
                .collect(),
        }
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    pub fn bus(&self) -> &ConfirmationBus {
        &self.bus
    }

    pub fn stock(&self) -> &StockSync {
        &self.stock
    }

    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn proofs(&self) -> &ProofChannel {
        &self.proofs
    }

    pub fn outbox(&self) -> &ProofOutboxProcessor {
        &self.outbox
    }

    pub fn queue(&self) -> &PendingPaymentQueue {
        &self.queue
    }

    pub fn actuator(&self) -> &ConfirmationActuator {
        &self.actuator
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for a [`ShopAgent`]. The backend defaults to [`HttpBackend`]
/// built from the config.
pub struct ShopAgentBuilder {
    config: ShopConfig,
    db: Option<Database>,
    backend: Option<Arc<dyn Backend>>,
    emitter: Option<Arc<dyn ShopEventEmitter>>,
}

impl ShopAgentBuilder {
    pub fn new(config: ShopConfig) -> Self {
        ShopAgentBuilder {
            config,
            db: None,
            backend: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn ShopEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> SyncResult<ShopAgent> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(&self.config.backend)?),
        };
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(ShopAgent::new(self.config, db, backend, emitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use vitrina_db::DbConfig;

    #[test]
    fn test_builder_requires_database() {
        let result = ShopAgentBuilder::new(ShopConfig::default()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_staff_agent_runs_queue_only() {
        let mut config = ShopConfig::default();
        config.device.role = DeviceRole::Staff;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut agent = ShopAgentBuilder::new(config)
            .with_database(db)
            .with_backend(Arc::new(FakeBackend::new()))
            .build()
            .unwrap();

        agent.start().await.unwrap();
        assert_eq!(agent.status().running_tasks, ["pending_payment_queue"]);

        agent.shutdown().await;
        assert!(agent.status().running_tasks.is_empty());
    }
}
