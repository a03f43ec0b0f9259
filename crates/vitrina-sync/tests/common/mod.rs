//! Shared setup for the protocol integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use vitrina_core::{ContactFields, ProductSnapshot};
use vitrina_db::{Database, DbConfig};
use vitrina_sync::testing::{FakeBackend, RecordingEmitter};
use vitrina_sync::{DeviceRole, ShopAgent, ShopConfig};

/// One device: its own local store, sharing the backend with the others.
pub struct Device {
    pub agent: ShopAgent,
    pub db: Database,
    pub events: Arc<RecordingEmitter>,
}

pub async fn device(backend: &Arc<FakeBackend>, role: DeviceRole) -> Device {
    let mut config = ShopConfig::default();
    config.device.role = role;
    config.store.utc_offset_minutes = Some(0);

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let events = Arc::new(RecordingEmitter::default());
    let agent = ShopAgent::new(config, db.clone(), backend.clone(), events.clone());

    Device { agent, db, events }
}

pub fn backend_with(products: &[(&str, i64)]) -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    backend.set_products(
        products
            .iter()
            .map(|(id, stock)| ProductSnapshot::new(*id, format!("Product {id}"), 1000, Decimal::from(*stock)))
            .collect(),
    );
    backend
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

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
