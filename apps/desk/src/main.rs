//! # Vitrina Desk Entry Point
//!
//! The actual setup is in lib.rs so the command layer stays testable.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vitrina_desk_lib::run().await
}
