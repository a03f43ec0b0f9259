//! # Command Line Interface
//!
//! `vitrina-desk <command>`: every subcommand is a thin wrapper over one
//! function in [`commands`](crate::commands). Results are printed to stdout
//! as JSON; logs go to stderr.
//!
//! ```text
//! vitrina-desk stock                      refresh and list sellable products
//! vitrina-desk cart | add | set | remove  cart operations
//! vitrina-desk checkout --method wallet   place the order
//! vitrina-desk proof V-0042 receipt.png   attach the payment proof
//! vitrina-desk pay V-0042 35.00           simulated card payment
//! vitrina-desk track V-0042 [--follow]    order status (until decided)
//! vitrina-desk queue                      pending payments (staff)
//! vitrina-desk confirm <sale-id>          confirm a payment (staff)
//! vitrina-desk reject <sale-id>           reject a payment (staff)
//! vitrina-desk watch                      run the background tasks
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::commands;
use crate::error::ApiError;
use crate::state::AppState;
use vitrina_core::{ContactFields, Money, PaymentMethod, PaymentProof};
use vitrina_sync::DeviceRole;

#[derive(Debug, Parser)]
#[command(name = "vitrina-desk", version, about = "Vitrina storefront and operations desk")]
pub struct Cli {
    /// Config file (defaults to vitrina.toml in the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured device role
    #[arg(long, global = true, value_enum)]
    pub role: Option<RoleArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Customer,
    Staff,
}

impl From<RoleArg> for DeviceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Customer => DeviceRole::Customer,
            RoleArg::Staff => DeviceRole::Staff,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    BankTransfer,
    Wallet,
    Card,
}

impl From<MethodArg> for PaymentMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::BankTransfer => PaymentMethod::BankTransfer,
            MethodArg::Wallet => PaymentMethod::Wallet,
            MethodArg::Card => PaymentMethod::Card,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh stock and list sellable products
    Stock,

    /// Show the cart
    Cart,

    /// Add one unit of a product to the cart
    Add { product_id: String },

    /// Set a cart line's quantity (0 removes it)
    Set { product_id: String, quantity: i64 },

    /// Remove a line from the cart
    Remove { product_id: String },

    /// Empty the cart
    Clear,

    /// Place the order for the current cart
    Checkout {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        document_id: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, value_enum)]
        method: MethodArg,
    },

    /// Attach a payment proof image to an order
    Proof { order_number: String, file: PathBuf },

    /// Complete a card order with a simulated charge
    Pay {
        order_number: String,
        /// Amount in major units, e.g. 35.00
        amount: String,
        #[arg(long)]
        reference: Option<String>,
    },

    /// Show an order's status
    Track {
        order_number: String,
        /// Keep polling until staff decides
        #[arg(long)]
        follow: bool,
    },

    /// List payments waiting for validation
    Queue,

    /// Confirm a sale's payment
    Confirm { sale_id: String },

    /// Reject a sale's payment on this desk
    Reject { sale_id: String },

    /// Run the background tasks for the configured role until ctrl-c
    Watch,

    /// Show the configuration
    Config,
}

/// Runs one subcommand against `state`.
pub async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Stock => {
            commands::refresh_stock(state).await?;
            print_json(&commands::get_products(state).await?)
        }
        Command::Cart => print_json(&commands::get_cart(state).await?),
        Command::Add { product_id } => {
            commands::refresh_stock(state).await?;
            print_json(&commands::add_to_cart(state, &product_id).await?)
        }
        Command::Set {
            product_id,
            quantity,
        } => {
            commands::refresh_stock(state).await?;
            print_json(&commands::set_quantity(state, &product_id, quantity).await?)
        }
        Command::Remove { product_id } => {
            print_json(&commands::remove_from_cart(state, &product_id).await?)
        }
        Command::Clear => print_json(&commands::clear_cart(state).await?),
        Command::Checkout {
            name,
            phone,
            address,
            document_id,
            notes,
            method,
        } => {
            let contact = ContactFields {
                name,
                phone,
                address,
                document_id,
                notes,
            };
            print_json(&commands::submit_order(state, &contact, method.into()).await?)
        }
        Command::Proof { order_number, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mime = PaymentProof::guess_mime(&file.to_string_lossy());
            let response = commands::upload_proof(state, &order_number, mime, bytes).await?;
            print_json(&response)
        }
        Command::Pay {
            order_number,
            amount,
            reference,
        } => {
            let amount = parse_amount(&amount)?;
            print_json(
                &commands::complete_card_payment(state, &order_number, amount, reference).await?,
            )
        }
        Command::Track {
            order_number,
            follow,
        } => track(state, &order_number, follow).await,
        Command::Queue => print_json(&commands::get_pending_payments(state).await?),
        Command::Confirm { sale_id } => print_json(&commands::confirm_payment(state, &sale_id).await?),
        Command::Reject { sale_id } => print_json(&commands::reject_payment(state, &sale_id).await?),
        Command::Watch => watch(state).await,
        Command::Config => print_json(&commands::get_config(state)),
    }
}

/// Prints the order, then (with `follow`) every status change until the
/// order is decided or ctrl-c.
async fn track(state: &AppState, order_number: &str, follow: bool) -> anyhow::Result<()> {
    let mut current = commands::get_order(state, order_number).await?;
    print_json(&current)?;

    if !follow || current.entry.status.is_terminal() {
        return Ok(());
    }
    if current.entry.awaits_confirmation() {
        state.watch_order(order_number).await.map_err(ApiError::from)?;
    }

    let period = state.config().polling.confirmation_poll();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tokio::time::sleep(period) => {}
        }

        let next = commands::get_order(state, order_number).await?;
        if next.entry.status != current.entry.status {
            print_json(&next)?;
        }
        if next.entry.status.is_terminal() {
            return Ok(());
        }
        current = next;
    }
}

async fn watch(state: &AppState) -> anyhow::Result<()> {
    state.start().await.map_err(ApiError::from)?;
    print_json(&commands::get_status(state).await)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Interrupted");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses an amount in major units into cents.
pub fn parse_amount(raw: &str) -> Result<Money, ApiError> {
    Decimal::from_str(raw.trim())
        .ok()
        .and_then(Money::from_decimal)
        .ok_or_else(|| ApiError::validation(format!("Invalid amount: '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("35.00").unwrap(), Money::from_cents(3500));
        assert_eq!(parse_amount(" 12.5 ").unwrap(), Money::from_cents(1250));
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_cli_parses_checkout() {
        let cli = Cli::try_parse_from([
            "vitrina-desk",
            "--role",
            "customer",
            "checkout",
            "--name",
            "Ana",
            "--phone",
            "+51 987 654 321",
            "--address",
            "Av. Arequipa 123",
            "--method",
            "bank-transfer",
        ])
        .unwrap();

        assert!(matches!(cli.role, Some(RoleArg::Customer)));
        match cli.command {
            Command::Checkout { method, name, .. } => {
                assert_eq!(PaymentMethod::from(method), PaymentMethod::BankTransfer);
                assert_eq!(name, "Ana");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_staff_commands() {
        let cli = Cli::try_parse_from(["vitrina-desk", "confirm", "sale-1"]).unwrap();
        assert!(matches!(cli.command, Command::Confirm { ref sale_id } if sale_id == "sale-1"));

        let cli = Cli::try_parse_from(["vitrina-desk", "track", "V-0001", "--follow"]).unwrap();
        assert!(matches!(cli.command, Command::Track { follow: true, .. }));
    }
}
