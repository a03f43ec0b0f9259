//! # Cart Repository
//!
//! Persists the customer's cart so it survives a restart.
//!
//! The cart is written as a whole snapshot: every mutation in the core
//! returns a new `Cart`, and `replace` swaps the stored lines for it in one
//! transaction. Line order is kept in the `position` column.

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use vitrina_core::{Cart, CartLine, Money, Promotion};

#[derive(Debug, FromRow)]
struct CartLineRow {
    product_id: String,
    name: String,
    unit_price_cents: i64,
    quantity: i64,
    stock: i64,
    promotion: Option<String>,
}

impl CartLineRow {
    fn into_line(self) -> DbResult<CartLine> {
        let promotion = match self.promotion {
            Some(json) => Some(
                serde_json::from_str::<Promotion>(&json)
                    .map_err(|e| DbError::corrupt("cart_lines.promotion", e))?,
            ),
            None => None,
        };

        Ok(CartLine {
            product_id: self.product_id,
            name: self.name,
            unit_price: Money::from_cents(self.unit_price_cents),
            quantity: self.quantity,
            stock: self.stock,
            promotion,
        })
    }
}

/// Repository for the `cart_lines` table.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Loads the stored cart for `session_id`. An unknown session is an
    /// empty cart.
    pub async fn load(&self, session_id: &str) -> DbResult<Cart> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            r#"
            SELECT product_id, name, unit_price_cents, quantity, stock, promotion
            FROM cart_lines
            WHERE session_id = ?1
            ORDER BY position
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(CartLineRow::into_line)
            .collect::<DbResult<Vec<_>>>()?;

        debug!(session_id = %session_id, lines = lines.len(), "Cart loaded");
        Ok(Cart::from_lines(lines))
    }

    /// Replaces the stored cart for `session_id` with `cart`.
    pub async fn replace(&self, session_id: &str, cart: &Cart) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_lines WHERE session_id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        for (position, line) in cart.lines().iter().enumerate() {
            let promotion = line
                .promotion
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| DbError::corrupt("cart_lines.promotion", e))?;

            sqlx::query(
                r#"
                INSERT INTO cart_lines (
                    session_id, position, product_id, name,
                    unit_price_cents, quantity, stock, promotion, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(session_id)
            .bind(position as i64)
            .bind(&line.product_id)
            .bind(&line.name)
            .bind(line.unit_price.cents())
            .bind(line.quantity)
            .bind(line.stock)
            .bind(promotion)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            session_id = %session_id,
            lines = cart.item_count(),
            "Cart saved"
        );
        Ok(())
    }

    pub async fn clear(&self, session_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cart_lines WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        debug!(session_id = %session_id, "Cart cleared");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use rust_decimal::Decimal;
    use vitrina_core::ProductSnapshot;

    async fn repo() -> CartRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().carts()
    }

    fn product(id: &str, price_cents: i64, stock: i64) -> ProductSnapshot {
        ProductSnapshot::new(id, id, price_cents, Decimal::from(stock))
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let repo = repo().await;
        assert!(repo.load("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_and_load_keeps_order_and_promotion() {
        let repo = repo().await;
        let promo = Promotion {
            id: "p1".to_string(),
            label: "10% off".to_string(),
            discount_bps: 1000,
        };

        let cart = Cart::new()
            .add(&product("B", 500, 3))
            .unwrap()
            .add(&product("A", 1000, 5).with_promotion(promo.clone()))
            .unwrap()
            .increase("B")
            .unwrap();

        repo.replace("s1", &cart).await.unwrap();
        let loaded = repo.load("s1").await.unwrap();

        assert_eq!(loaded, cart);
        assert_eq!(loaded.lines()[0].product_id, "B");
        assert_eq!(loaded.lines()[0].quantity, 2);
        assert_eq!(loaded.lines()[1].promotion, Some(promo));
    }

    #[tokio::test]
    async fn test_replace_overwrites_previous_snapshot() {
        let repo = repo().await;

        let first = Cart::new().add(&product("A", 100, 5)).unwrap();
        repo.replace("s1", &first).await.unwrap();

        let second = first.remove("A").unwrap().add(&product("C", 200, 1)).unwrap();
        repo.replace("s1", &second).await.unwrap();

        let loaded = repo.load("s1").await.unwrap();
        assert_eq!(loaded.item_count(), 1);
        assert!(loaded.line("A").is_none());
        assert!(loaded.line("C").is_some());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let repo = repo().await;

        repo.replace("s1", &Cart::new().add(&product("A", 100, 5)).unwrap())
            .await
            .unwrap();
        repo.replace("s2", &Cart::new().add(&product("B", 100, 5)).unwrap())
            .await
            .unwrap();

        repo.clear("s1").await.unwrap();

        assert!(repo.load("s1").await.unwrap().is_empty());
        assert!(repo.load("s2").await.unwrap().line("B").is_some());
    }
}
