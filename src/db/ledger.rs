use crate::models::{ExitReason, OrderRecord, OrderSide, TradeRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Append-only store of closed trades and placed orders
///
/// Both writes are durable once the returned future resolves. There is no
/// update or delete.
pub trait TradeLedger {
    fn record(&self, trade: &TradeRecord) -> impl Future<Output = Result<()>> + Send;

    fn record_order(&self, order: &OrderRecord) -> impl Future<Output = Result<()>> + Send;
}

/// SQLite-backed ledger
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if needed) the database and apply migrations
    ///
    /// # Arguments
    /// * `database_url` - e.g. "sqlite://trades.db" or "sqlite::memory:"
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // A single long-lived connection: writes are serialised and an
        // in-memory database survives for the life of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Trade ledger ready at {}", database_url);

        Ok(Self { pool })
    }

    /// Load every closed trade, oldest first
    pub async fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, entry_time, entry_price, quantity,
                   exit_time, exit_price, exit_reason, profit_loss
            FROM trades
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());

        for row in rows {
            let exit_reason_str: String = row.try_get("exit_reason")?;
            let exit_reason = match exit_reason_str.as_str() {
                "target reached" => ExitReason::TargetReached,
                "stop loss hit" => ExitReason::StopLossHit,
                other => {
                    return Err(sqlx::Error::Decode(
                        format!("invalid exit reason: {}", other).into(),
                    )
                    .into())
                }
            };
            let quantity: i64 = row.try_get("quantity")?;

            trades.push(TradeRecord {
                symbol: row.try_get("symbol")?,
                entry_time: row.try_get::<DateTime<Utc>, _>("entry_time")?,
                entry_price: row.try_get("entry_price")?,
                quantity: quantity as u64,
                exit_time: row.try_get::<DateTime<Utc>, _>("exit_time")?,
                exit_price: row.try_get("exit_price")?,
                exit_reason,
                profit_loss: row.try_get("profit_loss")?,
            });
        }

        Ok(trades)
    }

    /// Number of orders logged
    pub async fn order_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Close the pool, flushing pending work
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Trade ledger closed");
    }
}

impl TradeLedger for SqliteLedger {
    async fn record(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                symbol, entry_time, entry_price, quantity,
                exit_time, exit_price, exit_reason, profit_loss
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.symbol)
        .bind(trade.entry_time)
        .bind(trade.entry_price)
        .bind(trade.quantity as i64)
        .bind(trade.exit_time)
        .bind(trade.exit_price)
        .bind(trade.exit_reason.as_str())
        .bind(trade.profit_loss)
        .execute(&self.pool)
        .await?;

        tracing::debug!(symbol = %trade.symbol, pnl = trade.profit_loss, "Recorded trade");

        Ok(())
    }

    async fn record_order(&self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, symbol, side, order_time, price, quantity, reason)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.order_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.order_time)
        .bind(order.price)
        .bind(order.quantity as i64)
        .bind(&order.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-process ledger, for simulations that should leave no files behind
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    trades: Arc<Mutex<Vec<TradeRecord>>>,
    orders: Arc<Mutex<Vec<OrderRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Orders on one side only
    pub fn orders_for(&self, side: OrderSide) -> Vec<OrderRecord> {
        self.orders()
            .into_iter()
            .filter(|o| o.side == side)
            .collect()
    }
}

impl TradeLedger for MemoryLedger {
    async fn record(&self, trade: &TradeRecord) -> Result<()> {
        if let Ok(mut trades) = self.trades.lock() {
            trades.push(trade.clone());
        }
        Ok(())
    }

    async fn record_order(&self, order: &OrderRecord) -> Result<()> {
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(order.clone());
        }
        Ok(())
    }
}
