//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions. Everything is a plain function taking
//! a `&mut SqliteConnection`, so callers can acquire a connection from the pool, or open a
//! transaction and pass `&mut *tx`, and compose these calls without any other changes.

use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod actors;
pub mod commissions;
pub mod dispatch;
pub mod orders;
pub mod payments;
pub mod stock;

const SQLITE_DB_URL: &str = "sqlite://data/fulfillment.db";

pub fn db_url() -> String {
    let result = env::var("MFB_DATABASE_URL").unwrap_or_else(|_| {
        info!("MFB_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

/// Idempotent DDL bootstrap. Every statement is `IF NOT EXISTS`, so running it against an
/// existing database is a no-op.
async fn apply_schema(pool: &SqlitePool) -> Result<(), SqlxError> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL UNIQUE,
    customer_id TEXT NOT NULL,
    fulfiller_id TEXT NULL,
    shop_id TEXT NULL,
    kind TEXT NOT NULL,
    category TEXT NULL,
    status TEXT NOT NULL DEFAULT 'Placed',
    line_total INTEGER NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    origin_lat REAL NOT NULL,
    origin_lon REAL NOT NULL,
    destination_lat REAL NOT NULL,
    destination_lon REAL NOT NULL,
    search_radius_km REAL NOT NULL DEFAULT 0,
    search_attempts INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);

CREATE TABLE IF NOT EXISTS order_status_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    status TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    actor TEXT NOT NULL,
    note TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_order ON order_status_history (order_id);

CREATE TABLE IF NOT EXISTS dispatch_notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    actor_id TEXT NOT NULL,
    round INTEGER NOT NULL,
    notified_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    response TEXT NOT NULL DEFAULT 'Pending',
    responded_at TIMESTAMP NULL
);

CREATE INDEX IF NOT EXISTS idx_dispatch_order ON dispatch_notifications (order_id, response);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL UNIQUE REFERENCES orders (order_id),
    method TEXT NOT NULL,
    destination TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'Pending',
    amount INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS commission_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    actor_id TEXT NOT NULL,
    amount INTEGER NOT NULL,
    destination TEXT NOT NULL,
    rate_permille INTEGER NOT NULL,
    commission INTEGER NOT NULL,
    owner_earning INTEGER NOT NULL,
    obligation_status TEXT NOT NULL,
    due_date TIMESTAMP NULL,
    paid_date TIMESTAMP NULL,
    paid_proof TEXT NULL,
    last_reminder_at TIMESTAMP NULL,
    payout_id TEXT NULL,
    payout_status TEXT NULL,
    reversal_of INTEGER NULL REFERENCES commission_records (id),
    settled_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commissions_obligation ON commission_records (obligation_status, due_date);

CREATE TABLE IF NOT EXISTS actors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    display_name TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    is_available INTEGER NOT NULL DEFAULT 1,
    service_categories TEXT NOT NULL DEFAULT '',
    current_assignments INTEGER NOT NULL DEFAULT 0,
    completed_orders INTEGER NOT NULL DEFAULT 0,
    total_earnings INTEGER NOT NULL DEFAULT 0,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_actors_geo ON actors (kind, is_available, latitude, longitude);

CREATE TABLE IF NOT EXISTS product_stock (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    shop_id TEXT NOT NULL,
    product_id TEXT NOT NULL UNIQUE,
    quantity INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    product_id TEXT NOT NULL,
    quantity INTEGER NOT NULL
);
"#;
