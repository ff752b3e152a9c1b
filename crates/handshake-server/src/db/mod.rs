// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable Record Store (spec §4.3): a typed repository over Postgres.

pub mod challenges;
pub mod models;
pub mod sessions;
pub mod users;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open a connection pool and run pending migrations.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(20).connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
