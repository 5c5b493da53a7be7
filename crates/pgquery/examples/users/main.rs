//! Users and wallets: builders, the service layer and fused pagination.
//!
//! Run with:
//!   cargo run --example users -p pgquery
//!
//! Connection settings come from `DATABASE_URL`, or from `DB_HOST`,
//! `DB_USERNAME`, `DB_PASSWORD`, `DB_NAME` and `DB_SSL_MODE` (a `.env` file
//! works for both).

use pgquery::prelude::*;
use pgquery::{JsonAggOptions, SoftDelete};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Default, Clone, Record, Serialize, Deserialize)]
#[record(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
struct User {
    id: i64,
    name: String,
    email: String,
    #[record(special = "generated")]
    is_deleted: bool,
}

#[derive(Debug, Default, Clone, Record)]
#[record(rename_all = "camelCase")]
struct Wallet {
    id: i64,
    user_id: i64,
    balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserWithWallets {
    id: i64,
    name: String,
    wallets: serde_json::Value,
}

fn print_sql(label: &str, built: &BuiltQuery) {
    println!("[{label}]");
    println!("  SQL:    {}", built.sql);
    println!("  params: {}", built.args.len());
    println!();
}

fn demo_builders() -> OrmResult<()> {
    let mut active = SelectBuilder::for_record::<User>("users");
    active
        .where_and([("is_deleted", Condition::eq(false))])
        .where_or([
            Filter::from([("name", Condition::ilike("a%"))]),
            Filter::from([("email", Condition::like("%@example.com"))]),
        ])
        .order_by(["name"], true)
        .set_limit(20);
    print_sql("select", &active.build()?);

    let mut rich = SelectBuilder::new("wallets");
    rich.select(["user_id"])
        .where_and([("balance", Condition::gt(1_000_i64))]);
    let mut with_rich = SelectBuilder::aliased("users", "u");
    with_rich
        .select(["u.id", "u.name"])
        .where_and([("u.is_deleted", Condition::eq(false))])
        .with_cte("rich", &rich)
        .join("rich", "rich.user_id = u.id");
    print_sql("cte", &with_rich.build()?);

    let mut update = UpdateBuilder::new("wallets");
    update
        .increment([("balance", Param::new(50_i64))])
        .where_and([("user_id", Condition::eq(1_i64))]);
    print_sql("increment", &update.build()?);

    Ok(())
}

fn connect() -> OrmResult<deadpool_postgres::Pool> {
    match env::var("DATABASE_URL") {
        Ok(url) => create_pool(&url),
        Err(_) => DbConfig::from_env()?.pool(),
    }
}

#[tokio::main]
async fn main() -> OrmResult<()> {
    dotenvy::dotenv().ok();

    println!("=== SQL generation ===\n");
    demo_builders()?;

    let pool = match connect() {
        Ok(pool) => pool,
        Err(err) => {
            println!("no database configured ({err}); skipping live demo");
            return Ok(());
        }
    };

    let mut service = RelationalService::new(pool.clone());
    service.debug(2);

    service.execute("DROP TABLE IF EXISTS wallets").await?;
    service.execute("DROP TABLE IF EXISTS users").await?;
    service
        .execute(
            "CREATE TABLE users (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await?;
    service
        .execute(
            "CREATE TABLE wallets (
                id BIGINT PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                balance BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await?;

    println!("=== service ===\n");

    let users: Vec<User> = ["ada", "bob", "cy"]
        .into_iter()
        .map(|name| User {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            ..User::default()
        })
        .collect();
    let created: Vec<User> = service
        .insert_many_returning(
            "users",
            &users,
            &ReturningConfig::new(["id", "name", "email", "is_deleted"]),
        )
        .await?;
    println!("inserted {} users", created.len());

    // Each user gets a wallet inside one transaction.
    let owners: Vec<i64> = created.iter().map(|u| u.id).collect();
    let wallets = use_transactions(&pool, |tx| async move {
        let svc = RelationalService::for_transaction(tx);
        let wallets: Vec<Wallet> = owners
            .iter()
            .map(|user_id| Wallet {
                user_id: *user_id,
                balance: 100,
                ..Wallet::default()
            })
            .collect();
        svc.insert_batch("wallets", &wallets).await
    })
    .await?;
    println!("copied {wallets} wallets");

    let first = created[0].id;
    service
        .update_one_with_data("users", [("id", Condition::eq(first))], SoftDelete::default())
        .await?;

    let mut page = SelectBuilder::aliased("users", "u");
    page.select(["u.id", "u.name"])
        .left_join("wallets w", "w.user_id = u.id")
        .select_json_coalesce(
            "wallets",
            [("id", "w.id"), ("balance", "w.balance")],
            "'[]'::jsonb",
            JsonAggOptions::array().condition("w.id IS NOT NULL"),
        )
        .where_and([("u.is_deleted", Condition::eq(false))])
        .group_by(["u.id"])
        .paginate(&Pagination::new(1, 10).sort("u.name", 1));
    let result: PaginationResult<UserWithWallets> =
        service.select_paginated(&page.build()?).await?;
    println!("page: {} of {} users", result.data.len(), result.total_records);
    for user in &result.data {
        println!("  {} {} wallets={}", user.id, user.name, user.wallets);
    }

    let remaining = service
        .count_with_filter("users", [("is_deleted", Condition::eq(false))])
        .await?;
    println!("active users: {remaining}");

    Ok(())
}
