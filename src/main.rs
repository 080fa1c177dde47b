// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Oura-cache operator CLI
//!
//! Authorizes against the Oura API, fetches health data through the local
//! cache, and maintains the cache file.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use oura_cache::{
    config::Config,
    db::metadata_keys,
    error::AppError,
    models::{
        DailyActivity, DailyReadiness, DailySleep, DateRange, EntityType, HealthEntity,
        HeartRateSample,
    },
    services::{HealthService, TokenProvider},
    DataLayer,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Debug, Parser)]
#[command(name = "oura-cache", version, about = "Cached access to Oura health data")]
struct Cli {
    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the OAuth consent URL
    AuthorizeUrl {
        /// Opaque state echoed back to the redirect URI (random if omitted)
        #[arg(long)]
        state: Option<String>,
    },
    /// Exchange an authorization code for a stored credential
    ExchangeCode { code: String },
    /// Revoke the stored credential
    Revoke,
    /// Fetch records through the cache and print them as JSON
    Fetch {
        /// sleep, readiness, activity or heart_rate
        entity: EntityType,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Drop cached rows for the range before fetching
        #[arg(long)]
        refresh: bool,
    },
    /// Delete expired cache rows
    Sweep,
    /// Summarize cache contents and credential state
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.pretty);

    if let Err(e) = run(cli.command).await {
        match e.downcast_ref::<AppError>() {
            Some(app) => {
                let report = serde_json::to_string(&app.report()).unwrap_or_else(|_| app.to_string());
                eprintln!("{report}");
            }
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let layer = DataLayer::connect(config)?;
    tracing::debug!(cache = %layer.config.cache_path().display(), "Data layer ready");

    match command {
        Command::AuthorizeUrl { state } => {
            let state = state.unwrap_or_else(random_state);
            let url = layer.tokens.authorization_url(&state).ok_or_else(|| {
                anyhow::anyhow!("OAuth client settings are not configured (a personal access token is in use)")
            })?;
            println!("{url}");
        }
        Command::ExchangeCode { code } => {
            let credential = layer.tokens.exchange_code(&code).await?;
            print_json(&json!({
                "token_type": credential.token_type,
                "expires_at": credential.expires_at,
                "has_refresh_token": credential.refresh_token.is_some(),
            }))?;
        }
        Command::Revoke => {
            layer.tokens.revoke(None).await?;
            println!("revoked");
        }
        Command::Fetch {
            entity,
            start,
            end,
            refresh,
        } => {
            let range = match (start, end) {
                (Some(s), Some(e)) => Some(DateRange::new(s, e)),
                (Some(d), None) | (None, Some(d)) => Some(DateRange::single(d)),
                (None, None) => None,
            };
            let records = match entity {
                EntityType::Sleep => fetch::<DailySleep>(&layer.health, range, refresh).await?,
                EntityType::Readiness => {
                    fetch::<DailyReadiness>(&layer.health, range, refresh).await?
                }
                EntityType::Activity => fetch::<DailyActivity>(&layer.health, range, refresh).await?,
                EntityType::HeartRate => {
                    fetch::<HeartRateSample>(&layer.health, range, refresh).await?
                }
            };
            print_json(&records)?;
        }
        Command::Sweep => {
            let removed = layer.store.sweep_expired()?;
            print_json(&json!({ "removed": removed }))?;
        }
        Command::Status => {
            let mut entities = serde_json::Map::new();
            for (entity, rows) in layer.store.entry_counts()? {
                let last_sync = layer
                    .store
                    .get_metadata(&metadata_keys::last_sync(entity))?
                    .map(|m| m.value);
                entities.insert(
                    entity.to_string(),
                    json!({ "rows": rows, "last_sync": last_sync }),
                );
            }
            let credential = layer.store.load_credential()?.map(|c| {
                json!({
                    "token_type": c.token_type,
                    "expires_at": c.expires_at,
                    "has_refresh_token": c.refresh_token.is_some(),
                })
            });
            print_json(&json!({
                "cache_path": layer.config.cache_path(),
                "schema_version": layer.store.schema_version()?,
                "entities": entities,
                "credential": credential,
            }))?;
        }
    }
    Ok(())
}

async fn fetch<T: HealthEntity>(
    health: &HealthService,
    range: Option<DateRange>,
    refresh: bool,
) -> anyhow::Result<Value> {
    let records: Vec<T> = if refresh {
        health.refresh(range).await?
    } else {
        health.fetch(range).await?
    };
    Ok(serde_json::to_value(records)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Initialize structured logging on stderr; stdout carries command output.
fn init_logging(pretty: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("oura_cache=debug,info"));

    let format = if pretty {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_current_span(true)
            .flatten_event(true)
            .boxed()
    };

    tracing_subscriber::registry().with(filter).with(format).init();
}
