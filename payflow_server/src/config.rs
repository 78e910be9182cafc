use std::{env, str::FromStr, time::Duration};

use log::*;
use payflow_engine::{RelayConfig, WorkerConfig};
use pf_common::parse_boolean_flag;

const DEFAULT_PF_HOST: &str = "127.0.0.1";
const DEFAULT_PF_PORT: u16 = 3000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_BATCH_SIZE: i64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;
const DEFAULT_METRICS_INTERVAL_MS: u64 = 10_000;
const DEFAULT_BROKER_PARTITIONS: usize = 4;
const DEFAULT_PAYMENT_FAILURE_RATE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Relay sleep between polls when the outbox is empty.
    pub poll_interval_ms: u64,
    /// Outbox rows the relay drains per tick.
    pub batch_size: i64,
    /// Worker attempts per delivery before dead-lettering.
    pub max_retries: u32,
    /// Worker sleep between attempts.
    pub retry_backoff_ms: u64,
    /// Period of the worker's METRICS snapshot.
    pub metrics_interval_ms: u64,
    /// Partition count of the embedded broker.
    pub broker_partitions: usize,
    /// Share of payments the built-in payment service declines.
    pub payment_failure_rate: f64,
    /// When set, the built-in payment service only raises transient failures. Poison drills.
    pub payment_always_transient: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PF_HOST.to_string(),
            port: DEFAULT_PF_PORT,
            database_url: String::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL_MS,
            broker_partitions: DEFAULT_BROKER_PARTITIONS,
            payment_failure_rate: DEFAULT_PAYMENT_FAILURE_RATE,
            payment_always_transient: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("PF_HOST").ok().unwrap_or_else(|| DEFAULT_PF_HOST.into());
        let database_url = env::var("PF_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("PF_DATABASE_URL is not set. Please set it to the URL for the PayFlow database.");
            String::default()
        });
        Self {
            host,
            port: env_or_default("PF_PORT", DEFAULT_PF_PORT),
            database_url,
            poll_interval_ms: env_or_default("PF_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            batch_size: env_or_default("PF_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            max_retries: env_or_default("PF_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            retry_backoff_ms: env_or_default("PF_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS),
            metrics_interval_ms: env_or_default("PF_METRICS_INTERVAL_MS", DEFAULT_METRICS_INTERVAL_MS),
            broker_partitions: env_or_default("PF_BROKER_PARTITIONS", DEFAULT_BROKER_PARTITIONS),
            payment_failure_rate: env_or_default("PF_PAYMENT_FAILURE_RATE", DEFAULT_PAYMENT_FAILURE_RATE),
            payment_always_transient: parse_boolean_flag(env::var("PF_PAYMENT_ALWAYS_TRANSIENT").ok(), false),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            batch_size: self.batch_size,
            error_backoff: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            poll_timeout: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    <T as FromStr>::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("{s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
