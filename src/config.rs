//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::{env, str::FromStr, time::Duration};

use crate::error::{AppErr, AppResult};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://whiteboard.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// TTL classes of the fast tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub cursor:        Duration,
    pub presence:      Duration,
    pub drawing_batch: Duration,
    pub room_state:    Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            cursor:        Duration::from_secs(2),
            presence:      Duration::from_secs(5 * 60),
            drawing_batch: Duration::from_secs(60 * 60),
            room_state:    Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Per-connection token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub per_sec: f64,
    pub burst:   f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { per_sec: 60.0, burst: 120.0 }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url:      String,
    pub bind_addr:         String,
    pub ttls:              CacheTtls,
    pub room_grace:        Duration,
    pub sweep_interval:    Duration,
    pub rate_limit:        RateLimit,
    pub outbound_capacity: usize,
    pub body_limit:        usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url:      DEFAULT_DATABASE_URL.into(),
            bind_addr:         DEFAULT_BIND_ADDR.into(),
            ttls:              CacheTtls::default(),
            room_grace:        Duration::from_secs(60),
            sweep_interval:    Duration::from_secs(30),
            rate_limit:        RateLimit::default(),
            outbound_capacity: 256,
            body_limit:        16 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let d = Self::default();
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(d.database_url),
            bind_addr:    env::var("BIND_ADDR").unwrap_or(d.bind_addr),
            ttls: CacheTtls {
                cursor:        secs("CURSOR_TTL_SECS", d.ttls.cursor)?,
                presence:      secs("PRESENCE_TTL_SECS", d.ttls.presence)?,
                drawing_batch: secs("DRAWING_BATCH_TTL_SECS", d.ttls.drawing_batch)?,
                room_state:    secs("ROOM_STATE_TTL_SECS", d.ttls.room_state)?,
            },
            room_grace:     secs("ROOM_GRACE_SECS", d.room_grace)?,
            sweep_interval: secs("SWEEP_INTERVAL_SECS", d.sweep_interval)?,
            rate_limit: RateLimit {
                per_sec: parsed("RELAY_EVENTS_PER_SEC", d.rate_limit.per_sec)?,
                burst:   parsed("RELAY_BURST", d.rate_limit.burst)?,
            },
            outbound_capacity: parsed("OUTBOUND_CAPACITY", d.outbound_capacity)?,
            body_limit:        parsed("BODY_LIMIT_BYTES", d.body_limit)?,
        })
    }
}

fn parsed<T>(key: &'static str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| AppErr::Config {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}

fn secs(key: &'static str, default: Duration) -> AppResult<Duration> {
    parsed(key, default.as_secs()).map(Duration::from_secs)
}
