//! Configuration loader for the `flock-fcr` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). It also owns the growth-curve model used as the
//! synthetic weight fallback, and the layered resolution of per-flock
//! overrides onto the global curve.
use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

// ---

/// Approximate broiler growth curve: `base_kg + week * kg_per_week`.
///
/// Only used when a flock has no weight observation at or before a week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowthCurve {
    // ---
    pub base_kg: f64,
    pub kg_per_week: f64,
}

impl Default for GrowthCurve {
    fn default() -> Self {
        Self {
            base_kg: 0.04,
            kg_per_week: 0.25,
        }
    }
}

impl GrowthCurve {
    // ---
    pub fn new(base_kg: f64, kg_per_week: f64) -> Result<Self> {
        // ---
        if !is_valid_constant(base_kg) || !is_valid_constant(kg_per_week) {
            return Err(anyhow!(
                "growth curve constants must be finite and non-negative (base={base_kg}, per_week={kg_per_week})"
            ));
        }
        Ok(Self {
            base_kg,
            kg_per_week,
        })
    }

    /// Estimated average bird weight (kg) for a 1-based cohort week.
    pub fn estimate(&self, week: u32) -> f64 {
        self.base_kg + f64::from(week) * self.kg_per_week
    }

    /// Apply a flock's overrides on top of the global curve.
    ///
    /// Precedence is per field: a valid override value wins, otherwise the
    /// global value is kept. Invalid overrides are dropped with a warning.
    pub fn resolve(global: &GrowthCurve, flock: &GrowthCurveOverride) -> GrowthCurve {
        // ---
        let pick = |name: &str, over: Option<f64>, fallback: f64| match over {
            Some(v) if is_valid_constant(v) => v,
            Some(v) => {
                tracing::warn!(field = name, value = v, "ignoring invalid growth curve override");
                fallback
            }
            None => fallback,
        };

        GrowthCurve {
            base_kg: pick("base_kg", flock.base_kg, global.base_kg),
            kg_per_week: pick("kg_per_week", flock.kg_per_week, global.kg_per_week),
        }
    }
}

fn is_valid_constant(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Per-flock overrides for the growth curve. Absent fields inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct GrowthCurveOverride {
    pub base_kg: Option<f64>,
    pub kg_per_week: Option<f64>,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP server binds on all interfaces.
    pub http_port: u16,

    /// Global synthetic growth curve.
    pub growth_curve: GrowthCurve,

    /// Run approval-triggered recomputation on a spawned task.
    pub recalc_in_background: bool,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_PORT` – listen port (default: 8080)
/// - `GROWTH_CURVE_BASE_KG` – fallback curve intercept (default: 0.04)
/// - `GROWTH_CURVE_KG_PER_WEEK` – fallback curve slope (default: 0.25)
/// - `RECALC_IN_BACKGROUND` – `true`/`false` (default: true)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let http_port = u16::try_from(parse_env_u32!("HTTP_PORT", 8080))
        .map_err(|e| anyhow!("Invalid HTTP_PORT: {}", e))?;

    let defaults = GrowthCurve::default();
    let growth_curve = GrowthCurve::new(
        parse_env_f64!("GROWTH_CURVE_BASE_KG", defaults.base_kg),
        parse_env_f64!("GROWTH_CURVE_KG_PER_WEEK", defaults.kg_per_week),
    )?;

    let recalc_in_background = match env::var("RECALC_IN_BACKGROUND").as_deref() {
        Ok("0") | Ok("false") | Ok("no") => false,
        Ok("1") | Ok("true") | Ok("yes") | Err(_) => true,
        Ok(other) => return Err(anyhow!("Invalid RECALC_IN_BACKGROUND: {}", other)),
    };

    Ok(Config {
        db_url,
        db_pool_max,
        http_port,
        growth_curve,
        recalc_in_background,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  HTTP_PORT                : {}", self.http_port);
        tracing::info!("  GROWTH_CURVE_BASE_KG     : {}", self.growth_curve.base_kg);
        tracing::info!("  GROWTH_CURVE_KG_PER_WEEK : {}", self.growth_curve.kg_per_week);
        tracing::info!("  RECALC_IN_BACKGROUND     : {}", self.recalc_in_background);
    }
}

/// Replace the password portion of a connection URL with `****`.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}
