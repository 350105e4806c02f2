// src/config.rs

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("PROCTOR_WARN_THRESHOLD ({warn}) must be below PROCTOR_TERMINATE_THRESHOLD ({terminate})")]
    Thresholds { warn: u32, terminate: u32 },
}

/// Points added to the weighted violation score per severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityWeights {
    pub minor: u32,
    pub major: u32,
    pub critical: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            minor: 1,
            major: 3,
            critical: 7,
        }
    }
}

/// Escalation policy applied by the proctor monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProctorPolicy {
    pub weights: SeverityWeights,
    pub warn_threshold: u32,
    pub terminate_threshold: u32,
    /// A single critical event terminates immediately.
    pub critical_short_circuit: bool,
}

impl Default for ProctorPolicy {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            warn_threshold: 5,
            terminate_threshold: 15,
            critical_short_circuit: false,
        }
    }
}

impl ProctorPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warn_threshold >= self.terminate_threshold {
            return Err(ConfigError::Thresholds {
                warn: self.warn_threshold,
                terminate: self.terminate_threshold,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Award proportional credit on multi-select questions with no wrong pick.
    pub partial_credit: bool,
}

/// Everything the exam core needs to run attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamPolicy {
    pub proctor: ProctorPolicy,
    pub scoring: ScoringPolicy,
    pub shuffle_questions: bool,
}

impl Default for ExamPolicy {
    fn default() -> Self {
        Self {
            proctor: ProctorPolicy::default(),
            scoring: ScoringPolicy::default(),
            shuffle_questions: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the in-memory stores are used.
    pub database_url: Option<String>,
    /// JSON question bank loaded into the in-memory store.
    pub question_bank_path: Option<PathBuf>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub sweep_interval: Duration,
    pub policy: ExamPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let proctor = ProctorPolicy {
            weights: SeverityWeights {
                minor: parse_or("PROCTOR_WEIGHT_MINOR", 1)?,
                major: parse_or("PROCTOR_WEIGHT_MAJOR", 3)?,
                critical: parse_or("PROCTOR_WEIGHT_CRITICAL", 7)?,
            },
            warn_threshold: parse_or("PROCTOR_WARN_THRESHOLD", 5)?,
            terminate_threshold: parse_or("PROCTOR_TERMINATE_THRESHOLD", 15)?,
            critical_short_circuit: parse_or("PROCTOR_CRITICAL_SHORT_CIRCUIT", false)?,
        };
        proctor.validate()?;

        let policy = ExamPolicy {
            proctor,
            scoring: ScoringPolicy {
                partial_credit: parse_or("SCORING_PARTIAL_CREDIT", false)?,
            },
            shuffle_questions: parse_or("SHUFFLE_QUESTIONS", true)?,
        };

        Ok(Self {
            database_url,
            question_bank_path: env::var_os("QUESTION_BANK_PATH").map(PathBuf::from),
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 3600)?,
            rust_log,
            bind_addr: parse_or("BIND_ADDR", parse_default_addr())?,
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 15u64)?.max(1)),
            policy,
        })
    }
}

fn parse_default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Reads `key` from the environment, falling back to `default` when unset.
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
