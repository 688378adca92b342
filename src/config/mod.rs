//! Queue configuration.
//!
//! [`QueueConfig`] can be built in code or deserialized from JSON. The idle
//! grace period is written as a number of seconds, where a negative value
//! means "never stop", zero means "stop as soon as the backlog is
//! harvested", and a positive value is the wait before stopping.
//!
//! ```
//! use std::time::Duration;
//! use slotqueue::config::{IdleGrace, QueueConfig};
//!
//! let config = QueueConfig::from_json(r#"{ "idle_grace": 0.5, "worker_name": "thumbs" }"#).unwrap();
//! assert_eq!(config.idle_grace, IdleGrace::After(Duration::from_millis(500)));
//! assert_eq!(config.worker_name, "thumbs");
//! assert_eq!(config.initial_capacity, 16);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a [`QueueConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid queue configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// How long a queue keeps its worker after every task has been harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum IdleGrace {
    /// Keep the worker until the queue is disposed explicitly.
    #[default]
    Never,
    /// Stop on the tick that harvests the last task.
    Immediate,
    /// Stop once the backlog has stayed empty for longer than this.
    After(Duration),
}

impl IdleGrace {
    /// Converts the seconds encoding: negative is `Never`, zero is
    /// `Immediate`, positive is `After`. NaN, infinities and waits too long
    /// for a [`Duration`] are `Never`.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs == 0.0 {
            Self::Immediate
        } else if secs > 0.0 {
            Duration::try_from_secs_f64(secs).map_or(Self::Never, Self::After)
        } else {
            Self::Never
        }
    }

    /// Inverse of [`from_secs_f64`](Self::from_secs_f64); `Never` is `-1.0`.
    pub fn as_secs_f64(self) -> f64 {
        match self {
            Self::Never => -1.0,
            Self::Immediate => 0.0,
            Self::After(wait) => wait.as_secs_f64(),
        }
    }
}

impl From<f64> for IdleGrace {
    fn from(secs: f64) -> Self {
        Self::from_secs_f64(secs)
    }
}

impl From<IdleGrace> for f64 {
    fn from(grace: IdleGrace) -> f64 {
        grace.as_secs_f64()
    }
}

impl From<Duration> for IdleGrace {
    fn from(wait: Duration) -> Self {
        if wait.is_zero() {
            Self::Immediate
        } else {
            Self::After(wait)
        }
    }
}

/// Settings for a [`BackgroundTaskQueue`](crate::background::BackgroundTaskQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Backlog slots allocated when the worker starts (at least 4).
    pub initial_capacity: usize,

    /// Grace period used by [`submit`](crate::background::BackgroundTaskQueue::submit).
    pub idle_grace: IdleGrace,

    /// Name given to the worker thread.
    pub worker_name: String,
}

impl QueueConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if the input is not valid JSON or a
    /// field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            idle_grace: IdleGrace::Never,
            worker_name: String::from("slotqueue-worker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_from_seconds() {
        assert_eq!(IdleGrace::from_secs_f64(-1.0), IdleGrace::Never);
        assert_eq!(IdleGrace::from_secs_f64(0.0), IdleGrace::Immediate);
        assert_eq!(
            IdleGrace::from_secs_f64(0.2),
            IdleGrace::After(Duration::from_millis(200))
        );
        assert_eq!(IdleGrace::from_secs_f64(f64::NAN), IdleGrace::Never);
        assert_eq!(IdleGrace::from_secs_f64(f64::INFINITY), IdleGrace::Never);
        assert_eq!(IdleGrace::from_secs_f64(1e30), IdleGrace::Never);
    }

    #[test]
    fn grace_from_duration() {
        assert_eq!(IdleGrace::from(Duration::ZERO), IdleGrace::Immediate);
        assert_eq!(
            IdleGrace::from(Duration::from_secs(3)),
            IdleGrace::After(Duration::from_secs(3))
        );
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(QueueConfig::from_json("{}").unwrap(), QueueConfig::default());
    }

    #[test]
    fn negative_grace_means_never() {
        let config = QueueConfig::from_json(r#"{"idle_grace": -5}"#).unwrap();
        assert_eq!(config.idle_grace, IdleGrace::Never);
    }

    #[test]
    fn oversized_grace_means_never() {
        let config = QueueConfig::from_json(r#"{"idle_grace": 1e30}"#).unwrap();
        assert_eq!(config.idle_grace, IdleGrace::Never);
    }

    #[test]
    fn serializes_grace_as_seconds() {
        let config = QueueConfig {
            idle_grace: IdleGrace::After(Duration::from_millis(1500)),
            ..QueueConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["idle_grace"], 1.5);
        assert_eq!(json["initial_capacity"], 16);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = QueueConfig::from_json(r#"{"initial_capacity": "lots"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().starts_with("invalid queue configuration"));
    }
}
