//! Orchestrator configuration
//!
//! Defaults reproduce the production tuning: 50 Hz turns, a 7 s grace
//! period for missing votes and a one second cool-down after a failed turn.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sharespace_core::{Rect, StrategySettings, Turn, TurnClock};
use sharespace_solver::SolverConfig;
use sharespace_state::StatePositions;
use sharespace_time::{BucketConfig, TickConfig, TimingStrategy};
use sharespace_vote::{FairnessConfig, SelectionStrategy};
use thiserror::Error;

pub const ENV_TURN_PERIOD: &str = "SHARESPACE_TURN_PERIOD";
pub const ENV_GRACE_PERIOD: &str = "SHARESPACE_GRACE_PERIOD";
pub const ENV_SELECTION: &str = "SHARESPACE_SELECTION";
pub const ENV_TIMING: &str = "SHARESPACE_TIMING";
pub const ENV_LOG_LEVEL: &str = "SHARESPACE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SHARESPACE_LOG_FORMAT";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    // Parse errors
    #[error("{var}: invalid duration {value:?}: {reason}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    // Validation errors
    #[error("Turn period must be at least one millisecond")]
    TurnPeriodTooShort,

    #[error("Play area must have positive size")]
    EmptyPlayArea,

    #[error("Regular offset {0} does not fit inside the play area")]
    OffsetOutOfBounds(f64),

    #[error("Minimum execution time must be positive")]
    NonPositiveExecution,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Subscriber settings for [`crate::init_logging`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = LoggingConfig::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.format = match format.trim().to_ascii_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidValue {
                        var: ENV_LOG_FORMAT,
                        reason: format!("unknown log format: {other}"),
                    })
                }
            };
        }
        Ok(config)
    }
}

/// Conflict orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Length of one turn
    pub turn_period: Duration,
    /// Play area bounds
    pub bounds: Rect,
    /// Inset of the defocus corners from the bounds
    pub regular_offset: f64,
    /// Wait this long for missing votes before deciding without them
    pub grace_period: Duration,
    /// Cool-down while votes are missing
    pub missing_votes_cooldown: Turn,
    /// Cool-down after a turn that found no transition
    pub failure_cooldown: Duration,
    pub min_preparation_turns: Turn,
    /// Shift applied to every emitted event
    pub execution_delay_turns: Turn,
    pub min_execution_ms: f64,
    /// Transition records included in each state summary
    pub past_transitions: usize,
    pub selection: SelectionStrategy,
    pub timing: TimingStrategy,
    pub fairness: FairnessConfig,
    pub buckets: BucketConfig,
    pub solver: SolverConfig,
    pub ticks: TickConfig,
    /// Settings in effect before the operator sends any
    pub settings: StrategySettings,
    pub logging: LoggingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            turn_period: Duration::from_millis(20),
            bounds: Rect::default(),
            regular_offset: 0.5,
            grace_period: Duration::from_secs(7),
            missing_votes_cooldown: 5,
            failure_cooldown: Duration::from_secs(1),
            min_preparation_turns: 6,
            execution_delay_turns: 2,
            min_execution_ms: 360.0,
            past_transitions: 3,
            selection: SelectionStrategy::default(),
            timing: TimingStrategy::default(),
            fairness: FairnessConfig::default(),
            buckets: BucketConfig::default(),
            solver: SolverConfig::default(),
            ticks: TickConfig::default(),
            settings: StrategySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// 100 Hz turns for interactive sessions
    pub fn fast_turns() -> Self {
        OrchestratorConfig {
            turn_period: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Decide on whatever votes are present and never cool down. Used by
    /// scenario tests that drive turns by hand.
    pub fn deterministic() -> Self {
        OrchestratorConfig {
            grace_period: Duration::ZERO,
            missing_votes_cooldown: 0,
            failure_cooldown: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn with_turn_period(mut self, period: Duration) -> Self {
        self.turn_period = period;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_bounds(mut self, bounds: Rect, regular_offset: f64) -> Self {
        self.bounds = bounds;
        self.regular_offset = regular_offset;
        self
    }

    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_timing(mut self, timing: TimingStrategy) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_settings(mut self, settings: StrategySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(&self) -> TurnClock {
        TurnClock::new(self.turn_period)
    }

    pub fn positions(&self) -> StatePositions {
        StatePositions::new(self.bounds, self.regular_offset)
    }

    /// Failure cool-down in whole turns
    pub fn failure_cooldown_turns(&self) -> Turn {
        self.clock().ms_to_turns(self.failure_cooldown.as_secs_f64() * 1000.0)
    }

    /// Read overrides from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, starting from the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = OrchestratorConfig::default();

        if let Some(value) = lookup(ENV_TURN_PERIOD) {
            config.turn_period = parse_duration(ENV_TURN_PERIOD, &value)?;
        }
        if let Some(value) = lookup(ENV_GRACE_PERIOD) {
            config.grace_period = parse_duration(ENV_GRACE_PERIOD, &value)?;
        }
        if let Some(value) = lookup(ENV_SELECTION) {
            config.selection = value
                .parse()
                .map_err(|reason| ConfigError::InvalidValue { var: ENV_SELECTION, reason })?;
        }
        if let Some(value) = lookup(ENV_TIMING) {
            config.timing = value
                .parse()
                .map_err(|reason| ConfigError::InvalidValue { var: ENV_TIMING, reason })?;
        }
        config.logging = LoggingConfig::from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.turn_period < Duration::from_millis(1) {
            return Err(ConfigError::TurnPeriodTooShort);
        }
        let (w, h) = (self.bounds.width(), self.bounds.height());
        if w <= 0.0 || h <= 0.0 {
            return Err(ConfigError::EmptyPlayArea);
        }
        if self.regular_offset < 0.0 || self.regular_offset * 2.0 >= w.min(h) {
            return Err(ConfigError::OffsetOutOfBounds(self.regular_offset));
        }
        if self.min_execution_ms <= 0.0 {
            return Err(ConfigError::NonPositiveExecution);
        }
        Ok(())
    }
}

fn parse_duration(var: &'static str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
