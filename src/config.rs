use std::{str::FromStr, time::Duration};

/// What to do when a caller reaches an operation the object store cannot express.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behaviour {
    /// Return `FSError::Fatal`; the caller's harness is expected to abort on it.
    FailFast,
    /// Log a warning and return `FSError::NotImplemented`.
    Report,
    /// Pretend the call succeeded.
    Ignore,
}

impl FromStr for Behaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "panic" => Ok(Behaviour::FailFast),
            "report" | "warn" => Ok(Behaviour::Report),
            "ignore" => Ok(Behaviour::Ignore),
            other => Err(format!("unknown behaviour: {}", other)),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub behaviour: Behaviour,
    pub retry: RetryPolicy,
    /// When false `rename` only copies, leaving the source in place.
    pub delete_source_on_rename: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            behaviour: Behaviour::Report,
            retry: RetryPolicy::default(),
            delete_source_on_rename: true,
        }
    }
}

impl Config {
    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            ..Default::default()
        }
    }
}
