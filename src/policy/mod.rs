//! Master-password policy and rate limiting.
//!
//! Structural validation is the gate: at least 12 characters with one
//! character from each of the four classes.  Everything is
//! Unicode-aware — accented letters are letters, any non-alphanumeric
//! non-whitespace character is a symbol.  Strength classification is
//! advisory feedback only, never a gate.

use std::time::{Duration, Instant};

use crate::errors::{PassCliError, Result};

/// Minimum master password length in characters.
pub const MIN_LENGTH: usize = 12;

/// Free policy failures before the cooldown kicks in.
const FREE_FAILURES: u32 = 3;

/// Cooldown between attempts once the free failures are spent.
const COOLDOWN: Duration = Duration::from_secs(5);

/// Advisory strength buckets for live feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

/// Validate a master password against the structural policy.
///
/// Fails with `WeakPassword` listing everything that is missing.
pub fn validate(password: &str) -> Result<()> {
    let mut missing = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        missing.push(format!("at least {MIN_LENGTH} characters"));
    }
    if !password.chars().any(char::is_uppercase) {
        missing.push("an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        missing.push("a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_numeric()) {
        missing.push("a digit".to_string());
    }
    if !password.chars().any(is_symbol) {
        missing.push("a symbol".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PassCliError::WeakPassword(missing))
    }
}

/// Classify a password for live feedback. Not a gate.
pub fn strength(password: &str) -> Strength {
    let length = password.chars().count();
    let classes = [
        password.chars().any(char::is_uppercase),
        password.chars().any(char::is_lowercase),
        password.chars().any(|c| c.is_numeric()),
        password.chars().any(is_symbol),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    if length >= 16 && classes == 4 {
        Strength::Strong
    } else if length >= MIN_LENGTH && classes >= 3 {
        Strength::Medium
    } else {
        Strength::Weak
    }
}

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

/// Throttle repeated policy failures: the first three are free, after
/// that each retry must wait five seconds since the last failure.
///
/// Takes explicit `Instant`s so the schedule is testable without
/// sleeping.
#[derive(Debug, Default)]
pub struct RateLimiter {
    failures: u32,
    last_failure: Option<Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an attempt is allowed at `now`.
    pub fn check(&self, now: Instant) -> Result<()> {
        if self.failures < FREE_FAILURES {
            return Ok(());
        }
        if let Some(last) = self.last_failure {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < COOLDOWN {
                let remaining = (COOLDOWN - elapsed).as_secs().max(1);
                return Err(PassCliError::PolicyCooldown(remaining));
            }
        }
        Ok(())
    }

    pub fn register_failure(&mut self, now: Instant) {
        self.failures += 1;
        self.last_failure = Some(now);
    }
}
