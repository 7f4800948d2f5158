//! Engine configuration.
//!
//! All tunables have defaults matching live combat rules, so an empty RON
//! document `()` is a valid configuration.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::time::SimTime;

/// Tunable engine parameters.
///
/// # Example RON
///
/// ```ron
/// SimConfig(
///     gcd: 1000,
///     hook_timeout_ms: 500,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Global cooldown duration.
    pub gcd: SimTime,

    /// Cooldown category used to record the GCD.
    pub gcd_category: u32,

    /// Interrupt flag bit marking abilities that are off the GCD.
    pub gcd_bypass_flag: u32,

    /// Upper bound for a single `onCast`/`onDamage` hook, in real
    /// milliseconds.
    pub hook_timeout_ms: u64,

    /// Delay before a rotation retries after every candidate was rejected.
    pub rotation_fallback_delay: SimTime,

    /// Interval between periodic power regeneration ticks.
    pub power_regen_interval: SimTime,

    /// Mana regenerated per second, as a percentage of maximum.
    pub power_regen_percent: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            gcd: SimTime::from_millis(1500),
            gcd_category: 133,
            gcd_bypass_flag: 0x08,
            hook_timeout_ms: 10_000,
            rotation_fallback_delay: SimTime::from_millis(100),
            power_regen_interval: SimTime::from_millis(2000),
            power_regen_percent: 5,
        }
    }
}

impl SimConfig {
    /// Hook timeout as a [`Duration`].
    #[must_use]
    pub const fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    /// Parse a configuration from RON text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the text does not parse or a value is
    /// out of range.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| SimError::Config {
            message: e.to_string(),
        })?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(SimError::Config {
                message: errors.join("; "),
            });
        }

        Ok(config)
    }

    /// Load a configuration from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the file cannot be read, does not
    /// parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let path_str = path.display().to_string();

        let mut contents = String::new();
        std::fs::File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| SimError::Config {
                message: format!("{path_str}: {e}"),
            })?;

        let config = Self::from_ron_str(&contents).map_err(|e| match e {
            SimError::Config { message } => SimError::Config {
                message: format!("{path_str}: {message}"),
            },
            other => other,
        })?;

        tracing::info!(path = %path_str, gcd = %config.gcd, "Loaded simulation config");

        Ok(config)
    }

    /// Check value ranges, returning one message per problem.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.gcd_bypass_flag == 0 {
            errors.push("gcd_bypass_flag must name at least one bit".to_string());
        }
        if self.hook_timeout_ms == 0 {
            errors.push("hook_timeout_ms must be positive".to_string());
        }
        if self.rotation_fallback_delay.is_zero() {
            errors.push("rotation_fallback_delay must be positive".to_string());
        }
        if self.power_regen_interval.is_zero() {
            errors.push("power_regen_interval must be positive".to_string());
        }
        if self.power_regen_percent > 100 {
            errors.push(format!(
                "power_regen_percent must be at most 100, got {}",
                self.power_regen_percent
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.gcd, SimTime::from_millis(1500));
        assert_eq!(config.gcd_category, 133);
        assert_eq!(config.gcd_bypass_flag, 0x08);
        assert_eq!(config.hook_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let config = SimConfig::from_ron_str("(gcd: 1000, power_regen_percent: 10)").unwrap();
        assert_eq!(config.gcd, SimTime::from_millis(1000));
        assert_eq!(config.power_regen_percent, 10);
        assert_eq!(config.gcd_category, 133);

        assert_eq!(SimConfig::from_ron_str("()").unwrap(), SimConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SimConfig::from_ron_str("(gcd: 1000, haste: 30)").unwrap_err();
        assert!(matches!(err, SimError::Config { .. }));
    }

    #[test]
    fn test_validation_errors() {
        let err = SimConfig::from_ron_str("(hook_timeout_ms: 0, power_regen_percent: 150)")
            .unwrap_err();
        let SimError::Config { message } = err else {
            panic!("expected config error");
        };
        assert!(message.contains("hook_timeout_ms"));
        assert!(message.contains("power_regen_percent"));
    }

    #[test]
    fn test_missing_file() {
        let err = SimConfig::load(Path::new("/nonexistent/simcast.ron")).unwrap_err();
        assert!(matches!(err, SimError::Config { .. }));
    }
}
