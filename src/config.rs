//! Machine configuration.
//!
//! Defaults describe the stock console. [`MachineConfig::from_env`] layers
//! `CHIPCADE_SEED` and `CHIPCADE_BUDGET` on top; the binaries then apply
//! their command-line flags.

use std::env;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 0x0C41_9CAD;

/// Frame length in milliseconds (60 Hz, rounded down).
pub const DEFAULT_FRAME_DELTA_MS: u32 = 16;

pub const DEFAULT_DISPLAY_WIDTH: u16 = 320;
pub const DEFAULT_DISPLAY_HEIGHT: u16 = 200;

/// Fonts the headless scene knows about.
pub const DEFAULT_FONTS: [&str; 3] = ["square", "mono", "pixel"];

pub const SEED_ENV: &str = "CHIPCADE_SEED";
pub const BUDGET_ENV: &str = "CHIPCADE_BUDGET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Seed for the `RAND` generator.
    pub rng_seed: u64,
    /// Milliseconds subtracted from timer countdowns each frame.
    pub frame_delta_ms: u32,
    /// Maximum instructions per pass; `None` runs until the code stops.
    pub instruction_budget: Option<u64>,
    pub display_width: u16,
    pub display_height: u16,
    /// Lower-case font names accepted by `FNTSET`.
    pub fonts: Vec<String>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rng_seed: DEFAULT_SEED,
            frame_delta_ms: DEFAULT_FRAME_DELTA_MS,
            instruction_budget: None,
            display_width: DEFAULT_DISPLAY_WIDTH,
            display_height: DEFAULT_DISPLAY_HEIGHT,
            fonts: DEFAULT_FONTS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl MachineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_vars(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Unparsable values are ignored with a warning.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(SEED_ENV) {
            match parse_u64(&raw) {
                Some(seed) => self.rng_seed = seed,
                None => crate::warn!("ignoring {SEED_ENV}={raw}: not a number"),
            }
        }
        if let Some(raw) = lookup(BUDGET_ENV) {
            match parse_u64(&raw) {
                Some(0) => self.instruction_budget = None,
                Some(budget) => self.instruction_budget = Some(budget),
                None => crate::warn!("ignoring {BUDGET_ENV}={raw}: not a number"),
            }
        }
        self
    }

    pub fn display_size(&self) -> (u16, u16) {
        (self.display_width, self.display_height)
    }
}

/// Decimal or `0x` hexadecimal.
pub fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => text.replace('_', "").parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.rng_seed, DEFAULT_SEED);
        assert_eq!(config.frame_delta_ms, 16);
        assert_eq!(config.display_size(), (320, 200));
        assert!(config.instruction_budget.is_none());
        assert!(config.fonts.iter().any(|f| f == "square"));
    }

    #[test]
    fn env_overrides() {
        let config = MachineConfig::default()
            .with_vars(vars(&[(SEED_ENV, "0xBEEF"), (BUDGET_ENV, "10_000")]));
        assert_eq!(config.rng_seed, 0xBEEF);
        assert_eq!(config.instruction_budget, Some(10_000));
    }

    #[test]
    fn bad_or_zero_values() {
        let config = MachineConfig::default()
            .with_vars(vars(&[(SEED_ENV, "lots"), (BUDGET_ENV, "0")]));
        assert_eq!(config.rng_seed, DEFAULT_SEED);
        assert_eq!(config.instruction_budget, None);
    }
}
