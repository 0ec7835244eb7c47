use std::time::Duration;

use crate::error::LifeError;
use crate::grid::{GridDimensions, Seeding};
use crate::rules::Pattern;

// Defaults
pub const GRID_SIZE: u32 = 64;
pub const TICK_INTERVAL_MS: u64 = 33;
pub const LIVE_PROBABILITY: f64 = 0.4;
pub const WINDOW_SIZE: u32 = 512;

// Environment overrides
pub const ENV_GRID_SIZE: &str = "LIFE_GRID_SIZE";
pub const ENV_TICK_MS: &str = "LIFE_TICK_MS";
pub const ENV_LIVE_PROBABILITY: &str = "LIFE_LIVE_PROBABILITY";
pub const ENV_SEED: &str = "LIFE_SEED";
pub const ENV_PATTERN: &str = "LIFE_PATTERN";
pub const ENV_OVERLAY: &str = "LIFE_OVERLAY";

#[derive(Debug, Clone, PartialEq)]
pub struct LifeConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub tick_interval: Duration,
    pub seeding: Seeding,
    pub show_overlay: bool,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            grid_width: GRID_SIZE,
            grid_height: GRID_SIZE,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            seeding: Seeding::Random {
                probability: LIVE_PROBABILITY,
                seed: None,
            },
            show_overlay: true,
        }
    }
}

impl LifeConfig {
    /// Defaults overridden by the `LIFE_*` environment variables.
    pub fn from_env() -> Result<Self, LifeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LifeError> {
        let mut config = Self::default();

        if let Some(size) = parse::<u32>(&lookup, ENV_GRID_SIZE)? {
            config.grid_width = size;
            config.grid_height = size;
        }
        if let Some(ms) = parse::<u64>(&lookup, ENV_TICK_MS)? {
            config.tick_interval = Duration::from_millis(ms);
        }

        let probability = parse::<f64>(&lookup, ENV_LIVE_PROBABILITY)?.unwrap_or(LIVE_PROBABILITY);
        let seed = parse::<u64>(&lookup, ENV_SEED)?;
        config.seeding = Seeding::Random { probability, seed };
        // Checked here too, since a pattern below replaces it.
        config.seeding.validate()?;

        if let Some(name) = lookup(ENV_PATTERN) {
            let pattern = Pattern::from_name(&name).ok_or_else(|| {
                let known: Vec<&str> = Pattern::ALL.iter().map(|p| p.name()).collect();
                LifeError::Config(format!(
                    "{ENV_PATTERN}: unknown pattern {name:?}, expected one of {}",
                    known.join(", ")
                ))
            })?;
            config.seeding = Seeding::Pattern(pattern);
        }

        if let Some(flag) = lookup(ENV_OVERLAY) {
            config.show_overlay = match flag.trim() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                other => {
                    return Err(LifeError::Config(format!(
                        "{ENV_OVERLAY}: expected 0 or 1, got {other:?}"
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LifeError> {
        let dims = self.dimensions()?;
        if dims.width() != dims.height() {
            return Err(LifeError::Config(format!(
                "grid must be square, got {}x{}",
                dims.width(),
                dims.height()
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(LifeError::Config("tick interval must be positive".to_string()));
        }
        self.seeding.validate()
    }

    pub fn dimensions(&self) -> Result<GridDimensions, LifeError> {
        GridDimensions::new(self.grid_width, self.grid_height)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, LifeError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| LifeError::Config(format!("{key}={raw:?}: {err}")))
        })
        .transpose()
}
