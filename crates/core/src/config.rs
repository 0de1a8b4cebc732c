//! Runtime configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Prefix of every environment variable read by [`Config::from_env`].
const ENV_PREFIX: &str = "FLIPCHAIN_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Initial client width in pixels.
    pub width: u32,
    /// Initial client height in pixels.
    pub height: u32,
    /// Window title; frame statistics are appended to it.
    pub title: String,
    /// Number of swap-chain back buffers.
    pub back_buffer_count: u32,
    /// How long the loop sleeps per iteration while paused.
    pub paused_sleep: Duration,
    /// Attach the driver diagnostic messenger.
    pub enable_validation: bool,
    /// Queue driver warnings as fatal diagnostics.
    pub warnings_as_errors: bool,
    /// Multisample count that must be supported at startup.
    pub msaa_samples: u32,
    /// Default render-target clear color (RGBA).
    pub clear_color: [f32; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "flipchain".to_string(),
            back_buffer_count: 2,
            paused_sleep: Duration::from_millis(100),
            enable_validation: cfg!(debug_assertions),
            warnings_as_errors: false,
            msaa_samples: 4,
            clear_color: [0.0, 0.2, 0.4, 1.0],
        }
    }
}

impl Config {
    /// Defaults overlaid with `FLIPCHAIN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable name.
    ///
    /// Recognized keys: `FLIPCHAIN_WIDTH`, `FLIPCHAIN_HEIGHT`,
    /// `FLIPCHAIN_TITLE`, `FLIPCHAIN_BACK_BUFFERS`, `FLIPCHAIN_PAUSED_SLEEP_MS`,
    /// `FLIPCHAIN_VALIDATION`, `FLIPCHAIN_WARNINGS_AS_ERRORS`,
    /// `FLIPCHAIN_MSAA_SAMPLES` and `FLIPCHAIN_CLEAR_COLOR` (`r,g,b,a`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(value) = get("WIDTH") {
            config.width = parse("WIDTH", &value)?;
        }
        if let Some(value) = get("HEIGHT") {
            config.height = parse("HEIGHT", &value)?;
        }
        if let Some(value) = get("TITLE") {
            config.title = value;
        }
        if let Some(value) = get("BACK_BUFFERS") {
            config.back_buffer_count = parse("BACK_BUFFERS", &value)?;
        }
        if let Some(value) = get("PAUSED_SLEEP_MS") {
            config.paused_sleep = Duration::from_millis(parse("PAUSED_SLEEP_MS", &value)?);
        }
        if let Some(value) = get("VALIDATION") {
            config.enable_validation = parse_bool("VALIDATION", &value)?;
        }
        if let Some(value) = get("WARNINGS_AS_ERRORS") {
            config.warnings_as_errors = parse_bool("WARNINGS_AS_ERRORS", &value)?;
        }
        if let Some(value) = get("MSAA_SAMPLES") {
            config.msaa_samples = parse("MSAA_SAMPLES", &value)?;
        }
        if let Some(value) = get("CLEAR_COLOR") {
            config.clear_color = parse_color(&value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the values the presenter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.back_buffer_count < 2 {
            return Err(Error::Config(format!(
                "back buffer count must be at least 2, got {}",
                self.back_buffer_count
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.msaa_samples.is_power_of_two() {
            return Err(Error::Config(format!(
                "MSAA sample count must be a power of two, got {}",
                self.msaa_samples
            )));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{}{}: invalid value {:?}", ENV_PREFIX, name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{}{}: expected a boolean, got {:?}",
            ENV_PREFIX, name, value
        ))),
    }
}

fn parse_color(value: &str) -> Result<[f32; 4]> {
    let parts = value
        .split(',')
        .map(|part| parse::<f32>("CLEAR_COLOR", part))
        .collect::<Result<Vec<_>>>()?;

    <[f32; 4]>::try_from(parts).map_err(|parts| {
        Error::Config(format!(
            "{}CLEAR_COLOR: expected 4 components, got {}",
            ENV_PREFIX,
            parts.len()
        ))
    })
}
