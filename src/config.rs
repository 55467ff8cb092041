use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult, anyhow};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::workspace::LayoutMode;

#[derive(Parser, Clone, Debug)]
pub struct CliParams {
    /// Finnhub API token used for symbol search, quotes, and the trade stream
    #[clap(long = "token", env = "FINNHUB_TOKEN")]
    pub token: String,

    /// Price alert bands in format SYMBOL:LOWER:UPPER; repeat as needed
    #[clap(long = "alert", value_name = "SYMBOL:LOWER:UPPER")]
    pub alerts: Vec<AlertSpec>,

    /// Interval between quote snapshot refreshes (e.g., 15s, 1m)
    #[clap(long = "refresh", value_name = "DURATION", default_value = "15s")]
    pub refresh: DurationSpec,

    /// Delay before a dropped stream connection is retried
    #[clap(
        long = "reconnect-delay",
        value_name = "DURATION",
        default_value = "5s"
    )]
    pub reconnect_delay: DurationSpec,

    /// Preferences file holding the layout and command history
    #[clap(
        long = "prefs",
        value_name = "PATH",
        default_value = "tickdesk-prefs.json"
    )]
    pub prefs_path: PathBuf,
}

impl CliParams {
    pub fn refresh_interval(&self) -> Duration {
        self.refresh.as_duration()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay.as_duration()
    }
}

#[derive(Clone, Debug)]
pub struct AlertSpec {
    pub symbol: String,
    pub lower: f64,
    pub upper: f64,
}

impl FromStr for AlertSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let symbol = parts
            .next()
            .ok_or_else(|| "alert spec must include a symbol".to_string())?
            .trim();
        let lower = parts
            .next()
            .ok_or_else(|| "alert spec must include a lower bound".to_string())
            .and_then(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid lower bound: {value}"))
            })?;
        let upper = parts
            .next()
            .ok_or_else(|| "alert spec must include an upper bound".to_string())
            .and_then(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid upper bound: {value}"))
            })?;
        if parts.next().is_some() {
            return Err("alert spec should only have SYMBOL:LOWER:UPPER".to_string());
        }
        if symbol.is_empty() {
            return Err("alert spec symbol cannot be empty".to_string());
        }
        if lower >= upper {
            return Err(format!(
                "alert lower bound {lower} must be below upper bound {upper}"
            ));
        }
        Ok(AlertSpec {
            symbol: symbol.to_uppercase(),
            lower,
            upper,
        })
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DurationSpec(Duration);

impl DurationSpec {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for DurationSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = parse_duration_spec(s)?;
        Ok(DurationSpec(duration))
    }
}

fn parse_duration_spec(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration spec cannot be empty (examples: 15s, 1m, 1h)".to_string());
    }
    let split_idx = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| "duration spec must end with a unit like s, m, h, or d".to_string())?;
    if split_idx == 0 {
        return Err("duration spec must start with a number (examples: 15s, 1m)".to_string());
    }
    let (value_part, unit_part) = trimmed.split_at(split_idx);
    let value: f64 = value_part.parse().map_err(|_| {
        format!(
            "invalid numeric portion `{}` in duration spec `{}`",
            value_part, trimmed
        )
    })?;
    let unit = unit_part.trim().to_lowercase();
    if unit.is_empty() {
        return Err("duration spec missing unit (use s, m, h, or d)".to_string());
    }
    let seconds_multiplier = match unit.as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60.0 * 60.0,
        "d" | "day" | "days" => 60.0 * 60.0 * 24.0,
        other => {
            return Err(format!(
                "unsupported duration unit `{}` (use s, m, h, or d)",
                other
            ));
        }
    };
    let seconds = value * seconds_multiplier;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("duration must be positive: `{}`", trimmed));
    }
    let max_seconds = Duration::MAX.as_secs_f64();
    if seconds > max_seconds {
        return Err(format!("duration `{}` is too large", trimmed));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Durable user preferences. Only the layout and the command history
/// survive restarts; panel and tab contents are session-scoped.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    pub layout: LayoutMode,
    pub command_history: Vec<String>,
}

impl Preferences {
    pub fn load_or_init(path: impl AsRef<Path>) -> AnyResult<Preferences> {
        let path = path.as_ref();
        let stored = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<StoredPreferences>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let stored = StoredPreferences::default();
                let payload = serde_json::to_string_pretty(&stored)?;
                fs::write(path, payload)
                    .with_context(|| format!("writing {}", path.display()))?;
                stored
            }
            Err(err) => {
                return Err(anyhow!("reading {} failed: {}", path.display(), err));
            }
        };
        Ok(Preferences {
            path: path.to_path_buf(),
            layout: stored.layout,
            command_history: stored.command_history,
        })
    }

    pub fn save(&self) -> AnyResult<()> {
        let stored = StoredPreferences {
            layout: self.layout,
            command_history: self.command_history.clone(),
        };
        let payload = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, payload)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StoredPreferences {
    #[serde(default)]
    layout: LayoutMode,
    #[serde(default)]
    command_history: Vec<String>,
}
