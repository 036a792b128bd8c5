//! Environment-driven configuration.
//!
//! | Variable                         | Required | Default                  |
//! |----------------------------------|----------|--------------------------|
//! | `PDI_DATABASE_PATH`              | no       | `pdi.sqlite`             |
//! | `PDI_PAGERDUTY_INTEGRATION_KEY`  | no       | --                       |
//! | `PDI_LOG`                        | no       | `pdi=info,pdi_core=info` |

use std::path::PathBuf;

use crate::error::AppError;

pub const DEFAULT_DATABASE_PATH: &str = "pdi.sqlite";
/// Covers both the library and the `pdi` binary's own events.
pub const DEFAULT_LOG_FILTER: &str = "pdi=info,pdi_core=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    /// Routing key for PagerDuty events; `None` disables notification payloads.
    pub pagerduty_integration_key: Option<String>,
    pub log_filter: String,
}

impl Config {
    /// Load from the process environment, after reading a `.env` file if one exists.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_path = lookup("PDI_DATABASE_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let pagerduty_integration_key = match lookup("PDI_PAGERDUTY_INTEGRATION_KEY") {
            None => None,
            Some(v) if v.trim().is_empty() => {
                return Err(AppError::new(
                    "CONFIG_INVALID",
                    "PDI_PAGERDUTY_INTEGRATION_KEY must not be blank when set",
                ));
            }
            Some(v) => Some(v.trim().to_string()),
        };

        let log_filter = lookup("PDI_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_path: PathBuf::from(database_path),
            pagerduty_integration_key,
            log_filter,
        })
    }
}
