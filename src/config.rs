use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;
use reqwest::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CREDENTIALS_PATH: &str = ".dashboard-session.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: Url,
    pub timeout: Duration,
    pub credentials_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw_url = lookup("DASHBOARD_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_api_url(&raw_url)?;

        let timeout = Duration::from_secs(
            lookup("DASHBOARD_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let credentials_path = lookup("DASHBOARD_CREDENTIALS")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string())
            .into();

        Ok(Self {
            api_url,
            timeout,
            credentials_path,
        })
    }

    /// Command-line flags take precedence over the environment.
    pub fn with_overrides(
        mut self,
        api_url: Option<&str>,
        credentials_path: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        if let Some(raw) = api_url {
            self.api_url = parse_api_url(raw)?;
        }
        if let Some(path) = credentials_path {
            self.credentials_path = path;
        }
        Ok(self)
    }
}

fn parse_api_url(raw: &str) -> anyhow::Result<Url> {
    Url::parse(raw.trim()).with_context(|| format!("invalid API base URL {raw:?}"))
}
