//! Environment-driven configuration.
//!
//! Messages for misconfigured release-server settings carry the stable
//! `octoargosync-init-octoclienterror` token that operational tooling
//! greps for.

use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::env;
use url::Url;

const DEFAULT_PORT: u16 = 8080;

/// Which log formatter the process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::from_value(env::var("APP_ENV").ok())
    }

    fn from_value(value: Option<String>) -> Self {
        match value {
            Some(value) if value.to_lowercase() == "production" => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub octopus_server: Url,
    pub octopus_api_key: SecretString,
    pub octopus_space_id: Option<String>,
    pub argocd_server: String,
    pub argocd_token: SecretString,
    pub argocd_insecure: bool,
    pub app_env: AppEnv,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let octopus_server = required(&lookup, "OCTOPUS_SERVER")?;
        let octopus_server = Url::parse(&octopus_server).map_err(|cause| {
            anyhow!("octoargosync-init-octoclienterror - failed to parse OCTOPUS_SERVER as a url: {cause}")
        })?;
        let octopus_api_key = SecretString::from(required(&lookup, "OCTOPUS_API_KEY")?);
        let octopus_space_id = optional(&lookup, "OCTOPUS_SPACE_ID");

        let argocd_server = lookup("ARGOCD_SERVER")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("ARGOCD_SERVER must be defined")?;
        let argocd_token = lookup("ARGOCD_TOKEN")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(SecretString::from)
            .context("ARGOCD_TOKEN must be defined")?;
        let argocd_insecure = match optional(&lookup, "ARGOCD_INSECURE") {
            Some(value) => value
                .parse()
                .with_context(|| format!("ARGOCD_INSECURE must be true or false, got {value}"))?,
            None => true,
        };

        let port = match optional(&lookup, "PORT") {
            Some(value) => value
                .parse()
                .with_context(|| format!("PORT must be a port number, got {value}"))?,
            None => DEFAULT_PORT,
        };

        let app_env = AppEnv::from_value(lookup("APP_ENV"));

        Ok(Self {
            octopus_server,
            octopus_api_key,
            octopus_space_id,
            argocd_server,
            argocd_token,
            argocd_insecure,
            app_env,
            port,
        })
    }
}

fn required(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("octoargosync-init-octoclienterror - {name} must be defined"))
}

fn optional(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
