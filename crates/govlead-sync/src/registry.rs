//! `sources.yaml` loading and construction of one adapter handle per source.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use govlead_adapters::sam_gov::DEFAULT_SAM_BASE_URL;
use govlead_adapters::scrape::DEFAULT_SCRAPE_ENDPOINT;
use govlead_adapters::{
    EmailSettings, GmailCredentials, GmailMailbox, HttpSamPageSource, HttpScrapeClient,
    MunicipalScrapeAdapter, SamGovAdapter, SamGovSettings, ScrapeSettings, SourceAdapter,
    SourceHints, StateEmailAdapter,
};
use govlead_core::ContractSource;
use govlead_storage::HttpFetcher;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::fs;

use crate::config::{ConfigError, Credentials};

pub const DEFAULT_FETCH_LIMIT: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source: ContractSource,
    pub display_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
    #[serde(default)]
    pub lookback_days: Option<i64>,
    #[serde(default)]
    pub board_url: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub agency_hint: Option<String>,
    #[serde(default)]
    pub place_hint: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_FETCH_LIMIT
}

impl SourceConfig {
    fn hints(&self) -> SourceHints {
        SourceHints {
            agency: self.agency_hint.clone(),
            place_of_performance: self.place_hint.clone(),
        }
    }
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub async fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("sources.yaml");
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn get(&self, source: ContractSource) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source == source)
    }
}

/// An enabled source with its adapter, or the configuration error that keeps
/// it from running.
#[derive(Clone)]
pub struct SourceHandle {
    pub config: SourceConfig,
    pub adapter: Result<Arc<dyn SourceAdapter>, ConfigError>,
}

impl SourceHandle {
    pub fn source(&self) -> ContractSource {
        self.config.source
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("source", &self.config.source)
            .field("ready", &self.adapter.is_ok())
            .finish()
    }
}

/// Builds handles for every enabled source in the registry.
pub fn build_handles(
    registry: &SourceRegistry,
    credentials: &Credentials,
    fetcher: &Arc<HttpFetcher>,
) -> Vec<SourceHandle> {
    registry
        .enabled()
        .map(|config| SourceHandle {
            config: config.clone(),
            adapter: build_adapter(config, credentials, fetcher),
        })
        .collect()
}

fn build_adapter(
    config: &SourceConfig,
    credentials: &Credentials,
    fetcher: &Arc<HttpFetcher>,
) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    match config.source {
        ContractSource::FederalApi => {
            let key = clone_secret(&credentials.sam_api_key)?;
            let pages = HttpSamPageSource::new(fetcher.clone(), DEFAULT_SAM_BASE_URL, key);
            let defaults = SamGovSettings::default();
            let settings = SamGovSettings {
                page_size: config.page_size.unwrap_or(defaults.page_size),
                min_request_interval: config
                    .min_request_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.min_request_interval),
                lookback_days: config.lookback_days.unwrap_or(defaults.lookback_days),
            };
            Ok(Arc::new(SamGovAdapter::new(Arc::new(pages), settings)))
        }
        ContractSource::MunicipalScrape => {
            let board_url = config
                .board_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| ConfigError::Invalid {
                    var: format!("sources.yaml:{}.board_url", config.source),
                    reason: "a scrape source needs a board_url".into(),
                })?;
            let key = clone_secret(&credentials.scrape_api_key)?;
            let client = HttpScrapeClient::new(fetcher.clone(), DEFAULT_SCRAPE_ENDPOINT, key);
            let settings = ScrapeSettings {
                board_url,
                hints: config.hints(),
            };
            Ok(Arc::new(MunicipalScrapeAdapter::new(Arc::new(client), settings)))
        }
        ContractSource::StateEmail => {
            let gmail = credentials.gmail.as_ref().map_err(Clone::clone)?;
            let mailbox = GmailMailbox::new(
                fetcher.clone(),
                GmailCredentials {
                    client_id: gmail.client_id.clone(),
                    client_secret: rewrap(&gmail.client_secret),
                    refresh_token: rewrap(&gmail.refresh_token),
                },
            );
            let settings = EmailSettings {
                sender: config.sender.clone(),
                label: config.label.clone(),
                hints: config.hints(),
            };
            Ok(Arc::new(StateEmailAdapter::new(Arc::new(mailbox), settings)))
        }
    }
}

fn clone_secret(secret: &Result<SecretString, ConfigError>) -> Result<SecretString, ConfigError> {
    secret.as_ref().map(rewrap).map_err(Clone::clone)
}

fn rewrap(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use govlead_storage::HttpClientConfig;

    use super::*;

    const REGISTRY: &str = r#"
sources:
  - source: federal-api
    display_name: SAM.gov opportunities
    enabled: true
    cron: "0 0 */4 * * *"
    page_size: 50
    lookback_days: 5
  - source: municipal-scrape
    display_name: City bid board
    enabled: true
    board_url: https://city.example.test/bids
    place_hint: Springfield, IL
  - source: state-email
    display_name: State procurement notices
    enabled: false
"#;

    #[test]
    fn registry_parses_defaults_and_enabled_sources() {
        let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
        assert_eq!(registry.sources.len(), 3);
        let enabled: Vec<_> = registry.enabled().map(|s| s.source).collect();
        assert_eq!(
            enabled,
            vec![ContractSource::FederalApi, ContractSource::MunicipalScrape]
        );
        let federal = registry.get(ContractSource::FederalApi).unwrap();
        assert_eq!(federal.limit, DEFAULT_FETCH_LIMIT);
        assert_eq!(federal.page_size, Some(50));
        assert_eq!(federal.cron.as_deref(), Some("0 0 */4 * * *"));
    }

    #[test]
    fn missing_credentials_leave_only_that_source_unready() {
        let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([("SCRAPE_API_KEY", "scrape-key")]);
        let credentials = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        let fetcher = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());

        let handles = build_handles(&registry, &credentials, &fetcher);
        assert_eq!(handles.len(), 2);
        assert_eq!(
            handles[0].adapter.as_ref().err(),
            Some(&ConfigError::MissingEnvVar("SAM_API_KEY".into()))
        );
        let scrape = handles[1].adapter.as_ref().unwrap();
        assert_eq!(scrape.source(), ContractSource::MunicipalScrape);
    }

    #[tokio::test]
    async fn load_reads_sources_yaml_from_the_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("sources.yaml"), REGISTRY).await.unwrap();
        let registry = SourceRegistry::load(dir.path()).await.unwrap();
        assert_eq!(registry.enabled().count(), 2);

        let missing = SourceRegistry::load(&dir.path().join("nope")).await.unwrap_err();
        assert!(missing.to_string().contains("sources.yaml"));
    }
}
