use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Marker, Organism, PageSize};
use crate::error::QueryError;

pub const CONFIG_FILE_NAME: &str = "ncbi-query.json";
pub const API_KEY_ENV: &str = "NCBI_API_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<EndpointEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EndpointEntry {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub search_path: Option<String>,
    #[serde(default)]
    pub fetch_path: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Where and how E-utilities requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub search_path: String,
    pub fetch_path: String,
    pub database: String,
    pub timeout: Duration,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "eutils.ncbi.nlm.nih.gov".to_string(),
            search_path: "/entrez/eutils/esearch.fcgi".to_string(),
            fetch_path: "/entrez/eutils/efetch.fcgi".to_string(),
            database: "nuccore".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl Endpoint {
    fn from_entry(entry: EndpointEntry) -> Self {
        let default = Self::default();
        Self {
            scheme: entry.scheme.unwrap_or(default.scheme),
            host: entry.host.unwrap_or(default.host),
            search_path: entry.search_path.unwrap_or(default.search_path),
            fetch_path: entry.fetch_path.unwrap_or(default.fetch_path),
            database: entry.database.unwrap_or(default.database),
            timeout: entry
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default.timeout),
        }
    }

    pub fn search_url(&self, params: &[(&str, String)]) -> Result<Url, QueryError> {
        self.url(&self.search_path, params)
    }

    pub fn fetch_url(&self, params: &[(&str, String)]) -> Result<Url, QueryError> {
        self.url(&self.fetch_path, params)
    }

    /// Every parameter value is form-encoded, so `&`, `#` or `=` in a value stay
    /// inside that value.
    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, QueryError> {
        let base = format!("{}://{}{}", self.scheme, self.host, path);
        Url::parse_with_params(&base, params).map_err(|err| QueryError::InvalidEndpoint {
            url: base,
            message: err.to_string(),
        })
    }
}

/// The fixed parameters of one query run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub organism: Organism,
    pub marker: Marker,
    pub page_size: PageSize,
    pub api_key: Option<String>,
}

impl QueryConfig {
    pub fn new(organism: Organism, marker: Marker) -> Self {
        Self {
            organism,
            marker,
            page_size: PageSize::default(),
            api_key: None,
        }
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// `<organism>[organism] AND <marker>`, before URL encoding.
    pub fn search_term(&self) -> String {
        format!("{}[organism] AND {}", self.organism, self.marker)
    }
}

/// Values taken from the command line; each one wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    pub organism: Option<String>,
    pub marker: Option<String>,
    pub page_size: Option<u64>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub query: QueryConfig,
    pub endpoint: Endpoint,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file from `path`, or from the working directory or the user
    /// config directory when no path is given. A missing default file is not an error.
    pub fn load(path: Option<&str>) -> Result<Config, QueryError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Config::default()),
            },
        };
        debug!(path = %config_path, "loading config");

        let content = fs::read_to_string(&config_path)
            .map_err(|_| QueryError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| QueryError::ConfigParse(err.to_string()))
    }

    fn default_path() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "ncbi-query")
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.config_dir().join(CONFIG_FILE_NAME)).ok()
            })
            .filter(|path| path.exists())
    }

    /// Merges the file with the command line. Returns `Ok(None)` when neither names an
    /// organism, which is the usage path of the binary.
    pub fn resolve_config(
        config: Config,
        overrides: QueryOverrides,
    ) -> Result<Option<ResolvedConfig>, QueryError> {
        let Some(organism) = overrides.organism.or(config.organism) else {
            return Ok(None);
        };
        let organism: Organism = organism.parse()?;

        let marker = overrides
            .marker
            .or(config.marker)
            .map(|value| Marker::parse_or_default(&value))
            .unwrap_or_default();

        let page_size = match overrides.page_size.or(config.page_size) {
            Some(value) => PageSize::new(value)?,
            None => PageSize::default(),
        };

        let query = QueryConfig::new(organism, marker)
            .with_page_size(page_size)
            .with_api_key(overrides.api_key.or(config.api_key));

        Ok(Some(ResolvedConfig {
            query,
            endpoint: Endpoint::from_entry(config.endpoint.unwrap_or_default()),
        }))
    }
}

/// Credential from the environment, ignored when blank.
pub fn env_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}
