use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{env_flag, env_or};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub vies: ViesConfig,
    pub merchant: MerchantConfig,
    pub worker: WorkerConfig,
    pub log: LogSettings,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    /// Unset means in-memory storage (local runs and tests).
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Account country of the invoicing API; picks the regional endpoint.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiCountry {
    Sk,
    Cz,
    At,
}

impl ApiCountry {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCountry::Sk => "sk",
            ApiCountry::Cz => "cz",
            ApiCountry::At => "at",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sk" => Some(ApiCountry::Sk),
            "cz" => Some(ApiCountry::Cz),
            "at" => Some(ApiCountry::At),
            _ => None,
        }
    }

    pub fn production_url(&self) -> &'static str {
        match self {
            ApiCountry::Sk => "https://moja.superfaktura.sk",
            ApiCountry::Cz => "https://moje.superfaktura.cz",
            ApiCountry::At => "https://meine.superfaktura.at",
        }
    }

    pub fn sandbox_url(&self) -> &'static str {
        match self {
            ApiCountry::Sk => "https://sandbox.superfaktura.sk",
            ApiCountry::Cz => "https://sandbox.superfaktura.cz",
            ApiCountry::At => "https://sandbox.superfaktura.at",
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApiConfig {
    pub email: String,
    pub api_key: Secret<String>,
    pub company_id: Option<String>,
    pub country: ApiCountry,
    pub sandbox: bool,
    /// Replaces the regional endpoint entirely (staging proxies, tests).
    pub base_url: Option<String>,
    pub module: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.sandbox => self.country.sandbox_url().to_string(),
            None => self.country.production_url().to_string(),
        }
    }
}

/// EU VAT number lookup service.
#[derive(Deserialize, Clone, Debug)]
pub struct ViesConfig {
    pub base_url: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

/// Merchant identity used while building documents.
#[derive(Deserialize, Clone, Debug)]
pub struct MerchantConfig {
    /// ISO country of the shop's base location.
    pub base_country: String,
    /// Public URL of the shop; the payment callback hangs off it.
    pub site_url: String,
    /// Shared secret expected on payment callbacks. Unset accepts any.
    pub callback_secret: Option<Secret<String>>,
    pub lock_dir: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WorkerConfig {
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    pub batch_size: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let core = service_core::config::Config::load()
            .map_err(|e| anyhow!("Failed to load base configuration: {}", e))?;

        let host = env::var("INVOICE_SYNC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_or("INVOICE_SYNC_PORT", core.port);

        let database_url = env::var("INVOICE_SYNC_DATABASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new);

        let country_raw = env::var("INVOICE_SYNC_API_COUNTRY").unwrap_or_else(|_| "sk".to_string());
        let country = ApiCountry::from_string(&country_raw)
            .ok_or_else(|| anyhow!("Unsupported INVOICE_SYNC_API_COUNTRY: {}", country_raw))?;

        let api = ApiConfig {
            email: env::var("INVOICE_SYNC_API_EMAIL").unwrap_or_default(),
            api_key: Secret::new(env::var("INVOICE_SYNC_API_KEY").unwrap_or_default()),
            company_id: env::var("INVOICE_SYNC_API_COMPANY_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            country,
            sandbox: env_flag("INVOICE_SYNC_API_SANDBOX", false),
            base_url: env::var("INVOICE_SYNC_API_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            module: env::var("INVOICE_SYNC_API_MODULE")
                .unwrap_or_else(|_| "invoice-sync-service".to_string()),
            timeout: Duration::from_secs(env_or("INVOICE_SYNC_API_TIMEOUT_SECS", 30)),
        };

        let vies = ViesConfig {
            base_url: env::var("INVOICE_SYNC_VIES_URL").unwrap_or_else(|_| {
                "https://ec.europa.eu/taxation_customs/vies/rest-api".to_string()
            }),
            timeout: Duration::from_secs(env_or("INVOICE_SYNC_VIES_TIMEOUT_SECS", 10)),
        };

        let merchant = MerchantConfig {
            base_country: env::var("INVOICE_SYNC_BASE_COUNTRY")
                .unwrap_or_else(|_| country.as_str().to_uppercase()),
            site_url: env::var("INVOICE_SYNC_SITE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            callback_secret: env::var("INVOICE_SYNC_CALLBACK_SECRET")
                .ok()
                .filter(|v| !v.is_empty())
                .map(Secret::new),
            lock_dir: env::var("INVOICE_SYNC_LOCK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("invoice-sync-locks")),
        };

        let worker = WorkerConfig {
            enabled: env_flag("INVOICE_SYNC_WORKER_ENABLED", true),
            poll_interval: Duration::from_secs(env_or("INVOICE_SYNC_WORKER_POLL_SECS", 30)),
            batch_size: env_or("INVOICE_SYNC_WORKER_BATCH_SIZE", 20),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("INVOICE_SYNC_DB_MAX_CONNECTIONS", 10),
                min_connections: env_or("INVOICE_SYNC_DB_MIN_CONNECTIONS", 1),
            },
            api,
            vies,
            merchant,
            worker,
            log: LogSettings {
                level: core.log.level,
                json: core.log.json,
            },
            service_name: "invoice-sync-service".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn base_url_follows_country_and_sandbox() {
        let mut api = ApiConfig {
            email: "shop@example.com".into(),
            api_key: Secret::new("key".into()),
            company_id: None,
            country: ApiCountry::Cz,
            sandbox: false,
            base_url: None,
            module: "test".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(api.base_url(), "https://moje.superfaktura.cz");
        api.sandbox = true;
        assert_eq!(api.base_url(), "https://sandbox.superfaktura.cz");
        api.base_url = Some("http://127.0.0.1:9999/".into());
        assert_eq!(api.base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn from_env_reads_prefixed_variables() {
        env::set_var("INVOICE_SYNC_API_COUNTRY", "at");
        env::set_var("INVOICE_SYNC_API_SANDBOX", "yes");
        env::set_var("INVOICE_SYNC_CALLBACK_SECRET", "s3cret");
        env::remove_var("INVOICE_SYNC_BASE_COUNTRY");

        let config = Config::from_env().unwrap();
        assert_eq!(config.api.country, ApiCountry::At);
        assert!(config.api.sandbox);
        assert_eq!(config.merchant.base_country, "AT");
        assert!(config.merchant.callback_secret.is_some());
        assert_eq!(config.vies.timeout, Duration::from_secs(10));

        env::remove_var("INVOICE_SYNC_API_COUNTRY");
        env::remove_var("INVOICE_SYNC_API_SANDBOX");
        env::remove_var("INVOICE_SYNC_CALLBACK_SECRET");
    }

    #[test]
    #[serial]
    fn unknown_country_is_rejected() {
        env::set_var("INVOICE_SYNC_API_COUNTRY", "de");
        assert!(Config::from_env().is_err());
        env::remove_var("INVOICE_SYNC_API_COUNTRY");
    }
}
