//! Runtime settings for the estimator

use std::path::PathBuf;
use std::time::Duration;

/// Base URI of the LOOC-C API
pub const DEFAULT_BASE_URI: &str = "https://api.looc-c.farm/v1/";

/// Soil sampling depth used for measured SOC estimates, in cm
pub const SOC_DEPTH_CM: u32 = 30;

/// How long ERF co-benefit metadata stays cached, in seconds
pub const COBENEFIT_CACHE_TTL_S: i64 = 86_400 * 7;

/// Connection details for the estimation provider
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_uri: String,
    pub timeout: Duration,
}

/// Settings collected from the command line and environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: PathBuf,
    pub api_key: Option<String>,
    pub base_uri: String,
    pub timeout_secs: u64,
}

impl Settings {
    pub fn client_config(&self) -> ClientConfig {
        let mut base_uri = self.base_uri.clone();
        // reqwest joins relative paths onto the last segment otherwise
        if !base_uri.ends_with('/') {
            base_uri.push('/');
        }
        ClientConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            base_uri,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
