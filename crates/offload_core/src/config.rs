//! Backend client configuration.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | OFFLOAD_API_BASE_URL | `https://api.offload.app` | Base URL every relative endpoint path is joined onto. |
//! | OFFLOAD_REQUEST_TIMEOUT_SECS | 30 | Connect timeout and idle bound on each read. |
//! | OFFLOAD_RESOURCE_TIMEOUT_SECS | 300 | Upper bound for one full exchange. |

use log::warn;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.offload.app";
pub const BASE_URL_ENV: &str = "OFFLOAD_API_BASE_URL";
const REQUEST_TIMEOUT_ENV: &str = "OFFLOAD_REQUEST_TIMEOUT_SECS";
const RESOURCE_TIMEOUT_ENV: &str = "OFFLOAD_RESOURCE_TIMEOUT_SECS";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Identity sent when creating an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub install_id: String,
    pub app_version: String,
    pub platform: String,
}

impl ClientIdentity {
    pub fn new(install_id: impl Into<String>) -> Self {
        Self {
            install_id: install_id.into(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

/// Connection settings for the generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub resource_timeout: Duration,
    pub identity: ClientIdentity,
}

impl BackendConfig {
    /// Default settings for one install.
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
            identity,
        }
    }

    /// Loads overrides from the process environment.
    pub fn from_env(identity: ClientIdentity) -> Self {
        Self {
            base_url: env_opt_string(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout: env_duration_secs(REQUEST_TIMEOUT_ENV, DEFAULT_REQUEST_TIMEOUT),
            resource_timeout: env_duration_secs(RESOURCE_TIMEOUT_ENV, DEFAULT_RESOURCE_TIMEOUT),
            identity,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    match env_opt_string(name) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    "event=config_load module=config status=ignored key={} default_secs={}",
                    name,
                    default.as_secs()
                );
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BackendConfig, ClientIdentity, BASE_URL_ENV, DEFAULT_BASE_URL, REQUEST_TIMEOUT_ENV,
        RESOURCE_TIMEOUT_ENV,
    };
    use std::time::Duration;

    /// Sets env vars for one test and removes them on drop.
    struct ScopedEnv(Vec<&'static str>);

    impl ScopedEnv {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (name, value) in vars {
                std::env::set_var(name, value);
            }
            Self(vars.iter().map(|(name, _)| *name).collect())
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for name in &self.0 {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = BackendConfig::new(ClientIdentity::new("install-1"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.resource_timeout, Duration::from_secs(300));
        assert_eq!(config.identity.install_id, "install-1");
    }

    #[test]
    fn with_base_url_overrides_only_the_url() {
        let config =
            BackendConfig::new(ClientIdentity::new("i")).with_base_url("http://localhost:8000");
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    // No other test touches the OFFLOAD_* variables.
    #[test]
    fn from_env_reads_overrides_and_ignores_invalid_values() {
        {
            let _env = ScopedEnv::set(&[]);
            let config = BackendConfig::from_env(ClientIdentity::new("i"));
            assert_eq!(config, BackendConfig::new(ClientIdentity::new("i")));
        }
        {
            let _env = ScopedEnv::set(&[
                (BASE_URL_ENV, " http://localhost:8000 "),
                (REQUEST_TIMEOUT_ENV, "5"),
                (RESOURCE_TIMEOUT_ENV, "60"),
            ]);
            let config = BackendConfig::from_env(ClientIdentity::new("i"));
            assert_eq!(config.base_url, "http://localhost:8000");
            assert_eq!(config.request_timeout, Duration::from_secs(5));
            assert_eq!(config.resource_timeout, Duration::from_secs(60));
        }
        {
            let _env = ScopedEnv::set(&[
                (BASE_URL_ENV, "   "),
                (REQUEST_TIMEOUT_ENV, "soon"),
                (RESOURCE_TIMEOUT_ENV, "0"),
            ]);
            let config = BackendConfig::from_env(ClientIdentity::new("i"));
            assert_eq!(config.base_url, DEFAULT_BASE_URL);
            assert_eq!(config.request_timeout, Duration::from_secs(30));
            assert_eq!(config.resource_timeout, Duration::from_secs(300));
        }
    }
}
