use crate::fetch::DEFAULT_ACCEPT_LANGUAGE;
use crate::hls::{DEFAULT_MAX_RECURSION, RewriteOptions};
use std::env;
use std::time::Duration;

/// Default cache entry lifetime: one day
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86400;

/// Cache store backend selection
#[derive(Clone, Debug, PartialEq)]
pub enum CacheStoreType {
    /// In-process store (default)
    Memory,
    /// Shared Valkey/Redis store
    Valkey,
    /// No caching at all
    Disabled,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Cache entry TTL in seconds, also advertised as `max-age`
    pub cache_ttl_secs: u64,
    /// Deepest master-to-master hop allowed
    pub max_recursion: usize,
    /// Drop `#EXT-X-DISCONTINUITY` lines from media playlists
    pub filter_discontinuity: bool,
    pub cache_store: CacheStoreType,
    /// Valkey/Redis URL (used when cache_store = Valkey)
    pub valkey_url: Option<String>,
    /// Accept-Language sent upstream when the caller sends none
    pub default_accept_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            is_dev: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_recursion: DEFAULT_MAX_RECURSION,
            filter_discontinuity: true,
            cache_store: CacheStoreType::Memory,
            valkey_url: None,
            default_accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode PORT defaults to 3000. In PROD mode it is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let cache_ttl_secs = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        let max_recursion = env::var("MAX_RECURSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RECURSION);

        let filter_discontinuity = env::var("FILTER_DISCONTINUITY")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let cache_store = match env::var("CACHE_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "valkey" | "redis" => CacheStoreType::Valkey,
            "none" | "off" | "disabled" => CacheStoreType::Disabled,
            _ => CacheStoreType::Memory,
        };
        let valkey_url = env::var("VALKEY_URL").ok();

        let default_accept_language = env::var("DEFAULT_ACCEPT_LANGUAGE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string());

        Ok(Config {
            port,
            is_dev,
            cache_ttl_secs,
            max_recursion,
            filter_discontinuity,
            cache_store,
            valkey_url,
            default_accept_language,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            filter_discontinuity: self.filter_discontinuity,
            max_recursion: self.max_recursion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Env vars are process-global; tests touching them run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "DEV_MODE",
        "PORT",
        "CACHE_TTL_SECS",
        "MAX_RECURSION",
        "FILTER_DISCONTINUITY",
        "CACHE_STORE",
        "VALKEY_URL",
        "DEFAULT_ACCEPT_LANGUAGE",
    ];

    /// Clear every config var, apply `set`, run `f`, then restore.
    fn with_env(set: &[(&str, &str)], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        let saved: Vec<(&str, Option<String>)> =
            ALL_VARS.iter().map(|k| (*k, env::var(k).ok())).collect();

        for k in ALL_VARS {
            // SAFETY: serialized by ENV_LOCK
            unsafe { env::remove_var(k) };
        }
        for (k, v) in set {
            unsafe { env::set_var(k, v) };
        }

        f();

        for (k, old) in saved {
            match old {
                Some(v) => unsafe { env::set_var(k, v) },
                None => unsafe { env::remove_var(k) },
            }
        }
    }

    #[test]
    fn dev_mode_uses_defaults() {
        with_env(&[("DEV_MODE", "true")], || {
            let config = Config::from_env().expect("should succeed in dev mode");
            assert!(config.is_dev);
            assert_eq!(config.port, 3000);
            assert_eq!(config.cache_ttl_secs, 86400);
            assert_eq!(config.max_recursion, 5);
            assert!(config.filter_discontinuity);
            assert_eq!(config.cache_store, CacheStoreType::Memory);
            assert_eq!(config.valkey_url, None);
            assert_eq!(config.default_accept_language, "zh-CN,zh;q=0.9,en;q=0.8");
        });
    }

    #[test]
    fn prod_mode_requires_port() {
        with_env(&[], || {
            assert!(Config::from_env().is_err(), "Should fail without PORT in prod mode");
        });
    }

    #[test]
    fn prod_mode_with_port() {
        with_env(&[("PORT", "8080")], || {
            let config = Config::from_env().unwrap();
            assert!(!config.is_dev);
            assert_eq!(config.port, 8080);
        });
    }

    #[test]
    fn invalid_port_is_error() {
        with_env(&[("DEV_MODE", "true"), ("PORT", "http")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn rewrite_knobs_parsed() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("MAX_RECURSION", "2"),
                ("FILTER_DISCONTINUITY", "false"),
                ("CACHE_TTL_SECS", "30"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(
                    config.rewrite_options(),
                    RewriteOptions {
                        filter_discontinuity: false,
                        max_recursion: 2,
                    }
                );
                assert_eq!(config.cache_ttl(), Duration::from_secs(30));
            },
        );
    }

    #[test]
    fn unparsable_optional_values_fall_back() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("MAX_RECURSION", "deep"),
                ("FILTER_DISCONTINUITY", "maybe"),
                ("CACHE_TTL_SECS", "-1"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.max_recursion, 5);
                assert!(config.filter_discontinuity);
                assert_eq!(config.cache_ttl_secs, 86400);
            },
        );
    }

    #[test]
    fn cache_store_valkey_and_redis_alias() {
        for value in ["valkey", "redis", "Valkey"] {
            with_env(
                &[
                    ("DEV_MODE", "true"),
                    ("CACHE_STORE", value),
                    ("VALKEY_URL", "redis://127.0.0.1:6379"),
                ],
                || {
                    let config = Config::from_env().unwrap();
                    assert_eq!(config.cache_store, CacheStoreType::Valkey);
                    assert_eq!(config.valkey_url.as_deref(), Some("redis://127.0.0.1:6379"));
                },
            );
        }
    }

    #[test]
    fn cache_store_none_disables_cache() {
        with_env(&[("DEV_MODE", "true"), ("CACHE_STORE", "none")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.cache_store, CacheStoreType::Disabled);
        });
    }

    #[test]
    fn blank_accept_language_uses_default() {
        with_env(
            &[("DEV_MODE", "true"), ("DEFAULT_ACCEPT_LANGUAGE", "  ")],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.default_accept_language, DEFAULT_ACCEPT_LANGUAGE);
            },
        );
    }
}
