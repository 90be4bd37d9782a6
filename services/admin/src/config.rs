use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

// Admin service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub root_username: String,
    pub enforce: bool,
    pub request_timeout_ms: u64,
    pub reconcile_interval_secs: Option<u64>,
    pub menu_seed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct AdminConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    root_username: Option<String>,
    enforce: Option<bool>,
    request_timeout_ms: Option<u64>,
    reconcile_interval_secs: Option<u64>,
    menu_seed_path: Option<PathBuf>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("parse {name}")),
        Err(_) => Ok(default),
    }
}

fn parse_storage(raw: &str) -> Result<StorageBackend> {
    match raw.to_ascii_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "postgres" => Ok(StorageBackend::Postgres),
        other => bail!("unknown PORTCULLIS_STORAGE backend: {other}"),
    }
}

impl AdminConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("PORTCULLIS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8088".to_string())
            .parse()
            .with_context(|| "parse PORTCULLIS_BIND")?;
        let metrics_bind = std::env::var("PORTCULLIS_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
            .parse()
            .with_context(|| "parse PORTCULLIS_METRICS_BIND")?;
        let storage = match std::env::var("PORTCULLIS_STORAGE") {
            Ok(raw) => parse_storage(&raw)?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = match std::env::var("PORTCULLIS_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse(
                    "PORTCULLIS_POSTGRES_MAX_CONNECTIONS",
                    default_max_connections(),
                )?,
                connect_timeout_ms: env_parse(
                    "PORTCULLIS_POSTGRES_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms(),
                )?,
                acquire_timeout_ms: env_parse(
                    "PORTCULLIS_POSTGRES_ACQUIRE_TIMEOUT_MS",
                    default_acquire_timeout_ms(),
                )?,
            }),
            Err(_) => None,
        };
        let root_username =
            std::env::var("PORTCULLIS_ROOT_USERNAME").unwrap_or_else(|_| "root".to_string());
        let reconcile_interval_secs = match std::env::var("PORTCULLIS_RECONCILE_INTERVAL_SECS") {
            Ok(raw) => Some(
                raw.parse()
                    .with_context(|| "parse PORTCULLIS_RECONCILE_INTERVAL_SECS")?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            root_username,
            enforce: env_parse("PORTCULLIS_ENFORCE", true)?,
            request_timeout_ms: env_parse("PORTCULLIS_REQUEST_TIMEOUT_MS", 10_000)?,
            reconcile_interval_secs,
            menu_seed_path: std::env::var("PORTCULLIS_MENU_SEED").ok().map(PathBuf::from),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("PORTCULLIS_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read PORTCULLIS_CONFIG: {path}"))?;
            let override_cfg: AdminConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse admin config yaml")?;
            config.apply(override_cfg)?;
        }
        Ok(config)
    }

    fn apply(&mut self, override_cfg: AdminConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.root_username {
            self.root_username = value;
        }
        if let Some(value) = override_cfg.enforce {
            self.enforce = value;
        }
        if let Some(value) = override_cfg.request_timeout_ms {
            self.request_timeout_ms = value;
        }
        if let Some(value) = override_cfg.reconcile_interval_secs {
            self.reconcile_interval_secs = Some(value);
        }
        if let Some(value) = override_cfg.menu_seed_path {
            self.menu_seed_path = Some(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PORTCULLIS_BIND",
        "PORTCULLIS_METRICS_BIND",
        "PORTCULLIS_STORAGE",
        "PORTCULLIS_POSTGRES_URL",
        "PORTCULLIS_POSTGRES_MAX_CONNECTIONS",
        "PORTCULLIS_ROOT_USERNAME",
        "PORTCULLIS_ENFORCE",
        "PORTCULLIS_REQUEST_TIMEOUT_MS",
        "PORTCULLIS_RECONCILE_INTERVAL_SECS",
        "PORTCULLIS_MENU_SEED",
        "PORTCULLIS_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let saved = VARS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect();
            for key in VARS {
                unsafe {
                    std::env::remove_var(key);
                }
            }
            Self { saved }
        }

        fn set(&self, key: &str, value: &str) {
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                unsafe {
                    match value {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        let _guard = EnvGuard::clean();
        let config = AdminConfig::from_env().expect("config");
        assert_eq!(config.bind_addr, "0.0.0.0:8088".parse().expect("addr"));
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.postgres.is_none());
        assert_eq!(config.root_username, "root");
        assert!(config.enforce);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert!(config.reconcile_interval_secs.is_none());
    }

    #[test]
    #[serial]
    fn env_selects_postgres() {
        let guard = EnvGuard::clean();
        guard.set("PORTCULLIS_STORAGE", "postgres");
        guard.set("PORTCULLIS_POSTGRES_URL", "postgres://localhost/portcullis");
        guard.set("PORTCULLIS_POSTGRES_MAX_CONNECTIONS", "3");
        guard.set("PORTCULLIS_ENFORCE", "false");
        guard.set("PORTCULLIS_RECONCILE_INTERVAL_SECS", "30");

        let config = AdminConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        let pg = config.postgres.expect("postgres");
        assert_eq!(pg.max_connections, 3);
        assert_eq!(pg.acquire_timeout_ms, 5_000);
        assert!(!config.enforce);
        assert_eq!(config.reconcile_interval_secs, Some(30));
    }

    #[test]
    #[serial]
    fn invalid_values_name_the_variable() {
        let guard = EnvGuard::clean();
        guard.set("PORTCULLIS_REQUEST_TIMEOUT_MS", "soon");
        let err = AdminConfig::from_env().expect_err("invalid");
        assert!(err.to_string().contains("PORTCULLIS_REQUEST_TIMEOUT_MS"));

        let guard = EnvGuard::clean();
        guard.set("PORTCULLIS_STORAGE", "sqlite");
        assert!(AdminConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() {
        let guard = EnvGuard::clean();
        let path = std::env::temp_dir().join(format!("portcullis-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "bind_addr: 127.0.0.1:7000\nroot_username: admin\nenforce: false\npostgres:\n  url: postgres://db/portcullis\n",
        )
        .expect("write yaml");
        guard.set("PORTCULLIS_CONFIG", path.to_str().expect("utf8 path"));

        let config = AdminConfig::from_env_or_yaml().expect("config");
        let _ = fs::remove_file(&path);
        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().expect("addr"));
        assert_eq!(config.root_username, "admin");
        assert!(!config.enforce);
        let pg = config.postgres.expect("postgres");
        assert_eq!(pg.max_connections, 10);
    }
}
