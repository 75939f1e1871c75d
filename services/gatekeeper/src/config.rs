//! Gatekeeper configuration.
//!
//! Values come from `GATEKEEPER_*` environment variables; when
//! `GATEKEEPER_CONFIG` points at a YAML file, any field it sets overrides the
//! environment. The access rule table is normally supplied through YAML.
use anyhow::{Context, Result, bail};
use campus_authz::{AccessPolicy, AccessRule, EvaluatorConfig, PolicyEvaluator, UnverifiedAccess};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: Duration,
    pub issuer: String,
    /// True when no secret was configured and one was generated at startup.
    pub generated_secret: bool,
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub login_path: String,
    pub verification_path: String,
    pub unverified_access: UnverifiedAccess,
    pub rules: Vec<AccessRule>,
}

#[derive(Debug, Clone)]
pub struct InternalConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub session: SessionConfig,
    pub access: AccessConfig,
    pub internal: InternalConfig,
    /// Emails that become admins on first authentication.
    pub initial_admins: Vec<String>,
    /// Zero disables the background reconciliation task.
    pub reconcile_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct GatekeeperConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    session_secret: Option<String>,
    session_ttl_secs: Option<u64>,
    login_path: Option<String>,
    verification_path: Option<String>,
    unverified_access: Option<UnverifiedAccess>,
    access_rules: Option<Vec<AccessRule>>,
    internal_enabled: Option<bool>,
    internal_bind: Option<String>,
    internal_token: Option<String>,
    initial_admins: Option<Vec<String>>,
    reconcile_interval_secs: Option<u64>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_or(key, default)
        .parse()
        .with_context(|| format!("parse {key}"))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn generated_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

impl GatekeeperConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = parse_env("GATEKEEPER_BIND", "0.0.0.0:8443")?;
        let metrics_bind = parse_env("GATEKEEPER_METRICS_BIND", "0.0.0.0:8080")?;
        let storage = match env_or("GATEKEEPER_STORAGE", "memory").as_str() {
            "memory" => StorageBackend::Memory,
            "postgres" => StorageBackend::Postgres,
            other => bail!("unknown GATEKEEPER_STORAGE: {other}"),
        };
        let postgres = match std::env::var("GATEKEEPER_PG_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: parse_env("GATEKEEPER_PG_MAX_CONNECTIONS", "10")?,
                connect_timeout_ms: parse_env("GATEKEEPER_PG_CONNECT_TIMEOUT_MS", "5000")?,
                acquire_timeout_ms: parse_env("GATEKEEPER_PG_ACQUIRE_TIMEOUT_MS", "5000")?,
            }),
            Err(_) => None,
        };

        let (secret, generated) = match std::env::var("GATEKEEPER_SESSION_SECRET") {
            Ok(secret) => (secret, false),
            Err(_) => (generated_secret(), true),
        };
        let session = SessionConfig {
            secret,
            ttl: Duration::from_secs(parse_env(
                "GATEKEEPER_SESSION_TTL_SECS",
                &DEFAULT_SESSION_TTL_SECS.to_string(),
            )?),
            issuer: env_or("GATEKEEPER_SESSION_ISSUER", "campus-gatekeeper"),
            generated_secret: generated,
        };

        let unverified_access = match env_or("GATEKEEPER_UNVERIFIED_ACCESS", "forbid").as_str() {
            "forbid" => UnverifiedAccess::Forbid,
            "redirect" => UnverifiedAccess::Redirect,
            other => bail!("unknown GATEKEEPER_UNVERIFIED_ACCESS: {other}"),
        };
        let access = AccessConfig {
            login_path: env_or("GATEKEEPER_LOGIN_PATH", "/login"),
            verification_path: env_or("GATEKEEPER_VERIFICATION_PATH", "/verification"),
            unverified_access,
            rules: AccessPolicy::platform_default().rules().to_vec(),
        };

        let internal = InternalConfig {
            enabled: parse_env("GATEKEEPER_INTERNAL_ENABLED", "false")?,
            bind_addr: parse_env("GATEKEEPER_INTERNAL_BIND", "127.0.0.1:9443")?,
            token: std::env::var("GATEKEEPER_INTERNAL_TOKEN").ok(),
        };

        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            session,
            access,
            internal,
            initial_admins: parse_list(&env_or("GATEKEEPER_INITIAL_ADMINS", "")),
            reconcile_interval: Duration::from_secs(parse_env(
                "GATEKEEPER_RECONCILE_INTERVAL_SECS",
                &DEFAULT_RECONCILE_INTERVAL_SECS.to_string(),
            )?),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("GATEKEEPER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read GATEKEEPER_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: GatekeeperConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse gatekeeper config yaml")?;
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
        if let Some(value) = override_cfg.session_secret {
            self.session.secret = value;
            self.session.generated_secret = false;
        }
        if let Some(value) = override_cfg.session_ttl_secs {
            self.session.ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.login_path {
            self.access.login_path = value;
        }
        if let Some(value) = override_cfg.verification_path {
            self.access.verification_path = value;
        }
        if let Some(value) = override_cfg.unverified_access {
            self.access.unverified_access = value;
        }
        if let Some(value) = override_cfg.access_rules {
            self.access.rules = value;
        }
        if let Some(value) = override_cfg.internal_enabled {
            self.internal.enabled = value;
        }
        if let Some(value) = override_cfg.internal_bind {
            self.internal.bind_addr = value.parse().with_context(|| "parse internal_bind")?;
        }
        if let Some(value) = override_cfg.internal_token {
            self.internal.token = Some(value);
        }
        if let Some(value) = override_cfg.initial_admins {
            self.initial_admins = value;
        }
        if let Some(value) = override_cfg.reconcile_interval_secs {
            self.reconcile_interval = Duration::from_secs(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.secret.len() < MIN_SESSION_SECRET_LEN {
            bail!("session secret must be at least {MIN_SESSION_SECRET_LEN} bytes");
        }
        if self.session.ttl.is_zero() {
            bail!("session ttl must be positive");
        }
        if self.internal.enabled && self.internal.token.as_deref().unwrap_or("").is_empty() {
            bail!("internal listener requires GATEKEEPER_INTERNAL_TOKEN");
        }
        for path in [&self.access.login_path, &self.access.verification_path] {
            if !path.starts_with('/') {
                bail!("redirect targets must be absolute paths: {path}");
            }
        }
        self.evaluator()?;
        Ok(())
    }

    /// Build the policy evaluator from the configured rule table.
    pub fn evaluator(&self) -> Result<PolicyEvaluator> {
        let policy = AccessPolicy::new(self.access.rules.clone())
            .with_context(|| "invalid access rule table")?;
        Ok(PolicyEvaluator::with_config(
            policy,
            EvaluatorConfig {
                login_path: self.access.login_path.clone(),
                verification_path: self.access.verification_path.clone(),
                unverified_access: self.access.unverified_access,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::ScopedEnv;
    use campus_authz::{Decision, Role};
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_uses_defaults() {
        let _env = ScopedEnv::new()
            .unset("GATEKEEPER_STORAGE")
            .unset("GATEKEEPER_SESSION_SECRET")
            .unset("GATEKEEPER_INITIAL_ADMINS")
            .unset("GATEKEEPER_UNVERIFIED_ACCESS");
        let config = GatekeeperConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.session.generated_secret);
        assert!(config.session.secret.len() >= MIN_SESSION_SECRET_LEN);
        assert!(config.initial_admins.is_empty());
        assert_eq!(config.access.unverified_access, UnverifiedAccess::Forbid);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        let _env = ScopedEnv::new()
            .set("GATEKEEPER_STORAGE", "postgres")
            .set("GATEKEEPER_PG_URL", "postgres://localhost/campus")
            .set("GATEKEEPER_INITIAL_ADMINS", "root@example.com, ops@example.com")
            .set("GATEKEEPER_UNVERIFIED_ACCESS", "redirect");
        let config = GatekeeperConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.postgres.expect("pg").max_connections, 10);
        assert_eq!(
            config.initial_admins,
            vec!["root@example.com".to_string(), "ops@example.com".to_string()]
        );
        assert_eq!(config.access.unverified_access, UnverifiedAccess::Redirect);
    }

    #[test]
    #[serial]
    fn unknown_storage_backend_fails() {
        let _env = ScopedEnv::new().set("GATEKEEPER_STORAGE", "sqlite");
        let err = GatekeeperConfig::from_env().expect_err("backend");
        assert!(err.to_string().contains("GATEKEEPER_STORAGE"));
    }

    #[test]
    #[serial]
    fn yaml_overrides_rules_and_listeners() {
        let _env = ScopedEnv::new().unset("GATEKEEPER_STORAGE");
        let mut config = GatekeeperConfig::from_env().expect("config");
        config
            .apply_yaml(
                r#"
bind_addr: "127.0.0.1:9000"
session_secret: "0123456789abcdef0123456789abcdef"
internal_enabled: true
internal_token: "internal-token"
access_rules:
  - prefix: /jobs/post
    roles: [recruiter]
    requires_verified: true
"#,
            )
            .expect("yaml");
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(!config.session.generated_secret);
        assert!(config.internal.enabled);
        config.validate().expect("valid");

        let evaluator = config.evaluator().expect("evaluator");
        assert_eq!(evaluator.policy().rules().len(), 1);
        assert_eq!(evaluator.policy().rules()[0].roles, vec![Role::Recruiter]);
        assert_eq!(evaluator.evaluate(None, "/admin"), Decision::Allow);
    }

    #[test]
    #[serial]
    fn validate_rejects_weak_settings() {
        let _env = ScopedEnv::new().unset("GATEKEEPER_STORAGE");
        let mut config = GatekeeperConfig::from_env().expect("config");
        config.session.secret = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = GatekeeperConfig::from_env().expect("config");
        config.internal.enabled = true;
        config.internal.token = None;
        assert!(config.validate().is_err());

        let mut config = GatekeeperConfig::from_env().expect("config");
        config.access.rules = vec![AccessRule::authenticated("dashboard")];
        assert!(config.validate().is_err());
    }
}
