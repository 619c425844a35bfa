//! Configuration loading from environment variables.
//!
//! | Variable                   | Default          |
//! |----------------------------|------------------|
//! | `REGISTRAR_BIND`           | `0.0.0.0:8080`   |
//! | `JWT_SECRET`               | dev secret, warns|
//! | `TOKEN_TTL_MINUTES`        | `60`             |
//! | `PASSWORD_HASH_ROUNDS`     | `100000`         |
//! | `CONTENT_DIR`              | unset: in-memory |
//! | `DATABASE_URL`             | unset            |
//! | `USE_PERSISTENT_STORES`    | `false`          |
//! | `BOOTSTRAP_ADMIN_USERNAME` | unset            |
//! | `BOOTSTRAP_ADMIN_EMAIL`    | unset            |
//! | `BOOTSTRAP_ADMIN_PASSWORD` | unset            |

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use registrar_auth::Sha256PasswordHasher;

use crate::identity::BootstrapAdmin;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct RegistrarConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub password_hash_rounds: u32,
    pub content_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl core::fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("bind", &self.bind)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("password_hash_rounds", &self.password_hash_rounds)
            .field("content_dir", &self.content_dir)
            .field("use_persistent_stores", &self.use_persistent_stores)
            .field(
                "bootstrap_admin",
                &self.bootstrap_admin.as_ref().map(|a| &a.username),
            )
            .finish_non_exhaustive()
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_minutes: 60,
            password_hash_rounds: Sha256PasswordHasher::DEFAULT_ROUNDS,
            content_dir: None,
            database_url: None,
            use_persistent_stores: false,
            bootstrap_admin: None,
        }
    }
}

impl RegistrarConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind = match var("REGISTRAR_BIND") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "REGISTRAR_BIND",
                reason: format!("{e}"),
            })?,
            None => defaults.bind,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let token_ttl_minutes = match var("TOKEN_TTL_MINUTES") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "TOKEN_TTL_MINUTES",
                        reason: format!("expected a positive integer, got '{raw}'"),
                    });
                }
            },
            None => defaults.token_ttl_minutes,
        };

        let password_hash_rounds = match var("PASSWORD_HASH_ROUNDS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if (1..=Sha256PasswordHasher::MAX_ROUNDS).contains(&n) => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PASSWORD_HASH_ROUNDS",
                        reason: format!(
                            "expected 1..={}, got '{raw}'",
                            Sha256PasswordHasher::MAX_ROUNDS
                        ),
                    });
                }
            },
            None => defaults.password_hash_rounds,
        };

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };
        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let bootstrap_admin = match (
            var("BOOTSTRAP_ADMIN_USERNAME"),
            var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin {
                email: var("BOOTSTRAP_ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{username}@localhost")),
                username,
                password,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_USERNAME")),
        };

        Ok(Self {
            bind,
            jwt_secret,
            token_ttl_minutes,
            password_hash_rounds,
            content_dir: var("CONTENT_DIR").map(PathBuf::from),
            database_url,
            use_persistent_stores,
            bootstrap_admin,
        })
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<RegistrarConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RegistrarConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(cfg.token_ttl_minutes, 60);
        assert_eq!(cfg.password_hash_rounds, Sha256PasswordHasher::DEFAULT_ROUNDS);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert!(cfg.content_dir.is_none());
        assert!(cfg.bootstrap_admin.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("REGISTRAR_BIND", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_MINUTES", "15"),
            ("PASSWORD_HASH_ROUNDS", "2000"),
            ("CONTENT_DIR", "/var/lib/registrar"),
            ("BOOTSTRAP_ADMIN_USERNAME", "root"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "changeme123"),
        ])
        .unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.token_ttl_minutes, 15);
        assert_eq!(cfg.password_hash_rounds, 2000);
        assert_eq!(cfg.content_dir, Some(PathBuf::from("/var/lib/registrar")));
        let admin = cfg.bootstrap_admin.unwrap();
        assert_eq!(admin.username, "root");
        assert_eq!(admin.email, "root@localhost");
    }

    #[test]
    fn rejects_bad_numbers_and_flags() {
        assert!(matches!(
            load(&[("TOKEN_TTL_MINUTES", "soon")]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_MINUTES", .. })
        ));
        assert!(matches!(
            load(&[("TOKEN_TTL_MINUTES", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            load(&[("PASSWORD_HASH_ROUNDS", "0")]),
            Err(ConfigError::Invalid { var: "PASSWORD_HASH_ROUNDS", .. })
        ));
        assert!(matches!(
            load(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn persistent_stores_need_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn half_configured_bootstrap_admin_is_rejected() {
        assert_eq!(
            load(&[("BOOTSTRAP_ADMIN_USERNAME", "root")]).unwrap_err(),
            ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")
        );
    }
}
