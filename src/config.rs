//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero configuration for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address of the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:3030`
    pub http_addr: SocketAddr,

    /// JSON file holding the whole database.
    /// Env: `DATABASE_PATH`
    /// Default: `db.json`
    pub database_path: PathBuf,

    /// Env: `LOG_LEVEL` (error, warn, info, debug, trace)
    /// Default: `info`
    pub log_level: log::LevelFilter,

    /// Administrator account created on startup if missing.
    /// Env: `ADMIN_EMAIL`, `ADMIN_NAME`, `ADMIN_PASSWORD`
    pub admin_email: String,
    pub admin_name: String,
    pub admin_password: String,

    /// Work factor used when hashing new passwords.
    /// Env: `BCRYPT_COST`
    /// Default: `bcrypt::DEFAULT_COST`
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], 3030).into(),
            database_path: PathBuf::from("db.json"),
            log_level: log::LevelFilter::Info,
            admin_email: "admin@coursehub.local".to_string(),
            admin_name: "Platform Admin".to_string(),
            admin_password: "admin".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Runs before logging is set up, so problems with invalid values are returned to be
    /// logged by the caller.
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<String>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => warnings.push(format!("Invalid HTTP_ADDR {:?}, using default", addr)),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            match level.parse::<log::LevelFilter>() {
                Ok(parsed) => config.log_level = parsed,
                Err(_) => warnings.push(format!("Invalid LOG_LEVEL {:?}, using default", level)),
            }
        }

        if let Some(email) = lookup("ADMIN_EMAIL") {
            config.admin_email = email;
        }

        if let Some(name) = lookup("ADMIN_NAME") {
            config.admin_name = name;
        }

        if let Some(password) = lookup("ADMIN_PASSWORD") {
            config.admin_password = password;
        }

        if let Some(cost) = lookup("BCRYPT_COST") {
            match cost.parse::<u32>() {
                Ok(parsed) if (4..=31).contains(&parsed) => config.bcrypt_cost = parsed,
                _ => warnings.push(format!("Invalid BCRYPT_COST {:?}, using default", cost)),
            }
        }

        (config, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> (ServerConfig, Vec<String>) {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let (config, warnings) = load(&[]);

        assert!(warnings.is_empty());
        assert_eq!(config.http_addr, "127.0.0.1:3030".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_path, PathBuf::from("db.json"));
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn values_are_read_from_environment() {
        let (config, warnings) = load(&[
            ("HTTP_ADDR", "0.0.0.0:8080"),
            ("DATABASE_PATH", "/var/lib/coursehub/db.json"),
            ("LOG_LEVEL", "debug"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("BCRYPT_COST", "6"),
        ]);

        assert!(warnings.is_empty());
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/coursehub/db.json")
        );
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert_eq!(config.admin_email, "root@example.com");
        assert_eq!(config.bcrypt_cost, 6);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let (config, warnings) = load(&[
            ("HTTP_ADDR", "not an address"),
            ("LOG_LEVEL", "loud"),
            ("BCRYPT_COST", "2"),
        ]);

        assert_eq!(warnings.len(), 3);
        assert_eq!(config.http_addr.port(), 3030);
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    }
}
