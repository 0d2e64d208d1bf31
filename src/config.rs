//! Application configuration read from the environment.

use std::net::SocketAddr;

/// JWT secret used when `JWT_SECRET` is unset. Startup refuses it in
/// production.
pub const DEFAULT_JWT_SECRET: &str = "novelread-dev-secret-change-in-production";

const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

lazy_static::lazy_static! {
    /// Process-wide configuration, read on first use.
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub jwt_secret: String,
    pub jwt_expire_days: i64,
    pub allowed_origins: Vec<String>,
    pub upload_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .or_else(|| non_empty("FRONTEND_ORIGIN").map(|o| vec![o]))
            .unwrap_or_else(|| DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect());

        Self {
            host: non_empty("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: non_empty("PORT").and_then(|s| s.parse().ok()).unwrap_or(5001),
            environment: non_empty("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            jwt_secret: non_empty("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
            jwt_expire_days: non_empty("JWT_EXPIRE_DAYS")
                .and_then(|s| s.parse().ok())
                .filter(|d| *d > 0)
                .unwrap_or(30),
            allowed_origins,
            upload_dir: non_empty("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.port, 5001);
        assert_eq!(c.jwt_expire_days, 30);
        assert_eq!(c.upload_dir, "uploads");
        assert!(c.is_development());
        assert!(c.uses_default_secret());
        assert_eq!(c.allowed_origins.len(), 2);
        assert_eq!(c.bind_addr().unwrap().port(), 5001);
    }

    #[test]
    fn test_allowed_origins_take_precedence_over_frontend_origin() {
        let c = config(&[
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("FRONTEND_ORIGIN", "https://c.example"),
        ]);
        assert_eq!(c.allowed_origins, vec!["https://a.example", "https://b.example"]);

        let c = config(&[("FRONTEND_ORIGIN", "https://c.example")]);
        assert_eq!(c.allowed_origins, vec!["https://c.example"]);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let c = config(&[("PORT", "http"), ("JWT_EXPIRE_DAYS", "-3")]);
        assert_eq!(c.port, 5001);
        assert_eq!(c.jwt_expire_days, 30);
    }

    #[test]
    fn test_production_flags() {
        let c = config(&[("ENVIRONMENT", "production"), ("JWT_SECRET", "s3cr3t")]);
        assert!(c.is_production());
        assert!(!c.is_development());
        assert!(!c.uses_default_secret());
    }
}
