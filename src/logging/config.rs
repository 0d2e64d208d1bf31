use std::path::PathBuf;

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub environment: String,
    pub level: String,
    pub dir: PathBuf,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::new(
            environment,
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_DIR").ok(),
        )
    }

    pub fn new(environment: String, level: Option<String>, dir: Option<String>) -> Self {
        let level = level.filter(|l| !l.is_empty()).unwrap_or_else(|| {
            if environment == "production" {
                "info".to_string()
            } else {
                "debug".to_string()
            }
        });
        Self {
            environment,
            level,
            dir: PathBuf::from(dir.filter(|d| !d.is_empty()).unwrap_or_else(|| "logs".to_string())),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        format!(
            "novelread_backend={},tower_http=debug,axum=debug,sqlx=warn",
            self.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_defaults_by_environment() {
        let dev = LogConfig::new("development".to_string(), None, None);
        assert_eq!(dev.level, "debug");
        assert_eq!(dev.dir, PathBuf::from("logs"));

        let prod = LogConfig::new("production".to_string(), None, Some("/var/log/novel".into()));
        assert_eq!(prod.level, "info");
        assert!(prod.is_production());
        assert_eq!(prod.dir, PathBuf::from("/var/log/novel"));
    }

    #[test]
    fn test_default_directive_names_crate() {
        let cfg = LogConfig::new("development".to_string(), Some("trace".into()), None);
        assert!(cfg.default_directive().starts_with("novelread_backend=trace"));
    }
}
