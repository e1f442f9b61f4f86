use std::env;

const GIB: i64 = 1024 * 1024 * 1024;

/// Object store connection settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 compatible endpoint (default: "http://127.0.0.1:9000")
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Bucket holding every user object (default: "connect-drive")
    pub bucket: String,
    /// Region used for request signing (default: "us-east-1")
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "connect-drive".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            endpoint: env::var("S3_ENDPOINT").unwrap_or(default.endpoint),
            access_key: env::var("S3_ACCESS_KEY").unwrap_or(default.access_key),
            secret_key: env::var("S3_SECRET_KEY").unwrap_or(default.secret_key),
            bucket: env::var("S3_BUCKET").unwrap_or(default.bucket),
            region: env::var("S3_REGION").unwrap_or(default.region),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JWT signing secret (Required in production)
    pub jwt_secret: String,

    /// Access token lifetime in minutes (default: 15)
    pub access_token_ttl_minutes: i64,

    /// Refresh token lifetime in days (default: 30)
    pub refresh_token_ttl_days: i64,

    /// Lifetime of pre-signed upload/download URLs in seconds (default: 900)
    pub presign_ttl_secs: u64,

    /// Largest single file accepted, in bytes (default: 5 GiB)
    pub max_upload_size: i64,

    /// Quota granted to new accounts, in bytes (default: 10 GiB)
    pub default_storage_quota: i64,

    /// Days an item stays in the recycle bin before it is purged (default: 30)
    pub recycle_retention_days: i64,

    /// Seconds between background sweeps (default: 300)
    pub worker_interval_secs: u64,

    /// Optional endpoint receiving error reports as JSON
    pub monitoring_webhook_url: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 30,
            presign_ttl_secs: 900,
            max_upload_size: 5 * GIB,
            default_storage_quota: 10 * GIB,
            recycle_retention_days: 30,
            worker_interval_secs: 300,
            monitoring_webhook_url: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            storage: StorageConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn origins_from_env(default: Vec<String>) -> Vec<String> {
    env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            // Fallback for dev convenience, strictly enforced in production()
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
            access_token_ttl_minutes: parse_env(
                "ACCESS_TOKEN_TTL_MINUTES",
                default.access_token_ttl_minutes,
            ),
            refresh_token_ttl_days: parse_env(
                "REFRESH_TOKEN_TTL_DAYS",
                default.refresh_token_ttl_days,
            ),
            presign_ttl_secs: parse_env("PRESIGN_TTL_SECS", default.presign_ttl_secs),
            max_upload_size: parse_env("MAX_UPLOAD_SIZE", default.max_upload_size),
            default_storage_quota: parse_env(
                "DEFAULT_STORAGE_QUOTA",
                default.default_storage_quota,
            ),
            recycle_retention_days: parse_env(
                "RECYCLE_RETENTION_DAYS",
                default.recycle_retention_days,
            ),
            worker_interval_secs: parse_env("WORKER_INTERVAL_SECS", default.worker_interval_secs),
            monitoring_webhook_url: env::var("MONITORING_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            allowed_origins: origins_from_env(default.allowed_origins),
            storage: StorageConfig::from_env(),
        }
    }

    /// Environment config with a short retention and a fast sweep
    pub fn development() -> Self {
        Self {
            recycle_retention_days: 1,
            worker_interval_secs: 60,
            ..Self::from_env()
        }
    }

    /// Create config for production (strict security)
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("CRITICAL: JWT_SECRET must be set"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("CRITICAL: JWT_SECRET must be at least 32 bytes");
        }

        Ok(Self {
            jwt_secret,
            allowed_origins: origins_from_env(Vec::new()),
            ..Self::from_env()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.access_token_ttl_minutes, 15);
        assert_eq!(config.refresh_token_ttl_days, 30);
        assert_eq!(config.default_storage_quota, 10 * GIB);
        assert_eq!(config.max_upload_size, 5 * GIB);
        assert!(config.monitoring_webhook_url.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.recycle_retention_days, 1);
        assert_eq!(config.worker_interval_secs, 60);
    }

    #[test]
    fn test_production_requires_strong_secret() {
        unsafe { env::set_var("JWT_SECRET", "short") };
        assert!(AppConfig::production().is_err());

        unsafe { env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef") };
        let config = AppConfig::production().unwrap();
        unsafe { env::remove_var("JWT_SECRET") };
        assert_eq!(config.jwt_secret.len(), 32);
    }

    #[test]
    fn test_from_env_cors_fallback() {
        unsafe { env::remove_var("ALLOWED_ORIGINS") };
        let config = AppConfig::from_env();
        let default_config = AppConfig::default();
        assert_eq!(config.allowed_origins, default_config.allowed_origins);
        assert!(!config.allowed_origins.contains(&"*".to_string()));
    }
}
