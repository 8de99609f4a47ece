//! Configuration module
//!
//! `Config::from_env` is called once at startup; every component receives the
//! sub-config it needs through its constructor.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const MB: u64 = 1024 * 1024;

const SCAN_TIMEOUT_SECS: u64 = 30;
const SCAN_RETRIES: u32 = 3;
const SCAN_MAX_FILE_SIZE_MB: u64 = 100;
const CLAMAV_PORT: u16 = 3310;

const MULTIPART_THRESHOLD_MB: u64 = 100;
const MULTIPART_PART_SIZE_MB: u64 = 50;
const MULTIPART_CONCURRENCY: usize = 4;
const STORAGE_RETRY_ATTEMPTS: u32 = 3;
const STORAGE_RETRY_BASE_DELAY_MS: u64 = 1000;
const QUARANTINE_PREFIX: &str = "quarantine";

const MAX_FILE_SIZE_MB: u64 = 100;
const MAX_PRESIGN_EXPIRY_SECS: u64 = 1800;
const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 900;
const UPLOAD_RATE_LIMIT: u32 = 100;
const UPLOAD_RATE_WINDOW_SECS: u64 = 3600;
const RISK_THRESHOLD: u32 = 50;

const JOB_ATTEMPTS: u32 = 3;
const MAX_ACCESS_LOG: usize = 100;

const DEFAULT_ALLOWED_CONTENT_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp,\
application/pdf,text/plain,text/csv,application/json,application/zip,\
video/mp4,audio/mpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanBackendKind {
    Signature,
    ClamAv,
}

impl FromStr for ScanBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "signature" => Ok(ScanBackendKind::Signature),
            "clamav" => Ok(ScanBackendKind::ClamAv),
            _ => Err(anyhow::anyhow!("Invalid scan backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub enabled: bool,
    pub timeout: Duration,
    pub retries: u32,
    pub max_file_size: u64,
    pub backend: ScanBackendKind,
    pub clamav_host: String,
    pub clamav_port: u16,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(SCAN_TIMEOUT_SECS),
            retries: SCAN_RETRIES,
            max_file_size: SCAN_MAX_FILE_SIZE_MB * MB,
            backend: ScanBackendKind::Signature,
            clamav_host: "localhost".to_string(),
            clamav_port: CLAMAV_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    pub endpoint: Option<String>,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
    pub presign_secret: Option<String>,
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub part_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub quarantine_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: None,
            region: None,
            endpoint: None,
            local_path: None,
            local_base_url: None,
            presign_secret: None,
            multipart_threshold: MULTIPART_THRESHOLD_MB * MB,
            part_size: MULTIPART_PART_SIZE_MB * MB,
            part_concurrency: MULTIPART_CONCURRENCY,
            retry_attempts: STORAGE_RETRY_ATTEMPTS,
            retry_base_delay: Duration::from_millis(STORAGE_RETRY_BASE_DELAY_MS),
            quarantine_prefix: QUARANTINE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub max_file_size: u64,
    pub allowed_content_types: Vec<String>,
    pub max_presign_expiry_secs: u64,
    pub default_presign_expiry_secs: u64,
    pub rate_limit_per_window: u32,
    pub rate_limit_window: Duration,
    pub risk_threshold: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE_MB * MB,
            allowed_content_types: split_list(DEFAULT_ALLOWED_CONTENT_TYPES),
            max_presign_expiry_secs: MAX_PRESIGN_EXPIRY_SECS,
            default_presign_expiry_secs: DEFAULT_PRESIGN_EXPIRY_SECS,
            rate_limit_per_window: UPLOAD_RATE_LIMIT,
            rate_limit_window: Duration::from_secs(UPLOAD_RATE_WINDOW_SECS),
            risk_threshold: RISK_THRESHOLD,
        }
    }
}

impl SecurityPolicy {
    /// Effective presign lifetime: the default when unspecified, never above the ceiling.
    pub fn clamp_presign_expiry(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|secs| *secs > 0)
            .unwrap_or(self.default_presign_expiry_secs)
            .min(self.max_presign_expiry_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub job_attempts: u32,
    pub max_access_log: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            job_attempts: JOB_ATTEMPTS,
            max_access_log: MAX_ACCESS_LOG,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub environment: String,
    pub scan: ScanConfig,
    pub storage: StorageConfig,
    pub security: SecurityPolicy,
    pub processing: ProcessingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let scan = ScanConfig {
            enabled: env_bool("VIRUS_SCAN_ENABLED", true),
            timeout: Duration::from_secs(env_parse("VIRUS_SCAN_TIMEOUT_SECS", SCAN_TIMEOUT_SECS)),
            retries: env_parse("VIRUS_SCAN_RETRIES", SCAN_RETRIES),
            max_file_size: env_parse("VIRUS_SCAN_MAX_FILE_SIZE_MB", SCAN_MAX_FILE_SIZE_MB) * MB,
            backend: env::var("VIRUS_SCAN_BACKEND")
                .unwrap_or_else(|_| "signature".to_string())
                .parse()?,
            clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamav_port: env_parse("CLAMAV_PORT", CLAMAV_PORT),
        };

        let storage = StorageConfig {
            backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "local".to_string())
                .parse()?,
            bucket: env::var("S3_BUCKET").ok(),
            region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            endpoint: env::var("S3_ENDPOINT").ok(),
            local_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            presign_secret: env::var("PRESIGN_SECRET").ok(),
            multipart_threshold: env_parse("MULTIPART_THRESHOLD_MB", MULTIPART_THRESHOLD_MB) * MB,
            part_size: env_parse("MULTIPART_PART_SIZE_MB", MULTIPART_PART_SIZE_MB) * MB,
            part_concurrency: env_parse("MULTIPART_CONCURRENCY", MULTIPART_CONCURRENCY),
            retry_attempts: env_parse("STORAGE_RETRY_ATTEMPTS", STORAGE_RETRY_ATTEMPTS),
            retry_base_delay: Duration::from_millis(env_parse(
                "STORAGE_RETRY_BASE_DELAY_MS",
                STORAGE_RETRY_BASE_DELAY_MS,
            )),
            quarantine_prefix: env::var("QUARANTINE_PREFIX")
                .unwrap_or_else(|_| QUARANTINE_PREFIX.to_string()),
        };

        let security = SecurityPolicy {
            max_file_size: env_parse("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB) * MB,
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string()),
            ),
            max_presign_expiry_secs: env_parse("PRESIGN_MAX_EXPIRY_SECS", MAX_PRESIGN_EXPIRY_SECS),
            default_presign_expiry_secs: env_parse(
                "PRESIGN_DEFAULT_EXPIRY_SECS",
                DEFAULT_PRESIGN_EXPIRY_SECS,
            ),
            rate_limit_per_window: env_parse("UPLOAD_RATE_LIMIT", UPLOAD_RATE_LIMIT),
            rate_limit_window: Duration::from_secs(env_parse(
                "UPLOAD_RATE_WINDOW_SECS",
                UPLOAD_RATE_WINDOW_SECS,
            )),
            risk_threshold: env_parse("RISK_THRESHOLD", RISK_THRESHOLD),
        };

        let processing = ProcessingConfig {
            job_attempts: env_parse("PROCESSING_JOB_ATTEMPTS", JOB_ATTEMPTS),
            max_access_log: env_parse("MAX_ACCESS_LOG", MAX_ACCESS_LOG),
        };

        let config = Config {
            environment,
            scan,
            storage,
            security,
            processing,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.is_production() && self.storage.presign_secret.is_none() {
                    return Err(anyhow::anyhow!(
                        "PRESIGN_SECRET must be set in production for local presigned URLs"
                    ));
                }
            }
        }

        if self.storage.part_size < 5 * MB {
            return Err(anyhow::anyhow!(
                "MULTIPART_PART_SIZE_MB must be at least 5 (S3 minimum part size)"
            ));
        }
        if self.storage.part_concurrency == 0 {
            return Err(anyhow::anyhow!("MULTIPART_CONCURRENCY must be at least 1"));
        }
        if self.storage.retry_attempts == 0 {
            return Err(anyhow::anyhow!("STORAGE_RETRY_ATTEMPTS must be at least 1"));
        }
        if self.security.default_presign_expiry_secs > self.security.max_presign_expiry_secs {
            return Err(anyhow::anyhow!(
                "PRESIGN_DEFAULT_EXPIRY_SECS cannot exceed PRESIGN_MAX_EXPIRY_SECS"
            ));
        }
        if self.scan.timeout.is_zero() {
            return Err(anyhow::anyhow!("VIRUS_SCAN_TIMEOUT_SECS must be positive"));
        }
        if self.processing.max_access_log == 0 {
            return Err(anyhow::anyhow!("MAX_ACCESS_LOG must be at least 1"));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr + ToString + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
