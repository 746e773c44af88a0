use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

impl std::str::FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "sha1" => Ok(SignatureAlgorithm::Sha1),
            "sha256" => Ok(SignatureAlgorithm::Sha256),
            other => Err(format!("{other}, expected sha1/sha256")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    // sha256 requires the Cloudinary account's signature algorithm set to SHA-256.
    pub signature_algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub firebase_project_id: String,
    pub cloudinary: Option<CloudinaryConfig>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub cors_allowed_origins: Vec<String>,
    pub event_buffer_size: usize,
    pub max_upload_bytes: usize,
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = parse_log_format(optional("LOG_FORMAT").as_deref())?;

        let cloudinary = match (
            optional("CLOUDINARY_CLOUD_NAME"),
            optional("CLOUDINARY_API_KEY"),
            optional("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                signature_algorithm: parse_or_default(
                    "CLOUDINARY_SIGNATURE_ALGORITHM",
                    SignatureAlgorithm::Sha1,
                )?,
            }),
            _ => None,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 5000)?,
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            database_url: optional("DATABASE_URL"),
            db_max_connections: parse_or_default("DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parse_or_default("RUN_MIGRATIONS", true)?,
            firebase_project_id: optional("FIREBASE_PROJECT_ID").ok_or_else(|| {
                AppError::Internal("FIREBASE_PROJECT_ID must be set".to_string())
            })?,
            cloudinary,
            gemini_api_key: optional("GEMINI_API_KEY"),
            gemini_model: optional("GEMINI_MODEL")
                .unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            max_upload_bytes: parse_or_default("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            upstream_timeout_secs: parse_or_default("UPSTREAM_TIMEOUT_SECS", 30)?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat, AppError> {
    match raw {
        Some("json") => Ok(LogFormat::Json),
        Some("compact") | None => Ok(LogFormat::Compact),
        Some(other) => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact/json"
        ))),
    }
}
