use anyhow::{Context, Result};

const DEFAULT_INFERENCE_BASE_URL: &str = "https://i-deepanshu-ramunderdev.hf.space";
const MIB: usize = 1024 * 1024;

/// S3 settings. Present only when every S3 variable is set.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// `None` runs the service on the in-process store.
    pub database_url: Option<String>,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub inference_base_url: String,
    pub hf_token: Option<String>,
    pub inference_timeout_secs: u64,
    pub upload_dir: String,
    pub upload_ttl_hours: i64,
    pub max_pdf_bytes: usize,
    pub max_zip_bytes: usize,
    pub s3: Option<S3Config>,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: optional_env("DATABASE_URL"),
            razorpay_key_id: std::env::var("RAZORPAY_KEY_ID")
                .unwrap_or_else(|_| "rzp_test_key".to_string()),
            razorpay_key_secret: require_env("RAZORPAY_KEY_SECRET")?,
            inference_base_url: std::env::var("INFERENCE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_INFERENCE_BASE_URL.to_string()),
            hf_token: optional_env("HF_TOKEN"),
            inference_timeout_secs: parse_env("INFERENCE_TIMEOUT_SECS", 300)?,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "tmp/uploads".to_string()),
            upload_ttl_hours: parse_env("UPLOAD_TTL_HOURS", 24)?,
            max_pdf_bytes: parse_env("MAX_PDF_BYTES", 10 * MIB)?,
            max_zip_bytes: parse_env("MAX_ZIP_BYTES", 50 * MIB)?,
            s3: s3_from_env(),
            cookie_secure: parse_env("COOKIE_SECURE", false)?,
        })
    }

    /// Upper bound for a multipart upload body: both files plus form overhead.
    pub fn upload_body_limit(&self) -> usize {
        self.max_pdf_bytes + self.max_zip_bytes + MIB
    }
}

fn s3_from_env() -> Option<S3Config> {
    Some(S3Config {
        bucket: optional_env("S3_BUCKET")?,
        endpoint: optional_env("S3_ENDPOINT")?,
        access_key_id: optional_env("AWS_ACCESS_KEY_ID")?,
        secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY")?,
    })
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by handler and service tests.
    pub fn for_tests(upload_dir: &str) -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            database_url: None,
            razorpay_key_id: "rzp_test_key".to_string(),
            razorpay_key_secret: "test_secret".to_string(),
            inference_base_url: "http://127.0.0.1:9".to_string(),
            hf_token: None,
            inference_timeout_secs: 5,
            upload_dir: upload_dir.to_string(),
            upload_ttl_hours: 24,
            max_pdf_bytes: 10 * MIB,
            max_zip_bytes: 50 * MIB,
            s3: None,
            cookie_secure: false,
        }
    }
}
