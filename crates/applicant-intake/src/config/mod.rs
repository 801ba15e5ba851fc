use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::applicants::AddressLookup;

const DEFAULT_CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DEFAULT_MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: Option<DatabaseConfig>,
    pub images: Option<CloudinaryConfig>,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parse_number("DATABASE_MAX_CONNECTIONS", 5)?,
                acquire_timeout_secs: parse_number("DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?,
            }),
            _ => None,
        };

        let upload_timeout_secs = parse_number("IMAGE_UPLOAD_TIMEOUT_SECS", 30)?;
        let images = match env::var("CLOUDINARY_URL") {
            Ok(url) if !url.trim().is_empty() => {
                let mut images = CloudinaryConfig::from_url(
                    &url,
                    env::var("CLOUDINARY_FOLDER").ok(),
                    upload_timeout_secs,
                )?;
                if let Ok(value) = env::var("CLOUDINARY_SIGNATURE_ALGORITHM") {
                    images.signature_algorithm = SignatureAlgorithm::from_str(&value)
                        .ok_or(ConfigError::InvalidSignatureAlgorithm(value))?;
                }
                Some(images)
            }
            _ => None,
        };

        let address_lookup = match env::var("APP_EDIT_ADDRESS_LOOKUP") {
            Ok(value) => {
                AddressLookup::from_str(&value).ok_or(ConfigError::InvalidAddressLookup(value))?
            }
            Err(_) => AddressLookup::default(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            images,
            intake: IntakeConfig {
                max_photo_bytes: parse_number("APP_MAX_PHOTO_BYTES", DEFAULT_MAX_PHOTO_BYTES)?,
                address_lookup,
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// PostgreSQL connection settings.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Digest used to sign upload requests. Cloudinary accounts verify SHA-1
/// unless they were switched to SHA-256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub const fn label(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Some(SignatureAlgorithm::Sha1),
            "sha256" | "sha-256" => Some(SignatureAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// Credentials and limits for the hosted-image service.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: Option<String>,
    pub api_base: String,
    pub upload_timeout_secs: u64,
    pub signature_algorithm: SignatureAlgorithm,
}

impl CloudinaryConfig {
    /// Parse `cloudinary://<api_key>:<api_secret>@<cloud_name>`.
    pub fn from_url(
        raw: &str,
        folder: Option<String>,
        upload_timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let url = reqwest::Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidCloudinaryUrl)?;
        if url.scheme() != "cloudinary" {
            return Err(ConfigError::InvalidCloudinaryUrl);
        }

        let api_key = url.username();
        let api_secret = url.password().unwrap_or_default();
        let cloud_name = url.host_str().unwrap_or_default();
        if api_key.is_empty() || api_secret.is_empty() || cloud_name.is_empty() {
            return Err(ConfigError::InvalidCloudinaryUrl);
        }

        Ok(Self {
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            folder: folder.filter(|value| !value.trim().is_empty()),
            api_base: DEFAULT_CLOUDINARY_API_BASE.to_string(),
            upload_timeout_secs,
            signature_algorithm: SignatureAlgorithm::default(),
        })
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("folder", &self.folder)
            .field("api_base", &self.api_base)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish_non_exhaustive()
    }
}

/// Request handling knobs for the applicant routes.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub max_photo_bytes: usize,
    pub address_lookup: AddressLookup,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            address_lookup: AddressLookup::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidCloudinaryUrl,
    InvalidAddressLookup(String),
    InvalidSignatureAlgorithm(String),
    MissingDatabaseUrl,
    MissingCloudinaryUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a non-negative integer")
            }
            ConfigError::InvalidCloudinaryUrl => write!(
                f,
                "CLOUDINARY_URL must look like cloudinary://<api_key>:<api_secret>@<cloud_name>"
            ),
            ConfigError::InvalidAddressLookup(value) => write!(
                f,
                "APP_EDIT_ADDRESS_LOOKUP must be 'primary_key' or 'applicant', got '{value}'"
            ),
            ConfigError::InvalidSignatureAlgorithm(value) => write!(
                f,
                "CLOUDINARY_SIGNATURE_ALGORITHM must be 'sha1' or 'sha256', got '{value}'"
            ),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL is required unless running in memory")
            }
            ConfigError::MissingCloudinaryUrl => {
                write!(f, "CLOUDINARY_URL is required unless running in memory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
