use crate::services::{
    chunk_planner::{ChunkPlanner, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE},
    object_storage::{DEFAULT_PRESIGN_TTL, S3Settings},
    upload_service::DEFAULT_KEY_PREFIX,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub s3: S3Settings,
    /// Namespace prefix for generated object keys.
    pub key_prefix: String,
    pub presign_ttl: Duration,
    pub max_file_size: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Multipart video upload service")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides UPLOAD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket receiving uploads (overrides UPLOAD_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Object storage region (overrides UPLOAD_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom S3-compatible endpoint (overrides UPLOAD_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Use path-style bucket addressing (overrides UPLOAD_S3_FORCE_PATH_STYLE)
    #[arg(long)]
    pub s3_force_path_style: Option<bool>,

    /// Prefix for generated object keys (overrides UPLOAD_KEY_PREFIX)
    #[arg(long)]
    pub key_prefix: Option<String>,

    /// Lifetime of presigned part URLs in seconds (overrides UPLOAD_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Largest accepted file in bytes (overrides UPLOAD_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment.
    ///
    /// Credentials are only read from the environment
    /// (`UPLOAD_S3_ACCESS_KEY_ID` / `UPLOAD_S3_SECRET_ACCESS_KEY`); when unset
    /// the SDK's default provider chain is used.
    pub fn from_args(args: Args) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = env::var("UPLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("UPLOAD_PORT", 3000u16)?;
        let env_db = env::var("UPLOAD_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/uploads.db".into());
        let env_bucket = env::var("UPLOAD_S3_BUCKET").unwrap_or_else(|_| "videos".into());
        let env_region = env::var("UPLOAD_S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_endpoint = env::var("UPLOAD_S3_ENDPOINT").ok();
        let env_path_style = env_or("UPLOAD_S3_FORCE_PATH_STYLE", false)?;
        let env_prefix =
            env::var("UPLOAD_KEY_PREFIX").unwrap_or_else(|_| DEFAULT_KEY_PREFIX.into());
        let env_ttl = env_or("UPLOAD_PRESIGN_TTL_SECS", DEFAULT_PRESIGN_TTL.as_secs())?;
        let env_max_size = env_or("UPLOAD_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;

        // --- Merge ---
        let presign_ttl_secs = args.presign_ttl_secs.unwrap_or(env_ttl);
        if presign_ttl_secs == 0 {
            anyhow::bail!("presign TTL must be at least one second");
        }
        let max_file_size = args.max_file_size.unwrap_or(env_max_size);
        if max_file_size <= 0 {
            anyhow::bail!("max file size must be positive, got {}", max_file_size);
        }
        let plannable = ChunkPlanner::max_plannable_size(DEFAULT_CHUNK_SIZE);
        if max_file_size > plannable {
            anyhow::bail!(
                "max file size {} exceeds the {} bytes that {}-byte chunks can cover",
                max_file_size,
                plannable,
                DEFAULT_CHUNK_SIZE
            );
        }

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            s3: S3Settings {
                bucket: args.s3_bucket.unwrap_or(env_bucket),
                region: args.s3_region.unwrap_or(env_region),
                endpoint_url: args.s3_endpoint.or(env_endpoint),
                access_key_id: env::var("UPLOAD_S3_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("UPLOAD_S3_SECRET_ACCESS_KEY").ok(),
                force_path_style: args.s3_force_path_style.unwrap_or(env_path_style),
            },
            key_prefix: args.key_prefix.unwrap_or(env_prefix),
            presign_ttl: Duration::from_secs(presign_ttl_secs),
            max_file_size,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("s3_bucket", &self.s3.bucket)
            .field("s3_region", &self.s3.region)
            .field("s3_endpoint", &self.s3.endpoint_url)
            .field("s3_static_credentials", &self.s3.access_key_id.is_some())
            .field("key_prefix", &self.key_prefix)
            .field("presign_ttl", &self.presign_ttl)
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

/// Read and parse `name`, falling back to `default` when it is unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
