use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, collected from `EDDY_*` environment variables
/// (with `.env` support) and passed explicitly into the services.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// A message is quarantined once its distinct-reporter count strictly
    /// exceeds this.
    pub abuse_threshold: u32,
    /// How often each watch polls the store for new message ids.
    pub poll_interval: Duration,
    /// Attachment directory; when unset, quarantine skips access revocation.
    pub attachment_root: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("EDDY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("EDDY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;
        let db_path = PathBuf::from(std::env::var("EDDY_DB_PATH").unwrap_or_else(|_| "eddy.db".into()));
        let jwt_secret =
            std::env::var("EDDY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
        let abuse_threshold: u32 = std::env::var("EDDY_ABUSE_THRESHOLD")
            .unwrap_or_else(|_| "5".into())
            .parse()?;
        let poll_interval_ms: u64 = std::env::var("EDDY_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".into())
            .parse()?;
        let attachment_root = std::env::var("EDDY_ATTACHMENT_ROOT").ok().map(PathBuf::from);

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            abuse_threshold,
            poll_interval: Duration::from_millis(poll_interval_ms),
            attachment_root,
        })
    }
}
