use chrono::Duration;
use serde::Deserialize;

use crate::abuse::AbuseParams;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Sweep interval T in seconds; also the history read window.
    /// Set via WARDEN_SWEEP_INTERVAL_SECS. Default: 300.
    pub sweep_interval_secs: u64,
    /// Sliding-window bucket width W in seconds. Default: 60.
    pub bucket_secs: u64,
    /// Per-bucket request count above which (strictly) an identity is a
    /// violator. Default: 100.
    pub volume_threshold: u64,
    /// Base ban duration D in seconds. Default: 900.
    pub ban_secs: u64,
    /// Recidivism multiplier M (>= 1). Default: 3.
    pub recidivism_factor: u32,
}

impl Config {
    pub fn abuse_params(&self) -> AbuseParams {
        AbuseParams {
            window: Duration::seconds(self.sweep_interval_secs as i64),
            bucket_width: Duration::seconds(self.bucket_secs as i64),
            threshold: self.volume_threshold,
            ban_duration: Duration::seconds(self.ban_secs as i64),
            recidivism_factor: self.recidivism_factor.max(1) as i32,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    let cfg = Config {
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/warden".into()),
        sweep_interval_secs: env_or("WARDEN_SWEEP_INTERVAL_SECS", 300),
        bucket_secs: env_or("WARDEN_BUCKET_SECS", 60),
        volume_threshold: env_or("WARDEN_VOLUME_THRESHOLD", 100),
        ban_secs: env_or("WARDEN_BAN_SECS", 900),
        recidivism_factor: env_or("WARDEN_RECIDIVISM_FACTOR", 3),
    };

    if cfg.bucket_secs == 0 || cfg.sweep_interval_secs == 0 {
        anyhow::bail!("WARDEN_BUCKET_SECS and WARDEN_SWEEP_INTERVAL_SECS must be non-zero");
    }
    if cfg.recidivism_factor == 0 {
        anyhow::bail!("WARDEN_RECIDIVISM_FACTOR must be >= 1");
    }

    Ok(cfg)
}
