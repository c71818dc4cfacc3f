use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::info;

/// Admin passwords that must never reach a real directory.
const PLACEHOLDER_PASSWORDS: &[&str] = &["change-me", "admin", "password"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub seed_members: u32,
    pub admin_password: Option<String>,
    pub upload_latency: Duration,
    pub upload_base_url: String,
    pub remote_url: Option<String>,
    pub remote_auth: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let admin_password = optional("ROSTER_ADMIN_PASSWORD");
        if let Some(password) = &admin_password {
            if PLACEHOLDER_PASSWORDS.contains(&password.as_str()) {
                anyhow::bail!("ROSTER_ADMIN_PASSWORD is still a placeholder; pick a real one");
            }
        }

        Ok(Self {
            host: try_load("ROSTER_HOST", "0.0.0.0")?,
            port: try_load("ROSTER_PORT", "3000")?,
            db_path: try_load::<String>("ROSTER_DB_PATH", "roster.db")?.into(),
            seed_members: try_load("ROSTER_SEED_MEMBERS", "46")?,
            admin_password,
            upload_latency: Duration::from_millis(try_load("ROSTER_UPLOAD_LATENCY_MS", "1000")?),
            upload_base_url: try_load("ROSTER_UPLOAD_BASE_URL", "mock://uploads")?,
            remote_url: optional("ROSTER_REMOTE_URL"),
            remote_auth: optional("ROSTER_REMOTE_AUTH"),
        })
    }

    /// Zero-padded member ids `01..=seed_members`.
    pub fn seed_member_ids(&self) -> Vec<String> {
        let width = self.seed_members.to_string().len().max(2);
        (1..=self.seed_members)
            .map(|i| format!("{:0width$}", i, width = width))
            .collect()
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {key} value '{raw}'"))
}
