use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use linkfolio_db::DEFAULT_POOL_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub transactional: bool,
    pub image_dir: PathBuf,
    /// `None` allows any origin.
    pub cors_origin: Option<String>,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match var("LINKFOLIO_PORT").or_else(|| var("PORT")) {
            Some(v) => v.parse().with_context(|| format!("Invalid port {:?}", v))?,
            None => 5000,
        };
        let pool_size: usize = match var("LINKFOLIO_DB_POOL_SIZE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("Invalid LINKFOLIO_DB_POOL_SIZE {:?}", v))?,
            None => DEFAULT_POOL_SIZE,
        };
        let transactional = match var("LINKFOLIO_TRANSACTIONAL") {
            Some(v) => parse_bool(&v)?,
            None => false,
        };
        let max_upload_bytes: usize = match var("LINKFOLIO_MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("Invalid LINKFOLIO_MAX_UPLOAD_BYTES {:?}", v))?,
            None => 10 * 1024 * 1024,
        };

        Ok(Self {
            host: var("LINKFOLIO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("LINKFOLIO_DB_PATH")
                .unwrap_or_else(|| "linkfolio.db".into())
                .into(),
            pool_size,
            transactional,
            image_dir: var("LINKFOLIO_IMAGE_DIR")
                .unwrap_or_else(|| "public/images".into())
                .into(),
            cors_origin: var("LINKFOLIO_CORS_ORIGIN"),
            max_upload_bytes,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid LINKFOLIO_TRANSACTIONAL {:?}", other),
    }
}
