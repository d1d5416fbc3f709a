use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::remote::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub device_id: Uuid,

    /// Prefix used when printing money.
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Range used by `stack rewards` when none is given (1w, 1m, 3m, 1y, all).
    #[serde(default = "default_range")]
    pub default_range: String,

    /// Base URL of the remote transaction endpoints.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Identity sent to the remote endpoints.
    ///
    /// If missing (older configs), it is auto-filled from `device_id`.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_range() -> String {
    "1w".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        let device_id = Uuid::new_v4();
        Self {
            device_id,
            currency_symbol: default_currency_symbol(),
            default_range: default_range(),
            remote_url: None,
            user_id: Some(device_id.to_string()),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        });
    }

    let proj = ProjectDirs::from("com", "stack", "stack")
        .context("Failed to resolve platform directories")?;

    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
        data_dir: proj.data_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let mut cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    // Auto-migrate older config versions.
    let mut changed = false;
    if cfg.user_id.is_none() {
        cfg.user_id = Some(cfg.device_id.to_string());
        changed = true;
    }
    if cfg.page_size == 0 {
        cfg.page_size = default_page_size();
        changed = true;
    }
    if changed {
        write_config(&cfg_path, &cfg)?;
    }

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
