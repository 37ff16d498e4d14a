use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use openid_rp::{RequestBinAllocator, WARGAMING_EU_ENDPOINT};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "rp.toml";

const EXAMPLE: &str = include_str!("../../../docs/openid-rp/rp.toml.example");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpConfig {
    pub op_endpoint: String,
    pub return_to: String,
    pub listen_port: u16,
    pub request_timeout_ms: u64,
    pub request_bin: Option<RequestBinConfig>,
}

impl Default for RpConfig {
    fn default() -> Self {
        Self {
            op_endpoint: WARGAMING_EU_ENDPOINT.to_string(),
            return_to: "http://localhost:8000/".to_string(),
            listen_port: 8000,
            request_timeout_ms: 10_000,
            request_bin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestBinConfig {
    pub api_url: String,
    pub public_base: String,
}

impl Default for RequestBinConfig {
    fn default() -> Self {
        Self {
            api_url: RequestBinAllocator::DEFAULT_API_URL.to_string(),
            public_base: RequestBinAllocator::DEFAULT_PUBLIC_BASE.to_string(),
        }
    }
}

pub fn default_config_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".config").join("openid-rp"),
        None => PathBuf::from(".openid-rp"),
    }
}

/// Load `explicit` if given, else `rp.toml` from the default directory, else
/// built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<RpConfig> {
    if let Some(path) = explicit {
        return load_config_from_file(path);
    }
    let path = default_config_dir().join(CONFIG_FILE);
    if path.exists() {
        load_config_from_file(&path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(RpConfig::default())
    }
}

pub fn load_config_from_file(path: &Path) -> anyhow::Result<RpConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: RpConfig = toml::from_str(&content)
        .with_context(|| format!("invalid TOML in {}", path.display()))?;
    validate_config(&cfg).with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(cfg)
}

pub fn validate_config(cfg: &RpConfig) -> anyhow::Result<()> {
    url::Url::parse(&cfg.op_endpoint)
        .with_context(|| format!("op_endpoint {:?} is not a URL", cfg.op_endpoint))?;
    if !cfg.return_to.is_empty() {
        url::Url::parse(&cfg.return_to)
            .with_context(|| format!("return_to {:?} is not a URL", cfg.return_to))?;
    }
    if cfg.request_timeout_ms == 0 {
        bail!("request_timeout_ms must be greater than zero");
    }
    Ok(())
}

/// Write the example config as `rp.toml` into `dir`.
pub fn write_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = dir.join(CONFIG_FILE);
    write_default_config_file(&path, force)?;
    Ok(path)
}

/// Write the example config to `path`. Existing files are kept unless
/// `force` is set.
pub fn write_default_config_file(path: &Path, force: bool) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    if force || !path.exists() {
        fs::write(path, EXAMPLE).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_matches_defaults() {
        let cfg: RpConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(cfg, RpConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: RpConfig = toml::from_str(
            r#"
            return_to = "https://rp.example/cb"

            [request_bin]
            api_url = "https://bins.example/api"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.return_to, "https://rp.example/cb");
        assert_eq!(cfg.listen_port, 8000);
        let bin = cfg.request_bin.unwrap();
        assert_eq!(bin.api_url, "https://bins.example/api");
        assert_eq!(bin.public_base, "https://requestb.in");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let cfg = RpConfig {
            op_endpoint: "nowhere".to_string(),
            ..RpConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config(dir.path(), false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), RpConfig::default());

        fs::write(&path, "listen_port = 9000\n").unwrap();
        write_default_config(dir.path(), false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().listen_port, 9000);

        write_default_config(dir.path(), true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().listen_port, 8000);
    }

    #[test]
    fn custom_file_name_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("custom.toml");
        write_default_config_file(&path, false).unwrap();
        assert!(!dir.path().join("nested").join(CONFIG_FILE).exists());
        assert_eq!(load_config(Some(&path)).unwrap(), RpConfig::default());
    }

    #[test]
    fn bad_toml_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "listen_port = \"eighty\"").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }
}
