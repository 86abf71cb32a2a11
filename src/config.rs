use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::tfs::Credentials;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub tfs: TfsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub refresh: RefreshConfig,
  #[serde(default)]
  pub formats: FormatsConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
  /// Windows integrated authentication with the current identity
  #[default]
  Integrated,
  /// Personal access token from the environment
  Token,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TfsConfig {
  /// Collection URL, e.g. https://tfs.example.com/tfs/DefaultCollection
  pub url: String,
  #[serde(default)]
  pub auth: AuthType,
  pub domain: Option<String>,
  pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  #[default]
  Memory,
  /// Persisted per server under the data dir
  Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
  #[serde(default = "default_interval_minutes")]
  pub interval_minutes: u64,
  #[serde(default = "default_true")]
  pub auto_refresh: bool,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      interval_minutes: default_interval_minutes(),
      auto_refresh: true,
    }
  }
}

fn default_interval_minutes() -> u64 {
  5
}

fn default_true() -> bool {
  true
}

/// Output line templates, see `template::resolve_parameters`.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatsConfig {
  #[serde(default = "default_work_item_format")]
  pub work_item: String,
  #[serde(default = "default_pull_request_format")]
  pub pull_request: String,
  #[serde(default = "default_code_review_format")]
  pub code_review: String,
}

impl Default for FormatsConfig {
  fn default() -> Self {
    Self {
      work_item: default_work_item_format(),
      pull_request: default_pull_request_format(),
      code_review: default_code_review_format(),
    }
  }
}

fn default_work_item_format() -> String {
  "%Id%\t%WorkItemType%\t%State%\t%Title%".to_string()
}

fn default_pull_request_format() -> String {
  "!%Id%\t%Repository%\t%CreatedBy%\t%Title%".to_string()
}

fn default_code_review_format() -> String {
  "%Id%\t%Status%\t%ProjectName%\t%Title%".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tfsv.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tfsv/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/tfsv/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("tfsv.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tfsv").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Credentials for the session manager. The token, if any, comes from the
  /// environment.
  pub fn credentials(&self) -> Result<Credentials> {
    let personal_access_token = match self.tfs.auth {
      AuthType::Integrated => None,
      AuthType::Token => Some(Self::get_personal_access_token()?),
    };

    Ok(Credentials {
      server_url: self.tfs.url.clone(),
      use_windows_authentication: self.tfs.auth == AuthType::Integrated,
      personal_access_token,
      domain: self.tfs.domain.clone(),
      username: self.tfs.username.clone(),
    })
  }

  /// Get the personal access token from environment variables.
  ///
  /// Checks TFSV_PAT first, then AZURE_DEVOPS_EXT_PAT as fallback.
  pub fn get_personal_access_token() -> Result<String> {
    std::env::var("TFSV_PAT")
      .or_else(|_| std::env::var("AZURE_DEVOPS_EXT_PAT"))
      .map_err(|_| {
        eyre!(
          "Personal access token not found. Set TFSV_PAT or AZURE_DEVOPS_EXT_PAT environment variable."
        )
      })
  }
}
