//! Loading service configuration (server, storage, timer, report sink and the
//! test bank) from TOML, with environment overrides.
//!
//! See `AppConfig` and `TestCfg` for the expected schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub server: ServerCfg,
  #[serde(default)]
  pub storage: StorageCfg,
  #[serde(default)]
  pub timer: TimerCfg,
  #[serde(default)]
  pub report: ReportCfg,
  #[serde(default)]
  pub tests: Vec<TestCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerCfg {
  #[serde(default = "default_port")] pub port: u16,
}

impl Default for ServerCfg {
  fn default() -> Self { Self { port: default_port() } }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageCfg {
  /// Root for `snapshots/` and `reports/`.
  #[serde(default = "default_data_dir")] pub data_dir: PathBuf,
}

impl Default for StorageCfg {
  fn default() -> Self { Self { data_dir: default_data_dir() } }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimerCfg {
  /// Wall-clock length of one countdown second. Only shortened in tests.
  #[serde(default = "default_tick_millis")] pub tick_millis: u64,
}

impl Default for TimerCfg {
  fn default() -> Self { Self { tick_millis: default_tick_millis() } }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ReportCfg {
  /// Remote scoring service. When unset, reports are scored locally.
  #[serde(default)] pub endpoint: Option<String>,
}

/// Test entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct TestCfg {
  pub id: String,
  #[serde(default)] pub title: Option<String>,
  #[serde(default)] pub instructions: Option<String>,
  pub duration_secs: u64,
  #[serde(default)] pub sections: Vec<SectionCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SectionCfg {
  pub name: String,
  #[serde(default)] pub questions: Vec<QuestionCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  pub id: String,
  #[serde(default)] pub content: String,
  #[serde(default)] pub image: Option<String>,
  #[serde(default)] pub options: Vec<String>,
  pub answer: String,
  #[serde(default = "default_marks")] pub marks: f32,
  #[serde(default)] pub negative_marks: f32,
  #[serde(default)] pub subject: Option<String>,
  #[serde(default)] pub lesson: Option<String>,
  #[serde(default)] pub explanation: Option<String>,
}

fn default_port() -> u16 { 3000 }
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_tick_millis() -> u64 { 1000 }
fn default_marks() -> f32 { 1.0 }

impl AppConfig {
  pub fn snapshots_dir(&self) -> PathBuf { self.storage.data_dir.join("snapshots") }
  pub fn reports_dir(&self) -> PathBuf { self.storage.data_dir.join("reports") }

  /// Apply PORT, DATA_DIR, TICK_MILLIS and REPORT_ENDPOINT on top of the file values.
  pub fn apply_env_overrides(&mut self) {
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
      self.server.port = port;
    }
    if let Ok(dir) = std::env::var("DATA_DIR") {
      self.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(ms) = std::env::var("TICK_MILLIS").ok().and_then(|v| v.parse().ok()) {
      self.timer.tick_millis = ms;
    }
    if let Ok(endpoint) = std::env::var("REPORT_ENDPOINT") {
      if !endpoint.trim().is_empty() {
        self.report.endpoint = Some(endpoint);
      }
    }
  }
}

/// Load `AppConfig` from TESTPREP_CONFIG_PATH, then apply env overrides.
/// On any read/parse error the defaults are used.
pub fn load_app_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("TESTPREP_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => {
          info!(target: "testprep_backend", %path, tests = cfg.tests.len(), "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "testprep_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "testprep_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  cfg.apply_env_overrides();
  cfg
}
