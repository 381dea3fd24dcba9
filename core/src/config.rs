//! Configuration management for tool paths, timeouts, and interception defaults.
//!
//! Stores configuration in JSON format at `~/.kbridge/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Explicit path to the interception CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telepresence_path: Option<PathBuf>,

    /// Explicit path to kubectl.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl_path: Option<PathBuf>,

    /// Upper bound for any single external command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Cluster-side application port that intercepted traffic targets.
    #[serde(default = "default_target_port")]
    pub target_port: u16,

    /// Directory for per-deployment environment files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file_dir: Option<PathBuf>,

    /// How long background reconciliation stays off after a manual disconnect.
    #[serde(default = "default_suppression_window")]
    pub suppression_window_secs: u64,

    /// Wait after the graceful terminate signal, in milliseconds.
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_ms: u64,

    /// Wait after the forced kill signal, in milliseconds.
    #[serde(default = "default_kill_wait")]
    pub kill_wait_ms: u64,

    /// Status polling interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_command_timeout() -> u64 {
    30
}

fn default_target_port() -> u16 {
    8080
}

fn default_suppression_window() -> u64 {
    30
}

fn default_terminate_grace() -> u64 {
    2000
}

fn default_kill_wait() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telepresence_path: None,
            kubectl_path: None,
            command_timeout_secs: default_command_timeout(),
            target_port: default_target_port(),
            env_file_dir: None,
            suppression_window_secs: default_suppression_window(),
            terminate_grace_ms: default_terminate_grace(),
            kill_wait_ms: default_kill_wait(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Settings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_window_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Environment file written by the interception subprocess for a deployment.
    pub fn env_file_for(&self, deployment: &str) -> PathBuf {
        self.env_file_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("{}.env", deployment))
    }
}

/// Reads and writes [`Settings`] as a single JSON document.
pub struct ConfigStore {
    config_path: PathBuf,
}

/// Wraps an I/O or serde failure with what kbridge was doing at the time.
fn config_error<E: std::fmt::Display>(action: &str) -> impl FnOnce(E) -> Error + '_ {
    move |e| Error::Config(format!("{}: {}", action, e))
}

impl ConfigStore {
    /// Store at `~/.kbridge/config.json`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("No home directory to keep kbridge settings in".to_string()))?;
        Ok(Self::with_path(home.join(".kbridge").join("config.json")))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Tool overrides, timeouts and interception defaults. A missing file
    /// means every setting takes its default; missing fields do the same.
    pub async fn load(&self) -> Result<Settings> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(config_error("Reading kbridge settings")(e)),
        };
        serde_json::from_str(&content).map_err(config_error("Parsing kbridge settings"))
    }

    /// Replaces the settings file. The new document is synced to a sibling
    /// `.json.tmp` file and renamed over the old one.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(config_error("Creating the settings directory"))?;
        }

        let content =
            serde_json::to_string_pretty(settings).map_err(config_error("Serializing kbridge settings"))?;
        let staged = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&staged)
            .await
            .map_err(config_error("Staging kbridge settings"))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(config_error("Writing kbridge settings"))?;
        file.sync_all()
            .await
            .map_err(config_error("Syncing kbridge settings"))?;

        fs::rename(&staged, &self.config_path)
            .await
            .map_err(config_error("Replacing kbridge settings"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.suppression_window(), Duration::from_secs(30));
        assert_eq!(settings.terminate_grace(), Duration::from_secs(2));
        assert_eq!(settings.kill_wait(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        let settings = Settings {
            kubectl_path: Some(PathBuf::from("/opt/kubectl")),
            target_port: 3000,
            ..Settings::default()
        };

        store.save(&settings).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.config_path().parent().unwrap())
            .await
            .unwrap();
        fs::write(store.config_path(), r#"{"targetPort": 9000}"#)
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.target_port, 9000);
        assert_eq!(loaded.command_timeout_secs, 30);
        assert_eq!(loaded.poll_interval_secs, 5);
    }

    #[tokio::test]
    async fn test_invalid_json_is_config_error() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.config_path().parent().unwrap())
            .await
            .unwrap();
        fs::write(store.config_path(), "not json").await.unwrap();

        match store.load().await {
            Err(Error::Config(message)) => assert!(message.starts_with("Parsing kbridge settings")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_env_file_for_uses_configured_dir() {
        let settings = Settings {
            env_file_dir: Some(PathBuf::from("/work/envs")),
            ..Settings::default()
        };
        assert_eq!(
            settings.env_file_for("orders"),
            PathBuf::from("/work/envs/orders.env")
        );
    }
}
