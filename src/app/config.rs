//! Application configuration.
//!
//! Settings are read from JSON with camelCase keys. Every field has a default, so
//! a partial file (or no file at all) is valid.

use crate::app::messaging::errors::{MessagingError, MessagingResult};
use crate::app::messaging::resource_info::{ResourceAttributes, ResourceKind};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "app.config.json";
pub const DEFAULT_WATCHER_INTERVAL_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingConfig {
    pub app_settings: AppSettings,
    pub sqs: SqsSettings,
    pub sns: ServiceSettings,
    pub cloudwatch: CloudWatchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Services to instantiate, by registry name
    pub services: Vec<String>,
    /// Use the in-memory backend instead of AWS
    pub mocking: bool,
    pub rest_prefix: String,
    pub bind_address: String,
    /// Named AWS profile; the default credential chain is used when absent
    pub profile: Option<String>,
    /// Account id the mock backend uses when building ARNs and URLs
    pub account_id: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            services: vec!["SQS".into(), "SNS".into(), "CloudWatch".into()],
            mocking: false,
            rest_prefix: "/node-aws-messaging".into(),
            bind_address: "127.0.0.1:3000".into(),
            profile: None,
            account_id: "000000000000".into(),
        }
    }
}

/// Settings every service has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    pub region: String,
    /// Seconds between drift checks; zero or negative disables the watcher
    pub info_watcher_interval: i64,
    pub preload_info: bool,
    /// Merged under caller-supplied attributes on create
    pub default_attributes: ResourceAttributes,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            info_watcher_interval: DEFAULT_WATCHER_INTERVAL_SECS,
            preload_info: true,
            default_attributes: ResourceAttributes::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqsSettings {
    #[serde(flatten)]
    pub common: ServiceSettings,
    pub message_retention_period: u32,
    pub receive_wait_seconds: u32,
    pub delete_message_after_consuming: bool,
    /// Attach a policy letting any principal send to newly created queues
    pub allow_queue_to_receive_messages: bool,
    /// Fallback receive options (`maxNumberOfMessages`, `visibilityTimeout`, `waitTimeSeconds`)
    pub receive_attributes: ResourceAttributes,
}

impl Default for SqsSettings {
    fn default() -> Self {
        Self {
            common: ServiceSettings::default(),
            message_retention_period: 120,
            receive_wait_seconds: 10,
            delete_message_after_consuming: true,
            allow_queue_to_receive_messages: true,
            receive_attributes: ResourceAttributes::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchSettings {
    #[serde(flatten)]
    pub common: ServiceSettings,
    pub comparison_operator: String,
    pub statistic: String,
    pub treat_missing_data: String,
}

impl Default for CloudWatchSettings {
    fn default() -> Self {
        Self {
            common: ServiceSettings::default(),
            comparison_operator: "GreaterThanOrEqualToThreshold".into(),
            statistic: "Sum".into(),
            treat_missing_data: "missing".into(),
        }
    }
}

impl MessagingConfig {
    /// Resolve configuration in order: explicit path, `./app.config.<env>.json`,
    /// `./app.config.json`, the per-user config dir, then built-in defaults.
    pub fn load(explicit: Option<&Path>, env: Option<&str>) -> MessagingResult<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(MessagingError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Self::load_from_path(path);
        }

        let cwd = std::env::current_dir().map_err(|e| {
            MessagingError::Configuration(format!("cannot read working directory: {}", e))
        })?;
        if let Some(config) = Self::load_from_dir(&cwd, env)? {
            return Ok(config);
        }

        if let Some(dir) = project_config_dir() {
            if let Some(config) = Self::load_from_dir(&dir, None)? {
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Look for `app.config.<env>.json` then `app.config.json` inside `dir`.
    pub fn load_from_dir(dir: &Path, env: Option<&str>) -> MessagingResult<Option<Self>> {
        for path in candidate_files(dir, env) {
            if path.is_file() {
                return Self::load_from_path(&path).map(Some);
            }
        }
        Ok(None)
    }

    pub fn load_from_path(path: &Path) -> MessagingResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MessagingError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text).map_err(|e| match e {
            MessagingError::Configuration(msg) => {
                MessagingError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> MessagingResult<Self> {
        serde_json::from_str(text).map_err(|e| MessagingError::Configuration(e.to_string()))
    }

    /// The common settings for the service managing `kind`.
    pub fn settings_for(&self, kind: ResourceKind) -> &ServiceSettings {
        match kind {
            ResourceKind::Queue => &self.sqs.common,
            ResourceKind::Topic => &self.sns,
            ResourceKind::CloudwatchAlarm => &self.cloudwatch.common,
        }
    }
}

fn candidate_files(dir: &Path, env: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(2);
    if let Some(env) = env.filter(|e| !e.is_empty()) {
        files.push(dir.join(format!("app.config.{}.json", env)));
    }
    files.push(dir.join(CONFIG_FILE_NAME));
    files
}

fn project_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "", "awsmessaging").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = MessagingConfig::default();
        assert_eq!(config.app_settings.rest_prefix, "/node-aws-messaging");
        assert_eq!(config.sqs.common.info_watcher_interval, 30);
        assert_eq!(config.sqs.message_retention_period, 120);
        assert_eq!(config.sqs.receive_wait_seconds, 10);
        assert!(config.sqs.delete_message_after_consuming);
        assert_eq!(config.cloudwatch.statistic, "Sum");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MessagingConfig::from_json(
            r#"{
                "appSettings": { "mocking": true },
                "sqs": { "region": "eu-west-1", "infoWatcherInterval": -1,
                         "defaultAttributes": { "DelaySeconds": "5" } }
            }"#,
        )
        .unwrap();

        assert!(config.app_settings.mocking);
        assert_eq!(config.app_settings.services.len(), 3);
        assert_eq!(config.sqs.common.region, "eu-west-1");
        assert_eq!(config.sqs.common.info_watcher_interval, -1);
        assert_eq!(
            config.sqs.common.default_attributes.get("DelaySeconds").map(String::as_str),
            Some("5")
        );
        assert_eq!(config.sqs.message_retention_period, 120);
        assert_eq!(config.sns.region, "us-east-1");
    }

    #[test]
    fn test_env_file_wins_over_plain_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("app.config.json"),
            r#"{"sns": {"region": "us-west-2"}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("app.config.test.json"),
            r#"{"sns": {"region": "ap-south-1"}}"#,
        )
        .unwrap();

        let with_env = MessagingConfig::load_from_dir(dir.path(), Some("test"))
            .unwrap()
            .unwrap();
        assert_eq!(with_env.sns.region, "ap-south-1");

        let plain = MessagingConfig::load_from_dir(dir.path(), Some("prod"))
            .unwrap()
            .unwrap();
        assert_eq!(plain.sns.region, "us-west-2");
    }

    #[test]
    fn test_empty_dir_yields_none() {
        let dir = TempDir::new().unwrap();
        assert!(MessagingConfig::load_from_dir(dir.path(), None).unwrap().is_none());
    }

    #[test]
    fn test_unparsable_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.config.json");
        fs::write(&path, "{ not json").unwrap();
        match MessagingConfig::load(Some(&path), None) {
            Err(MessagingError::Configuration(msg)) => assert!(msg.contains("app.config.json")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(MessagingConfig::load(Some(&missing), None).is_err());
    }

    #[test]
    fn test_settings_for_kind() {
        let mut config = MessagingConfig::default();
        config.cloudwatch.common.info_watcher_interval = 0;
        assert_eq!(
            config.settings_for(ResourceKind::CloudwatchAlarm).info_watcher_interval,
            0
        );
        assert_eq!(config.settings_for(ResourceKind::Queue).info_watcher_interval, 30);
    }
}
