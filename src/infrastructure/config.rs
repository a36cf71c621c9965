use crate::application::controller::ControllerSettings;
use crate::application::reconciler::ReconcilerSettings;
use crate::domain::dashboard::{builtin_metric_types, MetricTypeConfig};
use anyhow::bail;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerSettings,
    pub api: ApiSettings,
    pub push: PushSettings,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default = "builtin_metric_types")]
    pub metric_types: BTreeMap<String, MetricTypeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushSettings {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcilerConfig {
    #[serde(default = "default_live_buffer_capacity")]
    pub live_buffer_capacity: usize,
    #[serde(default = "default_historical_page_size")]
    pub historical_page_size: u32,
    #[serde(default = "default_historical_max_items")]
    pub historical_max_items: usize,
    #[serde(default = "default_latest_limit")]
    pub latest_limit: usize,
    #[serde(default = "default_latest_push_limit")]
    pub latest_push_limit: usize,
    #[serde(default = "default_invalidate_debounce_ms")]
    pub invalidate_debounce_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            live_buffer_capacity: default_live_buffer_capacity(),
            historical_page_size: default_historical_page_size(),
            historical_max_items: default_historical_max_items(),
            latest_limit: default_latest_limit(),
            latest_push_limit: default_latest_push_limit(),
            invalidate_debounce_ms: default_invalidate_debounce_ms(),
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.live_buffer_capacity == 0 {
            bail!("reconciler.live_buffer_capacity must be at least 1");
        }
        if self.historical_page_size == 0 {
            bail!("reconciler.historical_page_size must be at least 1");
        }
        if self.historical_max_items == 0 {
            bail!("reconciler.historical_max_items must be at least 1");
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            reconciler: ReconcilerSettings {
                live_buffer_capacity: self.live_buffer_capacity,
                historical_page_size: self.historical_page_size,
                historical_max_items: self.historical_max_items,
                latest_limit: self.latest_limit,
                latest_push_limit: self.latest_push_limit,
            },
            invalidate_debounce: Duration::from_millis(self.invalidate_debounce_ms),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_live_buffer_capacity() -> usize {
    100
}

fn default_historical_page_size() -> u32 {
    20
}

fn default_historical_max_items() -> usize {
    100
}

fn default_latest_limit() -> usize {
    5
}

fn default_latest_push_limit() -> usize {
    20
}

fn default_invalidate_debounce_ms() -> u64 {
    200
}

/// `config/dashboard.{toml,yaml,json}` overlaid with `DASHBOARD__*` env vars.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"))
        .build()?;

    parse_dashboard_config(settings)
}

fn parse_dashboard_config(settings: config::Config) -> anyhow::Result<DashboardConfig> {
    let config: DashboardConfig = settings.try_deserialize()?;
    config.reconciler.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> anyhow::Result<DashboardConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?;
        parse_dashboard_config(settings)
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(
            r#"
            [api]
            base_url = "http://localhost:5000"
            [push]
            url = "http://localhost:5000/metricsHub"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.reconciler.live_buffer_capacity, 100);
        let settings = config.reconciler.controller_settings();
        assert_eq!(settings.invalidate_debounce, Duration::from_millis(200));
        assert_eq!(settings.reconciler.historical_max_items, 100);
        assert!(config.metric_types.contains_key("motion"));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = parse(
            r#"
            [api]
            base_url = "http://localhost:5000"
            [push]
            url = "http://localhost:5000/metricsHub"
            [reconciler]
            live_buffer_capacity = 0
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("live_buffer_capacity"));
    }

    #[test]
    fn test_metric_types_override() {
        let config = parse(
            r#"
            [api]
            base_url = "http://localhost:5000"
            [push]
            url = "http://localhost:5000/metricsHub"
            [metric_types.temperature]
            visualization = "gauge"
            unit = "C"
            "#,
        )
        .unwrap();

        assert_eq!(config.metric_types.len(), 1);
        assert_eq!(config.metric_types["temperature"].unit.as_deref(), Some("C"));
    }
}
