// Application state for HTTP handlers
use crate::application::controller::ControllerHandle;
use crate::domain::dashboard::MetricTypeConfig;
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
    pub metric_types: BTreeMap<String, MetricTypeConfig>,
}
