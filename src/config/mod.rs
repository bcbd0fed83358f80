/// CRM connection settings from environment variables
pub mod crm;

/// Metrics settings (object types, labels, thresholds) from metrics.toml
pub mod metrics;

pub use crm::CrmConfig;
pub use metrics::MetricsConfig;
