use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "CritAlert";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for the ingestion API.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Get the application data directory (~/CritAlert/)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("CritAlert")
}

/// Path of the alert/audit database.
pub fn db_path() -> PathBuf {
    app_data_dir().join("critalert.db")
}

/// Optional on-disk override for the embedded threshold catalog.
pub fn thresholds_path() -> PathBuf {
    app_data_dir().join("thresholds.json")
}

/// Optional on-disk override for the embedded escalation policy.
pub fn escalation_policy_path() -> PathBuf {
    app_data_dir().join("escalation_policy.json")
}

pub fn default_log_filter() -> String {
    "info,critalert=debug".to_string()
}
