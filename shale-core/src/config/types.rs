//! Configuration type definitions
//!
//! These types represent the runtime configuration for Shale.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for Shale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaleConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Root directory to serve
    #[serde(default = "default_root")]
    pub root: String,

    /// Index file name used for directory requests
    #[serde(default = "default_index")]
    pub index: String,

    /// Supported content encodings in server preference order
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,

    /// Extra headers set on every response
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ShaleConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root: default_root(),
            index: default_index(),
            encodings: default_encodings(),
            headers: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_root() -> String {
    ".".to_string()
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_encodings() -> Vec<String> {
    vec!["br".to_string(), "gzip".to_string(), "deflate".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}
