//! Serialization format definitions

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported checkpoint serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointFormat {
    /// JSON format (human-readable, larger file size)
    Json,

    /// YAML format (human-readable)
    Yaml,

    /// SafeTensors format (HuggingFace compatible, efficient binary)
    SafeTensors,
}

impl CheckpointFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &str {
        match self {
            CheckpointFormat::Json => "json",
            CheckpointFormat::Yaml => "yaml",
            CheckpointFormat::SafeTensors => "safetensors",
        }
    }

    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(CheckpointFormat::Json),
            "yaml" | "yml" => Some(CheckpointFormat::Yaml),
            "safetensors" => Some(CheckpointFormat::SafeTensors),
            _ => None,
        }
    }

    /// Detect format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
    }
}

/// Configuration for saving checkpoints
#[derive(Debug, Clone)]
pub struct SaveConfig {
    /// Serialization format
    pub format: CheckpointFormat,

    /// Whether to pretty-print (JSON only)
    pub pretty: bool,
}

impl SaveConfig {
    pub fn new(format: CheckpointFormat) -> Self {
        Self {
            format,
            pretty: true,
        }
    }

    /// Enable/disable pretty printing
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self::new(CheckpointFormat::SafeTensors)
    }
}
