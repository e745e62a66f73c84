// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging setup.
//!
//! Every component of this crate reports through `tracing` macros and never
//! installs a subscriber itself. Applications that do not already own one
//! can call [`init`] with a [`LogConfig`]:
//!
//! ```toml
//! [logging]
//! level = "debug"
//! path = "/var/log/pdf-trust/validation.log"
//! json_format = true
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over the configured level.
//! Scoped capture (for tests or per-request sinks) works with
//! `tracing::subscriber::with_default`.

use crate::error::{Result, TrustError};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Log level for filtering messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose - all messages.
    Trace = 0,
    /// Debug information.
    Debug = 1,
    /// Informational messages.
    #[default]
    Info = 2,
    /// Warnings.
    Warn = 3,
    /// Errors only.
    Error = 4,
}

impl LogLevel {
    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Get the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Filter directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Minimum log level to output.
    #[serde(default)]
    pub level: LogLevel,
    /// Path to log file (None for stderr).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Use JSON format for log entries.
    #[serde(default)]
    pub json_format: bool,
    /// Include the event target (module path) in each entry.
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            path: None,
            json_format: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Create a new config for file logging.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Create a new config for stderr logging.
    pub fn stderr() -> Self {
        Self::default()
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Enable JSON format.
    pub fn with_json(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Hide event targets.
    pub fn without_target(mut self) -> Self {
        self.include_target = false;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

/// Install a global `tracing` subscriber built from `config`.
///
/// Fails if a global subscriber is already set or the log file cannot be
/// opened.
pub fn init(config: &LogConfig) -> Result<()> {
    let writer = match &config.path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_writer(writer)
        .with_target(config.include_target)
        .with_ansi(config.path.is_none());

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| TrustError::config(format!("Failed to install log subscriber: {e}")))
}
