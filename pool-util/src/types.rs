// Copyright 2024 The Chain Pool Developers
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

//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Log level, independent of the `log` crate's so config files don't need
/// to know about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LogLevel {
	/// Error
	Error,
	/// Warning
	Warning,
	/// Info
	Info,
	/// Debug
	Debug,
	/// Trace
	Trace,
}

/// Logging setup: where to send log lines and at what level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	/// Whether to log to stdout.
	pub log_to_stdout: bool,
	/// Logging level for stdout.
	pub stdout_log_level: LogLevel,
	/// Whether to log to file.
	pub log_to_file: bool,
	/// Log file level.
	pub file_log_level: LogLevel,
	/// Log file path.
	pub log_file_path: String,
	/// Whether to append to an existing log file or replace it.
	pub log_file_append: bool,
	/// Size in bytes to rotate the log file over, if set.
	pub log_max_size: Option<u64>,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: LogLevel::Warning,
			log_to_file: true,
			file_log_level: LogLevel::Info,
			log_file_path: String::from("pool.log"),
			log_file_append: true,
			log_max_size: Some(1024 * 1024 * 16),
		}
	}
}
