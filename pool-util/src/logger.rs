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

//! Logging bootstrap used by every crate in the workspace. Hosts call
//! `init_logger` once at startup; everything else just uses `log`'s
//! macros (`info!`, `debug!`, ...).

use parking_lot::Mutex;
use std::panic;

use backtrace::Backtrace;

use crate::types::{LogLevel, LoggingConfig};

use log::{LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::rolling_file::{
	policy::compound::roll::fixed_window::FixedWindowRoller,
	policy::compound::trigger::size::SizeTrigger, policy::compound::CompoundPolicy,
	RollingFileAppender,
};
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::{threshold::ThresholdFilter, Filter, Response};

fn convert_log_level(level: &LogLevel) -> LevelFilter {
	match *level {
		LogLevel::Info => LevelFilter::Info,
		LogLevel::Warning => LevelFilter::Warn,
		LogLevel::Debug => LevelFilter::Debug,
		LogLevel::Trace => LevelFilter::Trace,
		LogLevel::Error => LevelFilter::Error,
	}
}

lazy_static::lazy_static! {
	/// Whether logging was explicitly initialized (don't log otherwise).
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
}

const LOGGING_PATTERN: &str = "{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

/// Rejects log records whose module path doesn't start with any of the
/// workspace's own crate-name prefixes, so a host embedding this pool
/// alongside other crates doesn't drown its own log in dependency noise.
#[derive(Debug)]
struct WorkspaceFilter;

impl Filter for WorkspaceFilter {
	fn filter(&self, record: &Record<'_>) -> Response {
		match record.module_path() {
			Some(path) if path.starts_with("pool") => Response::Neutral,
			_ => Response::Reject,
		}
	}
}

/// Initializes the logger with the given configuration. A no-op if
/// logging was already initialized in this process.
pub fn init_logger(config: LoggingConfig) {
	{
		let mut was_init = WAS_INIT.lock();
		if *was_init {
			return;
		}
		*was_init = true;
	}

	let level_stdout = convert_log_level(&config.stdout_log_level);
	let level_file = convert_log_level(&config.file_log_level);
	let level_minimum = std::cmp::max(level_stdout, level_file);

	let mut root = Root::builder();
	let mut appenders = vec![];

	if config.log_to_stdout {
		let stdout = ConsoleAppender::builder()
			.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
			.build();
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(level_stdout)))
				.filter(Box::new(WorkspaceFilter))
				.build("stdout", Box::new(stdout)),
		);
		root = root.appender("stdout");
	}

	if config.log_to_file {
		let file: Box<dyn Append> = if let Some(size) = config.log_max_size {
			let roller = FixedWindowRoller::builder()
				.build(&format!("{}.{{}}.gz", config.log_file_path), 32)
				.expect("failed to build log roller");
			let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(size)), Box::new(roller));
			Box::new(
				RollingFileAppender::builder()
					.append(config.log_file_append)
					.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
					.build(&config.log_file_path, Box::new(policy))
					.expect("failed to build rolling file appender"),
			)
		} else {
			Box::new(
				FileAppender::builder()
					.append(config.log_file_append)
					.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
					.build(&config.log_file_path)
					.expect("failed to build file appender"),
			)
		};
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(level_file)))
				.filter(Box::new(WorkspaceFilter))
				.build("file", file),
		);
		root = root.appender("file");
	}

	let log_config = Config::builder()
		.appenders(appenders)
		.build(root.build(level_minimum))
		.expect("failed to build logging config");

	log4rs::init_config(log_config).expect("failed to initialize log4rs");

	send_panic_to_log();
}

/// Initializes a stdout-only, debug-level logger for tests. A no-op after
/// the first call in a process.
pub fn init_test_logger() {
	let mut config = LoggingConfig::default();
	config.log_to_file = false;
	config.stdout_log_level = LogLevel::Debug;
	init_logger(config);
}

fn send_panic_to_log() {
	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		let message = match info.payload().downcast_ref::<&str>() {
			Some(s) => *s,
			None => match info.payload().downcast_ref::<String>() {
				Some(s) => s.as_str(),
				None => "unknown panic payload",
			},
		};
		log::error!("thread panicked at '{}': {:?}\n{:?}", message, info.location(), backtrace);
	}));
}
