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

//! Error kinds for the pool. Most pool operations that can fail do so in
//! one of the five ways enumerated here; everything else is a plain
//! `Result` around an external collaborator's own error.

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

/// Error returned by a pool operation.
#[derive(Debug)]
pub struct PoolError {
	inner: Context<ErrorKind>,
}

/// The five failure modes a pool operation can hit. Not all are really
/// "errors" in the exceptional sense: `TransientDependency` and
/// `ForkDetected` are routine control flow, encoded as a tagged result
/// rather than an exception so the try-insert loop stays a pure state
/// machine.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// The verifier needs more blocks before it can decide; not a real
	/// error, recorded as an outstanding fetch.
	#[fail(display = "waiting on {} dependencies", _0)]
	TransientDependency(usize),
	/// The block belongs to a non-current branch; resolved by tree
	/// bookkeeping, surfaced to callers only via a fork-version bump.
	#[fail(display = "block does not belong to the current branch")]
	ForkDetected,
	/// The block is invalid; it and its descendants are dropped.
	#[fail(display = "verification failed: {}", _0)]
	VerificationFailure(String),
	/// A timeout-triggered snapshot reorg invalidated pending account
	/// blocks; forces a fork-version bump and fetch re-issue.
	#[fail(display = "consistency rollback to height {}", _0)]
	ConsistencyRollback(u64),
	/// The ledger failed to read or write.
	#[fail(display = "ledger failure: {}", _0)]
	InfrastructureFailure(String),
}

impl Fail for PoolError {
	fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl Display for PoolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl PoolError {
	/// The specific kind of this error.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
}

impl From<ErrorKind> for PoolError {
	fn from(kind: ErrorKind) -> PoolError {
		PoolError {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for PoolError {
	fn from(inner: Context<ErrorKind>) -> PoolError {
		PoolError { inner }
	}
}

impl From<pool_ledger::Error> for PoolError {
	fn from(e: pool_ledger::Error) -> PoolError {
		ErrorKind::InfrastructureFailure(e.to_string()).into()
	}
}
