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

//! The fork-version counter and the per-block stamp that lets a cached
//! block self-invalidate when a rollback bumps the counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonically increasing counter, bumped on every rollback that
/// invalidates prior verification work. Shared by `Arc` across every pool
/// and every cached block wrapper so a rollback anywhere is visible
/// everywhere.
#[derive(Clone, Default)]
pub struct ForkVersion(Arc<AtomicU64>);

impl ForkVersion {
	/// Creates a new counter starting at zero.
	pub fn new() -> ForkVersion {
		ForkVersion(Arc::new(AtomicU64::new(0)))
	}

	/// Current value.
	pub fn val(&self) -> u64 {
		self.0.load(Ordering::SeqCst)
	}

	/// Bumps the counter, returning the new value. Called on every
	/// rollback and every current-branch mutation.
	pub fn inc(&self) -> u64 {
		self.0.fetch_add(1, Ordering::SeqCst) + 1
	}

	/// Stamps a freshly-seen block with the current version.
	pub fn stamp(&self) -> ForkStamp {
		ForkStamp {
			first_v: self.val(),
			v: self.clone(),
		}
	}
}

/// Records the fork version in effect when a block was last validated.
/// `is_current()` tells a cached wrapper whether it must re-verify its
/// cross-chain references before being reused.
#[derive(Clone)]
pub struct ForkStamp {
	first_v: u64,
	v: ForkVersion,
}

impl ForkStamp {
	/// True if no rollback has happened since this stamp was taken.
	pub fn is_current(&self) -> bool {
		self.first_v == self.v.val()
	}

	/// Re-stamps with the live version, acknowledging a rollback happened
	/// and this block's state has been reconciled with it.
	pub fn refresh(&mut self) {
		self.first_v = self.v.val();
	}

	/// The version recorded at construction or last refresh.
	pub fn version(&self) -> u64 {
		self.first_v
	}
}
