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

//! Uniform envelopes around the raw ledger/verifier block data, stamped
//! with the fork version in effect when they entered the pool.

use pool_core::{BlockKind, CommonBlock, ForkBlockBase, ForkVersion, Hash};
use pool_ledger::{AccountBlockData, SnapshotBlockData};

/// A snapshot block as it lives inside the pool.
#[derive(Clone)]
pub struct SnapshotPoolBlock {
	/// The underlying data, as the ledger and verifier see it.
	pub data: SnapshotBlockData,
	fork: ForkBlockBase,
}

impl SnapshotPoolBlock {
	/// Wraps ledger data, stamping it with the fork version live right now.
	pub fn new(data: SnapshotBlockData, version: &ForkVersion) -> SnapshotPoolBlock {
		SnapshotPoolBlock {
			data,
			fork: ForkBlockBase::new(version.stamp()),
		}
	}
}

impl CommonBlock for SnapshotPoolBlock {
	fn hash(&self) -> Hash {
		self.data.hash
	}

	fn prev_hash(&self) -> Hash {
		self.data.prev_hash
	}

	fn height(&self) -> u64 {
		self.data.height
	}

	fn kind(&self) -> BlockKind {
		BlockKind::Snapshot
	}

	fn fork_version_current(&self) -> bool {
		self.fork.is_current()
	}

	fn reset_fork_version(&mut self) {
		self.fork.reset();
	}

	fn fork_version(&self) -> u64 {
		self.fork.version()
	}
}

/// An account block as it lives inside the pool.
#[derive(Clone)]
pub struct AccountPoolBlock {
	/// The underlying data, as the ledger and verifier see it.
	pub data: AccountBlockData,
	fork: ForkBlockBase,
}

impl AccountPoolBlock {
	/// Wraps ledger data, stamping it with the fork version live right now.
	pub fn new(data: AccountBlockData, version: &ForkVersion) -> AccountPoolBlock {
		AccountPoolBlock {
			data,
			fork: ForkBlockBase::new(version.stamp()),
		}
	}
}

impl CommonBlock for AccountPoolBlock {
	fn hash(&self) -> Hash {
		self.data.hash
	}

	fn prev_hash(&self) -> Hash {
		self.data.prev_hash
	}

	fn height(&self) -> u64 {
		self.data.height
	}

	fn kind(&self) -> BlockKind {
		BlockKind::Account
	}

	fn fork_version_current(&self) -> bool {
		self.fork.is_current()
	}

	fn reset_fork_version(&mut self) {
		self.fork.reset();
	}

	fn fork_version(&self) -> u64 {
		self.fork.version()
	}
}
