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

//! The capability set that lets pool machinery treat snapshot blocks and
//! account blocks uniformly without ever downcasting.

use crate::fork::ForkStamp;
use crate::hash::{Hash, Height};

/// Which of the two interleaved chain families a block belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
	/// The single, global snapshot chain.
	Snapshot,
	/// One of the per-address account chains.
	Account,
}

/// Uniform envelope over a raw snapshot or account block. Components that
/// handle both chain families accept `&dyn CommonBlock` (or a generic
/// bound) and never need to know which concrete block type they hold.
pub trait CommonBlock: Send + Sync {
	/// This block's identity.
	fn hash(&self) -> Hash;
	/// The block this one extends.
	fn prev_hash(&self) -> Hash;
	/// Strictly increasing along prev-links.
	fn height(&self) -> Height;
	/// Which chain family this block belongs to.
	fn kind(&self) -> BlockKind;
	/// True if this block has not been invalidated by a rollback since it
	/// was last stamped.
	fn fork_version_current(&self) -> bool;
	/// Re-stamps this block against the live fork version.
	fn reset_fork_version(&mut self);
	/// The fork version this block was stamped with.
	fn fork_version(&self) -> u64;
}

/// Shared base embedded by every concrete block wrapper; mirrors the
/// `forkBlock` mixin in the originating implementation.
#[derive(Clone)]
pub struct ForkBlockBase {
	stamp: ForkStamp,
}

impl ForkBlockBase {
	/// Stamps the block with the fork version live at construction time.
	pub fn new(stamp: ForkStamp) -> ForkBlockBase {
		ForkBlockBase { stamp }
	}

	/// See [`CommonBlock::fork_version_current`].
	pub fn is_current(&self) -> bool {
		self.stamp.is_current()
	}

	/// See [`CommonBlock::reset_fork_version`].
	pub fn reset(&mut self) {
		self.stamp.refresh();
	}

	/// See [`CommonBlock::fork_version`].
	pub fn version(&self) -> u64 {
		self.stamp.version()
	}
}
