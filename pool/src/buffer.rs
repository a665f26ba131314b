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

//! Per-chain staging area for blocks that have arrived but have not yet
//! been placed into a snippet or grafted onto the chain tree.
//!
//! Once a block is grafted it belongs to a branch of the tree instead;
//! the tree is the single source of truth for placed-but-unconfirmed
//! blocks; placement is not separately mirrored here. `free` and the
//! tree are disjoint by construction (`drain_free_with_age` physically
//! removes a block before it can be handed to the tree), so a hash never
//! appears in both.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pool_core::{CommonBlock, Hash};

/// Blocks that have arrived with no known predecessor in the pool or
/// ledger yet, keyed by hash.
pub struct BlockPoolBuffer<B: CommonBlock> {
	free: HashMap<Hash, (B, Instant)>,
}

impl<B: CommonBlock> Default for BlockPoolBuffer<B> {
	fn default() -> Self {
		BlockPoolBuffer { free: HashMap::new() }
	}
}

impl<B: CommonBlock> BlockPoolBuffer<B> {
	/// An empty buffer.
	pub fn new() -> BlockPoolBuffer<B> {
		BlockPoolBuffer::default()
	}

	/// Inserts a newly arrived block into `free`. A no-op if the hash is
	/// already free (arrivals are deduplicated by hash).
	pub fn add(&mut self, block: B) {
		let hash = block.hash();
		if self.free.contains_key(&hash) {
			return;
		}
		self.free.insert(hash, (block, Instant::now()));
	}

	/// Re-inserts blocks that compaction could not place this cycle,
	/// preserving their original arrival time so the TTL still applies.
	pub fn return_free(&mut self, blocks: Vec<(B, Instant)>) {
		for (block, arrived) in blocks {
			self.free.insert(block.hash(), (block, arrived));
		}
	}

	/// Removes and returns every free block along with its arrival time,
	/// for callers (compaction) that need to preserve TTL bookkeeping
	/// across a cycle.
	pub fn drain_free_with_age(&mut self) -> Vec<(B, Instant)> {
		self.free.drain().map(|(_, v)| v).collect()
	}

	/// True if the hash is currently free.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.free.contains_key(hash)
	}

	/// Number of free blocks.
	pub fn free_len(&self) -> usize {
		self.free.len()
	}

	/// Evicts free blocks older than `ttl`. Returns the number evicted.
	pub fn evict_expired(&mut self, ttl: Duration) -> usize {
		let now = Instant::now();
		let before = self.free.len();
		self.free.retain(|_, (_, arrived)| now.duration_since(*arrived) < ttl);
		before - self.free.len()
	}
}
