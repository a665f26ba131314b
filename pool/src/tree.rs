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

//! A set of named branches sharing a common root in the persistent
//! ledger, with one distinguished "current" branch offered to
//! verification.
//!
//! Every branch stores its complete block list from the ledger root to
//! its tip, not a diff against a parent. That keeps re-parenting a matter
//! of renaming a `HashMap` entry instead of maintaining back-references;
//! the duplication this costs is bounded by how deep the pool's
//! unconfirmed tip is, which is small in practice.

use std::collections::HashMap;

use pool_core::{CommonBlock, Hash, HashHeight, Height};

/// A candidate linear extension of a chain.
pub struct Branch<B: CommonBlock> {
	name: String,
	blocks: Vec<B>,
	last_active_cycle: u64,
}

impl<B: CommonBlock> Branch<B> {
	fn new(name: String, blocks: Vec<B>, cycle: u64) -> Branch<B> {
		Branch {
			name,
			blocks,
			last_active_cycle: cycle,
		}
	}

	/// This branch's name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Blocks from the root (exclusive) to the tip (inclusive), oldest
	/// first.
	pub fn blocks(&self) -> &[B] {
		&self.blocks
	}

	/// Number of blocks past the root.
	pub fn size(&self) -> usize {
		self.blocks.len()
	}

	/// The head block (oldest still-pending block), mutable.
	pub fn head_mut(&mut self) -> Option<&mut B> {
		self.blocks.first_mut()
	}

	fn tail_hash_height(&self, root: HashHeight) -> HashHeight {
		self.blocks
			.last()
			.map(|b| HashHeight::new(b.hash(), b.height()))
			.unwrap_or(root)
	}

	fn find(&self, hash: Hash) -> bool {
		self.blocks.iter().any(|b| b.hash() == hash)
	}
}

/// The tree of branches for a single chain (one address, or the snapshot
/// chain).
pub struct ChainTree<B: CommonBlock> {
	root: HashHeight,
	current: Branch<B>,
	siblings: HashMap<String, Branch<B>>,
	next_id: u64,
	cycle: u64,
}

impl<B: CommonBlock> ChainTree<B> {
	/// A tree with an empty current branch rooted at `root`.
	pub fn new(root: HashHeight) -> ChainTree<B> {
		ChainTree {
			root,
			current: Branch::new("current".to_string(), Vec::new(), 0),
			siblings: HashMap::new(),
			next_id: 0,
			cycle: 0,
		}
	}

	/// The current branch.
	pub fn current(&self) -> &Branch<B> {
		&self.current
	}

	/// The current branch, mutable.
	pub fn current_mut(&mut self) -> &mut Branch<B> {
		&mut self.current
	}

	/// The ledger tail this tree is rooted at.
	pub fn root(&self) -> HashHeight {
		self.root
	}

	/// The tip of the current branch (the root if current is empty).
	pub fn tail(&self) -> HashHeight {
		self.current.tail_hash_height(self.root)
	}

	/// Side branches, by name.
	pub fn siblings(&self) -> impl Iterator<Item = &Branch<B>> {
		self.siblings.values()
	}

	/// Advances the internal cycle counter; called once per prune sweep.
	pub fn tick(&mut self) {
		self.cycle += 1;
	}

	/// Appends a snippet's blocks directly onto current. The caller is
	/// responsible for having checked `snippet.head_hash() ==
	/// self.tail().hash`.
	pub fn graft_current(&mut self, blocks: Vec<B>) {
		self.current.blocks.extend(blocks);
		self.current.last_active_cycle = self.cycle;
	}

	/// Appends a snippet's blocks onto a named side branch.
	pub fn graft_sibling(&mut self, name: &str, blocks: Vec<B>) {
		if let Some(b) = self.siblings.get_mut(name) {
			b.blocks.extend(blocks);
			b.last_active_cycle = self.cycle;
		}
	}

	/// Creates a new side branch made of `blocks`, extending directly
	/// from the root. Returns the assigned name.
	pub fn new_sibling(&mut self, blocks: Vec<B>) -> String {
		self.next_id += 1;
		let name = format!("fork-{}", self.next_id);
		self.siblings
			.insert(name.clone(), Branch::new(name.clone(), blocks, self.cycle));
		name
	}

	/// Looks up which branch (if any) contains the block named by `hash`.
	/// Returns `"current"` if it's already on current. `height` is not
	/// used to narrow the search — a hash uniquely identifies a block —
	/// but is accepted to match the lookup's natural key.
	pub fn find_in_tree(&self, hash: Hash, _height: Height) -> Option<String> {
		if self.current.find(hash) {
			return Some("current".to_string());
		}
		self.siblings.values().find(|b| b.find(hash)).map(|b| b.name().to_string())
	}

	/// Swaps current to the named branch, demoting the old current to a
	/// new side branch. A no-op if `name` is already `"current"`.
	pub fn current_modify_to_chain(&mut self, name: &str) -> bool {
		if name == "current" {
			return true;
		}
		let target = match self.siblings.remove(name) {
			Some(b) => b,
			None => return false,
		};
		let old_current = std::mem::replace(&mut self.current, target);
		self.current.last_active_cycle = self.cycle;
		if !old_current.blocks.is_empty() {
			self.siblings.insert(
				old_current.name.clone(),
				Branch::new(old_current.name, old_current.blocks, self.cycle),
			);
		}
		true
	}

	/// Drops current back to the root, demoting whatever it held to a
	/// side branch.
	pub fn current_modify_to_empty(&mut self) {
		let old_current = std::mem::replace(&mut self.current, Branch::new("current".to_string(), Vec::new(), self.cycle));
		if !old_current.blocks.is_empty() {
			self.next_id += 1;
			let name = format!("fork-{}", self.next_id);
			self.siblings.insert(name.clone(), Branch::new(name, old_current.blocks, self.cycle));
		}
	}

	/// Advances the root past a committed block: pops it from the front
	/// of current (and of any sibling that still agrees with it), and
	/// drops siblings that diverged before this point.
	pub fn advance_root(&mut self, committed: HashHeight) {
		self.root = committed;
		if self.current.blocks.first().map(|b| b.hash()) == Some(committed.hash) {
			self.current.blocks.remove(0);
		}
		self.siblings.retain(|_, b| match b.blocks.first() {
			Some(first) if first.hash() == committed.hash => {
				b.blocks.remove(0);
				true
			}
			_ => false,
		});
	}

	/// Demotes the suffix of current at and beyond `from_height` to a new
	/// side branch (a verifier fail-fork result).
	pub fn demote_current_suffix(&mut self, from_height: Height) {
		let split_at = self
			.current
			.blocks
			.iter()
			.position(|b| b.height() >= from_height);
		if let Some(idx) = split_at {
			let suffix: Vec<B> = self.current.blocks.split_off(idx);
			if !suffix.is_empty() {
				self.new_sibling(suffix);
			}
		}
	}

	/// Drops the head of current (a verifier fail-hard result): the
	/// offending block and everything above it.
	pub fn drop_current_from(&mut self, from_height: Height) {
		let split_at = self
			.current
			.blocks
			.iter()
			.position(|b| b.height() >= from_height);
		if let Some(idx) = split_at {
			self.current.blocks.truncate(idx);
		}
	}

	/// Garbage-collects side branches not extended for `max_idle_cycles`
	/// prune sweeps.
	pub fn loop_del_useless_chain(&mut self, max_idle_cycles: u64) -> usize {
		let cycle = self.cycle;
		let before = self.siblings.len();
		self.siblings
			.retain(|_, b| cycle.saturating_sub(b.last_active_cycle) <= max_idle_cycles);
		before - self.siblings.len()
	}

	/// Number of branches in the tree, current included.
	pub fn chain_count(&self) -> usize {
		self.siblings.len() + 1
	}

	/// Total blocks held across every side branch, current excluded.
	/// Reported as the pool's "compound" count: placed in the tree, not
	/// on the branch about to be offered to verification.
	pub fn sibling_block_count(&self) -> usize {
		self.siblings.values().map(|b| b.size()).sum()
	}
}
