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

//! Per-address pool: a buffer, a chain tree, and a reference-only view of
//! the persisted account chain for one address.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use pool_core::{Address, CommonBlock, ForkVersion, Hash, HashHeight};
use pool_ledger::{
	AccountBlockData, AccountVerifier, FetchRequest, Fetcher, LedgerReader, LedgerWriter, PoolConfig,
	VerifyOutcome,
};

use crate::block::AccountPoolBlock;
use crate::buffer::BlockPoolBuffer;
use crate::error::{ErrorKind, PoolError};
use crate::fetch::FetchGate;
use crate::snippet::{assemble, merge_all, Snippet};
use crate::tree::ChainTree;

/// Diagnostic counters for one address's pool, returned by `Info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
	/// Free blocks awaiting a predecessor.
	pub free_blocks: usize,
	/// Blocks placed in the tree's side branches, awaiting a fork
	/// decision (current's own blocks are counted by `current_len`).
	pub compound_blocks: usize,
	/// Blocks on the current branch.
	pub current_len: usize,
	/// Number of side branches, current excluded.
	pub side_chains: usize,
}

/// The pool for a single address's account chain. `L` is the shared
/// ledger type (read and write access); the verifier, fetcher are held
/// as trait objects since a single fetcher and verifier are shared
/// across every address's pool.
pub struct AccountPool<L> {
	address: Address,
	buffer: Mutex<BlockPoolBuffer<AccountPoolBlock>>,
	tree: Mutex<ChainTree<AccountPoolBlock>>,
	version: ForkVersion,
	ledger: Arc<L>,
	verifier: Arc<dyn AccountVerifier>,
	fetch_gate: Mutex<FetchGate<dyn Fetcher>>,
	config: PoolConfig,
}

impl<L> AccountPool<L>
where
	L: LedgerReader + LedgerWriter,
{
	/// Creates a pool for `address`, rooted at its current ledger tail.
	pub fn new(
		address: Address,
		ledger: Arc<L>,
		verifier: Arc<dyn AccountVerifier>,
		fetcher: Arc<dyn Fetcher>,
		version: ForkVersion,
		config: PoolConfig,
	) -> AccountPool<L> {
		let root = ledger.chain_tail(Some(&address));
		AccountPool {
			address,
			buffer: Mutex::new(BlockPoolBuffer::new()),
			tree: Mutex::new(ChainTree::new(root)),
			version,
			ledger,
			verifier,
			fetch_gate: Mutex::new(FetchGate::new(fetcher, Duration::from_millis(config.fetch_dedup_window_ms))),
			config,
		}
	}

	/// This pool's address.
	pub fn address(&self) -> Address {
		self.address
	}

	/// Enqueues a freshly arrived block into the buffer.
	pub fn add_block(&self, data: AccountBlockData) {
		let block = AccountPoolBlock::new(data, &self.version);
		self.buffer.lock().add(block);
	}

	/// True if `hash` is on the current branch.
	pub fn exist_in_current(&self, hash: &Hash) -> bool {
		self.tree.lock().current().blocks().iter().any(|b| b.hash() == *hash)
	}

	/// Whether `hash` lives anywhere in the pool: free, or on any branch
	/// of the tree.
	pub fn exist_in_pool(&self, hash: &Hash) -> bool {
		self.buffer.lock().contains(hash) || self.tree.lock().find_in_tree(*hash, 0).is_some() || self.exist_in_current(hash)
	}

	/// Drains and re-assembles free blocks into the tree. Returns the
	/// number of blocks grafted this cycle.
	pub fn compact(&self) -> usize {
		let drained = self.buffer.lock().drain_free_with_age();
		if drained.is_empty() {
			return 0;
		}
		let mut ages = std::collections::HashMap::with_capacity(drained.len());
		let mut blocks = Vec::with_capacity(drained.len());
		for (block, arrived) in drained {
			ages.insert(block.hash(), arrived);
			blocks.push(block);
		}
		let snippets = merge_all(assemble(blocks));

		let mut tree = self.tree.lock();
		let tail = tree.tail();

		// Snippets that would extend current all attach at the same
		// point; if more than one does, it's a fork at the tip. The
		// tallest wins current, ties broken by lexicographic head hash;
		// the rest are kept as side branches off the same point rather
		// than discarded.
		let mut at_tip = Vec::new();
		let mut rest = Vec::new();
		for snippet in snippets {
			if snippet.head().prev_hash() == tail.hash {
				at_tip.push(snippet);
			} else {
				rest.push(snippet);
			}
		}

		let mut grafted = 0;
		if !at_tip.is_empty() {
			at_tip.sort_by(|a, b| b.tail_height().cmp(&a.tail_height()).then_with(|| a.head_hash().cmp(&b.head_hash())));
			let mut contenders = at_tip.into_iter();
			let winner = contenders.next().expect("at_tip is non-empty");
			let current_prefix = tree.current().blocks().to_vec();
			grafted += winner.len();
			tree.graft_current(winner.into_blocks());
			for loser in contenders {
				let mut side = current_prefix.clone();
				side.extend(loser.into_blocks());
				tree.new_sibling(side);
			}
		}

		let mut leftover = Vec::new();
		for snippet in rest {
			match self.try_graft(&mut tree, snippet) {
				Ok(n) => grafted += n,
				Err(s) => leftover.push(s),
			}
		}
		drop(tree);

		if !leftover.is_empty() {
			let now = Instant::now();
			let returned: Vec<_> = leftover
				.into_iter()
				.flat_map(|s| s.into_blocks())
				.map(|b| {
					let age = ages.get(&b.hash()).copied().unwrap_or(now);
					(b, age)
				})
				.collect();
			self.buffer.lock().return_free(returned);
		}
		grafted
	}

	/// Grafts a snippet that does not attach at current's tip: onto an
	/// existing side branch it extends, or as a fresh branch off the
	/// ledger root. Issues a fetch and hands the snippet back otherwise.
	fn try_graft(
		&self,
		tree: &mut ChainTree<AccountPoolBlock>,
		snippet: Snippet<AccountPoolBlock>,
	) -> Result<usize, Snippet<AccountPoolBlock>> {
		if let Some(name) = tree.find_in_tree(snippet.head().prev_hash(), snippet.head_height().saturating_sub(1)) {
			let len = snippet.len();
			tree.graft_sibling(&name, snippet.into_blocks());
			return Ok(len);
		}
		if snippet.head().prev_hash() == tree.root().hash {
			let len = snippet.len();
			tree.new_sibling(snippet.into_blocks());
			return Ok(len);
		}

		let gap = snippet.head_height().saturating_sub(tree.tail().height);
		self.fetch_gate.lock().request(FetchRequest {
			target: HashHeight::new(snippet.head().prev_hash(), snippet.head_height().saturating_sub(1)),
			chain: Some(self.address),
			count: gap.max(1),
		});
		Err(snippet)
	}

	/// Verifies and commits as many leading blocks of current as possible.
	/// Returns the number of blocks committed.
	pub fn try_insert(&self) -> usize {
		let mut inserted = 0;
		loop {
			let candidate = {
				let mut tree = self.tree.lock();
				match tree.current_mut().head_mut() {
					Some(block) => {
						if !block.fork_version_current() {
							debug!(
								"account {} re-validating block at height {} after a fork-version bump",
								self.address,
								block.height()
							);
							block.reset_fork_version();
						}
						Some(block.data.clone())
					}
					None => None,
				}
			};
			let data = match candidate {
				Some(d) => d,
				None => break,
			};
			match self.verifier.verify(&data) {
				VerifyOutcome::Valid => {
					if let Err(e) = self.ledger.append_account_block(&data) {
						warn!("account {} append failed: {}", self.address, e);
						break;
					}
					self.tree.lock().advance_root(HashHeight::new(data.hash, data.height));
					inserted += 1;
				}
				VerifyOutcome::Pending(requests) => {
					let mut gate = self.fetch_gate.lock();
					for req in requests {
						gate.request(req);
					}
					break;
				}
				VerifyOutcome::FailFork => {
					self.tree.lock().demote_current_suffix(data.height);
					self.version.inc();
					break;
				}
				VerifyOutcome::FailHard => {
					info!("account {} dropping invalid block at height {}", self.address, data.height);
					self.tree.lock().drop_current_from(data.height);
					break;
				}
			}
		}
		if inserted > 0 {
			debug!("account {} committed {} blocks", self.address, inserted);
		}
		inserted
	}

	/// Looks up which branch (if any) holds `(hash, height)`.
	pub fn find_in_tree(&self, hash: Hash, height: u64) -> Option<String> {
		self.tree.lock().find_in_tree(hash, height)
	}

	/// Switches current to a branch already containing `target`, or drops
	/// current to the root and issues a fetch if `target` is unknown.
	pub fn fork_to(&self, target: HashHeight) -> Result<(), PoolError> {
		let name = self.find_in_tree(target.hash, target.height);
		let mut tree = self.tree.lock();
		match name {
			Some(name) => {
				tree.current_modify_to_chain(&name);
				self.version.inc();
				Ok(())
			}
			None => {
				tree.current_modify_to_empty();
				self.version.inc();
				drop(tree);
				self.fetch_gate.lock().request(FetchRequest {
					target,
					chain: Some(self.address),
					count: 1,
				});
				Err(ErrorKind::ForkDetected.into())
			}
		}
	}

	/// Non-destructive variant of [`AccountPool::fork_to`]: attempts the
	/// switch but never drops an already-healthy current to empty purely
	/// because the target wasn't found; it still issues a fetch.
	pub fn pending_to(&self, target: HashHeight) {
		if let Some(name) = self.find_in_tree(target.hash, target.height) {
			let mut tree = self.tree.lock();
			tree.current_modify_to_chain(&name);
			self.version.inc();
		} else {
			self.fetch_gate.lock().request(FetchRequest {
				target,
				chain: Some(self.address),
				count: 1,
			});
		}
	}

	/// Re-offers blocks a ledger rollback removed from this address's
	/// chain, as a new side branch of the tree. Takes `blocks` in the
	/// `RollbackResult` convention (highest first) and does not touch the
	/// ledger itself or bump the fork version — the caller (the top-level
	/// pool) owns the single ledger call and version bump for a rollback
	/// that may cascade across several pools.
	pub fn reintroduce_rolled_back(&self, mut blocks: Vec<AccountBlockData>) {
		if blocks.is_empty() {
			return;
		}
		blocks.reverse();
		let blocks: Vec<AccountPoolBlock> = blocks.into_iter().map(|d| AccountPoolBlock::new(d, &self.version)).collect();
		self.tree.lock().new_sibling(blocks);
	}

	/// Garbage-collects idle side branches.
	pub fn prune(&self) -> usize {
		let mut tree = self.tree.lock();
		tree.tick();
		tree.loop_del_useless_chain(self.config.useless_chain_cycles)
	}

	/// The oldest account block not yet referenced by a committed
	/// snapshot at or below `head_snapshot`.
	pub fn first_unconfirmed(&self, head_snapshot: &HashHeight) -> Option<pool_ledger::UnconfirmedBlock> {
		self.ledger.get_first_unconfirmed_block(&self.address, head_snapshot)
	}

	/// Diagnostic counters for this address's pool.
	pub fn info(&self) -> PoolStats {
		let buffer = self.buffer.lock();
		let tree = self.tree.lock();
		PoolStats {
			free_blocks: buffer.free_len(),
			compound_blocks: tree.sibling_block_count(),
			current_len: tree.current().size(),
			side_chains: tree.chain_count() - 1,
		}
	}

	/// Evicts free blocks that have sat unconfirmed longer than the
	/// configured TTL.
	pub fn evict_stale(&self) -> usize {
		self.buffer.lock().evict_expired(Duration::from_millis(self.config.free_block_ttl_ms))
	}
}
