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

//! The singleton pool for the snapshot chain. Same shape as
//! [`crate::account_pool::AccountPool`], but it additionally owns the
//! rollback authority exercised when account-confirmation timeouts fire,
//! and try-insert requires a consistency check against account tips
//! rather than just a plain verifier call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use pool_core::{CommonBlock, ForkVersion, Hash, HashHeight};
use pool_ledger::{
	FetchRequest, Fetcher, LedgerReader, LedgerWriter, PoolConfig, SnapshotBlockData, SnapshotVerifier,
	VerifyOutcome,
};

use crate::account_pool::PoolStats;
use crate::block::SnapshotPoolBlock;
use crate::buffer::BlockPoolBuffer;
use crate::error::{ErrorKind, PoolError};
use crate::fetch::FetchGate;
use crate::snippet::{assemble, merge_all, Snippet};
use crate::tree::ChainTree;

/// The pool for the single, global snapshot chain. `L` is the shared
/// ledger type; the verifier and fetcher are trait objects, shared with
/// every account pool's.
pub struct SnapshotPool<L> {
	buffer: Mutex<BlockPoolBuffer<SnapshotPoolBlock>>,
	tree: Mutex<ChainTree<SnapshotPoolBlock>>,
	version: ForkVersion,
	ledger: Arc<L>,
	verifier: Arc<dyn SnapshotVerifier>,
	fetch_gate: Mutex<FetchGate<dyn Fetcher>>,
	config: PoolConfig,
}

impl<L> SnapshotPool<L>
where
	L: LedgerReader + LedgerWriter,
{
	/// Creates the snapshot pool, rooted at the ledger's current head.
	pub fn new(
		ledger: Arc<L>,
		verifier: Arc<dyn SnapshotVerifier>,
		fetcher: Arc<dyn Fetcher>,
		version: ForkVersion,
		config: PoolConfig,
	) -> SnapshotPool<L> {
		let root = ledger.chain_tail(None);
		SnapshotPool {
			buffer: Mutex::new(BlockPoolBuffer::new()),
			tree: Mutex::new(ChainTree::new(root)),
			version,
			ledger,
			verifier,
			fetch_gate: Mutex::new(FetchGate::new(fetcher, Duration::from_millis(config.fetch_dedup_window_ms))),
			config,
		}
	}

	/// The ledger's current snapshot head, as seen through this pool's
	/// reader.
	pub fn head_snapshot(&self) -> HashHeight {
		self.ledger.head_snapshot()
	}

	/// Enqueues a freshly arrived snapshot block.
	pub fn add_block(&self, data: SnapshotBlockData) {
		let block = SnapshotPoolBlock::new(data, &self.version);
		self.buffer.lock().add(block);
	}

	/// True if `hash` is on the current branch.
	pub fn exist_in_current(&self, hash: &Hash) -> bool {
		self.tree.lock().current().blocks().iter().any(|b| b.hash() == *hash)
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
		// point; if more than one does, the tallest wins current, ties
		// broken by lexicographic head hash, and the rest are kept as
		// side branches off the same point.
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
		tree: &mut ChainTree<SnapshotPoolBlock>,
		snippet: Snippet<SnapshotPoolBlock>,
	) -> Result<usize, Snippet<SnapshotPoolBlock>> {
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
			chain: None,
			count: gap.max(1),
		});
		Err(snippet)
	}

	/// Verifies and commits as many leading blocks of current as
	/// possible. Each committed block's account tips are handed to
	/// `on_commit` before the next block is considered, under the
	/// caller's stop-the-world write lock (the pool's cross-chain
	/// consistency check).
	pub fn try_insert(&self, mut on_commit: impl FnMut(&SnapshotBlockData)) -> usize {
		let mut inserted = 0;
		loop {
			let candidate = {
				let mut tree = self.tree.lock();
				match tree.current_mut().head_mut() {
					Some(block) => {
						if !block.fork_version_current() {
							debug!("re-validating snapshot block at height {} after a fork-version bump", block.height());
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
					if let Err(e) = self.ledger.append_snapshot_block(&data) {
						warn!("snapshot append failed: {}", e);
						break;
					}
					self.tree.lock().advance_root(HashHeight::new(data.hash, data.height));
					on_commit(&data);
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
					info!("dropping invalid snapshot block at height {}", data.height);
					self.tree.lock().drop_current_from(data.height);
					break;
				}
			}
		}
		if inserted > 0 {
			debug!("snapshot pool committed {} blocks", inserted);
		}
		inserted
	}

	/// Whether `refer_snapshot` is still within the verifier's acceptance
	/// window relative to the current head.
	pub fn verify_account_timeout(&self, refer_snapshot: &HashHeight) -> bool {
		self.verifier.verify_account_timeout(&self.head_snapshot(), refer_snapshot)
	}

	/// Re-offers snapshot blocks a ledger rollback removed, as a new side
	/// branch of the tree. Takes `blocks` in the `RollbackResult`
	/// convention (highest first) and does not touch the ledger or bump
	/// the fork version — the top-level pool owns both for a rollback
	/// that cascades across the snapshot pool and every affected address.
	pub fn reintroduce_rolled_back(&self, mut blocks: Vec<SnapshotBlockData>) {
		if blocks.is_empty() {
			return;
		}
		blocks.reverse();
		let blocks: Vec<SnapshotPoolBlock> = blocks.into_iter().map(|d| SnapshotPoolBlock::new(d, &self.version)).collect();
		self.tree.lock().new_sibling(blocks);
	}

	/// Switches current to a branch already containing `target`, or drops
	/// current to the root and issues a fetch if `target` is unknown.
	pub fn fork_to(&self, target: HashHeight) -> Result<(), PoolError> {
		let name = self.tree.lock().find_in_tree(target.hash, target.height);
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
					chain: None,
					count: 1,
				});
				Err(ErrorKind::ForkDetected.into())
			}
		}
	}

	/// Garbage-collects idle side branches.
	pub fn prune(&self) -> usize {
		let mut tree = self.tree.lock();
		tree.tick();
		tree.loop_del_useless_chain(self.config.useless_chain_cycles)
	}

	/// Diagnostic counters for the snapshot pool.
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
