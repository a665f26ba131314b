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

//! In-memory stand-ins for the ledger, verifiers, fetcher, and broadcaster,
//! used by the pool's own test suite in place of a real store and
//! consensus engine.

use std::collections::HashMap;
use std::sync::Mutex;

use pool_core::{Address, Hash, HashHeight, Height, ZERO_HASH};

use crate::error::{Error, ErrorKind};
use crate::traits::{AccountVerifier, Broadcaster, Fetcher, LedgerReader, LedgerWriter, SnapshotVerifier, WalletStatus};
use crate::types::{
	AccountBlockData, FetchRequest, KeyStatus, RollbackResult, SnapshotBlockData, UnconfirmedBlock,
	VerifyOutcome,
};

/// An in-memory ledger. Snapshot blocks accumulate in a vector; account
/// blocks in a per-address vector. Good enough to exercise the pool
/// without a real persistent store.
#[derive(Default)]
pub struct MockLedger {
	inner: Mutex<MockLedgerState>,
}

#[derive(Default)]
struct MockLedgerState {
	snapshots: Vec<SnapshotBlockData>,
	accounts: HashMap<Address, Vec<AccountBlockData>>,
}

impl MockLedger {
	/// An empty ledger whose snapshot and every account chain start at the
	/// zero hash, height zero.
	pub fn new() -> MockLedger {
		MockLedger::default()
	}

	/// Directly seeds the ledger with an already-"confirmed" snapshot
	/// block, bypassing verification. Used to set up test fixtures.
	pub fn seed_snapshot(&self, block: SnapshotBlockData) {
		self.inner.lock().unwrap().snapshots.push(block);
	}

	/// Directly seeds the ledger with an already-"confirmed" account
	/// block.
	pub fn seed_account(&self, block: AccountBlockData) {
		self.inner
			.lock()
			.unwrap()
			.accounts
			.entry(block.address)
			.or_insert_with(Vec::new)
			.push(block);
	}

	/// Number of snapshot blocks committed so far.
	pub fn snapshot_len(&self) -> usize {
		self.inner.lock().unwrap().snapshots.len()
	}

	/// Number of account blocks committed for `addr`.
	pub fn account_len(&self, addr: &Address) -> usize {
		self.inner
			.lock()
			.unwrap()
			.accounts
			.get(addr)
			.map(|v| v.len())
			.unwrap_or(0)
	}

	/// The heights, in commit order, of every account block committed for
	/// `addr`. Used by tests to assert the ledger ended up with a
	/// particular linear history.
	pub fn account_heights(&self, addr: &Address) -> Vec<Height> {
		self.inner
			.lock()
			.unwrap()
			.accounts
			.get(addr)
			.map(|v| v.iter().map(|b| b.height).collect())
			.unwrap_or_default()
	}
}

impl LedgerReader for MockLedger {
	fn head_snapshot(&self) -> HashHeight {
		let state = self.inner.lock().unwrap();
		state
			.snapshots
			.last()
			.map(|b| HashHeight::new(b.hash, b.height))
			.unwrap_or_else(|| HashHeight::new(ZERO_HASH, 0))
	}

	fn get_snapshot_block_by_hash(&self, hash: &Hash) -> Option<SnapshotBlockData> {
		self.inner
			.lock()
			.unwrap()
			.snapshots
			.iter()
			.find(|b| &b.hash == hash)
			.cloned()
	}

	fn chain_tail(&self, addr: Option<&Address>) -> HashHeight {
		let state = self.inner.lock().unwrap();
		match addr {
			None => state
				.snapshots
				.last()
				.map(|b| HashHeight::new(b.hash, b.height))
				.unwrap_or_else(|| HashHeight::new(ZERO_HASH, 0)),
			Some(addr) => state
				.accounts
				.get(addr)
				.and_then(|v| v.last())
				.map(|b| HashHeight::new(b.hash, b.height))
				.unwrap_or_else(|| HashHeight::new(ZERO_HASH, 0)),
		}
	}

	fn get_first_unconfirmed_block(
		&self,
		addr: &Address,
		head_snapshot: &HashHeight,
	) -> Option<UnconfirmedBlock> {
		let state = self.inner.lock().unwrap();
		let confirmed_snapshots: std::collections::HashSet<Hash> = state
			.snapshots
			.iter()
			.take_while(|s| s.height <= head_snapshot.height)
			.flat_map(|s| s.account_tips.get(addr).map(|_| s.hash))
			.collect();
		state
			.accounts
			.get(addr)?
			.iter()
			.find(|b| !confirmed_snapshots.contains(&b.snapshot_hash))
			.map(|b| UnconfirmedBlock {
				hash: b.hash,
				height: b.height,
				snapshot_hash: b.snapshot_hash,
			})
	}
}

impl LedgerWriter for MockLedger {
	fn append_snapshot_block(&self, block: &SnapshotBlockData) -> Result<(), Error> {
		let mut state = self.inner.lock().unwrap();
		let expect_height = state.snapshots.last().map(|b| b.height + 1).unwrap_or(0);
		if block.height != expect_height {
			return Err(ErrorKind::Store(format!(
				"non-contiguous snapshot append: expected height {}, got {}",
				expect_height, block.height
			))
			.into());
		}
		state.snapshots.push(block.clone());
		Ok(())
	}

	fn append_account_block(&self, block: &AccountBlockData) -> Result<(), Error> {
		let mut state = self.inner.lock().unwrap();
		let chain = state.accounts.entry(block.address).or_insert_with(Vec::new);
		let expect_height = chain.last().map(|b| b.height + 1).unwrap_or(0);
		if block.height != expect_height {
			return Err(ErrorKind::Store(format!(
				"non-contiguous account append: expected height {}, got {}",
				expect_height, block.height
			))
			.into());
		}
		chain.push(block.clone());
		Ok(())
	}

	fn del_account_to_height(&self, addr: &Address, height: Height) -> Result<RollbackResult, Error> {
		let mut state = self.inner.lock().unwrap();
		let mut result = RollbackResult::default();

		let mut own_rolled = Vec::new();
		if let Some(chain) = state.accounts.get_mut(addr) {
			while chain.last().map(|b| b.height >= height).unwrap_or(false) {
				own_rolled.push(chain.pop().unwrap());
			}
		}
		let deleted_hashes: std::collections::HashSet<Hash> = own_rolled.iter().map(|b| b.hash).collect();
		if !own_rolled.is_empty() {
			result.accounts.insert(*addr, own_rolled);
		}

		while state
			.snapshots
			.last()
			.map(|s| s.account_tips.get(addr).map(|t| t.height >= height).unwrap_or(false))
			.unwrap_or(false)
		{
			result.snapshots.push(state.snapshots.pop().unwrap());
		}

		if !deleted_hashes.is_empty() {
			for (other_addr, chain) in state.accounts.iter_mut() {
				if other_addr == addr {
					continue;
				}
				let mut rolled = Vec::new();
				chain.retain(|b| {
					if b.send_block_hash.map(|h| deleted_hashes.contains(&h)).unwrap_or(false) {
						rolled.push(b.clone());
						false
					} else {
						true
					}
				});
				if !rolled.is_empty() {
					rolled.reverse();
					result.accounts.insert(*other_addr, rolled);
				}
			}
		}

		Ok(result)
	}
}

/// Records every fetch request for assertions, answering nothing (tests
/// drive ancestor arrival explicitly via the pool's `add_*` entry points).
#[derive(Default)]
pub struct RecordingFetcher {
	requests: Mutex<Vec<FetchRequest>>,
}

impl RecordingFetcher {
	/// A fetcher with no recorded requests yet.
	pub fn new() -> RecordingFetcher {
		RecordingFetcher::default()
	}

	/// Every request seen so far, in order.
	pub fn requests(&self) -> Vec<FetchRequest> {
		self.requests.lock().unwrap().clone()
	}
}

impl Fetcher for RecordingFetcher {
	fn fetch(&self, request: FetchRequest) {
		self.requests.lock().unwrap().push(request);
	}
}

/// Records broadcasts instead of sending them over a network.
#[derive(Default)]
pub struct RecordingBroadcaster {
	snapshot_blocks: Mutex<Vec<Hash>>,
	account_blocks: Mutex<Vec<Hash>>,
}

impl RecordingBroadcaster {
	/// A broadcaster with nothing recorded yet.
	pub fn new() -> RecordingBroadcaster {
		RecordingBroadcaster::default()
	}

	/// Hashes of every snapshot block rebroadcast so far.
	pub fn snapshot_blocks(&self) -> Vec<Hash> {
		self.snapshot_blocks.lock().unwrap().clone()
	}

	/// Hashes of every account block rebroadcast so far.
	pub fn account_blocks(&self) -> Vec<Hash> {
		self.account_blocks.lock().unwrap().clone()
	}
}

impl Broadcaster for RecordingBroadcaster {
	fn broadcast_snapshot_block(&self, block: &SnapshotBlockData) {
		self.snapshot_blocks.lock().unwrap().push(block.hash);
	}

	fn broadcast_account_block(&self, block: &AccountBlockData) {
		self.account_blocks.lock().unwrap().push(block.hash);
	}

	fn broadcast_received_blocks(&self, received: &AccountBlockData, sends: &[AccountBlockData]) {
		self.account_blocks.lock().unwrap().push(received.hash);
		for s in sends {
			self.account_blocks.lock().unwrap().push(s.hash);
		}
	}

	fn broadcast_unconfirmed_blocks(&self, _addr: &Address, blocks: &[AccountBlockData]) {
		for b in blocks {
			self.account_blocks.lock().unwrap().push(b.hash);
		}
	}
}

/// A wallet stub that reports a fixed status map.
#[derive(Default)]
pub struct FixedWalletStatus {
	status: HashMap<Address, KeyStatus>,
}

impl FixedWalletStatus {
	/// A wallet stub holding no keys at all.
	pub fn new() -> FixedWalletStatus {
		FixedWalletStatus::default()
	}

	/// Marks `addr` as unlocked (or locked) in the reported status map.
	pub fn set(&mut self, addr: Address, status: KeyStatus) {
		self.status.insert(addr, status);
	}
}

impl WalletStatus for FixedWalletStatus {
	fn status(&self) -> HashMap<Address, KeyStatus> {
		self.status.clone()
	}
}

/// A verifier that accepts an account block exactly when it extends the
/// ledger's current tail for its address by one height, asks for the
/// missing ancestor when it doesn't, and rejects anything at or below
/// the tail outright. Good enough to drive the pool through its
/// reassembly and try-insert logic without embodying real consensus
/// rules.
pub struct SequentialAccountVerifier<R> {
	ledger: std::sync::Arc<R>,
}

impl<R: LedgerReader> SequentialAccountVerifier<R> {
	/// A verifier reading tails from `ledger`.
	pub fn new(ledger: std::sync::Arc<R>) -> SequentialAccountVerifier<R> {
		SequentialAccountVerifier { ledger }
	}
}

impl<R: LedgerReader> AccountVerifier for SequentialAccountVerifier<R> {
	fn verify(&self, block: &AccountBlockData) -> VerifyOutcome {
		let tail = self.ledger.chain_tail(Some(&block.address));
		if block.height <= tail.height {
			return VerifyOutcome::FailHard;
		}
		if block.prev_hash == tail.hash && block.height == tail.height + 1 {
			return VerifyOutcome::Valid;
		}
		let gap = block.height - tail.height;
		VerifyOutcome::Pending(vec![FetchRequest {
			target: HashHeight::new(block.prev_hash, block.height - 1),
			chain: Some(block.address),
			count: gap,
		}])
	}
}

/// A verifier for the snapshot chain with the same sequential-extension
/// rule, plus a fixed acceptance window for `verify_account_timeout`.
pub struct SequentialSnapshotVerifier<R> {
	ledger: std::sync::Arc<R>,
	acceptance_window: Height,
}

impl<R: LedgerReader> SequentialSnapshotVerifier<R> {
	/// A verifier reading tails from `ledger`, accepting an unconfirmed
	/// reference up to `acceptance_window` heights behind the live head.
	pub fn new(ledger: std::sync::Arc<R>, acceptance_window: Height) -> SequentialSnapshotVerifier<R> {
		SequentialSnapshotVerifier {
			ledger,
			acceptance_window,
		}
	}
}

impl<R: LedgerReader> SnapshotVerifier for SequentialSnapshotVerifier<R> {
	fn verify(&self, block: &SnapshotBlockData) -> VerifyOutcome {
		let tail = self.ledger.chain_tail(None);
		if block.height <= tail.height {
			return VerifyOutcome::FailHard;
		}
		if block.prev_hash == tail.hash && block.height == tail.height + 1 {
			return VerifyOutcome::Valid;
		}
		let gap = block.height - tail.height;
		VerifyOutcome::Pending(vec![FetchRequest {
			target: HashHeight::new(block.prev_hash, block.height - 1),
			chain: None,
			count: gap,
		}])
	}

	fn verify_account_timeout(&self, head_snapshot: &HashHeight, refer_snapshot: &HashHeight) -> bool {
		head_snapshot.height.saturating_sub(refer_snapshot.height) <= self.acceptance_window
	}
}
