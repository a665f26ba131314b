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

//! The top-level orchestrator: one snapshot pool, a lazily populated
//! registry of account pools, three background loops, and the public
//! write/read API described for the block pool as a whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use parking_lot::RwLock;

use pool_core::{Address, ForkVersion, Hash, HashHeight, Height};
use pool_ledger::{
	AccountBlockData, AccountVerifier, Broadcaster, Fetcher, KeyStatus, LedgerReader, LedgerWriter,
	PoolConfig, SnapshotBlockData, SnapshotVerifier, WalletStatus,
};

use crate::account_pool::{AccountPool, PoolStats};
use crate::error::{ErrorKind, PoolError};
use crate::snapshot_pool::SnapshotPool;

/// Everything the top-level pool needs from the outside world, grouped
/// so `Pool::init` doesn't take six unrelated arguments.
pub struct PoolDeps<L> {
	/// The shared persistent ledger (read and write).
	pub ledger: Arc<L>,
	/// Consensus verification for the snapshot chain.
	pub snapshot_verifier: Arc<dyn SnapshotVerifier>,
	/// Consensus verification for account chains.
	pub account_verifier: Arc<dyn AccountVerifier>,
	/// Network retrieval of missing blocks.
	pub fetcher: Arc<dyn Fetcher>,
	/// Network rebroadcast of already-accepted blocks.
	pub broadcaster: Arc<dyn Broadcaster>,
	/// Lock status of locally held keys.
	pub wallet: Arc<dyn WalletStatus>,
}

/// Condition variable pair the background loops block on between ticks.
#[derive(Default)]
struct Signal {
	lock: Mutex<bool>,
	condvar: Condvar,
}

impl Signal {
	fn wait(&self, timeout: Duration) {
		let mut pending = self.lock.lock().unwrap();
		if !*pending {
			let (guard, _) = self.condvar.wait_timeout(pending, timeout).unwrap();
			pending = guard;
		}
		*pending = false;
	}

	fn notify(&self) {
		let mut pending = self.lock.lock().unwrap();
		*pending = true;
		self.condvar.notify_all();
	}
}

/// The block pool. Orchestrates the snapshot pool and one account pool
/// per address, and runs the compact/try-insert/housekeeping loops.
pub struct Pool<L> {
	deps_ledger: Arc<L>,
	snapshot_verifier: Arc<dyn SnapshotVerifier>,
	account_verifier: Arc<dyn AccountVerifier>,
	fetcher: Arc<dyn Fetcher>,
	broadcaster: Arc<dyn Broadcaster>,
	wallet: Arc<dyn WalletStatus>,
	config: PoolConfig,

	snapshot_pool: Arc<SnapshotPool<L>>,
	pending_ac: Arc<DashMap<Address, Arc<AccountPool<L>>>>,
	version: ForkVersion,

	/// Gates rollback/"stop the world" confirmation checks against every
	/// other reader and the insert loop. Readers and AddBlock take the
	/// read side; rollback and snapshot confirmation take the write side.
	global: Arc<RwLock<()>>,

	signal: Arc<Signal>,
	running: Arc<AtomicBool>,
	threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<L> Pool<L>
where
	L: LedgerReader + LedgerWriter + 'static,
{
	/// Builds the pool. Call [`Pool::start`] to launch its background
	/// loops.
	pub fn init(deps: PoolDeps<L>, config: PoolConfig) -> Pool<L> {
		let version = ForkVersion::new();
		let snapshot_pool = Arc::new(SnapshotPool::new(
			deps.ledger.clone(),
			deps.snapshot_verifier.clone(),
			deps.fetcher.clone(),
			version.clone(),
			config,
		));
		Pool {
			deps_ledger: deps.ledger,
			snapshot_verifier: deps.snapshot_verifier,
			account_verifier: deps.account_verifier,
			fetcher: deps.fetcher,
			broadcaster: deps.broadcaster,
			wallet: deps.wallet,
			config,
			snapshot_pool,
			pending_ac: Arc::new(DashMap::new()),
			version,
			global: Arc::new(RwLock::new(())),
			signal: Arc::new(Signal::default()),
			running: Arc::new(AtomicBool::new(false)),
			threads: Mutex::new(Vec::new()),
		}
	}

	fn account_pool(&self, addr: Address) -> Arc<AccountPool<L>> {
		if let Some(p) = self.pending_ac.get(&addr) {
			return p.clone();
		}
		let pool = Arc::new(AccountPool::new(
			addr,
			self.deps_ledger.clone(),
			self.account_verifier.clone(),
			self.fetcher.clone(),
			self.version.clone(),
			self.config,
		));
		self.pending_ac.entry(addr).or_insert(pool).clone()
	}

	// -- Write API -------------------------------------------------------

	/// Enqueues a snapshot block for later verification by the compact
	/// and try-insert loops.
	pub fn add_snapshot_block(&self, block: SnapshotBlockData) {
		let _read = self.global.read();
		self.snapshot_pool.add_block(block);
		self.signal.notify();
	}

	/// Synchronously verifies and commits a snapshot block, broadcasting
	/// it back out if verification fails.
	pub fn add_direct_snapshot_block(&self, block: SnapshotBlockData) -> Result<(), PoolError> {
		let _read = self.global.read();
		match self.snapshot_verifier.verify(&block) {
			pool_ledger::VerifyOutcome::Valid => {
				self.deps_ledger.append_snapshot_block(&block)?;
				Ok(())
			}
			pool_ledger::VerifyOutcome::Pending(requests) => {
				self.snapshot_pool.add_block(block.clone());
				for req in requests {
					self.fetcher.fetch(req);
				}
				Err(ErrorKind::TransientDependency(0).into())
			}
			pool_ledger::VerifyOutcome::FailFork | pool_ledger::VerifyOutcome::FailHard => {
				self.broadcaster.broadcast_snapshot_block(&block);
				Err(ErrorKind::VerificationFailure("snapshot block rejected".to_string()).into())
			}
		}
	}

	/// Enqueues an account block for `addr`.
	pub fn add_account_block(&self, addr: Address, block: AccountBlockData) {
		let _read = self.global.read();
		self.account_pool(addr).add_block(block);
		self.signal.notify();
	}

	/// Synchronously verifies and commits an account block.
	pub fn add_direct_account_block(&self, addr: Address, block: AccountBlockData) -> Result<(), PoolError> {
		let _read = self.global.read();
		match self.account_verifier.verify(&block) {
			pool_ledger::VerifyOutcome::Valid => {
				self.deps_ledger.append_account_block(&block)?;
				Ok(())
			}
			pool_ledger::VerifyOutcome::Pending(requests) => {
				self.account_pool(addr).add_block(block.clone());
				for req in requests {
					self.fetcher.fetch(req);
				}
				Err(ErrorKind::TransientDependency(0).into())
			}
			pool_ledger::VerifyOutcome::FailFork | pool_ledger::VerifyOutcome::FailHard => {
				self.broadcaster.broadcast_account_block(&block);
				Err(ErrorKind::VerificationFailure("account block rejected".to_string()).into())
			}
		}
	}

	/// Batch variant of [`Pool::add_account_block`]; atomicity is
	/// per-block, not per-batch.
	pub fn add_account_blocks(&self, addr: Address, blocks: Vec<AccountBlockData>) {
		for b in blocks {
			self.add_account_block(addr, b);
		}
	}

	/// Batch variant of [`Pool::add_direct_account_block`]; atomicity is
	/// per-block, not per-batch. Returns the first error encountered, if
	/// any, but still attempts every block.
	pub fn add_direct_account_blocks(&self, addr: Address, blocks: Vec<AccountBlockData>) -> Result<(), PoolError> {
		let mut first_err = None;
		for b in blocks {
			if let Err(e) = self.add_direct_account_block(addr, b) {
				if first_err.is_none() {
					first_err = Some(e);
				}
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	// -- Read API ----------------------------------------------------------

	/// True if `hash` is on `addr`'s current branch.
	pub fn exist_in_pool(&self, addr: Address, hash: &Hash) -> bool {
		let _read = self.global.read();
		self.account_pool(addr).exist_in_pool(hash)
	}

	/// Rolls `addr`'s account chain back to `target`, destructively.
	pub fn fork_account_to(&self, addr: Address, target: HashHeight) -> Result<(), PoolError> {
		let _write = self.global.write();
		self.do_rollback_account_to(addr, target.height + 1)?;
		self.account_pool(addr).fork_to(target)
	}

	/// Cascading rollback of `addr`'s account chain down to (but not
	/// including) `height`: deletes the ledger suffix and redistributes
	/// everything invalidated — `addr`'s own rolled-back blocks, any
	/// other address's blocks that depended on them, and any snapshot
	/// that had certified a now-deleted tip — back into the respective
	/// pools' current branches, then bumps the fork version once. The
	/// caller must already hold `self.global` for writing.
	fn do_rollback_account_to(&self, addr: Address, height: Height) -> Result<(), PoolError> {
		let result = self.deps_ledger.del_account_to_height(&addr, height)?;
		self.snapshot_pool.reintroduce_rolled_back(result.snapshots);
		for (other_addr, blocks) in result.accounts {
			self.account_pool(other_addr).reintroduce_rolled_back(blocks);
		}
		self.version.inc();
		Ok(())
	}

	/// Non-destructively attempts to switch `addr`'s current branch to
	/// one already containing `target`, fetching it if unknown.
	pub fn pending_account_to(&self, addr: Address, target: HashHeight) {
		let _read = self.global.read();
		self.account_pool(addr).pending_to(target);
	}

	/// Diagnostic counters. `addr` selects an account pool; `None` reads
	/// the snapshot pool.
	pub fn info(&self, addr: Option<Address>) -> PoolStats {
		let _read = self.global.read();
		match addr {
			Some(a) => self.account_pool(a).info(),
			None => self.snapshot_pool.info(),
		}
	}

	/// Number of account pools created so far (one per address ever
	/// referenced).
	pub fn account_pool_count(&self) -> usize {
		self.pending_ac.len()
	}

	// -- Background loops ----------------------------------------------------

	fn loop_compact(&self) {
		let idle = Duration::from_millis(self.config.compact_idle_ms);
		while self.running.load(Ordering::SeqCst) {
			self.signal.wait(idle);
			if !self.running.load(Ordering::SeqCst) {
				break;
			}
			self.compact_once();
		}
	}

	fn compact_once(&self) {
		let _read = self.global.read();
		self.snapshot_pool.compact();
		for entry in self.pending_ac.iter() {
			entry.value().compact();
		}
	}

	fn loop_try_insert(&self) {
		let idle = Duration::from_millis(self.config.try_insert_idle_ms);
		while self.running.load(Ordering::SeqCst) {
			self.signal.wait(idle);
			if !self.running.load(Ordering::SeqCst) {
				break;
			}
			self.try_insert_once();
		}
	}

	fn try_insert_once(&self) {
		let pending_ac = self.pending_ac.clone();
		{
			let _write = self.global.write();
			self.snapshot_pool.try_insert(|committed| {
				for (addr, tip) in &committed.account_tips {
					if let Some(p) = pending_ac.get(addr) {
						p.pending_to(*tip);
					}
				}
			});
		}
		let _read = self.global.read();
		for entry in self.pending_ac.iter() {
			entry.value().try_insert();
		}
	}

	/// Runs one compact pass only, without attempting inserts. Exposed
	/// alongside [`Pool::tick`] for tests that need to observe the tree
	/// between grafting and verification — a fork decision is visible
	/// here, before the winner's blocks have had a chance to commit and
	/// prune the loser.
	pub fn compact(&self) {
		self.compact_once();
	}

	/// Runs one compact pass followed by one try-insert pass,
	/// synchronously on the caller's thread. Exposed so tests (and
	/// embedders that prefer their own scheduling) can drive the pool
	/// deterministically instead of waiting on the background loops'
	/// timers.
	pub fn tick(&self) {
		self.compact_once();
		self.try_insert_once();
	}

	fn housekeeping_tick(
		&self,
		elapsed: Duration,
		broadcast_acc: &mut Duration,
		timeout_acc: &mut Duration,
		prune_acc: &mut Duration,
	) {
		*broadcast_acc += elapsed;
		*timeout_acc += elapsed;
		*prune_acc += elapsed;

		let status = self.wallet.status();
		let head_snapshot = self.snapshot_pool.head_snapshot();

		if *broadcast_acc >= Duration::from_millis(self.config.broadcast_period_ms) {
			*broadcast_acc = Duration::ZERO;
			for (addr, key_status) in status.iter() {
				if *key_status != KeyStatus::Unlocked {
					continue;
				}
				let pool = self.account_pool(*addr);
				if let Some(unconfirmed) = pool.first_unconfirmed(&head_snapshot) {
					info!("rebroadcasting unconfirmed block for {} at height {}", addr, unconfirmed.height);
				}
			}
		}

		if *timeout_acc >= Duration::from_millis(self.config.timeout_period_ms) {
			*timeout_acc = Duration::ZERO;
			for (addr, key_status) in status.iter() {
				if *key_status != KeyStatus::Unlocked {
					continue;
				}
				let pool = self.account_pool(*addr);
				if let Some(unconfirmed) = pool.first_unconfirmed(&head_snapshot) {
					let refer = HashHeight::new(unconfirmed.snapshot_hash, 0);
					if !self.snapshot_pool.verify_account_timeout(&refer) {
						let _write = self.global.write();
						if let Err(e) = self.do_rollback_account_to(*addr, unconfirmed.height) {
							warn!("timeout rollback for {} failed: {}", addr, e);
						}
					}
				}
			}
		}

		if *prune_acc >= Duration::from_millis(self.config.prune_period_ms) {
			*prune_acc = Duration::ZERO;
			self.snapshot_pool.prune();
			self.snapshot_pool.evict_stale();
			for entry in self.pending_ac.iter() {
				entry.value().prune();
				entry.value().evict_stale();
			}
		}
	}

	fn loop_housekeeping(&self) {
		let tick = Duration::from_millis(20);
		let mut broadcast_acc = Duration::ZERO;
		let mut timeout_acc = Duration::ZERO;
		let mut prune_acc = Duration::ZERO;
		while self.running.load(Ordering::SeqCst) {
			thread::sleep(tick);
			if !self.running.load(Ordering::SeqCst) {
				break;
			}
			self.housekeeping_tick(tick, &mut broadcast_acc, &mut timeout_acc, &mut prune_acc);
		}
	}

	// -- Lifecycle ----------------------------------------------------------

	/// Launches the compact, try-insert, and housekeeping loops on their
	/// own threads. A no-op if already running.
	pub fn start(self: &Arc<Self>) {
		if self.running.swap(true, Ordering::SeqCst) {
			return;
		}
		let mut threads = self.threads.lock().unwrap();

		let p = self.clone();
		threads.push(thread::spawn(move || p.loop_compact()));

		let p = self.clone();
		threads.push(thread::spawn(move || p.loop_try_insert()));

		let p = self.clone();
		threads.push(thread::spawn(move || p.loop_housekeeping()));

		info!("pool started");
	}

	/// Signals every loop to stop and waits for them to exit. In-flight
	/// `AddBlock` calls complete; no new inserts land after this returns.
	pub fn stop(&self) {
		if !self.running.swap(false, Ordering::SeqCst) {
			return;
		}
		self.signal.notify();
		let mut threads = self.threads.lock().unwrap();
		for handle in threads.drain(..) {
			let _ = handle.join();
		}
		info!("pool stopped");
	}
}
