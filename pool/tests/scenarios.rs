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

//! Scenario tests exercising the pool end to end against the in-memory
//! ledger and scripted verifiers from `pool_ledger::mock`.

use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pool::{Pool, PoolDeps};
use pool_core::{Address, Hash, HashHeight};
use pool_ledger::mock::{
	FixedWalletStatus, MockLedger, RecordingBroadcaster, RecordingFetcher, SequentialAccountVerifier,
	SequentialSnapshotVerifier,
};
use pool_ledger::{AccountBlockData, KeyStatus, PoolConfig, SnapshotBlockData};

fn hash(n: u64) -> Hash {
	Hash::from_str(&format!("{:064x}", n)).unwrap()
}

fn addr(n: u8) -> Address {
	Address([n; 32])
}

fn account_block(address: Address, height: u64) -> AccountBlockData {
	AccountBlockData {
		hash: hash(height),
		prev_hash: hash(height - 1),
		height,
		address,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	}
}

fn test_pool(a: Address) -> (Arc<Pool<MockLedger>>, Arc<MockLedger>, Arc<RecordingFetcher>) {
	let ledger = Arc::new(MockLedger::new());
	ledger.seed_account(AccountBlockData {
		hash: hash(5),
		prev_hash: hash(4),
		height: 5,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	});
	let fetcher = Arc::new(RecordingFetcher::new());
	let deps = PoolDeps {
		ledger: ledger.clone(),
		snapshot_verifier: Arc::new(SequentialSnapshotVerifier::new(ledger.clone(), 100)),
		account_verifier: Arc::new(SequentialAccountVerifier::new(ledger.clone())),
		fetcher: fetcher.clone(),
		broadcaster: Arc::new(RecordingBroadcaster::new()),
		wallet: Arc::new(FixedWalletStatus::new()),
	};
	let pool = Arc::new(Pool::init(deps, PoolConfig::default()));
	(pool, ledger, fetcher)
}

#[test]
fn out_of_order_arrival_reaches_head() {
	let a = addr(1);
	let (pool, ledger, _fetcher) = test_pool(a);

	pool.add_account_block(a, account_block(a, 8));
	pool.add_account_block(a, account_block(a, 7));
	pool.add_account_block(a, account_block(a, 6));

	for _ in 0..4 {
		pool.tick();
	}

	assert_eq!(ledger.account_heights(&a), vec![6, 7, 8]);
	let stats = pool.info(Some(a));
	assert_eq!(stats.free_blocks, 0);
	assert_eq!(stats.compound_blocks, 0);
}

#[test]
fn gap_triggers_a_fetch_for_the_missing_ancestor() {
	let a = addr(2);
	let (pool, ledger, fetcher) = test_pool(a);

	pool.add_account_block(a, account_block(a, 10));
	pool.tick();

	let requests = fetcher.requests();
	assert!(requests.iter().any(|r| r.target == HashHeight::new(hash(9), 9) && r.chain == Some(a)));
	assert_eq!(ledger.account_heights(&a), Vec::<u64>::new());
}

#[test]
fn higher_branch_wins_current_and_loser_survives_as_a_side_chain() {
	let a = addr(3);
	let (pool, ledger, _fetcher) = test_pool(a);

	// Two branches competing for the same fork point (tail height 5):
	// a short one to 7, and a taller one to 9. Both land in the buffer
	// before compaction runs, so they compete in the same cycle.
	pool.add_account_block(a, account_block(a, 6));
	pool.add_account_block(a, account_block(a, 7));

	let fork6 = AccountBlockData {
		hash: hash(1006),
		prev_hash: hash(5),
		height: 6,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	};
	let fork7 = AccountBlockData {
		hash: hash(1007),
		prev_hash: hash(1006),
		height: 7,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	};
	let fork8 = AccountBlockData {
		hash: hash(1008),
		prev_hash: hash(1007),
		height: 8,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	};
	let fork9 = AccountBlockData {
		hash: hash(1009),
		prev_hash: hash(1008),
		height: 9,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	};
	pool.add_account_block(a, fork6);
	pool.add_account_block(a, fork7);
	pool.add_account_block(a, fork8);
	pool.add_account_block(a, fork9);

	// Compact alone: the taller snippet (to height 9) wins current, the
	// shorter one is kept as a side branch rather than dropped.
	pool.compact();
	let stats = pool.info(Some(a));
	assert_eq!(stats.current_len, 4);
	assert!(stats.side_chains >= 1);

	for _ in 0..6 {
		pool.tick();
	}

	// The winning branch's blocks are what actually reach the ledger.
	assert_eq!(ledger.account_heights(&a), vec![6, 7, 8, 9]);
}

#[test]
fn timeout_rolls_back_an_unconfirmed_address() {
	let a = addr(4);
	let ledger = Arc::new(MockLedger::new());

	// Height 5 references a snapshot that confirms it (its account_tips
	// names `a`); height 6 references one that never does, so it's the
	// first unconfirmed block.
	let mut tips = std::collections::HashMap::new();
	tips.insert(a, HashHeight::new(hash(5), 5));
	ledger.seed_snapshot(SnapshotBlockData {
		hash: hash(1),
		prev_hash: pool_core::ZERO_HASH,
		height: 1,
		account_tips: tips,
	});
	ledger.seed_snapshot(SnapshotBlockData {
		hash: hash(2),
		prev_hash: hash(1),
		height: 2,
		account_tips: std::collections::HashMap::new(),
	});
	ledger.seed_account(AccountBlockData {
		hash: hash(5),
		prev_hash: hash(4),
		height: 5,
		address: a,
		snapshot_hash: hash(1),
		send_block_hash: None,
	});
	ledger.seed_account(AccountBlockData {
		hash: hash(6),
		prev_hash: hash(5),
		height: 6,
		address: a,
		snapshot_hash: hash(2),
		send_block_hash: None,
	});

	let mut wallet = FixedWalletStatus::new();
	wallet.set(a, KeyStatus::Unlocked);

	let fetcher = Arc::new(RecordingFetcher::new());
	let deps = PoolDeps {
		ledger: ledger.clone(),
		// Acceptance window of 0: any snapshot below the live head is stale.
		snapshot_verifier: Arc::new(SequentialSnapshotVerifier::new(ledger.clone(), 0)),
		account_verifier: Arc::new(SequentialAccountVerifier::new(ledger.clone())),
		fetcher,
		broadcaster: Arc::new(RecordingBroadcaster::new()),
		wallet: Arc::new(wallet),
	};
	// A short timeout period so the housekeeping loop's 20ms tick fires
	// the check well within the test's sleep window.
	let config = PoolConfig {
		timeout_period_ms: 15,
		..PoolConfig::default()
	};
	let pool = Arc::new(Pool::init(deps, config));

	assert_eq!(ledger.account_heights(&a), vec![5, 6]);
	pool.start();
	thread::sleep(Duration::from_millis(120));
	pool.stop();

	// The unconfirmed suffix (height 6, referencing the still-unconfirming
	// snapshot) was rolled back off the ledger; the confirmed height 5
	// block was not touched.
	assert_eq!(ledger.account_heights(&a), vec![5]);
}

#[test]
fn concurrent_direct_add_creates_one_pool_per_address() {
	let a0 = addr(0);
	let (pool, _ledger, _fetcher) = test_pool(a0);

	let handles: Vec<_> = (0u8..100)
		.map(|i| {
			let pool = pool.clone();
			thread::spawn(move || {
				let address = Address([i.wrapping_add(10); 32]);
				pool.add_account_block(address, account_block(address, 1));
			})
		})
		.collect();
	for h in handles {
		h.join().unwrap();
	}

	// test_pool seeds a0's ledger data but never touches the pool itself,
	// so only the 100 distinct addresses above register an account pool.
	assert_eq!(pool.account_pool_count(), 100);
}

#[test]
fn stop_halts_background_loops_promptly() {
	let a = addr(5);
	let (pool, _ledger, _fetcher) = test_pool(a);

	pool.start();
	let producer_pool = pool.clone();
	let producer = thread::spawn(move || {
		for h in 6..20 {
			producer_pool.add_account_block(a, account_block(a, h));
			thread::sleep(Duration::from_millis(2));
		}
	});
	thread::sleep(Duration::from_millis(30));
	pool.stop();
	producer.join().unwrap();

	// Stop returns without hanging; a further tick is still safe to call.
	pool.tick();
}

#[test]
fn exist_in_pool_reports_free_then_committed_membership() {
	let a = addr(9);
	let (pool, ledger, _fetcher) = test_pool(a);

	let block = account_block(a, 6);
	assert!(!pool.exist_in_pool(a, &block.hash));

	pool.add_account_block(a, block.clone());
	assert!(pool.exist_in_pool(a, &block.hash));

	pool.tick();
	assert_eq!(ledger.account_heights(&a), vec![6]);
	// Once committed, the block lives only in the ledger; it is no
	// longer "in the pool" (neither free nor on any tree branch).
	assert!(!pool.exist_in_pool(a, &block.hash));
}

#[test]
fn pending_account_to_switches_current_to_a_known_side_branch() {
	let a = addr(8);
	let (pool, ledger, _fetcher) = test_pool(a);

	pool.add_account_block(a, account_block(a, 6));
	pool.add_account_block(a, account_block(a, 7));
	pool.add_account_block(a, account_block(a, 8));

	let fork6 = AccountBlockData {
		hash: hash(2006),
		prev_hash: hash(5),
		height: 6,
		address: a,
		snapshot_hash: pool_core::ZERO_HASH,
		send_block_hash: None,
	};
	pool.add_account_block(a, fork6.clone());

	pool.compact();
	let stats = pool.info(Some(a));
	assert_eq!(stats.current_len, 3);
	assert!(stats.side_chains >= 1);

	pool.pending_account_to(a, HashHeight::new(fork6.hash, 6));
	for _ in 0..4 {
		pool.tick();
	}

	// The short side branch, not the taller chain compact originally
	// picked, is what reached the ledger after the switch.
	assert_eq!(ledger.account_heights(&a), vec![6]);
}

#[test]
fn fork_account_to_rolls_back_the_ledger_below_the_persisted_tip() {
	let a = addr(7);
	let (pool, ledger, _fetcher) = test_pool(a);

	pool.add_account_block(a, account_block(a, 6));
	pool.add_account_block(a, account_block(a, 7));
	for _ in 0..3 {
		pool.tick();
	}
	assert_eq!(ledger.account_heights(&a), vec![5, 6, 7]);

	// The target is already committed to the ledger, one height below
	// the live tip. Reaching it requires an actual ledger rollback, not
	// just rearranging the (by now empty) in-memory tree.
	let _ = pool.fork_account_to(a, HashHeight::new(hash(6), 6));
	assert_eq!(ledger.account_heights(&a), vec![5, 6]);
}

#[test]
fn adding_the_same_block_twice_is_idempotent() {
	let a = addr(6);
	let (pool, ledger, _fetcher) = test_pool(a);

	let block = account_block(a, 6);
	pool.add_account_block(a, block.clone());
	pool.add_account_block(a, block);
	pool.tick();
	pool.tick();

	assert_eq!(ledger.account_heights(&a), vec![6]);
}
