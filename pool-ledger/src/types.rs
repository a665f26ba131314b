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

//! Plain data exchanged with the ledger and the verifiers. These carry no
//! fork-version stamp; the pool wraps them in its own block types once
//! they're accepted into the buffer.

use std::collections::HashMap;

use pool_core::{Address, Hash, HashHeight, Height};
use serde::{Deserialize, Serialize};

/// A snapshot block as the ledger and verifier see it: its identity, and
/// the account tips it certifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlockData {
	/// This block's hash.
	pub hash: Hash,
	/// The snapshot block it extends.
	pub prev_hash: Hash,
	/// Height along the snapshot chain.
	pub height: Height,
	/// Account tips this snapshot certifies, keyed by address.
	pub account_tips: HashMap<Address, HashHeight>,
}

/// An account block as the ledger and verifier see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBlockData {
	/// This block's hash.
	pub hash: Hash,
	/// The account block it extends.
	pub prev_hash: Hash,
	/// Height along this address's chain.
	pub height: Height,
	/// The address this block belongs to.
	pub address: Address,
	/// The snapshot this block was last confirmed under. An advisory
	/// reference, resolved by lookup rather than ownership.
	pub snapshot_hash: Hash,
	/// If this is a receive block, the send block it consumes.
	pub send_block_hash: Option<Hash>,
}

/// A first-unconfirmed-block record: the oldest account block not yet
/// referenced by an accepted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedBlock {
	/// The block's hash.
	pub hash: Hash,
	/// The block's height.
	pub height: Height,
	/// The snapshot it was sent under.
	pub snapshot_hash: Hash,
}

/// The result of deleting the ledger down to some height: everything that
/// was rolled back, returned to the pool so it can be re-offered as side
/// branches or re-fetched.
#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
	/// Snapshot blocks removed from the ledger, highest first.
	pub snapshots: Vec<SnapshotBlockData>,
	/// Account blocks removed from the ledger, per address, highest first.
	pub accounts: HashMap<Address, Vec<AccountBlockData>>,
}

/// Whether a locally held key is available to sign with or is locked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyStatus {
	/// The key is unlocked and can sign; its address should be
	/// rebroadcast/retimed by the housekeeping loop.
	Unlocked,
	/// The key is locked.
	Locked,
}

/// A request for the fetcher to retrieve ancestors or cross-chain blocks
/// closing a gap the verifier reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
	/// The block to fetch, named by hash and height.
	pub target: HashHeight,
	/// Which chain the target belongs to; `None` means the snapshot chain.
	pub chain: Option<Address>,
	/// How many blocks the peer should return in one round trip, a hint
	/// sized to close the known gap in a single request.
	pub count: u64,
}

/// The verifier's decision for a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
	/// The block is valid and may be committed to the ledger.
	Valid,
	/// The verifier needs more blocks before it can decide.
	Pending(Vec<FetchRequest>),
	/// The block cannot be on the current branch; its suffix is demoted.
	FailFork,
	/// The block is invalid; it and its descendants are dropped.
	FailHard,
}

/// Tick intervals, TTLs, and windows the pool's background loops and
/// fetch-dedup logic are configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
	/// How long a free block with no known parent may sit in the buffer
	/// before it's evicted.
	pub free_block_ttl_ms: u64,
	/// Idle period for the try-insert loop when no signal arrives.
	pub try_insert_idle_ms: u64,
	/// Idle period for the compact loop when no signal arrives.
	pub compact_idle_ms: u64,
	/// Period of the unconfirmed-block rebroadcast ticker.
	pub broadcast_period_ms: u64,
	/// Period of the unconfirmed-block timeout ticker.
	pub timeout_period_ms: u64,
	/// Period of the useless-chain pruning ticker.
	pub prune_period_ms: u64,
	/// Cycles a branch may go unextended before `loop_del_useless_chain`
	/// collects it.
	pub useless_chain_cycles: u64,
	/// Window within which a duplicate fetch request for the same target
	/// is suppressed.
	pub fetch_dedup_window_ms: u64,
	/// Maximum size the buffer's free map is allowed to grow to before
	/// the most stale entries are evicted ahead of their TTL.
	pub max_free_blocks: usize,
}

impl Default for PoolConfig {
	fn default() -> PoolConfig {
		PoolConfig {
			free_block_ttl_ms: 60_000,
			try_insert_idle_ms: 20,
			compact_idle_ms: 40,
			broadcast_period_ms: 30_000,
			timeout_period_ms: 40_000,
			prune_period_ms: 60_000,
			useless_chain_cycles: 10,
			fetch_dedup_window_ms: 2_000,
			max_free_blocks: 10_000,
		}
	}
}
