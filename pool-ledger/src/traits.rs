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

//! Contracts the pool is built against. The persistent store, the
//! consensus verifiers, and the network fetcher/broadcaster are all
//! external collaborators; the pool never embodies their logic.

use std::collections::HashMap;

use pool_core::{Address, HashHeight};

use crate::error::Error;
use crate::types::{
	AccountBlockData, FetchRequest, KeyStatus, RollbackResult, SnapshotBlockData, UnconfirmedBlock,
	VerifyOutcome,
};

/// Read access to the persistent ledger.
pub trait LedgerReader: Send + Sync {
	/// The current head of the snapshot chain.
	fn head_snapshot(&self) -> HashHeight;

	/// Looks up a snapshot block already committed to the ledger.
	fn get_snapshot_block_by_hash(&self, hash: &pool_core::Hash) -> Option<SnapshotBlockData>;

	/// The ledger tail a pool's chain tree is rooted at: the snapshot
	/// chain's head if `addr` is `None`, otherwise that address's head.
	fn chain_tail(&self, addr: Option<&Address>) -> HashHeight;

	/// The oldest account block for `addr` not yet referenced by a
	/// snapshot at or below `head_snapshot`, if any is outstanding.
	fn get_first_unconfirmed_block(
		&self,
		addr: &Address,
		head_snapshot: &HashHeight,
	) -> Option<UnconfirmedBlock>;
}

/// Write access to the persistent ledger.
pub trait LedgerWriter: Send + Sync {
	/// Appends a verified snapshot block to the ledger.
	fn append_snapshot_block(&self, block: &SnapshotBlockData) -> Result<(), Error>;

	/// Appends a verified account block to the ledger.
	fn append_account_block(&self, block: &AccountBlockData) -> Result<(), Error>;

	/// Deletes `addr`'s account chain down to `height` (every block with
	/// height `>= height` is removed), cascading to whatever that
	/// invalidates: snapshots that had certified a now-deleted tip for
	/// `addr`, and other addresses' blocks that referenced a deleted send
	/// block. Returns everything rolled back so the pool can re-offer it.
	fn del_account_to_height(&self, addr: &Address, height: pool_core::Height) -> Result<RollbackResult, Error>;
}

/// Consensus verification for the snapshot chain.
pub trait SnapshotVerifier: Send + Sync {
	/// Verifies a single snapshot block against the current ledger head.
	fn verify(&self, block: &SnapshotBlockData) -> VerifyOutcome;

	/// Whether `refer_snapshot` (the snapshot an unconfirmed account
	/// block was sent under) is still within the acceptance window of
	/// `head_snapshot`.
	fn verify_account_timeout(&self, head_snapshot: &HashHeight, refer_snapshot: &HashHeight) -> bool;
}

/// Consensus verification for account chains.
pub trait AccountVerifier: Send + Sync {
	/// Verifies a single account block against the current ledger head
	/// and, for receive blocks, its referenced send block.
	fn verify(&self, block: &AccountBlockData) -> VerifyOutcome;
}

/// Fire-and-forget retrieval of missing blocks over the network. Results
/// are expected to arrive later through the pool's `add_*_block` entry
/// points, not as a return value here.
pub trait Fetcher: Send + Sync {
	/// Requests a block (and `request.count` ancestors) from peers.
	fn fetch(&self, request: FetchRequest);
}

/// Rebroadcast of blocks already accepted by this node, either locally
/// originated or already present in the pool.
pub trait Broadcaster: Send + Sync {
	/// Rebroadcasts a single snapshot block, e.g. after a failed direct add.
	fn broadcast_snapshot_block(&self, block: &SnapshotBlockData);

	/// Rebroadcasts a single account block, e.g. after a failed direct add.
	fn broadcast_account_block(&self, block: &AccountBlockData);

	/// Rebroadcasts a contract receive and the send blocks it consumes.
	fn broadcast_received_blocks(&self, received: &AccountBlockData, sends: &[AccountBlockData]);

	/// Rebroadcasts every unconfirmed block for `addr`, on the
	/// housekeeping loop's broadcast tick.
	fn broadcast_unconfirmed_blocks(&self, addr: &Address, blocks: &[AccountBlockData]);
}

/// Lock status of the wallet's keys, used to decide which addresses the
/// housekeeping loop rebroadcasts and times out.
pub trait WalletStatus: Send + Sync {
	/// Current lock status of every address the wallet holds a key for.
	fn status(&self) -> HashMap<Address, KeyStatus>;
}
