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

//! The external-collaborator contracts the block pool is built against:
//! the persistent ledger, the snapshot/account verifiers, the network
//! fetcher and broadcaster, and wallet lock status. Also provides
//! in-memory stand-ins for all of the above so the pool can be exercised
//! without a real store or consensus engine.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![warn(missing_docs)]

mod error;
pub mod mock;
mod traits;
mod types;

pub use crate::error::{Error, ErrorKind};
pub use crate::traits::{
	AccountVerifier, Broadcaster, Fetcher, LedgerReader, LedgerWriter, SnapshotVerifier,
	WalletStatus,
};
pub use crate::types::{
	AccountBlockData, FetchRequest, KeyStatus, PoolConfig, RollbackResult, SnapshotBlockData,
	UnconfirmedBlock, VerifyOutcome,
};
