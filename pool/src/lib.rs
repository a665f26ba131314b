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

//! The block pool: an in-memory staging layer between the network and
//! the permanent ledger of a DAG blockchain with a snapshot chain and
//! per-address account chains. See [`Pool`] for the top-level entry
//! point.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![warn(missing_docs)]

mod account_pool;
mod block;
mod buffer;
mod error;
mod fetch;
mod pool;
mod snapshot_pool;
mod snippet;
mod tree;

pub use crate::account_pool::{AccountPool, PoolStats};
pub use crate::block::{AccountPoolBlock, SnapshotPoolBlock};
pub use crate::error::{ErrorKind, PoolError};
pub use crate::pool::{Pool, PoolDeps};
pub use crate::snapshot_pool::SnapshotPool;
