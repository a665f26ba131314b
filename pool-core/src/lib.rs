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

//! Chain-agnostic capability types shared by the block pool and its
//! collaborators: hashes, addresses, the fork-version counter, and the
//! small trait that lets snapshot and account blocks be handled uniformly.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![warn(missing_docs)]

mod block;
mod fork;
mod hash;

pub use crate::block::{BlockKind, CommonBlock, ForkBlockBase};
pub use crate::fork::{ForkStamp, ForkVersion};
pub use crate::hash::{Address, Hash, HashHeight, HashParseError, Height, ZERO_HASH};
