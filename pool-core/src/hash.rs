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

//! Hash and address identifiers used pervasively across the pool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 32-byte identifier for a block, shared by snapshot and account blocks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

/// The zero hash, used as a sentinel for "no block".
pub const ZERO_HASH: Hash = Hash([0; 32]);

impl Hash {
	/// Builds a hash from a byte slice. Panics if the slice is not 32 bytes.
	pub fn from_slice(v: &[u8]) -> Hash {
		let mut a = [0u8; 32];
		a.copy_from_slice(v);
		Hash(a)
	}

	/// Returns the raw bytes.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.0.iter() {
			write!(f, "{:02x}", byte)?;
		}
		Ok(())
	}
}

impl FromStr for Hash {
	type Err = HashParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() != 64 {
			return Err(HashParseError::WrongLength(s.len()));
		}
		let mut bytes = [0u8; 32];
		for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
			let hex = std::str::from_utf8(chunk).map_err(|_| HashParseError::NotHex)?;
			bytes[i] = u8::from_str_radix(hex, 16).map_err(|_| HashParseError::NotHex)?;
		}
		Ok(Hash(bytes))
	}
}

/// Error returned when parsing a hash from its hex representation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashParseError {
	/// The string wasn't 64 hex characters long.
	WrongLength(usize),
	/// The string contained non-hex characters.
	NotHex,
}

impl fmt::Display for HashParseError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HashParseError::WrongLength(n) => write!(f, "expected 64 hex characters, got {}", n),
			HashParseError::NotHex => write!(f, "not valid hex"),
		}
	}
}

impl std::error::Error for HashParseError {}

/// A chain account's address. Account chains are keyed by this.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.0.iter() {
			write!(f, "{:02x}", byte)?;
		}
		Ok(())
	}
}

/// A block's height along its chain. Strictly increases along prev-links.
pub type Height = u64;

/// Identifies a block by its hash and height together, the unit the
/// verifier and fetcher exchange when naming a missing ancestor or a
/// fork target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashHeight {
	/// The block's hash.
	pub hash: Hash,
	/// The block's height.
	pub height: Height,
}

impl HashHeight {
	/// Convenience constructor.
	pub fn new(hash: Hash, height: Height) -> HashHeight {
		HashHeight { hash, height }
	}
}

impl fmt::Display for HashHeight {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.hash, self.height)
	}
}
