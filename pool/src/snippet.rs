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

//! A gap-free run of blocks not yet rooted in the persistent ledger.

use std::collections::HashMap;

use pool_core::{CommonBlock, Hash, Height};

/// A maximal gap-free sequence of blocks, ordered head-first. Every
/// consecutive pair satisfies `blocks[i+1].prev_hash() == blocks[i].hash()`.
/// Always holds at least one block.
pub struct Snippet<B: CommonBlock> {
	blocks: Vec<B>,
}

impl<B: CommonBlock> Snippet<B> {
	/// A single-block snippet.
	pub fn singleton(block: B) -> Snippet<B> {
		Snippet { blocks: vec![block] }
	}

	/// The oldest block in the snippet.
	pub fn head(&self) -> &B {
		&self.blocks[0]
	}

	/// The newest block in the snippet.
	pub fn tail(&self) -> &B {
		self.blocks.last().expect("snippet is never empty")
	}

	/// Hash of the oldest block.
	pub fn head_hash(&self) -> Hash {
		self.head().hash()
	}

	/// Hash of the newest block.
	pub fn tail_hash(&self) -> Hash {
		self.tail().hash()
	}

	/// Height of the newest block.
	pub fn tail_height(&self) -> Height {
		self.tail().height()
	}

	/// Height of the oldest block.
	pub fn head_height(&self) -> Height {
		self.head().height()
	}

	/// Number of blocks in the snippet.
	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	/// True if this snippet is a single block (never actually empty).
	pub fn is_empty(&self) -> bool {
		false
	}

	/// Extends this snippet with `other`, which must head where this one
	/// tails (`other.head_hash() == self.tail_hash()`). Consumes `other`.
	fn extend_with(&mut self, mut other: Snippet<B>) {
		debug_assert_eq!(other.head_hash(), self.tail_hash());
		self.blocks.append(&mut other.blocks);
	}

	/// Attempts to merge `other` onto this snippet if they are adjacent
	/// in either direction (this snippet's tail is other's head, or vice
	/// versa). Returns `other` back unmerged if they don't connect.
	pub fn try_merge(&mut self, other: Snippet<B>) -> Option<Snippet<B>> {
		if other.head_hash() == self.tail_hash() {
			self.extend_with(other);
			None
		} else if self.head_hash() == other.tail_hash() {
			let mut merged = other;
			merged.extend_with(std::mem::replace(self, Snippet { blocks: Vec::new() }));
			*self = merged;
			None
		} else {
			Some(other)
		}
	}

	/// Consumes the snippet, returning its blocks in head-to-tail order.
	pub fn into_blocks(self) -> Vec<B> {
		self.blocks
	}
}

/// Greedily assembles maximal snippets out of a flat set of free blocks.
/// A block starts a new snippet if its `prev_hash` isn't the hash of
/// another block in the same set (step 2 of compaction: "start from any
/// block whose prev is not another free block; extend forward").
pub fn assemble<B: CommonBlock>(blocks: Vec<B>) -> Vec<Snippet<B>> {
	let mut by_hash: HashMap<Hash, B> = HashMap::new();
	let mut by_prev: HashMap<Hash, Hash> = HashMap::new();
	for b in blocks {
		by_prev.insert(b.prev_hash(), b.hash());
		by_hash.insert(b.hash(), b);
	}

	let roots: Vec<Hash> = by_hash
		.keys()
		.filter(|h| {
			let prev = by_hash.get(h).unwrap().prev_hash();
			!by_hash.contains_key(&prev)
		})
		.cloned()
		.collect();

	let mut snippets = Vec::new();
	for root in roots {
		let mut chain = vec![by_hash.remove(&root).expect("root present")];
		loop {
			let next_hash = match by_prev.get(&chain.last().unwrap().hash()) {
				Some(h) => *h,
				None => break,
			};
			match by_hash.remove(&next_hash) {
				Some(next) => chain.push(next),
				None => break,
			}
		}
		snippets.push(Snippet { blocks: chain });
	}
	snippets
}

/// Merges a batch of snippets pairwise until no two connect anymore.
/// Quadratic in the number of snippets, which is small per cycle in
/// practice (bounded by how many distinct gaps arrived this tick).
pub fn merge_all<B: CommonBlock>(mut snippets: Vec<Snippet<B>>) -> Vec<Snippet<B>> {
	loop {
		let mut merged_pair = None;
		'search: for i in 0..snippets.len() {
			for j in 0..snippets.len() {
				if i == j {
					continue;
				}
				if snippets[i].tail_hash() == snippets[j].head_hash() {
					merged_pair = Some((i, j));
					break 'search;
				}
			}
		}
		let (i, j) = match merged_pair {
			Some(pair) => pair,
			None => break,
		};
		let second = snippets.remove(j);
		let first_idx = if j < i { i - 1 } else { i };
		let first = &mut snippets[first_idx];
		let leftover = first.try_merge(second);
		debug_assert!(leftover.is_none());
	}
	snippets
}
