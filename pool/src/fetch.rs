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

//! Dedup window around the fetcher: the same missing ancestor shows up
//! in a verifier's `Pending` result on every try-insert tick until it
//! arrives, so requests are suppressed if one already went out recently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pool_core::HashHeight;
use pool_ledger::{FetchRequest, Fetcher};

/// Wraps a [`Fetcher`] with a time-windowed dedup on the request target.
/// Holds the fetcher behind an `Arc` so many chains' gates can share the
/// one network collaborator.
pub struct FetchGate<F: Fetcher + ?Sized> {
	fetcher: Arc<F>,
	window: Duration,
	last_sent: HashMap<HashHeight, Instant>,
}

impl<F: Fetcher + ?Sized> FetchGate<F> {
	/// A gate suppressing duplicate requests within `window`.
	pub fn new(fetcher: Arc<F>, window: Duration) -> FetchGate<F> {
		FetchGate {
			fetcher,
			window,
			last_sent: HashMap::new(),
		}
	}

	/// Forwards `request` to the wrapped fetcher unless an identical
	/// target was requested within the dedup window. Returns whether the
	/// request was actually sent.
	pub fn request(&mut self, request: FetchRequest) -> bool {
		let now = Instant::now();
		if let Some(last) = self.last_sent.get(&request.target) {
			if now.duration_since(*last) < self.window {
				return false;
			}
		}
		self.last_sent.insert(request.target, now);
		self.fetcher.fetch(request);
		true
	}

	/// Drops dedup entries older than the window, bounding memory use
	/// across long runs with many distinct gaps.
	pub fn sweep(&mut self) {
		let window = self.window;
		let now = Instant::now();
		self.last_sent.retain(|_, last| now.duration_since(*last) < window);
	}
}
