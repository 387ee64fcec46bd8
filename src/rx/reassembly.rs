// Copyright 2025 The rdtp Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::api::MSS;
use crate::api::SACK_BITS;
use crate::types::SeqNum;
use std::cmp::min;
use std::collections::BTreeMap;

/// The maximum number of segments held in the out-of-order buffer. Segments arriving beyond this
/// limit are dropped; the selective acknowledgement bitmap will not list them, forcing the
/// transmitter to retransmit data that actually advances the cumulative acknowledgement.
const MAX_BUFFERED_SEGMENTS: usize = 128;

/// Keeps track of received data segments and reassembles them into the original byte stream.
///
/// Segments arriving at the next expected byte offset are delivered immediately, together with
/// any directly following segments already buffered. Segments arriving ahead of the expected
/// offset, but within the advertised window, are held in an ordered out-of-order buffer. It also
/// generates the selective acknowledgement bitmap that reports that buffer to the transmitter.
pub struct ReassemblyBuffer {
    /// The next in-order byte expected from the peer (the cumulative acknowledgement point).
    expected_ack: SeqNum,

    /// Receive window, in segments. Bounds how far beyond `expected_ack` a segment may be
    /// buffered.
    window_segments: u16,

    /// Segments received ahead of `expected_ack`, keyed by their starting offset. Every key is
    /// greater than `expected_ack` and below `expected_ack + window_segments * MSS`.
    buffered: BTreeMap<SeqNum, Vec<u8>>,

    duplicate_count: usize,
    peak_buffered_count: usize,
}

impl ReassemblyBuffer {
    pub fn new(initial_expected_ack: SeqNum, window_segments: u16) -> Self {
        Self {
            expected_ack: initial_expected_ack,
            window_segments,
            buffered: BTreeMap::new(),
            duplicate_count: 0,
            peak_buffered_count: 0,
        }
    }

    /// Returns the next in-order byte expected from the peer.
    pub fn expected_ack(&self) -> SeqNum {
        self.expected_ack
    }

    /// Number of segments currently held in the out-of-order buffer.
    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_count
    }

    pub fn peak_buffered_count(&self) -> usize {
        self.peak_buffered_count
    }

    /// Call for every incoming data segment. Returns the payload runs that have become deliverable
    /// in order - empty when the segment was out of order, a duplicate, or outside the window.
    ///
    /// A duplicate or out-of-window segment never changes the delivered stream nor the
    /// acknowledgement point; the caller still acknowledges it, as the acknowledgement that made
    /// it stale may have been lost.
    pub fn handle_data(&mut self, seq: SeqNum, payload: &[u8]) -> Vec<Vec<u8>> {
        if seq == self.expected_ack {
            let mut delivered = vec![payload.to_vec()];
            self.expected_ack += payload.len() as u32;

            // A filled gap may make previously buffered segments contiguous.
            while let Some(segment) = self.buffered.remove(&self.expected_ack) {
                self.expected_ack += segment.len() as u32;
                delivered.push(segment);
            }
            return delivered;
        }

        if seq < self.expected_ack {
            self.duplicate_count += 1;
            return vec![];
        }

        let window_end = self.expected_ack + self.window_segments as u32 * MSS as u32;
        if seq >= window_end || self.buffered.len() >= MAX_BUFFERED_SEGMENTS {
            return vec![];
        }
        if self.buffered.contains_key(&seq) {
            self.duplicate_count += 1;
            return vec![];
        }

        self.buffered.insert(seq, payload.to_vec());
        self.peak_buffered_count = self.peak_buffered_count.max(self.buffered.len());
        vec![]
    }

    /// Builds the selective acknowledgement bitmap: bit i is set iff a segment starting at
    /// `expected_ack + (i + 1) * MSS` is buffered.
    pub fn sack_mask(&self) -> u64 {
        let mut mask = 0;
        let bits = min(SACK_BITS, self.window_segments as usize);
        for i in 0..bits {
            let seq = self.expected_ack + ((i as u32 + 1) * MSS as u32);
            if self.buffered.contains_key(&seq) {
                mask |= 1 << i;
            }
        }
        mask
    }
}
