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
use crate::api::SocketTime;
use crate::types::SeqNum;
use std::collections::BTreeMap;
use std::time::Duration;

struct OutstandingSegment {
    payload: Vec<u8>,
    last_sent: SocketTime,
    retx_count: u32,
    acked: bool,
}

/// The retransmission buffer: every data segment that has been sent but whose bytes have not yet
/// been crossed by a cumulative acknowledgement, keyed by starting offset.
///
/// Payload ownership is exclusive to the table entry. Entries are released - payload and all -
/// when the cumulative acknowledgement passes their last byte. Segments acknowledged only
/// selectively are marked but retained, since a selective acknowledgement does not promise the
/// peer kept the data.
pub struct InflightTable {
    segments: BTreeMap<SeqNum, OutstandingSegment>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self { segments: BTreeMap::new() }
    }

    /// Records a freshly transmitted segment.
    pub fn insert(&mut self, seq: SeqNum, payload: Vec<u8>, now: SocketTime) {
        self.segments.insert(
            seq,
            OutstandingSegment { payload, last_sent: now, retx_count: 0, acked: false },
        );
    }

    /// Number of segments sent but not yet acknowledged, cumulatively or selectively.
    pub fn unacked_count(&self) -> usize {
        self.segments.values().filter(|s| !s.acked).count()
    }

    /// Releases every segment fully covered by the cumulative acknowledgement `ackno`.
    pub fn handle_cumulative_ack(&mut self, ackno: SeqNum) {
        self.segments.retain(|seq, segment| *seq + segment.payload.len() as u32 > ackno);
    }

    /// Marks segments listed in a selective acknowledgement bitmap: bit i refers to the segment
    /// starting at `ackno + (i + 1) * MSS`.
    pub fn apply_sack_mask(&mut self, ackno: SeqNum, mask: u64) {
        for i in 0..SACK_BITS {
            if mask & (1 << i) != 0 {
                let seq = ackno + ((i as u32 + 1) * MSS as u32);
                if let Some(segment) = self.segments.get_mut(&seq) {
                    segment.acked = true;
                }
            }
        }
    }

    /// The lowest-offset segment that has not been acknowledged, if any. This is the fast
    /// retransmission candidate.
    pub fn oldest_unacked(&self) -> Option<SeqNum> {
        self.segments.iter().find(|(_, s)| !s.acked).map(|(seq, _)| *seq)
    }

    /// All unacknowledged segments whose retransmission timeout has elapsed.
    pub fn expired_segments(&self, now: SocketTime, rto: Duration) -> Vec<SeqNum> {
        self.segments
            .iter()
            .filter(|(_, s)| !s.acked && now - s.last_sent >= rto)
            .map(|(seq, _)| *seq)
            .collect()
    }

    /// The earliest moment any unacknowledged segment will time out.
    pub fn next_expiry(&self, rto: Duration) -> Option<SocketTime> {
        self.segments.values().filter(|s| !s.acked).map(|s| s.last_sent + rto).min()
    }

    pub fn payload(&self, seq: SeqNum) -> Option<&[u8]> {
        self.segments.get(&seq).map(|s| s.payload.as_slice())
    }

    /// Accounts for a retransmission of `seq` and returns the segment's total retransmission
    /// count.
    pub fn record_retransmit(&mut self, seq: SeqNum, now: SocketTime) -> u32 {
        let segment = self.segments.get_mut(&seq).expect("retransmitted segment must be tracked");
        segment.last_sent = now;
        segment.retx_count += 1;
        segment.retx_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: SeqNum = SeqNum(5001);
    const T0: SocketTime = SocketTime::zero();
    const RTO: Duration = Duration::from_millis(300);

    fn table_with_segments(count: u32) -> InflightTable {
        let mut table = InflightTable::new();
        for i in 0..count {
            table.insert(BASE + i * MSS as u32, vec![i as u8; MSS], T0);
        }
        table
    }

    #[test]
    fn cumulative_ack_releases_covered_segments() {
        let mut table = table_with_segments(3);
        assert_eq!(table.unacked_count(), 3);

        table.handle_cumulative_ack(BASE + 2 * MSS as u32);
        assert_eq!(table.unacked_count(), 1);
        assert_eq!(table.oldest_unacked(), Some(BASE + 2 * MSS as u32));
        assert!(table.payload(BASE).is_none());
    }

    #[test]
    fn partial_ack_does_not_release_segment() {
        let mut table = table_with_segments(1);
        // An acknowledgement in the middle of a segment must not release it.
        table.handle_cumulative_ack(BASE + MSS as u32 / 2);
        assert_eq!(table.unacked_count(), 1);
        assert!(table.payload(BASE).is_some());
    }

    #[test]
    fn sack_marks_but_does_not_release() {
        let mut table = table_with_segments(3);
        // Bit 1 refers to the third segment relative to an ack at the first one's start.
        table.apply_sack_mask(BASE, 0b10);
        assert_eq!(table.unacked_count(), 2);
        assert_eq!(table.oldest_unacked(), Some(BASE));
        // The selectively acknowledged payload stays resident until the cumulative ack.
        assert!(table.payload(BASE + 2 * MSS as u32).is_some());
    }

    #[test]
    fn sack_bits_without_matching_segment_are_ignored() {
        let mut table = table_with_segments(1);
        table.apply_sack_mask(BASE, u64::MAX);
        assert_eq!(table.unacked_count(), 1);
    }

    #[test]
    fn expired_segments_respects_rto_and_acked_state() {
        let mut table = table_with_segments(2);
        table.apply_sack_mask(BASE - MSS as u32, 0b10); // acks the second segment
        assert!(table.expired_segments(T0 + Duration::from_millis(299), RTO).is_empty());
        assert_eq!(table.expired_segments(T0 + RTO, RTO), vec![BASE]);
    }

    #[test]
    fn retransmit_resets_expiry_and_counts() {
        let mut table = table_with_segments(1);
        assert_eq!(table.record_retransmit(BASE, T0 + RTO), 1);
        assert_eq!(table.record_retransmit(BASE, T0 + RTO + RTO), 2);
        assert!(table.expired_segments(T0 + RTO + RTO, RTO).is_empty());
        assert_eq!(table.next_expiry(RTO), Some(T0 + RTO + RTO + RTO));
    }

    #[test]
    fn next_expiry_is_earliest_unacked_deadline() {
        let mut table = InflightTable::new();
        table.insert(BASE, vec![0; MSS], T0);
        table.insert(BASE + MSS as u32, vec![1; MSS], T0 + Duration::from_millis(50));
        assert_eq!(table.next_expiry(RTO), Some(T0 + RTO));

        table.handle_cumulative_ack(BASE + MSS as u32);
        assert_eq!(table.next_expiry(RTO), Some(T0 + Duration::from_millis(50) + RTO));
    }

    #[test]
    fn payload_is_available_until_release() {
        let mut table = table_with_segments(1);
        assert_eq!(table.payload(BASE).unwrap().len(), MSS);
        table.handle_cumulative_ack(BASE + MSS as u32);
        assert!(table.payload(BASE).is_none());
    }
}
