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

#[cfg(not(test))]
use log::debug;
#[cfg(test)]
use std::println as debug;

const Q16_ONE: u64 = 1 << 16;

/// What the transmitter should do in response to a duplicate acknowledgement.
#[derive(Debug, PartialEq)]
pub enum DupAckAction {
    /// Fewer than three duplicates so far - nothing to do.
    Ignore,

    /// Third duplicate: retransmit the oldest unacknowledged segment. The caller reports back
    /// with [`RenoController::enter_fast_retransmit`] if a retransmission actually happened.
    FastRetransmit,

    /// Beyond the third duplicate the window has already been inflated - keep the pipe full.
    InflateWindow,
}

/// Reno congestion control, with the window counted in segments.
///
/// The window starts at one segment with the slow-start threshold at the fixed flow-control
/// window. Slow start grows the window by one segment per advancing acknowledgement; congestion
/// avoidance accumulates 1/cwnd per advancing acknowledgement in Q16 fixed point and grows the
/// window when the accumulator reaches one. Both `cwnd >= 1` and `ssthresh >= 1` hold at all
/// times.
pub struct RenoController {
    cwnd: u32,
    ssthresh: u32,
    dup_ack_count: u32,
    ca_accumulator_q16: u64,

    fast_retransmit_count: usize,
    rto_expiry_count: usize,
}

impl RenoController {
    pub fn new(initial_ssthresh: u32) -> Self {
        Self {
            cwnd: 1,
            ssthresh: initial_ssthresh.max(1),
            dup_ack_count: 0,
            ca_accumulator_q16: 0,
            fast_retransmit_count: 0,
            rto_expiry_count: 0,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn fast_retransmit_count(&self) -> usize {
        self.fast_retransmit_count
    }

    pub fn rto_expiry_count(&self) -> usize {
        self.rto_expiry_count
    }

    /// Call for every acknowledgement that advances the cumulative acknowledgement point.
    pub fn handle_ack_advance(&mut self) {
        self.dup_ack_count = 0;
        let old_cwnd = self.cwnd;
        if self.cwnd < self.ssthresh {
            self.cwnd += 1;
            debug!("SS increase cwnd={} ({}), ssthresh={}", self.cwnd, old_cwnd, self.ssthresh);
        } else {
            // Rounding up makes the accumulator reach one in exactly cwnd acknowledgements.
            self.ca_accumulator_q16 += Q16_ONE.div_ceil(u64::from(self.cwnd));
            if self.ca_accumulator_q16 >= Q16_ONE {
                self.ca_accumulator_q16 -= Q16_ONE;
                self.cwnd += 1;
                debug!("CA increase cwnd={} ({}), ssthresh={}", self.cwnd, old_cwnd, self.ssthresh);
            }
        }
    }

    /// Call for every acknowledgement that repeats the current cumulative acknowledgement point.
    pub fn handle_duplicate_ack(&mut self) -> DupAckAction {
        self.dup_ack_count += 1;
        match self.dup_ack_count {
            3 => DupAckAction::FastRetransmit,
            n if n > 3 => {
                self.cwnd += 1;
                debug!("dupACK #{} inflates cwnd={}", self.dup_ack_count, self.cwnd);
                DupAckAction::InflateWindow
            }
            _ => DupAckAction::Ignore,
        }
    }

    /// Applies the fast retransmit window reduction. Called only when the third duplicate
    /// acknowledgement led to an actual retransmission.
    pub fn enter_fast_retransmit(&mut self) {
        let old_cwnd = self.cwnd;
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = self.ssthresh + 3;
        self.fast_retransmit_count += 1;
        debug!("fast retransmit cwnd={} ({}), ssthresh={}", self.cwnd, old_cwnd, self.ssthresh);
    }

    /// Applies the timeout reaction. Called once per expiry scan that found at least one expired
    /// segment, never once per segment.
    pub fn handle_rto_expiry(&mut self) {
        let old_cwnd = self.cwnd;
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = 1;
        self.dup_ack_count = 0;
        self.ca_accumulator_q16 = 0;
        self.rto_expiry_count += 1;
        debug!("timeout cwnd={} ({}), ssthresh={}", self.cwnd, old_cwnd, self.ssthresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_slow_start() {
        let cc = RenoController::new(32);
        assert_eq!(cc.cwnd(), 1);
        assert_eq!(cc.ssthresh(), 32);
    }

    #[test]
    fn slow_start_grows_one_segment_per_ack() {
        let mut cc = RenoController::new(8);
        for expected in 2..=8 {
            cc.handle_ack_advance();
            assert_eq!(cc.cwnd(), expected);
        }
    }

    #[test]
    fn congestion_avoidance_grows_one_segment_per_window() {
        let mut cc = RenoController::new(1);
        assert_eq!(cc.cwnd(), 1);

        // At cwnd=1 a single advancing ack accumulates a full window's worth.
        cc.handle_ack_advance();
        assert_eq!(cc.cwnd(), 2);

        // At cwnd=2 it takes two acks, at cwnd=3 three, and so on.
        cc.handle_ack_advance();
        assert_eq!(cc.cwnd(), 2);
        cc.handle_ack_advance();
        assert_eq!(cc.cwnd(), 3);

        for _ in 0..2 {
            cc.handle_ack_advance();
        }
        assert_eq!(cc.cwnd(), 3);
        cc.handle_ack_advance();
        assert_eq!(cc.cwnd(), 4);
    }

    #[test]
    fn timeout_collapses_window() {
        let mut cc = RenoController::new(32);
        for _ in 0..9 {
            cc.handle_ack_advance();
        }
        assert_eq!(cc.cwnd(), 10);

        cc.handle_rto_expiry();
        assert_eq!(cc.cwnd(), 1);
        assert_eq!(cc.ssthresh(), 5);
        assert_eq!(cc.rto_expiry_count(), 1);
    }

    #[test]
    fn timeout_floors_ssthresh_at_one() {
        let mut cc = RenoController::new(32);
        cc.handle_rto_expiry();
        assert_eq!(cc.cwnd(), 1);
        assert_eq!(cc.ssthresh(), 1);
    }

    #[test]
    fn third_duplicate_requests_fast_retransmit() {
        let mut cc = RenoController::new(32);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::Ignore);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::Ignore);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::FastRetransmit);
    }

    #[test]
    fn fast_retransmit_halves_window_plus_three() {
        let mut cc = RenoController::new(32);
        for _ in 0..9 {
            cc.handle_ack_advance();
        }
        assert_eq!(cc.cwnd(), 10);

        for _ in 0..3 {
            cc.handle_duplicate_ack();
        }
        cc.enter_fast_retransmit();
        assert_eq!(cc.ssthresh(), 5);
        assert_eq!(cc.cwnd(), 8);
        assert_eq!(cc.fast_retransmit_count(), 1);
    }

    #[test]
    fn duplicates_beyond_third_inflate_window() {
        let mut cc = RenoController::new(32);
        for _ in 0..3 {
            cc.handle_duplicate_ack();
        }
        cc.enter_fast_retransmit();
        let inflated_from = cc.cwnd();

        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::InflateWindow);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::InflateWindow);
        assert_eq!(cc.cwnd(), inflated_from + 2);
    }

    #[test]
    fn advancing_ack_resets_duplicate_count() {
        let mut cc = RenoController::new(32);
        cc.handle_duplicate_ack();
        cc.handle_duplicate_ack();
        cc.handle_ack_advance();
        // The count starts over - the next two duplicates do not trigger fast retransmit.
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::Ignore);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::Ignore);
        assert_eq!(cc.handle_duplicate_ack(), DupAckAction::FastRetransmit);
    }
}
