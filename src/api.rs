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

use std::fmt;
use std::ops::Add;
use std::ops::Sub;
use std::time::Duration;

/// Maximum Segment Size - the upper bound on payload bytes carried by a single data segment.
///
/// This value is wire-compatibility sensitive and must match on both endpoints, as the selective
/// acknowledgement bitmap addresses segments at multiples of it.
pub const MSS: usize = 1000;

/// Number of bits in the selective acknowledgement bitmap.
pub const SACK_BITS: usize = 64;

/// Largest datagram either endpoint will emit or accept (header plus payload).
pub const MAX_DATAGRAM_SIZE: usize = 1400;

/// Represents a point in time relative to the creation of an endpoint.
///
/// This is an absolute timestamp within the "Socket Epoch".
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SocketTime(Duration);

impl SocketTime {
    /// The moment the endpoint was created (t=0).
    pub const fn zero() -> SocketTime {
        SocketTime(Duration::ZERO)
    }
    pub const fn infinite_future() -> SocketTime {
        SocketTime(Duration::MAX)
    }
}

impl Add<Duration> for SocketTime {
    type Output = SocketTime;
    fn add(self, rhs: Duration) -> SocketTime {
        SocketTime(self.0 + rhs)
    }
}

impl Sub<Duration> for SocketTime {
    type Output = SocketTime;
    fn sub(self, rhs: Duration) -> SocketTime {
        SocketTime(self.0 - rhs)
    }
}

impl Sub<SocketTime> for SocketTime {
    type Output = Duration;
    fn sub(self, rhs: SocketTime) -> Duration {
        self.0 - rhs.0
    }
}

impl From<Duration> for SocketTime {
    fn from(value: Duration) -> Self {
        SocketTime(value)
    }
}

impl From<SocketTime> for Duration {
    fn from(value: SocketTime) -> Self {
        value.0
    }
}

/// User configurable options.
///
/// The defaults reproduce the protocol's reference timing. `rto` and `handshake_rto` affect only
/// the endpoint they are set on; `fixed_wnd` is advertised on the wire and bounds both the
/// sender's in-flight table and the receiver's out-of-order admission window.
#[derive(Clone)]
pub struct Options {
    /// Fixed flow-control window, in segments. The sender never keeps more unacknowledged
    /// segments in flight than this, regardless of the congestion window.
    pub fixed_wnd: u16,

    /// Retransmission timeout for data segments. Constant - no RTT estimation is performed.
    pub rto: Duration,

    /// Retransmission timeout for SYN and FIN segments.
    pub handshake_rto: Duration,

    /// Upper bound on retransmissions of any single segment (data, SYN or FIN). Exceeding it
    /// aborts the connection.
    pub max_retx: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            fixed_wnd: 32,
            rto: Duration::from_millis(300),
            handshake_rto: Duration::from_millis(300),
            max_retx: 50,
        }
    }
}

/// Represents the category of an error that has occurred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    /// Indicates that no error has occurred. This will never be the case when
    /// [`SocketEvent::OnAborted`] is generated.
    NoError,

    /// The operation could not be completed because of too many retransmissions or timeouts.
    /// This typically indicates a loss of connectivity to the peer.
    TooManyRetries,
}

/// Events generated by the sender and receiver state machines.
///
/// The machines perform no I/O themselves; the driving loop pops events and acts on them -
/// datagrams are put on the wire, delivered payload is appended to the output sink.
#[derive(Debug, PartialEq)]
pub enum SocketEvent {
    /// Generated when the machine wants a datagram to be sent to the peer.
    SendPacket(Vec<u8>),

    /// Generated when the handshake completes, on both endpoints.
    OnConnected(),

    /// Generated by the receiver for every in-order run of payload bytes. Appending the payloads
    /// of these events, in order, reconstructs the transferred stream exactly.
    OnData(Vec<u8>),

    /// Generated when the connection is closed in a controlled way, after the FIN exchange. No
    /// other event will be generated after this one.
    OnClosed(),

    /// Generated when the connection is torn down ungracefully, e.g. when a segment has exceeded
    /// its retransmission budget. No other event will be generated after this one.
    OnAborted(ErrorKind, String),
}

/// Tracked metrics, a snapshot of an endpoint's counters. Sender-side fields are zero on a
/// receiver and vice versa.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metrics {
    /// Number of datagrams sent, including retransmissions and control segments.
    pub tx_packets_count: usize,

    /// Number of data segments retransmitted, for any reason.
    pub rtx_packets_count: usize,

    /// Number of valid datagrams received and processed.
    pub rx_packets_count: usize,

    /// Number of data segments received that had already been delivered or buffered.
    pub rx_duplicate_count: usize,

    /// Largest number of segments ever held in the out-of-order buffer at once.
    pub peak_buffered_count: usize,

    /// The current congestion window, in segments.
    pub cwnd: u32,

    /// The current slow-start threshold, in segments.
    pub ssthresh: u32,

    /// Number of fast retransmits performed (third duplicate ACK).
    pub fast_retransmit_count: usize,

    /// Number of retransmission timeout events (counted once per expiry scan, not per segment).
    pub rto_expiry_count: usize,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx={} rtx={} rx={} dup={} cwnd={} ssthresh={} fast_rtx={} rto={}",
            self.tx_packets_count,
            self.rtx_packets_count,
            self.rx_packets_count,
            self.rx_duplicate_count,
            self.cwnd,
            self.ssthresh,
            self.fast_retransmit_count,
            self.rto_expiry_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_time_arithmetic() {
        let t = SocketTime::zero() + Duration::from_millis(300);
        assert_eq!(t - SocketTime::zero(), Duration::from_millis(300));
        assert_eq!(t - Duration::from_millis(100), SocketTime::zero() + Duration::from_millis(200));
        assert!(t < SocketTime::infinite_future());
    }

    #[test]
    fn default_options_match_reference_timing() {
        let options = Options::default();
        assert_eq!(options.rto, Duration::from_millis(300));
        assert_eq!(options.handshake_rto, Duration::from_millis(300));
        assert_eq!(options.max_retx, 50);
        assert_eq!(options.fixed_wnd, 32);
    }
}
