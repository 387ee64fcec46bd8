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

use crate::api::Metrics;
use crate::api::Options;
use crate::api::SocketEvent;
use crate::api::SocketTime;
use crate::events::Events;
use crate::packet::header::SegmentHeader;
use crate::packet::header::flags;
use crate::rx::reassembly::ReassemblyBuffer;
use crate::types::SeqNum;
#[cfg(not(test))]
use log::info;
use std::mem;
use std::net::SocketAddr;
#[cfg(test)]
use std::println as info;
use std::time::Duration;

const MIN_ISN: u32 = 1_000;
const MAX_ISN: u32 = 66_536;

struct SynRcvdState {
    reassembly: ReassemblyBuffer,
}

struct EstablishedState {
    established_at: SocketTime,
    reassembly: ReassemblyBuffer,
}

struct FinWaitState {
    established_at: SocketTime,
    reassembly: ReassemblyBuffer,
    peer_fin_seq: SeqNum,
}

struct TerminatedState {
    elapsed: Duration,
    duplicate_count: usize,
    peak_buffered_count: usize,
}

enum State {
    Closed,
    SynRcvd(SynRcvdState),
    Established(EstablishedState),
    FinWait(FinWaitState),
    Terminated(TerminatedState),
}

/// The receiving endpoint of a transfer.
///
/// Performs no I/O: feed it every incoming datagram together with its source address via
/// [`Receiver::handle_input`] and drain [`Receiver::poll_event`] - `SendPacket` events are
/// acknowledgements to put on the wire, `OnData` events carry the reconstructed stream in order.
///
/// The first valid SYN binds its source address as the peer for the lifetime of the connection;
/// datagrams from anyone else are dropped. The receiver owns no timers - every packet it sends is
/// a direct response to one it received, and a lost response is recovered by the peer's
/// retransmission.
pub struct Receiver {
    ctx: Context,
    state: State,
}

struct Context {
    name: String,
    options: Options,
    events: Events,
    isn: SeqNum,
    peer: Option<SocketAddr>,
    rx_packets_count: usize,
    tx_packets_count: usize,
}

impl Context {
    fn send(&mut self, header: SegmentHeader, payload: &[u8]) {
        log::debug!("[{}] TX {}", self.name, header);
        self.tx_packets_count += 1;
        self.events.add(SocketEvent::SendPacket(header.serialize(payload)));
    }

    /// Acknowledges the current reassembly state: cumulative acknowledgement point plus a fresh
    /// selective acknowledgement bitmap.
    fn send_ack(&mut self, reassembly: &ReassemblyBuffer) {
        let header = SegmentHeader {
            seq: self.isn + 1,
            ack: reassembly.expected_ack(),
            flags: flags::ACK,
            wnd: self.options.fixed_wnd,
            sack_mask: reassembly.sack_mask(),
        };
        self.send(header, &[]);
    }

    fn send_syn_ack(&mut self, expected_ack: SeqNum) {
        let header = SegmentHeader {
            seq: self.isn,
            ack: expected_ack,
            flags: flags::SYN | flags::ACK,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(header, &[]);
    }

    /// Responds to the peer's FIN: acknowledge it, then request our own close.
    fn send_fin_exchange(&mut self, peer_fin_seq: SeqNum, expected_ack: SeqNum) {
        let ack = SegmentHeader {
            seq: self.isn + 1,
            ack: peer_fin_seq + 1,
            flags: flags::ACK,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(ack, &[]);

        let fin = SegmentHeader {
            seq: self.isn + 2,
            ack: expected_ack,
            flags: flags::FIN | flags::ACK,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(fin, &[]);
    }
}

impl Receiver {
    /// Creates a new `Receiver`, listening for a connection from any peer.
    ///
    /// The provided `name` is only used for logging to identify this endpoint.
    pub fn new(name: &str, options: &Options) -> Self {
        Receiver {
            ctx: Context {
                name: name.into(),
                options: options.clone(),
                events: Events::new(),
                isn: SeqNum(fastrand::u32(MIN_ISN..MAX_ISN)),
                peer: None,
                rx_packets_count: 0,
                tx_packets_count: 0,
            },
            state: State::Closed,
        }
    }

    pub fn poll_event(&mut self) -> Option<SocketEvent> {
        self.ctx.events.next_event()
    }

    /// Handles an incoming datagram. Malformed datagrams and datagrams from anyone but the bound
    /// peer are dropped silently.
    pub fn handle_input(&mut self, now: SocketTime, from: SocketAddr, data: &[u8]) {
        let Ok((header, payload)) = SegmentHeader::parse(data).inspect_err(|e| {
            log::debug!("[{}] dropping datagram: {}", self.ctx.name, e);
        }) else {
            return;
        };

        if let Some(peer) = self.ctx.peer {
            if from != peer {
                log::debug!("[{}] dropping datagram from non-peer {}", self.ctx.name, from);
                return;
            }
        }

        self.ctx.rx_packets_count += 1;
        log::debug!("[{}] RX {}", self.ctx.name, header);
        self.handle_segment(now, from, &header, payload);
    }

    fn handle_segment(
        &mut self,
        now: SocketTime,
        from: SocketAddr,
        header: &SegmentHeader,
        payload: &[u8],
    ) {
        match &mut self.state {
            State::Closed => {
                if header.is_syn() {
                    self.ctx.peer = Some(from);
                    let reassembly =
                        ReassemblyBuffer::new(header.seq + 1, self.ctx.options.fixed_wnd);
                    info!("[{}] RX SYN(seq={}) from {}", self.ctx.name, header.seq, from);
                    self.ctx.send_syn_ack(reassembly.expected_ack());
                    self.state = State::SynRcvd(SynRcvdState { reassembly });
                }
                return;
            }
            State::SynRcvd(s) => {
                if header.is_syn() {
                    // Our SYN|ACK may have been lost - answer the retransmitted SYN again.
                    let expected_ack = s.reassembly.expected_ack();
                    self.ctx.send_syn_ack(expected_ack);
                    return;
                }
                if header.is_ack() && header.ack == self.ctx.isn + 1 {
                    self.establish(now);
                    return;
                }
                if header.is_data() || header.is_fin() {
                    // Data or a FIN implies the peer completed the handshake; its final ACK was
                    // lost. Processed below as established traffic.
                    self.establish(now);
                } else {
                    return;
                }
            }
            State::Established(_) | State::FinWait(_) => {}
            State::Terminated(_) => return,
        }

        match &mut self.state {
            State::Established(est) => {
                if header.is_fin() {
                    let expected_ack = est.reassembly.expected_ack();
                    info!("[{}] RX FIN(seq={})", self.ctx.name, header.seq);
                    self.ctx.send_fin_exchange(header.seq, expected_ack);
                    let State::Established(est) = mem::replace(&mut self.state, State::Closed)
                    else {
                        unreachable!()
                    };
                    self.state = State::FinWait(FinWaitState {
                        established_at: est.established_at,
                        reassembly: est.reassembly,
                        peer_fin_seq: header.seq,
                    });
                    return;
                }

                if header.is_data() {
                    for run in est.reassembly.handle_data(header.seq, payload) {
                        self.ctx.events.add(SocketEvent::OnData(run));
                    }
                    log::debug!(
                        "[{}] expected_ack={}, {} segments buffered",
                        self.ctx.name,
                        est.reassembly.expected_ack(),
                        est.reassembly.buffered_count()
                    );
                    self.ctx.send_ack(&est.reassembly);
                }
            }
            State::FinWait(fin_wait) => {
                if header.is_fin() {
                    // The peer retransmitted its FIN - our responses must have been lost.
                    let peer_fin_seq = fin_wait.peer_fin_seq;
                    let expected_ack = fin_wait.reassembly.expected_ack();
                    self.ctx.send_fin_exchange(peer_fin_seq, expected_ack);
                    return;
                }
                if header.is_ack() && header.ack == self.ctx.isn + 3 {
                    let State::FinWait(fin_wait) = mem::replace(&mut self.state, State::Closed)
                    else {
                        unreachable!()
                    };
                    let elapsed = now - fin_wait.established_at;
                    info!("[{}] connection closed, transfer took {:?}", self.ctx.name, elapsed);
                    self.ctx.events.add(SocketEvent::OnClosed());
                    self.state = State::Terminated(TerminatedState {
                        elapsed,
                        duplicate_count: fin_wait.reassembly.duplicate_count(),
                        peak_buffered_count: fin_wait.reassembly.peak_buffered_count(),
                    });
                }
            }
            _ => {}
        }
    }

    fn establish(&mut self, now: SocketTime) {
        let State::SynRcvd(s) = mem::replace(&mut self.state, State::Closed) else {
            unreachable!()
        };
        info!("[{}] connection established", self.ctx.name);
        self.ctx.events.add(SocketEvent::OnConnected());
        self.state =
            State::Established(EstablishedState { established_at: now, reassembly: s.reassembly });
    }

    /// The address of the connected peer, once a SYN has bound one.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.ctx.peer
    }

    /// Elapsed time between establishment and the close of a terminated connection.
    pub fn transfer_time(&self) -> Option<Duration> {
        match &self.state {
            State::Terminated(t) => Some(t.elapsed),
            _ => None,
        }
    }

    pub fn metrics(&self) -> Metrics {
        let (duplicates, peak) = match &self.state {
            State::SynRcvd(s) => (s.reassembly.duplicate_count(), s.reassembly.peak_buffered_count()),
            State::Established(s) => {
                (s.reassembly.duplicate_count(), s.reassembly.peak_buffered_count())
            }
            State::FinWait(s) => {
                (s.reassembly.duplicate_count(), s.reassembly.peak_buffered_count())
            }
            State::Terminated(t) => (t.duplicate_count, t.peak_buffered_count),
            State::Closed => (0, 0),
        };
        Metrics {
            tx_packets_count: self.ctx.tx_packets_count,
            rx_packets_count: self.ctx.rx_packets_count,
            rx_duplicate_count: duplicates,
            peak_buffered_count: peak,
            ..Default::default()
        }
    }
}
