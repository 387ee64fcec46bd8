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

use crate::api::ErrorKind;
use crate::api::MSS;
use crate::api::Metrics;
use crate::api::Options;
use crate::api::SocketEvent;
use crate::api::SocketTime;
use crate::events::Events;
use crate::packet::header::SegmentHeader;
use crate::packet::header::flags;
use crate::timer::Timer;
use crate::tx::congestion::DupAckAction;
use crate::tx::congestion::RenoController;
use crate::tx::inflight::InflightTable;
use crate::types::SeqNum;
#[cfg(not(test))]
use log::info;
#[cfg(not(test))]
use log::warn;
use std::cmp::min;
use std::mem;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

const MIN_ISN: u32 = 5_000;
const MAX_ISN: u32 = 70_536;

struct SynSentState {
    syn_timer: Timer,
}

struct EstablishedState {
    /// Highest cumulative acknowledgement received. Never decreases.
    last_ack: SeqNum,
    inflight: InflightTable,
    cc: RenoController,
}

struct FinWaitState {
    fin_timer: Timer,
    fin_acked: bool,
    cc: RenoController,
}

enum State {
    Closed,
    SynSent(SynSentState),
    Established(EstablishedState),
    FinWait(FinWaitState),
    Terminated(Option<RenoController>),
}

/// The sending endpoint of a transfer.
///
/// Performs no I/O: call [`Sender::connect`] once, feed every incoming datagram via
/// [`Sender::handle_input`], call [`Sender::poll`] every loop iteration to fill the window and
/// service retransmission timeouts, and drain [`Sender::poll_event`]. The connection is over once
/// `OnClosed` or `OnAborted` has been generated.
///
/// Acknowledgement processing always happens before the next window fill, so credit granted by an
/// acknowledgement is reflected in the very next batch of transmitted segments.
pub struct Sender {
    ctx: Context,
    state: State,
}

struct Context {
    name: String,
    options: Options,
    events: Events,

    /// The byte stream to transfer. Data bytes are numbered from `isn + 1`.
    data: Vec<u8>,

    /// Offset of the next unsent byte in `data`.
    offset: usize,

    isn: SeqNum,

    /// The next sequence number to assign.
    next_seq: SeqNum,

    tx_packets_count: usize,
    rtx_packets_count: usize,
    rx_packets_count: usize,
}

impl Context {
    fn send(&mut self, header: SegmentHeader, payload: &[u8]) {
        log::debug!("[{}] TX {}", self.name, header);
        self.tx_packets_count += 1;
        self.events.add(SocketEvent::SendPacket(header.serialize(payload)));
    }

    fn send_syn(&mut self) {
        let header = SegmentHeader {
            seq: self.isn,
            ack: SeqNum(0),
            flags: flags::SYN,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(header, &[]);
    }

    fn send_fin(&mut self) {
        // The FIN consumes one sequence number but next_seq is not advanced; its
        // acknowledgement is recognized as next_seq + 1.
        let header = SegmentHeader {
            seq: self.next_seq,
            ack: SeqNum(0),
            flags: flags::FIN,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(header, &[]);
    }

    fn send_data(&mut self, seq: SeqNum, payload: &[u8]) {
        let header = SegmentHeader {
            seq,
            ack: SeqNum(0),
            flags: flags::DATA,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(header, payload);
    }

    /// Acknowledges the peer's FIN. This is the last segment of the connection.
    fn send_fin_ack(&mut self, peer_fin_seq: SeqNum) {
        let header = SegmentHeader {
            seq: self.next_seq + 1,
            ack: peer_fin_seq + 1,
            flags: flags::ACK,
            wnd: self.options.fixed_wnd,
            sack_mask: 0,
        };
        self.send(header, &[]);
    }

    fn abort(&mut self, reason: &str) {
        warn!("[{}] aborting connection: {}", self.name, reason);
        self.events.add(SocketEvent::OnAborted(ErrorKind::TooManyRetries, reason.into()));
    }
}

impl Sender {
    /// Creates a new `Sender` that will transfer `data` once connected.
    ///
    /// The provided `name` is only used for logging to identify this endpoint.
    pub fn new(name: &str, data: Vec<u8>, options: &Options) -> Self {
        let isn = SeqNum(fastrand::u32(MIN_ISN..MAX_ISN));
        Sender {
            ctx: Context {
                name: name.into(),
                options: options.clone(),
                events: Events::new(),
                data,
                offset: 0,
                isn,
                next_seq: isn + 1,
                tx_packets_count: 0,
                rtx_packets_count: 0,
                rx_packets_count: 0,
            },
            state: State::Closed,
        }
    }

    pub fn poll_event(&mut self) -> Option<SocketEvent> {
        self.ctx.events.next_event()
    }

    /// Initiates the handshake by sending a SYN. The SYN is retransmitted every handshake
    /// timeout until answered or the retransmission budget runs out.
    pub fn connect(&mut self, now: SocketTime) {
        debug_assert!(matches!(self.state, State::Closed));
        info!("[{}] connecting, SYN seq={}", self.ctx.name, self.ctx.isn);
        self.ctx.send_syn();
        let mut syn_timer = Timer::new(self.ctx.options.handshake_rto, self.ctx.options.max_retx);
        syn_timer.start(now);
        self.state = State::SynSent(SynSentState { syn_timer });
    }

    /// Handles an incoming datagram. Malformed datagrams are dropped silently.
    pub fn handle_input(&mut self, now: SocketTime, data: &[u8]) {
        let Ok((header, _payload)) = SegmentHeader::parse(data).inspect_err(|e| {
            log::debug!("[{}] dropping datagram: {}", self.ctx.name, e);
        }) else {
            return;
        };

        self.ctx.rx_packets_count += 1;
        log::debug!("[{}] RX {}", self.ctx.name, header);

        match &mut self.state {
            State::SynSent(_) => self.handle_syn_ack(now, &header),
            State::Established(_) => {
                if header.is_fin() {
                    self.handle_peer_fin(&header);
                } else if header.is_ack() {
                    self.handle_ack(now, &header);
                }
            }
            State::FinWait(fin_wait) => {
                if header.is_fin() {
                    self.handle_peer_fin(&header);
                } else if header.is_ack() && header.ack == self.ctx.next_seq + 1 {
                    info!("[{}] FIN acknowledged, awaiting peer FIN", self.ctx.name);
                    fin_wait.fin_acked = true;
                    fin_wait.fin_timer.stop();
                }
            }
            State::Closed | State::Terminated(_) => {}
        }
    }

    /// Performs one iteration of protocol work: fills the transmission window, retransmits timed
    /// out segments (applying the congestion reaction once per iteration with any expiry), and
    /// services the handshake and FIN timers. Call this once per loop iteration, after any
    /// [`Sender::handle_input`] calls.
    pub fn poll(&mut self, now: SocketTime) {
        match &mut self.state {
            State::SynSent(s) => {
                if s.syn_timer.expire(now) {
                    if s.syn_timer.is_running() {
                        let retx = s.syn_timer.expiration_count();
                        info!("[{}] retransmitting SYN, attempt {}", self.ctx.name, retx);
                        self.ctx.send_syn();
                    } else {
                        self.ctx.abort("handshake failed, SYN retransmission budget exhausted");
                        self.state = State::Terminated(None);
                    }
                }
            }
            State::Established(_) => {
                self.fill_window(now);
                self.service_data_timeouts(now);
                self.maybe_send_fin(now);
            }
            State::FinWait(f) => {
                if !f.fin_acked && f.fin_timer.expire(now) {
                    if f.fin_timer.is_running() {
                        let retx = f.fin_timer.expiration_count();
                        info!("[{}] retransmitting FIN, attempt {}", self.ctx.name, retx);
                        self.ctx.send_fin();
                    } else {
                        let State::FinWait(f) = mem::replace(&mut self.state, State::Closed)
                        else {
                            unreachable!()
                        };
                        self.ctx.abort("FIN not acknowledged, retransmission budget exhausted");
                        self.state = State::Terminated(Some(f.cc));
                    }
                }
            }
            State::Closed | State::Terminated(_) => {}
        }
    }

    /// The earliest moment at which [`Sender::poll`] has timer work to do. `None` when no timer
    /// is pending.
    pub fn poll_timeout(&self) -> Option<SocketTime> {
        match &self.state {
            State::SynSent(s) => s.syn_timer.next_expiry(),
            State::Established(est) => est.inflight.next_expiry(self.ctx.options.rto),
            State::FinWait(f) => f.fin_timer.next_expiry(),
            State::Closed | State::Terminated(_) => None,
        }
    }

    fn handle_syn_ack(&mut self, _now: SocketTime, header: &SegmentHeader) {
        if !(header.is_syn() && header.is_ack() && header.ack == self.ctx.isn + 1) {
            return;
        }

        let peer_isn = header.seq;
        let ack = SegmentHeader {
            seq: self.ctx.isn + 1,
            ack: peer_isn + 1,
            flags: flags::ACK,
            wnd: self.ctx.options.fixed_wnd,
            sack_mask: 0,
        };
        self.ctx.send(ack, &[]);
        info!("[{}] connected, peer isn={}", self.ctx.name, peer_isn);
        self.ctx.events.add(SocketEvent::OnConnected());
        self.state = State::Established(EstablishedState {
            last_ack: self.ctx.isn + 1,
            inflight: InflightTable::new(),
            cc: RenoController::new(u32::from(self.ctx.options.fixed_wnd)),
        });
    }

    fn handle_ack(&mut self, now: SocketTime, header: &SegmentHeader) {
        let State::Established(est) = &mut self.state else { unreachable!() };
        let ackno = header.ack;

        if ackno > est.last_ack {
            est.cc.handle_ack_advance();
            est.inflight.handle_cumulative_ack(ackno);
            est.inflight.apply_sack_mask(ackno, header.sack_mask);
            est.last_ack = ackno;
        } else if ackno == est.last_ack {
            // A duplicate may still carry fresh selective acknowledgement bits.
            est.inflight.apply_sack_mask(ackno, header.sack_mask);
            match est.cc.handle_duplicate_ack() {
                DupAckAction::FastRetransmit => {
                    if let Some(seq) = est.inflight.oldest_unacked() {
                        est.cc.enter_fast_retransmit();
                        self.retransmit(now, seq);
                    }
                }
                DupAckAction::InflateWindow | DupAckAction::Ignore => {}
            }
        }
        // An acknowledgement below last_ack is stale and ignored.
    }

    fn handle_peer_fin(&mut self, header: &SegmentHeader) {
        self.ctx.send_fin_ack(header.seq);
        info!("[{}] RX FIN(seq={}), transfer complete", self.ctx.name, header.seq);
        self.ctx.events.add(SocketEvent::OnClosed());
        let cc = match mem::replace(&mut self.state, State::Closed) {
            State::Established(est) => est.cc,
            State::FinWait(f) => f.cc,
            _ => unreachable!(),
        };
        self.state = State::Terminated(Some(cc));
    }

    fn fill_window(&mut self, now: SocketTime) {
        let State::Established(est) = &mut self.state else { unreachable!() };
        let window = min(est.cc.cwnd(), u32::from(self.ctx.options.fixed_wnd)) as usize;

        while est.inflight.unacked_count() < window && self.ctx.offset < self.ctx.data.len() {
            let chunk = min(MSS, self.ctx.data.len() - self.ctx.offset);
            let payload = self.ctx.data[self.ctx.offset..self.ctx.offset + chunk].to_vec();
            let seq = self.ctx.next_seq;

            self.ctx.send_data(seq, &payload);
            est.inflight.insert(seq, payload, now);

            self.ctx.offset += chunk;
            self.ctx.next_seq += chunk as u32;
        }
    }

    fn service_data_timeouts(&mut self, now: SocketTime) {
        let State::Established(est) = &mut self.state else { unreachable!() };
        let expired = est.inflight.expired_segments(now, self.ctx.options.rto);
        if expired.is_empty() {
            return;
        }

        // One congestion reaction per expiry scan, no matter how many segments timed out.
        est.cc.handle_rto_expiry();
        for seq in expired {
            self.retransmit(now, seq);
            if matches!(self.state, State::Terminated(_)) {
                return;
            }
        }
    }

    fn retransmit(&mut self, now: SocketTime, seq: SeqNum) {
        let State::Established(est) = &mut self.state else { unreachable!() };
        let payload = est.inflight.payload(seq).expect("unacked segment has a payload").to_vec();
        self.ctx.send_data(seq, &payload);
        self.ctx.rtx_packets_count += 1;

        let retx_count = est.inflight.record_retransmit(seq, now);
        if retx_count > self.ctx.options.max_retx {
            let State::Established(est) = mem::replace(&mut self.state, State::Closed) else {
                unreachable!()
            };
            self.ctx.abort("segment retransmission budget exhausted");
            self.state = State::Terminated(Some(est.cc));
        }
    }

    /// Once every byte has been sent and every in-flight segment acknowledged, emits the FIN and
    /// starts its retransmission timer.
    fn maybe_send_fin(&mut self, now: SocketTime) {
        let State::Established(est) = &mut self.state else { return };
        if self.ctx.offset < self.ctx.data.len() || est.inflight.unacked_count() != 0 {
            return;
        }

        info!("[{}] all data acknowledged, TX FIN(seq={})", self.ctx.name, self.ctx.next_seq);
        self.ctx.send_fin();
        let mut fin_timer = Timer::new(self.ctx.options.handshake_rto, self.ctx.options.max_retx);
        fin_timer.start(now);

        let State::Established(est) = mem::replace(&mut self.state, State::Closed) else {
            unreachable!()
        };
        self.state = State::FinWait(FinWaitState { fin_timer, fin_acked: false, cc: est.cc });
    }

    pub fn metrics(&self) -> Metrics {
        let cc = match &self.state {
            State::Established(est) => Some(&est.cc),
            State::FinWait(f) => Some(&f.cc),
            State::Terminated(cc) => cc.as_ref(),
            State::Closed | State::SynSent(_) => None,
        };
        Metrics {
            tx_packets_count: self.ctx.tx_packets_count,
            rtx_packets_count: self.ctx.rtx_packets_count,
            rx_packets_count: self.ctx.rx_packets_count,
            cwnd: cc.map_or(0, |cc| cc.cwnd()),
            ssthresh: cc.map_or(0, |cc| cc.ssthresh()),
            fast_retransmit_count: cc.map_or(0, |cc| cc.fast_retransmit_count()),
            rto_expiry_count: cc.map_or(0, |cc| cc.rto_expiry_count()),
            ..Default::default()
        }
    }
}
