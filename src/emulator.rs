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

use crate::api::SocketTime;
use std::collections::VecDeque;
use std::time::Duration;

/// Which way a datagram is travelling through the emulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    /// From the sending endpoint towards the receiving endpoint. Subject to loss and delay.
    ToServer,

    /// From the receiving endpoint back to the sending endpoint. Forwarded untouched.
    ToClient,
}

/// What the emulator decided to do with a datagram.
#[derive(Debug, PartialEq)]
pub enum ForwardAction {
    /// Put the datagram on the wire now.
    Deliver(Vec<u8>),

    /// The datagram sits in the delay queue; [`Emulator::poll`] will release it.
    Delayed,

    /// The datagram was lost.
    Dropped,
}

struct DelayedDatagram {
    due: SocketTime,
    data: Vec<u8>,
}

/// A network middlebox that forwards datagrams between two endpoints, degrading one direction.
///
/// Client-to-server datagrams are dropped with the configured probability, the survivors held in
/// a FIFO delay queue for the configured one-way delay. Server-to-client datagrams pass through
/// untouched. Datagram content is never parsed, validated or modified.
pub struct Emulator {
    loss_rate: f64,
    delay: Duration,
    delay_queue: VecDeque<DelayedDatagram>,
    rng: fastrand::Rng,

    forwarded_count: usize,
    dropped_count: usize,
}

impl Emulator {
    pub fn new(loss_rate: f64, delay: Duration) -> Self {
        Self::with_rng(loss_rate, delay, fastrand::Rng::new())
    }

    /// Creates an emulator with a caller-provided random number generator, for reproducible loss
    /// patterns.
    pub fn with_rng(loss_rate: f64, delay: Duration, rng: fastrand::Rng) -> Self {
        Self {
            loss_rate,
            delay,
            delay_queue: VecDeque::new(),
            rng,
            forwarded_count: 0,
            dropped_count: 0,
        }
    }

    /// Decides the fate of one datagram.
    pub fn handle_datagram(
        &mut self,
        now: SocketTime,
        direction: Direction,
        data: &[u8],
    ) -> ForwardAction {
        match direction {
            Direction::ToClient => {
                self.forwarded_count += 1;
                ForwardAction::Deliver(data.to_vec())
            }
            Direction::ToServer => {
                if self.loss_rate > 0.0 && self.rng.f64() < self.loss_rate {
                    self.dropped_count += 1;
                    return ForwardAction::Dropped;
                }
                if self.delay.is_zero() {
                    self.forwarded_count += 1;
                    return ForwardAction::Deliver(data.to_vec());
                }
                self.delay_queue
                    .push_back(DelayedDatagram { due: now + self.delay, data: data.to_vec() });
                ForwardAction::Delayed
            }
        }
    }

    /// Releases every delayed datagram whose due time has passed, in arrival order. All released
    /// datagrams are bound for the server.
    pub fn poll(&mut self, now: SocketTime) -> Vec<Vec<u8>> {
        let mut released = Vec::new();
        while let Some(front) = self.delay_queue.front() {
            if front.due > now {
                break;
            }
            released.push(self.delay_queue.pop_front().unwrap().data);
            self.forwarded_count += 1;
        }
        released
    }

    /// The due time of the next queued datagram, if any.
    pub fn next_due(&self) -> Option<SocketTime> {
        self.delay_queue.front().map(|d| d.due)
    }

    pub fn forwarded_count(&self) -> usize {
        self.forwarded_count
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: SocketTime = SocketTime::zero();
    const DELAY: Duration = Duration::from_millis(5);

    fn lossless() -> Emulator {
        Emulator::with_rng(0.0, DELAY, fastrand::Rng::with_seed(1))
    }

    #[test]
    fn server_bound_datagrams_are_delayed() {
        let mut emu = lossless();
        assert_eq!(emu.handle_datagram(T0, Direction::ToServer, &[1]), ForwardAction::Delayed);
        assert!(emu.poll(T0 + Duration::from_millis(4)).is_empty());
        assert_eq!(emu.poll(T0 + DELAY), vec![vec![1]]);
        assert_eq!(emu.forwarded_count(), 1);
    }

    #[test]
    fn client_bound_datagrams_pass_through() {
        let mut emu = lossless();
        assert_eq!(
            emu.handle_datagram(T0, Direction::ToClient, &[7, 8]),
            ForwardAction::Deliver(vec![7, 8])
        );
        assert_eq!(emu.dropped_count(), 0);
    }

    #[test]
    fn zero_delay_forwards_immediately() {
        let mut emu = Emulator::with_rng(0.0, Duration::ZERO, fastrand::Rng::with_seed(1));
        assert_eq!(
            emu.handle_datagram(T0, Direction::ToServer, &[3]),
            ForwardAction::Deliver(vec![3])
        );
    }

    #[test]
    fn delay_queue_preserves_order() {
        let mut emu = lossless();
        emu.handle_datagram(T0, Direction::ToServer, &[1]);
        emu.handle_datagram(T0 + Duration::from_millis(1), Direction::ToServer, &[2]);
        assert_eq!(emu.next_due(), Some(T0 + DELAY));

        let released = emu.poll(T0 + Duration::from_millis(10));
        assert_eq!(released, vec![vec![1], vec![2]]);
        assert!(emu.next_due().is_none());
    }

    #[test]
    fn full_loss_drops_every_server_bound_datagram() {
        let mut emu = Emulator::with_rng(1.0, DELAY, fastrand::Rng::with_seed(1));
        for i in 0..10u8 {
            assert_eq!(emu.handle_datagram(T0, Direction::ToServer, &[i]), ForwardAction::Dropped);
        }
        assert_eq!(emu.dropped_count(), 10);
        // The reverse path is never degraded.
        assert_eq!(
            emu.handle_datagram(T0, Direction::ToClient, &[9]),
            ForwardAction::Deliver(vec![9])
        );
    }

    #[test]
    fn loss_rate_is_approximated() {
        let mut emu = Emulator::with_rng(0.3, Duration::ZERO, fastrand::Rng::with_seed(42));
        let mut dropped = 0;
        for _ in 0..1000 {
            if emu.handle_datagram(T0, Direction::ToServer, &[0]) == ForwardAction::Dropped {
                dropped += 1;
            }
        }
        assert!((200..400).contains(&dropped), "dropped {dropped} of 1000");
    }
}
