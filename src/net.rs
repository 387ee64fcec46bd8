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

use crate::api::MAX_DATAGRAM_SIZE;
use std::io;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::net::UdpSocket;

/// A nonblocking UDP socket with an always-allocated receive buffer, sized for the largest
/// datagram the protocol emits.
pub struct DatagramSocket {
    socket: UdpSocket,
    recv_buffer: Box<[u8]>,
}

impl DatagramSocket {
    pub fn bind<A: ToSocketAddrs>(bind_address: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_address)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, recv_buffer: vec![0; MAX_DATAGRAM_SIZE].into_boxed_slice() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// If a datagram can be read from the socket, returns it and its source address. Returns
    /// Ok(None) when no datagram is waiting.
    pub fn try_recv(&mut self) -> io::Result<Option<(&[u8], SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, from)) => Ok(Some((&self.recv_buffer[..len], from))),
            Err(err) => match err.kind() {
                // The only acceptable error is WouldBlock, indicating no packet.
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            },
        }
    }

    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_recv_returns_none_when_idle() {
        let mut socket = DatagramSocket::bind("127.0.0.1:0").unwrap();
        assert!(socket.try_recv().unwrap().is_none());
    }

    #[test]
    fn datagrams_round_trip_between_sockets() {
        let mut a = DatagramSocket::bind("127.0.0.1:0").unwrap();
        let b = DatagramSocket::bind("127.0.0.1:0").unwrap();

        b.send_to(&[1, 2, 3], a.local_addr().unwrap()).unwrap();

        // Nonblocking receive: allow the loopback datagram a moment to arrive.
        for _ in 0..100 {
            if let Some((data, from)) = a.try_recv().unwrap() {
                assert_eq!(data, &[1, 2, 3]);
                assert_eq!(from, b.local_addr().unwrap());
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("datagram never arrived");
    }
}
