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

use anyhow::Context;
use anyhow::Result;
use rdtp::api::SocketTime;
use rdtp::emulator::Direction;
use rdtp::emulator::Emulator;
use rdtp::emulator::ForwardAction;
use rdtp::net::DatagramSocket;
use std::env;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use std::time::Instant;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!("usage: emulator <bind_addr> <server_addr> <loss_rate> <delay_ms>");
        eprintln!();
        eprintln!("Forwards datagrams between a client and <server_addr>. Client-to-server");
        eprintln!("datagrams are dropped with probability <loss_rate> (0..1) and delayed by");
        eprintln!("<delay_ms>; server-to-client datagrams pass through untouched.");
        std::process::exit(2);
    }

    let server: SocketAddr = args[2].parse().context("parsing server address")?;
    let loss_rate: f64 = args[3].parse().context("parsing loss rate")?;
    let delay_ms: u64 = args[4].parse().context("parsing delay")?;

    let mut socket = DatagramSocket::bind(&args[1]).context("binding emulator socket")?;
    println!(
        "emulator on {}, server {}, loss {:.1}%, delay {} ms",
        socket.local_addr()?,
        server,
        loss_rate * 100.0,
        delay_ms
    );

    let mut emulator = Emulator::new(loss_rate, Duration::from_millis(delay_ms));
    let mut client: Option<SocketAddr> = None;
    let start = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        let now = SocketTime::zero() + start.elapsed();

        while let Some((datagram, from)) = socket.try_recv()? {
            let datagram = datagram.to_vec();
            if from == server {
                // Server-to-client traffic is forwarded untouched.
                if let Some(client) = client {
                    if let ForwardAction::Deliver(d) =
                        emulator.handle_datagram(now, Direction::ToClient, &datagram)
                    {
                        socket.send_to(&d, client)?;
                    }
                }
            } else {
                if client.is_none() {
                    client = Some(from);
                    println!("client connected: {from}");
                }
                if let ForwardAction::Deliver(d) =
                    emulator.handle_datagram(now, Direction::ToServer, &datagram)
                {
                    socket.send_to(&d, server)?;
                }
            }
        }

        for datagram in emulator.poll(now) {
            socket.send_to(&datagram, server)?;
        }

        if last_stats.elapsed() >= Duration::from_secs(3) {
            println!(
                "forwarded {} datagrams, dropped {}",
                emulator.forwarded_count(),
                emulator.dropped_count()
            );
            last_stats = Instant::now();
        }

        thread::sleep(Duration::from_millis(1));
    }
}
