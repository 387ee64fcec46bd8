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
use anyhow::bail;
use rdtp::api::Options;
use rdtp::api::SocketEvent;
use rdtp::api::SocketTime;
use rdtp::net::DatagramSocket;
use rdtp::socket::sender::Sender;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use std::time::Instant;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!("usage: sender <bind_addr> <peer_addr> <input_file> <fixed_wnd_segments>");
        std::process::exit(2);
    }

    let peer: SocketAddr = args[2].parse().context("parsing peer address")?;
    let data = fs::read(&args[3]).with_context(|| format!("reading input file {}", args[3]))?;
    let fixed_wnd: u16 = args[4].parse().context("parsing window size")?;
    let options = Options { fixed_wnd, ..Options::default() };

    let mut socket = DatagramSocket::bind(&args[1]).context("binding sender socket")?;
    println!("sender bound at {}, peer {}", socket.local_addr()?, peer);
    println!("input: {} bytes, window: {} segments", data.len(), fixed_wnd);

    let total_bytes = data.len();
    let mut sender = Sender::new("sender", data, &options);
    let start = Instant::now();
    sender.connect(SocketTime::zero());

    loop {
        let now = SocketTime::zero() + start.elapsed();

        while let Some((datagram, _from)) = socket.try_recv()? {
            sender.handle_input(now, datagram);
        }
        sender.poll(now);

        while let Some(event) = sender.poll_event() {
            match event {
                SocketEvent::SendPacket(datagram) => socket.send_to(&datagram, peer)?,
                SocketEvent::OnConnected() => println!("connected"),
                SocketEvent::OnClosed() => {
                    let secs = start.elapsed().as_secs_f64().max(1e-9);
                    println!(
                        "transfer done: {} bytes in {:.3} s ({:.3} MB/s), {}",
                        total_bytes,
                        secs,
                        total_bytes as f64 / 1e6 / secs,
                        sender.metrics()
                    );
                    return Ok(());
                }
                SocketEvent::OnAborted(kind, reason) => {
                    bail!("transfer aborted: {:?}: {}", kind, reason)
                }
                SocketEvent::OnData(_) => unreachable!("sender never delivers data"),
            }
        }

        thread::sleep(Duration::from_millis(1));
    }
}
