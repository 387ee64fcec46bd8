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
use rdtp::socket::receiver::Receiver;
use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::thread;
use std::time::Duration;
use std::time::Instant;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: receiver <bind_addr> <output_file> <fixed_wnd_segments>");
        std::process::exit(2);
    }

    let fixed_wnd: u16 = args[3].parse().context("parsing window size")?;
    let options = Options { fixed_wnd, ..Options::default() };

    let mut socket = DatagramSocket::bind(&args[1]).context("binding receiver socket")?;
    let output = File::create(&args[2])
        .with_context(|| format!("creating output file {}", args[2]))?;
    let mut output = BufWriter::new(output);
    println!("receiver listening on {}, window: {} segments", socket.local_addr()?, fixed_wnd);

    let mut receiver = Receiver::new("receiver", &options);
    let start = Instant::now();
    let mut received_bytes = 0usize;

    loop {
        let now = SocketTime::zero() + start.elapsed();

        while let Some((datagram, from)) = socket.try_recv()? {
            receiver.handle_input(now, from, datagram);
        }

        while let Some(event) = receiver.poll_event() {
            match event {
                SocketEvent::SendPacket(datagram) => {
                    let peer = receiver.peer().context("sending without a bound peer")?;
                    socket.send_to(&datagram, peer)?;
                }
                SocketEvent::OnData(run) => {
                    received_bytes += run.len();
                    output.write_all(&run).context("writing output file")?;
                }
                SocketEvent::OnConnected() => println!("connection established"),
                SocketEvent::OnClosed() => {
                    output.flush().context("flushing output file")?;
                    let elapsed = receiver.transfer_time().unwrap_or_default();
                    println!(
                        "connection closed: {} bytes in {:.3} s, {}",
                        received_bytes,
                        elapsed.as_secs_f64(),
                        receiver.metrics()
                    );
                    return Ok(());
                }
                SocketEvent::OnAborted(kind, reason) => {
                    bail!("connection aborted: {:?}: {}", kind, reason)
                }
            }
        }

        thread::sleep(Duration::from_millis(1));
    }
}
