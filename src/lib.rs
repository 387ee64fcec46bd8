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

//! A reliable data transfer protocol over unreliable datagram transport.
//!
//! The crate delivers a byte stream from a sending endpoint to a receiving endpoint through a
//! lossy, delay-prone network: a segmented sliding-window sender with Reno congestion control, a
//! reassembling receiver with out-of-order buffering and selective acknowledgements, a three-way
//! handshake and a symmetric teardown. A packet-forwarding emulator that injects configurable
//! loss and delay on one direction completes the testbed.
//!
//! The protocol engines in [`socket`] perform no I/O of their own - they consume timestamps and
//! datagrams and produce [`api::SocketEvent`]s - so a whole transfer can run in virtual time.
//! The `sender`, `receiver` and `emulator` binaries drive them over UDP.

pub mod api;
pub mod emulator;
pub mod net;
pub mod socket;

pub(crate) mod events;
pub(crate) mod packet;
pub(crate) mod rx;
pub(crate) mod timer;
pub(crate) mod tx;
pub(crate) mod types;

#[cfg(test)]
pub(crate) mod testing;

/// Returns the version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
