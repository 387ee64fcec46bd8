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

use crate::api::MSS;
use crate::packet::ParseError;
use crate::packet::checksum::checksum16;
use crate::packet::ensure;
use crate::packet::read_u16_be;
use crate::packet::read_u32_be;
use crate::packet::read_u64_be;
use crate::packet::write_u16_be;
use crate::packet::write_u32_be;
use crate::packet::write_u64_be;
use crate::types::SeqNum;
use std::fmt;

/// Size of the fixed segment header.
pub const HEADER_SIZE: usize = 24;

/// Segment flag bits. A segment may carry several, e.g. SYN|ACK during the handshake.
pub mod flags {
    pub const SYN: u16 = 0x0001;
    pub const ACK: u16 = 0x0002;
    pub const FIN: u16 = 0x0004;
    pub const DATA: u16 = 0x0008;
    /// Reserved. Never emitted and never interpreted.
    #[allow(dead_code)]
    pub const RST: u16 = 0x0010;
}

/// Segment header
///
/// The on-wire layout, with all multi-byte fields in network byte order:
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Sequence Number                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     Acknowledgement Number                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Flags             |            Window             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Payload Length        |            Checksum           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                           SACK Bitmap                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Checksum convention: the checksum is computed with the multi-byte header fields laid out in
/// native byte order and the checksum field zeroed, followed by the payload. The wire then
/// carries the fields converted to network byte order together with the computed checksum. Both
/// endpoints must follow this convention - it is not the conventional application order of the
/// Internet checksum, but it is self-consistent.
///
/// The payload length is not stored here; it is implied by the payload slice handed to
/// [`SegmentHeader::serialize`] and returned by [`SegmentHeader::parse`].
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentHeader {
    pub seq: SeqNum,
    pub ack: SeqNum,
    pub flags: u16,
    pub wnd: u16,
    pub sack_mask: u64,
}

/// Writes the header fields into `buf` in native byte order with a zeroed checksum field. This is
/// the representation the checksum is computed over.
fn write_native(header: &SegmentHeader, len: u16, buf: &mut [u8]) {
    buf[0..4].copy_from_slice(&header.seq.0.to_ne_bytes());
    buf[4..8].copy_from_slice(&header.ack.0.to_ne_bytes());
    buf[8..10].copy_from_slice(&header.flags.to_ne_bytes());
    buf[10..12].copy_from_slice(&header.wnd.to_ne_bytes());
    buf[12..14].copy_from_slice(&len.to_ne_bytes());
    buf[14..16].copy_from_slice(&0u16.to_ne_bytes());
    buf[16..24].copy_from_slice(&header.sack_mask.to_ne_bytes());
}

impl SegmentHeader {
    /// Serializes the header and payload into a single datagram buffer, computing the checksum.
    pub fn serialize(&self, payload: &[u8]) -> Vec<u8> {
        debug_assert!(payload.len() <= MSS);
        let len = payload.len() as u16;

        let mut scratch = vec![0; HEADER_SIZE + payload.len()];
        write_native(self, len, &mut scratch);
        scratch[HEADER_SIZE..].copy_from_slice(payload);
        let cksum = checksum16(&scratch);

        let mut wire = vec![0; HEADER_SIZE + payload.len()];
        write_u32_be!(&mut wire[0..4], self.seq.0);
        write_u32_be!(&mut wire[4..8], self.ack.0);
        write_u16_be!(&mut wire[8..10], self.flags);
        write_u16_be!(&mut wire[10..12], self.wnd);
        write_u16_be!(&mut wire[12..14], len);
        write_u16_be!(&mut wire[14..16], cksum);
        write_u64_be!(&mut wire[16..24], self.sack_mask);
        wire[HEADER_SIZE..].copy_from_slice(payload);
        wire
    }

    /// Parses a datagram into a header and its payload slice, verifying length and checksum.
    pub fn parse(data: &[u8]) -> Result<(SegmentHeader, &[u8]), ParseError> {
        ensure!(data.len() >= HEADER_SIZE, ParseError::TooShort);

        let header = SegmentHeader {
            seq: SeqNum(read_u32_be!(&data[0..4])),
            ack: SeqNum(read_u32_be!(&data[4..8])),
            flags: read_u16_be!(&data[8..10]),
            wnd: read_u16_be!(&data[10..12]),
            sack_mask: read_u64_be!(&data[16..24]),
        };
        let len = read_u16_be!(&data[12..14]) as usize;
        let cksum = read_u16_be!(&data[14..16]);

        ensure!(len <= MSS && HEADER_SIZE + len <= data.len(), ParseError::InvalidLength);
        let payload = &data[HEADER_SIZE..HEADER_SIZE + len];

        let mut scratch = vec![0; HEADER_SIZE + len];
        write_native(&header, len as u16, &mut scratch);
        scratch[HEADER_SIZE..].copy_from_slice(payload);
        ensure!(checksum16(&scratch) == cksum, ParseError::ChecksumMismatch);

        Ok((header, payload))
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn is_data(&self) -> bool {
        self.flags & flags::DATA != 0
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_syn() {
            names.push("SYN");
        }
        if self.is_ack() {
            names.push("ACK");
        }
        if self.is_fin() {
            names.push("FIN");
        }
        if self.is_data() {
            names.push("DATA");
        }
        write!(f, "{}, seq={}, ack={}, wnd={}", names.join("|"), self.seq, self.ack, self.wnd)
    }
}
