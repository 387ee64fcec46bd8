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

/// Sequence Number
///
/// A byte offset within the sender's stream, counted from the sender's Initial Sequence Number.
/// Control segments (SYN, FIN) consume exactly one sequence number; data segments consume one per
/// payload byte. Sequence numbers compare with plain unsigned ordering - initial sequence numbers
/// are small and the stream is bounded by the transferred file size, so the space never wraps
/// within a connection.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SeqNum(pub u32);

impl fmt::Debug for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u32> for SeqNum {
    type Output = SeqNum;

    #[inline]
    fn add(self, rhs: u32) -> SeqNum {
        SeqNum(self.0.wrapping_add(rhs))
    }
}

impl std::ops::Sub<u32> for SeqNum {
    type Output = SeqNum;

    #[inline]
    fn sub(self, rhs: u32) -> SeqNum {
        SeqNum(self.0.wrapping_sub(rhs))
    }
}

impl std::ops::AddAssign<u32> for SeqNum {
    fn add_assign(&mut self, rhs: u32) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_cmp() {
        assert!(SeqNum(42) == SeqNum(42));
        assert!(SeqNum(1) > SeqNum(0));
        assert!(SeqNum(0) < SeqNum(1));
        assert!(SeqNum(5001) > SeqNum(5000));
        assert!(SeqNum(1_048_576) > SeqNum(5000));
    }

    #[test]
    fn seq_arithmetic() {
        let isn = SeqNum(5000);
        assert_eq!(isn + 1, SeqNum(5001));
        assert_eq!(isn + 1000, SeqNum(6000));
        assert_eq!(SeqNum(6000) - 1000, SeqNum(5000));

        let mut seq = SeqNum(5001);
        seq += 1000;
        assert_eq!(seq, SeqNum(6001));
    }
}
