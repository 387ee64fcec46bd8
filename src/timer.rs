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
use std::time::Duration;

/// A very simple retransmission timer
///
/// The timer fires at a fixed interval. When it expires it is automatically restarted, as long as
/// the number of expirations is below the configurable `max_restarts` parameter. The `is_running`
/// property can be queried to know whether the restart budget has been exhausted - an exhausted
/// timer means the peer has stopped responding.
///
/// The protocol uses a constant timeout with no backoff, so expiry N+1 always follows expiry N by
/// exactly the base duration.
pub struct Timer {
    duration: Duration,
    expiration_count: u32,
    max_restarts: u32,
    next_expiry: Option<SocketTime>,
}

impl Timer {
    /// Creates a new timer with the provided interval and restart budget.
    pub fn new(duration: Duration, max_restarts: u32) -> Self {
        Self { duration, expiration_count: 0, max_restarts, next_expiry: None }
    }

    /// Returns true if the timer has expired. This method is not idempotent - calling it changes
    /// state.
    ///
    /// If expired, the next expiration time is scheduled, unless the timer has reached its restart
    /// limit, in which case it is stopped.
    pub fn expire(&mut self, now: SocketTime) -> bool {
        let Some(current_expiry) = self.next_expiry else {
            return false;
        };

        if current_expiry > now {
            return false;
        }

        let restarts_remaining = self.expiration_count < self.max_restarts;
        self.expiration_count = self.expiration_count.saturating_add(1);
        self.next_expiry = restarts_remaining.then(|| current_expiry + self.duration);

        true
    }

    /// Number of times the timer has expired since it was last started.
    pub fn expiration_count(&self) -> u32 {
        self.expiration_count
    }

    pub fn next_expiry(&self) -> Option<SocketTime> {
        self.next_expiry
    }

    pub fn is_running(&self) -> bool {
        self.next_expiry.is_some()
    }

    pub fn stop(&mut self) {
        self.next_expiry = None;
    }

    /// Starts the timer. If it's already started, it will be restarted with its expiration count
    /// reset.
    pub fn start(&mut self, now: SocketTime) {
        self.expiration_count = 0;
        self.next_expiry = Some(now + self.duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_TIME: SocketTime = SocketTime::zero();

    #[test]
    fn new_timer_is_not_running() {
        let t = Timer::new(Duration::from_millis(300), 50);
        assert!(!t.is_running());
        assert!(t.next_expiry().is_none());
    }

    #[test]
    fn stopped_timer_does_not_expire() {
        let mut t = Timer::new(Duration::from_millis(300), 50);
        t.start(START_TIME);
        t.stop();
        assert!(!t.expire(START_TIME + Duration::from_millis(300)));
    }

    #[test]
    fn timer_expires_after_duration() {
        let mut t = Timer::new(Duration::from_millis(300), 50);
        t.start(START_TIME);
        assert!(t.is_running());
        assert!(!t.expire(START_TIME + Duration::from_millis(299)));
        assert!(t.expire(START_TIME + Duration::from_millis(300)));
        assert!(t.is_running());
    }

    #[test]
    fn timer_restarts_without_drift() {
        let mut t = Timer::new(Duration::from_millis(300), 50);
        t.start(START_TIME);
        assert!(t.expire(START_TIME + Duration::from_millis(350)));
        assert_eq!(t.next_expiry(), Some(START_TIME + Duration::from_millis(600)));
        assert!(!t.expire(START_TIME + Duration::from_millis(599)));
        assert!(t.expire(START_TIME + Duration::from_millis(600)));
        assert_eq!(t.expiration_count(), 2);
    }

    #[test]
    fn timer_stops_when_exhausted() {
        let mut t = Timer::new(Duration::from_millis(300), 2);
        t.start(START_TIME);
        assert!(t.expire(START_TIME + Duration::from_millis(300)));
        assert!(t.expire(START_TIME + Duration::from_millis(600)));
        assert!(t.expire(START_TIME + Duration::from_millis(900)));
        assert!(!t.is_running());
        assert!(!t.expire(START_TIME + Duration::from_millis(1200)));
    }

    #[test]
    fn restarting_resets_expiration_count() {
        let mut t = Timer::new(Duration::from_millis(300), 1);
        t.start(START_TIME);
        assert!(t.expire(START_TIME + Duration::from_millis(300)));
        t.start(START_TIME + Duration::from_millis(400));
        assert_eq!(t.expiration_count(), 0);
        assert!(t.expire(START_TIME + Duration::from_millis(700)));
        assert!(t.is_running());
    }
}
