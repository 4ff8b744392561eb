// Copyright 2024 TFAS Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// The backoff policy for ledger subscriptions and resync fetches.
///
/// Starts at one second, doubles up to a thirty second ceiling and never
/// gives up; transient ledger outages must never surface as permanent
/// failures.
pub fn subscription_backoff() -> ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(1))
        .with_max_interval(Duration::from_secs(30))
        .with_max_elapsed_time(None)
        .build()
}

/// A backoff policy which always returns a constant duration, until it
/// exceeds the maximum retry count.
///
/// Used for per-event handler retries, where after a handful of attempts
/// the event is logged and skipped instead of blocking the batch.
#[derive(Debug)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new constant backoff with `interval` between retries and
    /// at most `max_retry_count` attempts, after which `None` is returned
    /// to indicate that we should stop retrying.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_stops_after_max_retries() {
        let mut backoff =
            ConstantWithMaxRetryCount::new(Duration::from_millis(100), 3);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), None);
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn subscription_backoff_is_capped_and_unbounded() {
        let backoff = subscription_backoff();
        assert_eq!(backoff.initial_interval, Duration::from_secs(1));
        assert_eq!(backoff.max_interval, Duration::from_secs(30));
        assert_eq!(backoff.max_elapsed_time, None);
    }
}
