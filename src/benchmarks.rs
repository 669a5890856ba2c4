use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::{
    clock::{truncate_to_second, Clock},
    config::BenchmarksConfig,
    error::ConfigError,
};

/// All requests completed within one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    timestamp: SystemTime,
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
}

impl Bucket {
    fn new(timestamp: SystemTime, duration: Duration) -> Self {
        Bucket {
            timestamp,
            count: 1,
            sum: duration,
            min: duration,
            max: duration,
        }
    }

    fn merge(&mut self, duration: Duration) {
        self.count += 1;
        self.sum = self.sum.saturating_add(duration);
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }
}

/// Request statistics over some window.
///
/// Serializes with response times in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(rename = "total_requests")]
    pub requests: u64,
    #[serde(rename = "total_requests_sec")]
    pub requests_per_second: f64,
    #[serde(rename = "average_resp_time", serialize_with = "as_micros")]
    pub average_response_time: Duration,
    #[serde(rename = "min_resp_time", serialize_with = "as_micros")]
    pub min_response_time: Duration,
    #[serde(rename = "max_resp_time", serialize_with = "as_micros")]
    pub max_response_time: Duration,
}

fn as_micros<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

/// Collects request durations into one-second buckets and answers aggregate
/// statistics for any trailing window up to the retention horizon.
///
/// Updates take the write lock for eviction plus merge, stats only take the
/// read lock, so readers never see a half-written bucket.
#[derive(Debug)]
pub struct Benchmarks {
    buckets: RwLock<VecDeque<Bucket>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for Benchmarks {
    fn default() -> Self {
        let config = BenchmarksConfig::default();
        Benchmarks {
            buckets: RwLock::new(VecDeque::new()),
            retention: config.retention,
            clock: config.clock,
        }
    }
}

impl Benchmarks {
    pub fn new(config: BenchmarksConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!("Keeping request benchmarks for {:?}", config.retention);
        Ok(Benchmarks {
            buckets: RwLock::new(VecDeque::with_capacity(
                config.retention.as_secs().min(3600) as usize,
            )),
            retention: config.retention,
            clock: config.clock,
        })
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of one-second buckets currently held.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Record one completed request that took `duration`.
    pub fn update(&self, duration: Duration) {
        let now = self.clock.now();
        let second = truncate_to_second(now);

        let mut buckets = self.buckets.write();

        if let Some(cutoff) = now.checked_sub(self.retention) {
            let before = buckets.len();
            while buckets.front().is_some_and(|b| b.timestamp <= cutoff) {
                buckets.pop_front();
            }
            if buckets.len() < before {
                trace!("Evicted {} expired buckets", before - buckets.len());
            }
        }

        match buckets.back_mut() {
            // If the clock stepped backwards, fold into the newest bucket so
            // timestamps stay ordered.
            Some(last) if last.timestamp >= second => last.merge(duration),
            _ => {
                trace!("Opening bucket for {:?}", second);
                buckets.push_back(Bucket::new(second, duration));
            }
        }
    }

    /// Aggregate every retained bucket newer than `now - window`.
    ///
    /// The request rate is taken over the span the matching buckets actually
    /// cover, not the requested window, so asking for an hour right after
    /// startup doesn't report a near-zero rate.
    pub fn stats(&self, window: Duration) -> Snapshot {
        if window.is_zero() {
            return Snapshot::default();
        }
        let cutoff = self.clock.now().checked_sub(window);

        let buckets = self.buckets.read();

        let mut requests = 0u64;
        let mut sum = Duration::ZERO;
        let mut extremes: Option<(Duration, Duration)> = None;
        let mut newest: Option<SystemTime> = None;
        let mut oldest: Option<SystemTime> = None;

        for bucket in buckets.iter().rev() {
            if cutoff.is_some_and(|cutoff| bucket.timestamp <= cutoff) {
                break;
            }
            requests += bucket.count;
            sum = sum.saturating_add(bucket.sum);
            extremes = Some(match extremes {
                Some((min, max)) => (min.min(bucket.min), max.max(bucket.max)),
                None => (bucket.min, bucket.max),
            });
            newest.get_or_insert(bucket.timestamp);
            oldest = Some(bucket.timestamp);
        }
        drop(buckets);

        let (Some((min, max)), Some(newest), Some(oldest)) = (extremes, newest, oldest) else {
            return Snapshot::default();
        };

        let covered = newest.duration_since(oldest).unwrap_or_default() + Duration::from_secs(1);
        let average = sum.as_nanos() / requests as u128;

        Snapshot {
            requests,
            requests_per_second: requests as f64 / covered.as_secs_f64(),
            average_response_time: Duration::from_nanos(
                u64::try_from(average).unwrap_or(u64::MAX),
            ),
            min_response_time: min,
            max_response_time: max,
        }
    }
}
