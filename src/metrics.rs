//! The CloudWatch metrics pulled per broker and the window they cover.
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use clap::Parser;

use crate::error::OptionsError;

/// CloudWatch namespace of all MSK metrics.
pub const NAMESPACE: &str = "AWS/Kafka";

pub const CLUSTER_NAME_DIMENSION: &str = "Cluster Name";
pub const BROKER_ID_DIMENSION: &str = "Broker ID";

/// Metrics reported as a single average over the whole window.
pub const AVERAGE_METRICS: &[&str] = &[
    "BytesInPerSec",
    "BytesOutPerSec",
    "MessagesInPerSec",
    "CpuUser",
];

/// Metrics reported as the highest per-period average within the window.
pub const PEAK_METRICS: &[&str] = &[
    "BytesInPerSec",
    "BytesOutPerSec",
    "MessagesInPerSec",
    "CpuUser",
    "ConnectionCount",
    "PartitionCount",
    "GlobalTopicCount",
    "EstimatedMaxTimeLag",
    "LeaderCount",
    "ReplicationBytesOutPerSec",
    "ReplicationBytesInPerSec",
    "MemoryFree",
    "MemoryUsed",
];

/// CloudWatch retention of hourly datapoints.
pub const MAX_PERIOD_DAYS: u32 = 455;

/// Most datapoints a single `GetMetricStatistics` call may return.
pub const MAX_DATAPOINTS: u64 = 1440;

const SECS_PER_DAY: u64 = 86_400;

/// Minimum period granularity by age of the data, oldest first.
const RETENTION_GRANULARITY: &[(u32, u32)] = &[(63, 3600), (15, 300)];

/// Only published per cluster, never per broker.
const CLUSTER_LEVEL_METRICS: &[&str] = &["GlobalTopicCount"];

/// How a metric is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// One datapoint spanning the whole window.
    Average,

    /// Datapoints of the aggregation duration, the largest one wins.
    Peak,
}

/// CLI config for metric collection.
#[derive(Debug, Parser)]
pub struct CollectionCLIConfig {
    /// Number of days to collect metrics for, ending tomorrow at midnight UTC.
    #[clap(long, default_value_t = 7)]
    period_days: u32,

    /// Aggregation duration of peak metrics.
    #[clap(long, default_value = "1h", value_parser = humantime::parse_duration)]
    aggregation: Duration,
}

/// Validated collection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub period_days: u32,
    pub aggregation_secs: u32,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            period_days: 7,
            aggregation_secs: 3600,
        }
    }
}

impl TryFrom<CollectionCLIConfig> for Collection {
    type Error = OptionsError;

    fn try_from(config: CollectionCLIConfig) -> Result<Self, Self::Error> {
        if config.period_days == 0 {
            return Err(OptionsError::ZeroPeriod);
        }
        if config.period_days > MAX_PERIOD_DAYS {
            return Err(OptionsError::PeriodTooLong(config.period_days));
        }

        // CloudWatch periods are multiples of 60 seconds
        let secs = config.aggregation.as_secs();
        if secs < 60 || secs % 60 != 0 || config.aggregation.subsec_nanos() != 0 {
            return Err(OptionsError::BadAggregation(secs));
        }
        let aggregation_secs =
            u32::try_from(secs).map_err(|_| OptionsError::BadAggregation(secs))?;

        let datapoints = u64::from(config.period_days) * SECS_PER_DAY / secs;
        if datapoints > MAX_DATAPOINTS {
            return Err(OptionsError::TooManyDatapoints { datapoints });
        }

        // older datapoints are only kept at coarser resolution
        for &(age_days, multiple) in RETENTION_GRANULARITY {
            if config.period_days > age_days && aggregation_secs % multiple != 0 {
                return Err(OptionsError::CoarseAggregationRequired { age_days, multiple });
            }
        }

        Ok(Self {
            period_days: config.period_days,
            aggregation_secs,
        })
    }
}

impl Collection {
    /// Statistics period in seconds for metrics of the given kind.
    pub fn period_secs(&self, kind: MetricKind) -> i32 {
        let secs = match kind {
            MetricKind::Peak => u64::from(self.aggregation_secs),
            MetricKind::Average => SECS_PER_DAY * u64::from(self.period_days),
        };
        i32::try_from(secs).unwrap_or(i32::MAX)
    }

    /// Window ending at midnight UTC after `today`.
    pub fn window(&self, today: NaiveDate) -> MetricWindow {
        let end = today
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let start = end
            .checked_sub_days(Days::new(u64::from(self.period_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        MetricWindow { start, end }
    }
}

/// Time range of a metric query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A single `GetMetricStatistics` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub metric: &'static str,
    pub kind: MetricKind,

    /// Dimension name/value pairs.
    pub dimensions: Vec<(&'static str, String)>,
    pub window: MetricWindow,
    pub period_secs: i32,
}

impl MetricQuery {
    pub fn new(
        collection: &Collection,
        window: MetricWindow,
        cluster: &str,
        broker_id: i32,
        metric: &'static str,
        kind: MetricKind,
    ) -> Self {
        let mut dimensions = vec![(CLUSTER_NAME_DIMENSION, cluster.to_owned())];
        if !CLUSTER_LEVEL_METRICS.contains(&metric) {
            dimensions.push((BROKER_ID_DIMENSION, broker_id.to_string()));
        }

        Self {
            metric,
            kind,
            dimensions,
            window,
            period_secs: collection.period_secs(kind),
        }
    }
}

/// Column header of a metric in the cluster data table.
pub fn column_name(metric: &str, kind: MetricKind, period_days: u32) -> String {
    let agg = match kind {
        MetricKind::Average => "avg",
        MetricKind::Peak => "max",
    };
    format!("{metric} ({agg} over last {period_days} days)")
}

/// Largest datapoint, `0` if there are none.
pub fn max_datapoint(averages: impl IntoIterator<Item = f64>) -> f64 {
    averages.into_iter().fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(period_days: u32, aggregation: &str) -> Result<Collection, OptionsError> {
        Collection::try_from(CollectionCLIConfig {
            period_days,
            aggregation: humantime::parse_duration(aggregation).unwrap(),
        })
    }

    #[test]
    fn test_collection_validation() {
        assert_eq!(collection(7, "1h").unwrap(), Collection::default());
        assert_eq!(
            collection(1, "5m").unwrap(),
            Collection {
                period_days: 1,
                aggregation_secs: 300
            }
        );
        assert_eq!(collection(0, "1h").unwrap_err(), OptionsError::ZeroPeriod);
        assert_eq!(
            collection(7, "30s").unwrap_err(),
            OptionsError::BadAggregation(30)
        );
        assert_eq!(
            collection(7, "90s").unwrap_err(),
            OptionsError::BadAggregation(90)
        );
    }

    #[test]
    fn test_collection_bounds() {
        assert_eq!(
            collection(100_000_000, "1d").unwrap_err(),
            OptionsError::PeriodTooLong(100_000_000)
        );
        assert_eq!(
            collection(90, "1h").unwrap_err(),
            OptionsError::TooManyDatapoints { datapoints: 2160 }
        );
        assert_eq!(
            collection(7, "5m").unwrap_err(),
            OptionsError::TooManyDatapoints { datapoints: 2016 }
        );
        assert_eq!(
            collection(14, "5m").unwrap_err(),
            OptionsError::TooManyDatapoints { datapoints: 4032 }
        );
        // exactly at the limit
        assert_eq!(
            collection(60, "1h").unwrap(),
            Collection {
                period_days: 60,
                aggregation_secs: 3600
            }
        );
        assert_eq!(
            collection(20, "1260s").unwrap_err(),
            OptionsError::CoarseAggregationRequired {
                age_days: 15,
                multiple: 300
            }
        );
        assert_eq!(collection(100, "2h").unwrap().period_days, 100);
        assert_eq!(collection(455, "8h").unwrap().aggregation_secs, 8 * 3600);

        let c = collection(455, "8h").unwrap();
        let window = c.window(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(window.start.to_rfc3339(), "2022-12-03T00:00:00+00:00");
    }

    #[test]
    fn test_periods() {
        let c = Collection::default();
        assert_eq!(c.period_secs(MetricKind::Peak), 3600);
        assert_eq!(c.period_secs(MetricKind::Average), 3600 * 24 * 7);
    }

    #[test]
    fn test_average_period_spans_window() {
        let c = collection(3, "15m").unwrap();
        assert_eq!(c.period_secs(MetricKind::Peak), 900);
        assert_eq!(c.period_secs(MetricKind::Average), 3 * 86_400);

        let window = c.window(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            (window.end - window.start).num_seconds(),
            i64::from(c.period_secs(MetricKind::Average))
        );
    }

    #[test]
    fn test_window() {
        let window = Collection::default().window(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(window.end.to_rfc3339(), "2024-03-02T00:00:00+00:00");
        assert_eq!(window.start.to_rfc3339(), "2024-02-24T00:00:00+00:00");
    }

    #[test]
    fn test_query_dimensions() {
        let c = Collection::default();
        let window = c.window(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let q = MetricQuery::new(&c, window, "orders", 2, "BytesInPerSec", MetricKind::Peak);
        assert_eq!(
            q.dimensions,
            vec![
                (CLUSTER_NAME_DIMENSION, "orders".to_string()),
                (BROKER_ID_DIMENSION, "2".to_string()),
            ]
        );
        assert_eq!(q.period_secs, 3600);

        let q = MetricQuery::new(&c, window, "orders", 2, "GlobalTopicCount", MetricKind::Peak);
        assert_eq!(
            q.dimensions,
            vec![(CLUSTER_NAME_DIMENSION, "orders".to_string())]
        );
    }

    #[test]
    fn test_column_name() {
        assert_eq!(
            column_name("CpuUser", MetricKind::Average, 7),
            "CpuUser (avg over last 7 days)"
        );
        assert_eq!(
            column_name("MemoryUsed", MetricKind::Peak, 1),
            "MemoryUsed (max over last 1 days)"
        );
    }

    #[test]
    fn test_max_datapoint() {
        assert_eq!(max_datapoint(std::iter::empty()), 0.0);
        assert_eq!(max_datapoint([1.5, 7.25, 3.0]), 7.25);
        assert_eq!(max_datapoint([-4.0]), 0.0);
    }
}
