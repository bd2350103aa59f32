//! Typed errors for the config file and CLI options.
use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn the config file into a [`StatsConfig`](crate::accounts::StatsConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("cannot read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path:?} is malformed")]
    Malformed {
        path: PathBuf,
        #[source]
        source: ::config::ConfigError,
    },

    #[error("section [{0}] contains a `.`, which is not allowed in section names")]
    DottedSection(String),

    #[error("config file {0:?} has no account sections")]
    Empty(PathBuf),

    #[error("section [{section}] is missing required key `{key}`")]
    MissingKey { section: String, key: &'static str },

    #[error(
        "section [{0}] must set both `aws_access_key_id` and `aws_secret_access_key`, or neither"
    )]
    PartialCredentials(String),
}

/// Invalid combination of collection options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("collection period must be at least one day")]
    ZeroPeriod,

    #[error("collection period of {0} days exceeds the {max} days CloudWatch retains", max = crate::metrics::MAX_PERIOD_DAYS)]
    PeriodTooLong(u32),

    #[error(
        "{datapoints} datapoints per metric exceed the CloudWatch limit of {max}, use a longer aggregation",
        max = crate::metrics::MAX_DATAPOINTS
    )]
    TooManyDatapoints { datapoints: u64 },

    #[error("aggregation over data older than {age_days} days must be a multiple of {multiple}s")]
    CoarseAggregationRequired { age_days: u32, multiple: u32 },

    #[error("aggregation duration must be a whole number of minutes and at least 1m, got {0}s")]
    BadAggregation(u64),
}
