use std::fmt;

use thiserror::Error;
use ts_core::NormalizeError;

use crate::surface::SeriesId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Candlestick,
    Histogram,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKind::Candlestick => f.write_str("candlestick"),
            SeriesKind::Histogram => f.write_str("histogram"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid market data: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("unknown series {0:?}")]
    UnknownSeries(SeriesId),
    #[error("series {id:?} is a {actual} series, expected {expected}")]
    SeriesKind {
        id: SeriesId,
        expected: SeriesKind,
        actual: SeriesKind,
    },
    #[error("renderer backend: {0}")]
    Backend(String),
    #[error("resize subscription: {0}")]
    Subscription(String),
    #[error("chart surface already released")]
    Released,
}
