use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Seconds since Unix epoch.
pub type Timestamp = i64;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timeframe granularities used by the multi-timeframe signal radar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weeks(u32),
}

impl TimeFrame {
    /// Name used as key by the analysis backend ("15m", "1h", "4h", "1d").
    pub fn name(&self) -> String {
        match *self {
            TimeFrame::Minutes(m) => format!("{m}m"),
            TimeFrame::Hours(h) => format!("{h}h"),
            TimeFrame::Days(d) => format!("{d}d"),
            TimeFrame::Weeks(w) => format!("{w}w"),
        }
    }

    /// Parse e.g. "1m", "15m", "1h", "4h", "1d", "1w".
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        let unit = s.chars().last()?;
        let count: u32 = s[..s.len() - unit.len_utf8()]
            .parse()
            .ok()
            .filter(|c| *c > 0)?;
        match unit {
            'm' => Some(TimeFrame::Minutes(count)),
            'h' => Some(TimeFrame::Hours(count)),
            'd' => Some(TimeFrame::Days(count)),
            'w' => Some(TimeFrame::Weeks(count)),
            _ => None,
        }
    }
}

impl std::str::FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeFrame::from_str(s).ok_or_else(|| format!("invalid timeframe: {s}"))
    }
}

/// A point on the shared horizontal axis.
///
/// The backend sends Unix seconds; calendar-day bars use `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarTime {
    Timestamp(Timestamp),
    Date(NaiveDate),
}

impl BarTime {
    /// Short label for the time axis.
    pub fn label(&self) -> String {
        match *self {
            BarTime::Timestamp(ts) => DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.format("%m-%d %H:%M").to_string())
                .unwrap_or_else(|| ts.to_string()),
            BarTime::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }
}

impl From<Timestamp> for BarTime {
    fn from(ts: Timestamp) -> Self {
        BarTime::Timestamp(ts)
    }
}

impl From<NaiveDate> for BarTime {
    fn from(d: NaiveDate) -> Self {
        BarTime::Date(d)
    }
}

impl fmt::Display for BarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarTime::Timestamp(ts) => write!(f, "{ts}"),
            BarTime::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl Serialize for BarTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BarTime::Timestamp(ts) => serializer.serialize_i64(*ts),
            BarTime::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for BarTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match RawTime::deserialize(deserializer)? {
            RawTime::Int(ts) => Ok(BarTime::Timestamp(ts)),
            RawTime::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                Ok(BarTime::Timestamp(f as i64))
            }
            RawTime::Float(f) => Err(D::Error::custom(format!("invalid bar time: {f}"))),
            RawTime::Text(s) => {
                let s = s.trim();
                if let Ok(ts) = s.parse::<i64>() {
                    return Ok(BarTime::Timestamp(ts));
                }
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(BarTime::Date)
                    .map_err(|_| D::Error::custom(format!("invalid bar time: {s:?}")))
            }
        }
    }
}

/// A decimal number carried as text, exactly as received.
///
/// Numbers sent as JSON numbers are kept in their textual form so that all
/// parsing happens in one place ([`normalize`]).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct DecimalText(String);

impl DecimalText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Finite `f64` value, or `None` for empty/garbage/non-finite text.
    pub fn to_f64(&self) -> Option<f64> {
        self.0
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

impl From<&str> for DecimalText {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DecimalText {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<f64> for DecimalText {
    fn from(v: f64) -> Self {
        Self(v.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDecimal {
    Text(String),
    Int(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawDecimal::deserialize(deserializer)? {
            RawDecimal::Text(s) => DecimalText(s),
            RawDecimal::Int(i) => DecimalText(i.to_string()),
            RawDecimal::Float(f) => DecimalText(f.to_string()),
        })
    }
}

/// One OHLCV observation as delivered by the market-data endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: BarTime,
    pub open: DecimalText,
    pub high: DecimalText,
    pub low: DecimalText,
    pub close: DecimalText,
    pub volume: DecimalText,
}

impl Bar {
    pub fn new(
        time: impl Into<BarTime>,
        open: impl Into<DecimalText>,
        high: impl Into<DecimalText>,
        low: impl Into<DecimalText>,
        close: impl Into<DecimalText>,
        volume: impl Into<DecimalText>,
    ) -> Self {
        Self {
            time: time.into(),
            open: open.into(),
            high: high.into(),
            low: low.into(),
            close: close.into(),
            volume: volume.into(),
        }
    }

    /// Convert one bar; `index` is only used for error reporting.
    pub fn parse(&self, index: usize) -> Result<(CandlePoint, VolumeBar), NormalizeError> {
        let field = |field: BarField, text: &DecimalText| {
            text.to_f64().ok_or_else(|| NormalizeError::InvalidField {
                index,
                field,
                value: text.as_str().to_string(),
            })
        };
        let open = field(BarField::Open, &self.open)?;
        let high = field(BarField::High, &self.high)?;
        let low = field(BarField::Low, &self.low)?;
        let close = field(BarField::Close, &self.close)?;
        let volume = field(BarField::Volume, &self.volume)?;

        let candle = CandlePoint {
            time: self.time,
            open,
            high,
            low,
            close,
        };
        let bar = VolumeBar {
            time: self.time,
            value: volume,
            color_tag: ColorTag::from_open_close(open, close),
        };
        Ok((candle, bar))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("bar {index}: field `{field}` is not a finite decimal: {value:?}")]
    InvalidField {
        index: usize,
        field: BarField,
        value: String,
    },
}

/// Price direction of a bar, decided from its own open/close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Up,
    Down,
}

impl ColorTag {
    pub fn from_open_close(open: f64, close: f64) -> Self {
        if close >= open {
            ColorTag::Up
        } else {
            ColorTag::Down
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandlePoint {
    pub time: BarTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl CandlePoint {
    pub fn direction(&self) -> ColorTag {
        ColorTag::from_open_close(self.open, self.close)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBar {
    pub time: BarTime,
    pub value: f64,
    pub color_tag: ColorTag,
}

/// Candle and volume series derived from the same bars in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSeries {
    pub candles: Vec<CandlePoint>,
    pub volume: Vec<VolumeBar>,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Convert raw bars into plot-ready series.
///
/// Fails fast: the first bar with an unparseable or non-finite field rejects
/// the whole batch.
pub fn normalize(bars: &[Bar]) -> Result<NormalizedSeries, NormalizeError> {
    let mut out = NormalizedSeries {
        candles: Vec::with_capacity(bars.len()),
        volume: Vec::with_capacity(bars.len()),
    };
    for (index, bar) in bars.iter().enumerate() {
        let (candle, volume) = bar.parse(index)?;
        out.candles.push(candle);
        out.volume.push(volume);
    }
    Ok(out)
}
