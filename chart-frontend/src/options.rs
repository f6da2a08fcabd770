use serde::{Deserialize, Serialize};

pub const CHART_HEIGHT: f64 = 400.0;

pub const BACKGROUND_COLOR: &str = "#ffffff";
pub const TEXT_COLOR: &str = "#333";
pub const GRID_COLOR: &str = "#e1e1e1";

pub const UP_COLOR: &str = "#26a69a";
pub const DOWN_COLOR: &str = "#ef5350";
pub const VOLUME_UP_COLOR: &str = "rgba(38, 166, 154, 0.5)";
pub const VOLUME_DOWN_COLOR: &str = "rgba(239, 83, 80, 0.5)";

/// Id of the overlay scale the volume histogram lives on.
pub const VOLUME_SCALE_ID: &str = "volume";

/// Fractional space kept free above and below a price scale's content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleMargins {
    pub top: f64,
    pub bottom: f64,
}

impl ScaleMargins {
    pub const fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }

    /// Pixel band `(top, bottom)` this scale may draw into.
    ///
    /// Margins are clamped so the band never inverts.
    pub fn band(&self, height: f64) -> (f64, f64) {
        let top = self.top.clamp(0.0, 1.0);
        let bottom = self.bottom.clamp(0.0, 1.0 - top);
        (height * top, height * (1.0 - bottom))
    }
}

/// No margins: the scale spans the full pane height.
impl Default for ScaleMargins {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub background: String,
    pub text_color: String,
    pub font: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            background: BACKGROUND_COLOR.to_string(),
            text_color: TEXT_COLOR.to_string(),
            font: "12px 'Inter', sans-serif".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    pub vert_lines: String,
    pub horz_lines: String,
    /// Number of horizontal lines (one per price label).
    pub price_lines: usize,
    /// Upper bound on vertical lines (one per time label).
    pub time_lines: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            vert_lines: GRID_COLOR.to_string(),
            horz_lines: GRID_COLOR.to_string(),
            price_lines: 5,
            time_lines: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickOptions {
    pub up_color: String,
    pub down_color: String,
    pub wick_up_color: String,
    pub wick_down_color: String,
    pub border_visible: bool,
    pub border_up_color: String,
    pub border_down_color: String,
}

impl Default for CandlestickOptions {
    fn default() -> Self {
        Self {
            up_color: UP_COLOR.to_string(),
            down_color: DOWN_COLOR.to_string(),
            wick_up_color: UP_COLOR.to_string(),
            wick_down_color: DOWN_COLOR.to_string(),
            border_visible: false,
            border_up_color: UP_COLOR.to_string(),
            border_down_color: DOWN_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramOptions {
    pub up_color: String,
    pub down_color: String,
    /// Value the bars grow from.
    pub base: f64,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            up_color: VOLUME_UP_COLOR.to_string(),
            down_color: VOLUME_DOWN_COLOR.to_string(),
            base: 0.0,
        }
    }
}

/// Static visual configuration of a chart.
///
/// The defaults are the dashboard's look: 400px tall, white background,
/// teal/red candles, volume confined to the bottom fifth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub height: f64,
    pub layout: LayoutOptions,
    pub grid: GridOptions,
    pub candles: CandlestickOptions,
    pub volume: HistogramOptions,
    pub price_scale_margins: ScaleMargins,
    pub volume_scale_margins: ScaleMargins,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            height: CHART_HEIGHT,
            layout: LayoutOptions::default(),
            grid: GridOptions::default(),
            candles: CandlestickOptions::default(),
            volume: HistogramOptions::default(),
            price_scale_margins: ScaleMargins::new(0.1, 0.2),
            volume_scale_margins: ScaleMargins::new(0.8, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_keeps_volume_in_bottom_fifth() {
        let opts = ChartOptions::default();
        let (vol_top, vol_bottom) = opts.volume_scale_margins.band(opts.height);
        let (price_top, price_bottom) = opts.price_scale_margins.band(opts.height);
        assert_eq!(vol_top, 320.0);
        assert_eq!(vol_bottom, 400.0);
        assert!(price_top >= 0.0);
        assert!(price_bottom <= vol_top);
    }

    #[test]
    fn band_never_inverts() {
        let (top, bottom) = ScaleMargins::new(0.9, 0.5).band(100.0);
        assert_eq!(top, 90.0);
        assert_eq!(bottom, 90.0);
        let (top, bottom) = ScaleMargins::new(-1.0, 2.0).band(100.0);
        assert_eq!(top, 0.0);
        assert_eq!(bottom, 0.0);
    }

    #[test]
    fn default_margins_span_full_height() {
        assert_eq!(ScaleMargins::default().band(400.0), (0.0, 400.0));
    }

    #[test]
    fn partial_options_fill_defaults() {
        let opts: ChartOptions = serde_json::from_str(r#"{"height": 300.0}"#).unwrap();
        assert_eq!(opts.height, 300.0);
        assert_eq!(opts.candles.up_color, UP_COLOR);
        assert!(!opts.candles.border_visible);
        assert_eq!(opts.volume_scale_margins, ScaleMargins::new(0.8, 0.0));
    }
}
