use tracing::debug;
use ts_core::{CandlePoint, ColorTag, VolumeBar};

use crate::error::{ChartError, SeriesKind};
use crate::options::{CandlestickOptions, ChartOptions, HistogramOptions, ScaleMargins};
use crate::scale::{price_decimals, PriceScale, PriceScaleId, ScaleRange, TimeScale};

/// Handle to a series attached to a [`ChartSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId(u32);

// ---------- frame primitives ------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CandleGlyph {
    pub x: f64,
    pub half_width: f64,
    pub wick_top: f64,
    pub wick_bottom: f64,
    pub body_top: f64,
    pub body_bottom: f64,
    pub body_color: String,
    pub wick_color: String,
    pub border_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramGlyph {
    pub x: f64,
    pub half_width: f64,
    pub top: f64,
    pub bottom: f64,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Center,
    Right,
}

impl TextAlign {
    pub fn as_css(&self) -> &'static str {
        match self {
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub align: TextAlign,
}

/// Everything needed to paint one chart, in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: f64,
    pub height: f64,
    pub background: String,
    pub text_color: String,
    pub font: String,
    pub vert_line_color: String,
    pub horz_line_color: String,
    pub vert_lines: Vec<GridLine>,
    pub horz_lines: Vec<GridLine>,
    pub price_labels: Vec<AxisLabel>,
    pub time_labels: Vec<AxisLabel>,
    pub histogram: Vec<HistogramGlyph>,
    pub candles: Vec<CandleGlyph>,
}

impl Frame {
    pub fn paint(&self, backend: &mut dyn RendererBackend) {
        backend.begin_frame(self.width, self.height, &self.background);
        backend.draw_grid(&self.vert_lines, &self.vert_line_color);
        backend.draw_grid(&self.horz_lines, &self.horz_line_color);
        // Volume goes under the candles.
        backend.draw_histogram(&self.histogram);
        backend.draw_candles(&self.candles);
        backend.draw_labels(&self.price_labels, &self.text_color, &self.font);
        backend.draw_labels(&self.time_labels, &self.text_color, &self.font);
        backend.end_frame();
    }
}

/// Drawing target a surface paints into.
pub trait RendererBackend {
    fn begin_frame(&mut self, width: f64, height: f64, clear_color: &str);
    fn draw_grid(&mut self, lines: &[GridLine], color: &str);
    fn draw_histogram(&mut self, bars: &[HistogramGlyph]);
    fn draw_candles(&mut self, candles: &[CandleGlyph]);
    fn draw_labels(&mut self, labels: &[AxisLabel], color: &str, font: &str);
    fn end_frame(&mut self) {}
    /// Give back whatever the backend holds (canvas element, buffers).
    fn release(&mut self);
}

// ---------- series ----------------------------------------------------------

#[derive(Debug, Clone)]
enum SeriesData {
    Candles(CandlestickOptions, Vec<CandlePoint>),
    Histogram(HistogramOptions, Vec<VolumeBar>),
}

#[derive(Debug, Clone)]
struct Series {
    id: SeriesId,
    scale: PriceScaleId,
    data: SeriesData,
}

impl Series {
    fn kind(&self) -> SeriesKind {
        match self.data {
            SeriesData::Candles(..) => SeriesKind::Candlestick,
            SeriesData::Histogram(..) => SeriesKind::Histogram,
        }
    }

    fn len(&self) -> usize {
        match &self.data {
            SeriesData::Candles(_, c) => c.len(),
            SeriesData::Histogram(_, h) => h.len(),
        }
    }

    fn extents(&self) -> Vec<(f64, f64)> {
        match &self.data {
            SeriesData::Candles(_, c) => c.iter().map(|p| (p.low, p.high)).collect(),
            SeriesData::Histogram(opts, h) => h
                .iter()
                .map(|b| (b.value.min(opts.base), b.value.max(opts.base)))
                .collect(),
        }
    }
}

// ---------- surface ---------------------------------------------------------

/// A live chart: one backend, its price scales, one time scale and the
/// series attached to them.
pub struct ChartSurface {
    backend: Box<dyn RendererBackend>,
    options: ChartOptions,
    width: f64,
    height: f64,
    scales: Vec<PriceScale>,
    time_scale: TimeScale,
    series: Vec<Series>,
    next_series_id: u32,
    released: bool,
}

impl ChartSurface {
    pub fn new(backend: Box<dyn RendererBackend>, width: f64, options: ChartOptions) -> Self {
        let height = options.height;
        let right = PriceScale::new(PriceScaleId::Right, options.price_scale_margins);
        Self {
            backend,
            width,
            height,
            scales: vec![right],
            time_scale: TimeScale::new(width),
            series: Vec::new(),
            next_series_id: 1,
            released: false,
            options,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn time_scale(&self) -> &TimeScale {
        &self.time_scale
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn add_candlestick_series(
        &mut self,
        opts: CandlestickOptions,
    ) -> Result<SeriesId, ChartError> {
        self.add_series(PriceScaleId::Right, SeriesData::Candles(opts, Vec::new()))
    }

    /// Attach a histogram to `scale`, creating the scale if it does not exist.
    pub fn add_histogram_series(
        &mut self,
        opts: HistogramOptions,
        scale: PriceScaleId,
    ) -> Result<SeriesId, ChartError> {
        if self.price_scale(&scale).is_none() {
            self.scales
                .push(PriceScale::new(scale.clone(), ScaleMargins::default()));
        }
        self.add_series(scale, SeriesData::Histogram(opts, Vec::new()))
    }

    fn add_series(&mut self, scale: PriceScaleId, data: SeriesData) -> Result<SeriesId, ChartError> {
        if self.released {
            return Err(ChartError::Released);
        }
        let id = SeriesId(self.next_series_id);
        self.next_series_id += 1;
        self.series.push(Series { id, scale, data });
        Ok(id)
    }

    pub fn price_scale(&self, id: &PriceScaleId) -> Option<&PriceScale> {
        self.scales.iter().find(|s| s.id() == id)
    }

    pub fn price_scale_mut(&mut self, id: &PriceScaleId) -> Option<&mut PriceScale> {
        self.scales.iter_mut().find(|s| s.id() == id)
    }

    fn series_mut(&mut self, id: SeriesId) -> Result<&mut Series, ChartError> {
        if self.released {
            return Err(ChartError::Released);
        }
        self.series
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ChartError::UnknownSeries(id))
    }

    /// Replace the whole content of a candlestick series.
    pub fn set_candles(&mut self, id: SeriesId, points: Vec<CandlePoint>) -> Result<(), ChartError> {
        let series = self.series_mut(id)?;
        let actual = series.kind();
        match &mut series.data {
            SeriesData::Candles(_, data) => {
                *data = points;
                Ok(())
            }
            SeriesData::Histogram(..) => Err(ChartError::SeriesKind {
                id,
                expected: SeriesKind::Candlestick,
                actual,
            }),
        }
    }

    /// Replace the whole content of a histogram series.
    pub fn set_histogram(&mut self, id: SeriesId, bars: Vec<VolumeBar>) -> Result<(), ChartError> {
        let series = self.series_mut(id)?;
        let actual = series.kind();
        match &mut series.data {
            SeriesData::Histogram(_, data) => {
                *data = bars;
                Ok(())
            }
            SeriesData::Candles(..) => Err(ChartError::SeriesKind {
                id,
                expected: SeriesKind::Histogram,
                actual,
            }),
        }
    }

    pub fn candles(&self, id: SeriesId) -> Option<&[CandlePoint]> {
        self.series.iter().find(|s| s.id == id).and_then(|s| match &s.data {
            SeriesData::Candles(_, c) => Some(c.as_slice()),
            SeriesData::Histogram(..) => None,
        })
    }

    pub fn histogram(&self, id: SeriesId) -> Option<&[VolumeBar]> {
        self.series.iter().find(|s| s.id == id).and_then(|s| match &s.data {
            SeriesData::Histogram(_, h) => Some(h.as_slice()),
            SeriesData::Candles(..) => None,
        })
    }

    /// Zoom the time scale so every bar of every series is visible.
    pub fn fit_content(&mut self) {
        let len = self.series.iter().map(Series::len).max().unwrap_or(0);
        self.time_scale.fit_content(len);
    }

    /// New container width; height stays fixed.
    pub fn apply_width(&mut self, width: f64) {
        self.width = width;
        self.time_scale.set_width(width);
    }

    pub fn paint(&mut self) -> Result<(), ChartError> {
        if self.released {
            return Err(ChartError::Released);
        }
        let frame = self.frame();
        frame.paint(self.backend.as_mut());
        Ok(())
    }

    /// Drops all series and releases the backend. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.series.clear();
        self.backend.release();
        debug!("chart surface released");
    }

    pub fn frame(&self) -> Frame {
        let layout = &self.options.layout;
        let grid = &self.options.grid;
        let mut frame = Frame {
            width: self.width,
            height: self.height,
            background: layout.background.clone(),
            text_color: layout.text_color.clone(),
            font: layout.font.clone(),
            vert_line_color: grid.vert_lines.clone(),
            horz_line_color: grid.horz_lines.clone(),
            vert_lines: Vec::new(),
            horz_lines: Vec::new(),
            price_labels: Vec::new(),
            time_labels: Vec::new(),
            histogram: Vec::new(),
            candles: Vec::new(),
        };

        let ts = &self.time_scale;
        let half_width = bar_half_width(ts.bar_spacing());

        for scale in &self.scales {
            let attached: Vec<&Series> =
                self.series.iter().filter(|s| &s.scale == scale.id()).collect();
            let Some(range) =
                ScaleRange::from_extents(attached.iter().flat_map(|s| s.extents()))
            else {
                continue;
            };
            let band = scale.band(self.height);

            if scale.id() == &PriceScaleId::Right {
                self.price_axis(&mut frame, &range, band);
            }

            for series in attached {
                match &series.data {
                    SeriesData::Candles(opts, points) => {
                        frame.candles.extend(points.iter().enumerate().map(|(i, p)| {
                            candle_glyph(opts, p, ts.index_to_x(i), half_width, &range, band)
                        }));
                    }
                    SeriesData::Histogram(opts, bars) => {
                        frame.histogram.extend(bars.iter().enumerate().map(|(i, b)| {
                            let color = match b.color_tag {
                                ColorTag::Up => &opts.up_color,
                                ColorTag::Down => &opts.down_color,
                            };
                            let y_value = range.to_y(b.value, band);
                            let y_base = range.to_y(opts.base, band);
                            HistogramGlyph {
                                x: ts.index_to_x(i),
                                half_width,
                                top: y_value.min(y_base),
                                bottom: y_value.max(y_base),
                                color: color.clone(),
                            }
                        }));
                    }
                }
            }
        }

        let labelled = self.series.iter().find(|s| s.len() == ts.len());
        for i in ts.label_indices(grid.time_lines) {
            let x = ts.index_to_x(i);
            frame.vert_lines.push(GridLine {
                x1: x,
                y1: 0.0,
                x2: x,
                y2: self.height,
            });
            let time = labelled.and_then(|s| match &s.data {
                SeriesData::Candles(_, c) => c.get(i).map(|p| p.time),
                SeriesData::Histogram(_, h) => h.get(i).map(|b| b.time),
            });
            if let Some(time) = time {
                frame.time_labels.push(AxisLabel {
                    x,
                    y: self.height - 4.0,
                    text: time.label(),
                    align: TextAlign::Center,
                });
            }
        }

        frame
    }

    fn price_axis(&self, frame: &mut Frame, range: &ScaleRange, band: (f64, f64)) {
        let decimals = price_decimals(range.span());
        for value in range.ticks(self.options.grid.price_lines) {
            let y = range.to_y(value, band);
            frame.horz_lines.push(GridLine {
                x1: 0.0,
                y1: y,
                x2: self.width,
                y2: y,
            });
            frame.price_labels.push(AxisLabel {
                x: (self.width - 4.0).max(0.0),
                y,
                text: format!("{value:.decimals$}"),
                align: TextAlign::Right,
            });
        }
    }
}

impl Drop for ChartSurface {
    fn drop(&mut self) {
        self.release();
    }
}

fn bar_half_width(spacing: f64) -> f64 {
    (spacing * 0.4).max(0.5).min(spacing / 2.0)
}

fn candle_glyph(
    opts: &CandlestickOptions,
    p: &CandlePoint,
    x: f64,
    half_width: f64,
    range: &ScaleRange,
    band: (f64, f64),
) -> CandleGlyph {
    let (body, wick, border) = match p.direction() {
        ColorTag::Up => (&opts.up_color, &opts.wick_up_color, &opts.border_up_color),
        ColorTag::Down => (&opts.down_color, &opts.wick_down_color, &opts.border_down_color),
    };
    let y_open = range.to_y(p.open, band);
    let y_close = range.to_y(p.close, band);
    CandleGlyph {
        x,
        half_width,
        wick_top: range.to_y(p.high, band),
        wick_bottom: range.to_y(p.low, band),
        body_top: y_open.min(y_close),
        body_bottom: y_open.max(y_close),
        body_color: body.clone(),
        wick_color: wick.clone(),
        border_color: opts.border_visible.then(|| border.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{EventLog, RecordingBackend, SurfaceEvent};
    use ts_core::BarTime;

    fn surface(width: f64) -> (ChartSurface, EventLog) {
        let log = EventLog::default();
        let backend = RecordingBackend::new(log.clone());
        (
            ChartSurface::new(Box::new(backend), width, ChartOptions::default()),
            log,
        )
    }

    fn candle(t: i64, o: f64, h: f64, l: f64, c: f64) -> CandlePoint {
        CandlePoint {
            time: BarTime::Timestamp(t),
            open: o,
            high: h,
            low: l,
            close: c,
        }
    }

    #[test]
    fn wrong_series_kind_is_rejected() {
        let (mut s, _) = surface(100.0);
        let candles = s.add_candlestick_series(CandlestickOptions::default()).unwrap();
        let err = s.set_histogram(candles, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ChartError::SeriesKind {
                expected: SeriesKind::Histogram,
                actual: SeriesKind::Candlestick,
                ..
            }
        ));
        assert!(matches!(
            s.set_candles(SeriesId(99), Vec::new()),
            Err(ChartError::UnknownSeries(SeriesId(99)))
        ));
    }

    #[test]
    fn histogram_creates_missing_overlay_scale() {
        let (mut s, _) = surface(100.0);
        let id = PriceScaleId::overlay("vol");
        assert!(s.price_scale(&id).is_none());
        s.add_histogram_series(HistogramOptions::default(), id.clone())
            .unwrap();
        assert!(s.price_scale(&id).is_some());
    }

    #[test]
    fn candle_glyphs_follow_direction_colors() {
        let (mut s, _) = surface(200.0);
        let id = s.add_candlestick_series(CandlestickOptions::default()).unwrap();
        s.set_candles(
            id,
            vec![candle(1, 100.0, 110.0, 95.0, 105.0), candle(2, 105.0, 106.0, 90.0, 92.0)],
        )
        .unwrap();
        s.fit_content();
        let frame = s.frame();
        assert_eq!(frame.candles.len(), 2);
        assert_eq!(frame.candles[0].body_color, crate::options::UP_COLOR);
        assert_eq!(frame.candles[0].wick_color, crate::options::UP_COLOR);
        assert_eq!(frame.candles[1].body_color, crate::options::DOWN_COLOR);
        assert!(frame.candles.iter().all(|c| c.border_color.is_none()));
        assert_eq!(frame.candles[0].x, 50.0);
        assert_eq!(frame.candles[1].x, 150.0);
        assert!(frame.candles[0].wick_top <= frame.candles[0].body_top);
        assert!(frame.candles[0].wick_bottom >= frame.candles[0].body_bottom);
        assert_eq!(frame.price_labels.len(), 5);
        assert_eq!(frame.time_labels.len(), 2);
    }

    #[test]
    fn released_surface_refuses_work() {
        let (mut s, log) = surface(100.0);
        let id = s.add_candlestick_series(CandlestickOptions::default()).unwrap();
        s.release();
        s.release();
        assert!(s.is_released());
        assert_eq!(s.series_count(), 0);
        assert!(matches!(s.paint(), Err(ChartError::Released)));
        assert!(matches!(s.set_candles(id, Vec::new()), Err(ChartError::Released)));
        drop(s);
        assert_eq!(log.count(|e| matches!(e, SurfaceEvent::Released)), 1);
    }

    #[test]
    fn empty_surface_paints_background_only() {
        let (mut s, log) = surface(300.0);
        s.paint().unwrap();
        let frame = s.frame();
        assert!(frame.candles.is_empty());
        assert!(frame.horz_lines.is_empty());
        assert_eq!(frame.background, "#ffffff");
        assert_eq!(log.count(|e| matches!(e, SurfaceEvent::Painted { .. })), 1);
    }
}
