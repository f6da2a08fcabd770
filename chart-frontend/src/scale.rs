use crate::options::ScaleMargins;

/// Identifies a vertical price scale on a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PriceScaleId {
    /// The default scale candles attach to.
    Right,
    /// An independent scale that shares the plot area but not the range.
    Overlay(String),
}

impl PriceScaleId {
    pub fn overlay(id: impl Into<String>) -> Self {
        PriceScaleId::Overlay(id.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceScale {
    id: PriceScaleId,
    margins: ScaleMargins,
}

impl PriceScale {
    pub fn new(id: PriceScaleId, margins: ScaleMargins) -> Self {
        Self { id, margins }
    }

    pub fn id(&self) -> &PriceScaleId {
        &self.id
    }

    pub fn margins(&self) -> ScaleMargins {
        self.margins
    }

    pub fn set_margins(&mut self, margins: ScaleMargins) {
        self.margins = margins;
    }

    pub fn band(&self, height: f64) -> (f64, f64) {
        self.margins.band(height)
    }
}

/// Value range of a scale, derived from the data attached to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRange {
    pub lo: f64,
    pub hi: f64,
}

impl ScaleRange {
    /// Smallest range covering every `(lo, hi)` extent; flat ranges are widened.
    pub fn from_extents<I: IntoIterator<Item = (f64, f64)>>(extents: I) -> Option<Self> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (a, b) in extents {
            lo = lo.min(a.min(b));
            hi = hi.max(a.max(b));
        }
        if !lo.is_finite() || !hi.is_finite() {
            return None;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            let pad = hi.abs().max(1.0) * 0.5;
            lo -= pad;
            hi += pad;
        }
        Some(Self { lo, hi })
    }

    pub fn span(&self) -> f64 {
        self.hi - self.lo
    }

    /// Project `value` into the pixel band `(top, bottom)`; higher values sit higher.
    pub fn to_y(&self, value: f64, band: (f64, f64)) -> f64 {
        let (top, bottom) = band;
        let frac = (self.hi - value) / self.span();
        top + frac * (bottom - top)
    }

    /// `count` evenly spaced values from `hi` down to `lo`.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        if count < 2 {
            return Vec::new();
        }
        let step = self.span() / (count as f64 - 1.0);
        (0..count).map(|i| self.hi - step * i as f64).collect()
    }
}

/// Horizontal axis: logical bar indices mapped to pixel columns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeScale {
    width: f64,
    len: usize,
    bar_spacing: f64,
}

impl TimeScale {
    pub fn new(width: f64) -> Self {
        Self {
            width,
            len: 0,
            bar_spacing: 0.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bar_spacing(&self) -> f64 {
        self.bar_spacing
    }

    /// Zoom so that all `len` bars fill the current width.
    pub fn fit_content(&mut self, len: usize) {
        self.len = len;
        self.bar_spacing = if len == 0 {
            0.0
        } else {
            self.width / len as f64
        };
    }

    /// Apply a new width; a fitted scale stays fitted.
    pub fn set_width(&mut self, width: f64) {
        self.width = width;
        self.fit_content(self.len);
    }

    /// Center x of the bar at `index`.
    pub fn index_to_x(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.bar_spacing
    }

    /// Indices that get a time label, at most `max_labels` of them.
    pub fn label_indices(&self, max_labels: usize) -> Vec<usize> {
        if self.len == 0 || max_labels == 0 {
            return Vec::new();
        }
        let step = self.len.div_ceil(max_labels).max(1);
        (0..self.len).step_by(step).collect()
    }
}

/// Decimal places for price labels given the visible span.
pub fn price_decimals(span: f64) -> usize {
    if span >= 1000.0 {
        0
    } else if span >= 100.0 {
        1
    } else if span >= 10.0 {
        2
    } else if span >= 1.0 {
        3
    } else if span >= 0.1 {
        4
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_covers_extents() {
        let r = ScaleRange::from_extents(vec![(95.0, 110.0), (100.0, 120.0), (90.0, 101.0)]).unwrap();
        assert_eq!(r.lo, 90.0);
        assert_eq!(r.hi, 120.0);
        assert!(ScaleRange::from_extents(Vec::<(f64, f64)>::new()).is_none());
    }

    #[test]
    fn flat_range_is_widened() {
        let r = ScaleRange::from_extents(vec![(100.0, 100.0)]).unwrap();
        assert!(r.lo < 100.0 && r.hi > 100.0);
        let zero = ScaleRange::from_extents(vec![(0.0, 0.0)]).unwrap();
        assert!(zero.span() > 0.0);
    }

    #[test]
    fn projection_respects_band() {
        let r = ScaleRange { lo: 0.0, hi: 100.0 };
        let band = (320.0, 400.0);
        assert_eq!(r.to_y(100.0, band), 320.0);
        assert_eq!(r.to_y(0.0, band), 400.0);
        assert_eq!(r.to_y(50.0, band), 360.0);
    }

    #[test]
    fn fit_content_spreads_bars_over_width() {
        let mut ts = TimeScale::new(800.0);
        ts.fit_content(4);
        assert_eq!(ts.bar_spacing(), 200.0);
        assert_eq!(ts.index_to_x(0), 100.0);
        assert_eq!(ts.index_to_x(3), 700.0);
        ts.set_width(400.0);
        assert_eq!(ts.bar_spacing(), 100.0);
        assert_eq!(ts.len(), 4);
    }

    #[test]
    fn zero_width_collapses_to_origin() {
        let mut ts = TimeScale::new(0.0);
        ts.fit_content(10);
        assert_eq!(ts.bar_spacing(), 0.0);
        assert_eq!(ts.index_to_x(9), 0.0);
    }

    #[test]
    fn label_indices_are_bounded() {
        let mut ts = TimeScale::new(100.0);
        ts.fit_content(100);
        let idx = ts.label_indices(6);
        assert!(idx.len() <= 6);
        assert_eq!(idx[0], 0);
        ts.fit_content(3);
        assert_eq!(ts.label_indices(6), vec![0, 1, 2]);
    }

    #[test]
    fn ticks_run_top_down() {
        let r = ScaleRange { lo: 10.0, hi: 20.0 };
        assert_eq!(r.ticks(3), vec![20.0, 15.0, 10.0]);
        assert!(r.ticks(1).is_empty());
        assert_eq!(price_decimals(r.span()), 2);
    }
}
