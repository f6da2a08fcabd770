use tracing::debug;
use ts_core::NormalizedSeries;

use crate::error::ChartError;
use crate::options::{ChartOptions, VOLUME_SCALE_ID};
use crate::scale::PriceScaleId;
use crate::surface::{ChartSurface, RendererBackend, SeriesId};

/// Where a chart lives: something with a width that can host a backend.
pub trait ChartContainer {
    /// Current layout width in CSS pixels.
    fn client_width(&self) -> f64;
    fn create_backend(
        &self,
        width: f64,
        height: f64,
    ) -> Result<Box<dyn RendererBackend>, ChartError>;
}

/// Container width, with unusable measurements collapsed to 0.
pub fn measure(container: &dyn ChartContainer) -> f64 {
    let width = container.client_width();
    if width.is_finite() && width > 0.0 {
        width
    } else {
        0.0
    }
}

/// The candlestick and histogram series of one chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPair {
    pub price: SeriesId,
    pub volume: SeriesId,
}

/// Builds and feeds the dual-pane price/volume chart.
#[derive(Debug, Clone, Default)]
pub struct ChartEngine {
    options: ChartOptions,
}

impl ChartEngine {
    pub fn new(options: ChartOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn initialize(&self, container: &dyn ChartContainer) -> Result<ChartSurface, ChartError> {
        let width = measure(container);
        let backend = container.create_backend(width, self.options.height)?;
        debug!(width, height = self.options.height, "chart surface created");
        Ok(ChartSurface::new(backend, width, self.options.clone()))
    }

    /// Candles on the default right scale.
    pub fn configure_price_series(&self, surface: &mut ChartSurface) -> Result<SeriesId, ChartError> {
        let id = surface.add_candlestick_series(self.options.candles.clone())?;
        if let Some(scale) = surface.price_scale_mut(&PriceScaleId::Right) {
            scale.set_margins(self.options.price_scale_margins);
        }
        Ok(id)
    }

    /// Volume on its own overlay scale, squeezed into the bottom band.
    pub fn configure_volume_series(
        &self,
        surface: &mut ChartSurface,
    ) -> Result<SeriesId, ChartError> {
        let scale = PriceScaleId::overlay(VOLUME_SCALE_ID);
        let id = surface.add_histogram_series(self.options.volume.clone(), scale.clone())?;
        if let Some(overlay) = surface.price_scale_mut(&scale) {
            overlay.set_margins(self.options.volume_scale_margins);
        }
        Ok(id)
    }

    pub fn configure(&self, surface: &mut ChartSurface) -> Result<SeriesPair, ChartError> {
        Ok(SeriesPair {
            price: self.configure_price_series(surface)?,
            volume: self.configure_volume_series(surface)?,
        })
    }

    /// Replace both series with `series`, fit every bar into view and paint.
    pub fn render(
        &self,
        surface: &mut ChartSurface,
        pair: SeriesPair,
        series: NormalizedSeries,
    ) -> Result<(), ChartError> {
        let bars = series.len();
        surface.set_candles(pair.price, series.candles)?;
        surface.set_histogram(pair.volume, series.volume)?;
        surface.fit_content();
        surface.paint()?;
        debug!(bars, "chart rendered");
        Ok(())
    }

    pub fn teardown(&self, surface: Option<ChartSurface>) {
        if let Some(mut surface) = surface {
            surface.release();
        }
    }
}
