#[cfg(target_arch = "wasm32")]
mod canvas;
mod engine;
mod error;
pub mod headless;
mod lifecycle;
mod options;
mod scale;
mod surface;

pub use engine::{measure, ChartContainer, ChartEngine, SeriesPair};
pub use error::{ChartError, SeriesKind};
pub use lifecycle::{ChartMount, MountPhase, ResizeListener, ResizeSource};
pub use options::*;
pub use scale::{PriceScale, PriceScaleId, ScaleRange, TimeScale};
pub use surface::{
    AxisLabel, CandleGlyph, ChartSurface, Frame, GridLine, HistogramGlyph, RendererBackend,
    SeriesId, TextAlign,
};

#[cfg(target_arch = "wasm32")]
pub use canvas::{CanvasBackend, ElementContainer, WindowResize};
#[cfg(target_arch = "wasm32")]
pub use web::ChartHandle;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::rc::Rc;

    use tracing::warn;
    use ts_core::Bar;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use web_sys::HtmlElement;

    use crate::canvas::{js_error, ElementContainer, WindowResize};
    use crate::{ChartError, ChartMount, MountPhase, ResizeListener};

    fn to_js(err: ChartError) -> JsValue {
        JsValue::from_str(&err.to_string())
    }

    /// Give layout one frame to settle, then measure the container again.
    fn schedule_remeasure(listener: ResizeListener) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let cb = Closure::once_into_js(move || listener());
        if let Err(err) = window.request_animation_frame(cb.unchecked_ref()) {
            warn!(err = %js_error(err), "failed to schedule resize");
        }
    }

    /// Price/volume chart mounted in a DOM element.
    #[wasm_bindgen]
    pub struct ChartHandle {
        mount: ChartMount<ElementContainer, WindowResize>,
    }

    #[wasm_bindgen]
    impl ChartHandle {
        #[wasm_bindgen(constructor)]
        pub fn new(container_id: &str) -> Result<ChartHandle, JsValue> {
            let container = ElementContainer::by_id(container_id).map_err(to_js)?;
            let resize = WindowResize::new().map_err(to_js)?;
            Ok(ChartHandle {
                mount: ChartMount::new(container, resize),
            })
        }

        /// Replace the chart with a JSON array of OHLCV bars.
        ///
        /// An empty array clears the chart. Malformed bars reject the whole
        /// batch and leave the chart empty.
        pub fn set_data(&self, bars_json: &str) -> Result<(), JsValue> {
            let bars: Vec<Bar> =
                serde_json::from_str(bars_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
            self.set_bars(bars.into()).map(|_| ()).map_err(|e| {
                web_sys::console::warn_1(&JsValue::from_str(&e.to_string()));
                to_js(e)
            })
        }

        /// Remove the chart; a later `set_data` draws it again.
        pub fn clear(&self) {
            self.mount.unmount();
        }

        /// "unmounted", "initialized", "configured" or "rendered".
        pub fn phase(&self) -> String {
            format!("{:?}", self.mount.phase()).to_lowercase()
        }

        pub fn generation(&self) -> f64 {
            self.mount.generation() as f64
        }

        /// Remove the chart for good; later `set_data` calls are refused.
        pub fn destroy(&self) {
            self.mount.dispose();
        }
    }

    impl ChartHandle {
        pub fn from_element(element: HtmlElement) -> Result<Self, ChartError> {
            Ok(Self {
                mount: ChartMount::new(ElementContainer::new(element), WindowResize::new()?),
            })
        }

        /// Hand over bars already held by the caller; identity decides rebuilds.
        pub fn set_bars(&self, bars: Rc<[Bar]>) -> Result<MountPhase, ChartError> {
            let before = self.mount.generation();
            let phase = self.mount.set_data(Some(bars))?;
            if self.mount.generation() != before {
                schedule_remeasure(self.mount.resize_trigger());
            }
            Ok(phase)
        }

        pub fn mount(&self) -> &ChartMount<ElementContainer, WindowResize> {
            &self.mount
        }
    }
}
