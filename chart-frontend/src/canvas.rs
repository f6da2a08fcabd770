use tracing::warn;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlElement, Window};

use crate::engine::ChartContainer;
use crate::error::ChartError;
use crate::lifecycle::{ResizeListener, ResizeSource};
use crate::surface::{AxisLabel, CandleGlyph, GridLine, HistogramGlyph, RendererBackend};

pub(crate) fn js_error(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

/// 2D canvas appended to the chart container.
pub struct CanvasBackend {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    released: bool,
}

impl CanvasBackend {
    fn new(canvas: HtmlCanvasElement, ctx: CanvasRenderingContext2d) -> Self {
        Self {
            canvas,
            ctx,
            released: false,
        }
    }
}

impl RendererBackend for CanvasBackend {
    fn begin_frame(&mut self, width: f64, height: f64, clear_color: &str) {
        self.canvas.set_width(width as u32);
        self.canvas.set_height(height as u32);
        self.ctx.set_fill_style_str(clear_color);
        self.ctx.fill_rect(0.0, 0.0, width, height);
    }

    fn draw_grid(&mut self, lines: &[GridLine], color: &str) {
        if lines.is_empty() {
            return;
        }
        let ctx = &self.ctx;
        ctx.set_stroke_style_str(color);
        ctx.set_line_width(1.0);
        ctx.begin_path();
        for l in lines {
            ctx.move_to(l.x1, l.y1);
            ctx.line_to(l.x2, l.y2);
        }
        ctx.stroke();
    }

    fn draw_histogram(&mut self, bars: &[HistogramGlyph]) {
        let ctx = &self.ctx;
        for b in bars {
            ctx.set_fill_style_str(&b.color);
            let h = (b.bottom - b.top).max(1.0);
            ctx.fill_rect(b.x - b.half_width, b.top, b.half_width * 2.0, h);
        }
    }

    fn draw_candles(&mut self, candles: &[CandleGlyph]) {
        let ctx = &self.ctx;
        ctx.set_line_width(1.0);
        for c in candles {
            ctx.set_stroke_style_str(&c.wick_color);
            ctx.begin_path();
            ctx.move_to(c.x, c.wick_top);
            ctx.line_to(c.x, c.wick_bottom);
            ctx.stroke();

            let body_h = (c.body_bottom - c.body_top).max(1.0);
            ctx.set_fill_style_str(&c.body_color);
            ctx.fill_rect(c.x - c.half_width, c.body_top, c.half_width * 2.0, body_h);
            if let Some(border) = &c.border_color {
                ctx.set_stroke_style_str(border);
                ctx.stroke_rect(c.x - c.half_width, c.body_top, c.half_width * 2.0, body_h);
            }
        }
    }

    fn draw_labels(&mut self, labels: &[AxisLabel], color: &str, font: &str) {
        let ctx = &self.ctx;
        ctx.set_fill_style_str(color);
        ctx.set_font(font);
        ctx.set_text_baseline("middle");
        for l in labels {
            ctx.set_text_align(l.align.as_css());
            // Text failures only lose a label.
            let _ = ctx.fill_text(&l.text, l.x, l.y);
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.canvas.remove();
        }
    }
}

/// A DOM element that hosts a chart canvas.
#[derive(Clone)]
pub struct ElementContainer {
    element: HtmlElement,
}

impl ElementContainer {
    pub fn new(element: HtmlElement) -> Self {
        Self { element }
    }

    pub fn by_id(id: &str) -> Result<Self, ChartError> {
        let element = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(id))
            .ok_or_else(|| ChartError::Backend(format!("no element with id {id:?}")))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| ChartError::Backend(format!("element {id:?} is not an HtmlElement")))?;
        Ok(Self::new(element))
    }
}

impl ChartContainer for ElementContainer {
    fn client_width(&self) -> f64 {
        self.element.client_width() as f64
    }

    fn create_backend(
        &self,
        width: f64,
        height: f64,
    ) -> Result<Box<dyn RendererBackend>, ChartError> {
        let document = self
            .element
            .owner_document()
            .ok_or_else(|| ChartError::Backend("container is detached".into()))?;
        let canvas = document
            .create_element("canvas")
            .map_err(|e| ChartError::Backend(js_error(e)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| ChartError::Backend("canvas element expected".into()))?;
        canvas.set_width(width as u32);
        canvas.set_height(height as u32);
        let ctx = canvas
            .get_context("2d")
            .map_err(|e| ChartError::Backend(js_error(e)))?
            .ok_or_else(|| ChartError::Backend("no 2d context".into()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| ChartError::Backend("no 2d context".into()))?;
        self.element
            .append_child(&canvas)
            .map_err(|e| ChartError::Backend(js_error(e)))?;
        Ok(Box::new(CanvasBackend::new(canvas, ctx)))
    }
}

/// `resize` events on the browser window.
pub struct WindowResize {
    window: Window,
}

impl WindowResize {
    pub fn new() -> Result<Self, ChartError> {
        let window =
            web_sys::window().ok_or_else(|| ChartError::Subscription("no window".into()))?;
        Ok(Self { window })
    }
}

impl ResizeSource for WindowResize {
    type Subscription = Closure<dyn Fn()>;

    fn subscribe(&self, listener: ResizeListener) -> Result<Self::Subscription, ChartError> {
        let closure = Closure::<dyn Fn()>::new(move || listener());
        self.window
            .add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref())
            .map_err(|e| ChartError::Subscription(js_error(e)))?;
        Ok(closure)
    }

    fn unsubscribe(&self, subscription: Self::Subscription) {
        if let Err(err) = self
            .window
            .remove_event_listener_with_callback("resize", subscription.as_ref().unchecked_ref())
        {
            warn!(err = %js_error(err), "failed to remove resize listener");
        }
    }
}
