use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::engine::ChartContainer;
use crate::error::ChartError;
use crate::lifecycle::{ResizeListener, ResizeSource};
use crate::surface::{AxisLabel, CandleGlyph, GridLine, HistogramGlyph, RendererBackend};

/// Something observable that happened to a headless chart.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Created { width: f64, height: f64 },
    Painted { width: f64, candles: usize, bars: usize },
    Released,
    Subscribed(u32),
    Unsubscribed(u32),
}

/// Shared, append-only record of [`SurfaceEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<SurfaceEvent>>>);

impl EventLog {
    pub fn push(&self, event: SurfaceEvent) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&SurfaceEvent) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    pub fn last_paint(&self) -> Option<SurfaceEvent> {
        self.0
            .borrow()
            .iter()
            .rev()
            .find(|e| matches!(e, SurfaceEvent::Painted { .. }))
            .cloned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Backend that draws nothing and records what it was asked to draw.
pub struct RecordingBackend {
    log: EventLog,
    width: f64,
    candles: usize,
    bars: usize,
    released: bool,
}

impl RecordingBackend {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            width: 0.0,
            candles: 0,
            bars: 0,
            released: false,
        }
    }
}

impl RendererBackend for RecordingBackend {
    fn begin_frame(&mut self, width: f64, _height: f64, _clear_color: &str) {
        self.width = width;
        self.candles = 0;
        self.bars = 0;
    }

    fn draw_grid(&mut self, _lines: &[GridLine], _color: &str) {}

    fn draw_histogram(&mut self, bars: &[HistogramGlyph]) {
        self.bars += bars.len();
    }

    fn draw_candles(&mut self, candles: &[CandleGlyph]) {
        self.candles += candles.len();
    }

    fn draw_labels(&mut self, _labels: &[AxisLabel], _color: &str, _font: &str) {}

    fn end_frame(&mut self) {
        self.log.push(SurfaceEvent::Painted {
            width: self.width,
            candles: self.candles,
            bars: self.bars,
        });
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.push(SurfaceEvent::Released);
        }
    }
}

/// Container with a width the caller controls.
#[derive(Clone)]
pub struct HeadlessContainer {
    width: Rc<Cell<f64>>,
    refuse_backend: Rc<Cell<bool>>,
    log: EventLog,
}

impl HeadlessContainer {
    pub fn new(width: f64, log: EventLog) -> Self {
        Self {
            width: Rc::new(Cell::new(width)),
            refuse_backend: Rc::new(Cell::new(false)),
            log,
        }
    }

    pub fn set_width(&self, width: f64) {
        self.width.set(width);
    }

    /// Make backend creation fail until switched back.
    pub fn refuse_backend(&self, refuse: bool) {
        self.refuse_backend.set(refuse);
    }
}

impl ChartContainer for HeadlessContainer {
    fn client_width(&self) -> f64 {
        self.width.get()
    }

    fn create_backend(
        &self,
        width: f64,
        height: f64,
    ) -> Result<Box<dyn RendererBackend>, ChartError> {
        if self.refuse_backend.get() {
            return Err(ChartError::Backend("container refused a backend".into()));
        }
        self.log.push(SurfaceEvent::Created { width, height });
        Ok(Box::new(RecordingBackend::new(self.log.clone())))
    }
}

/// Resize source driven by hand.
#[derive(Clone)]
pub struct ManualResize {
    listeners: Rc<RefCell<Vec<(u32, ResizeListener)>>>,
    next_id: Rc<Cell<u32>>,
    fail_next: Rc<Cell<bool>>,
    log: EventLog,
}

impl ManualResize {
    pub fn new(log: EventLog) -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_id: Rc::new(Cell::new(1)),
            fail_next: Rc::new(Cell::new(false)),
            log,
        }
    }

    /// Fire every current listener, as a window resize would.
    pub fn notify(&self) {
        for listener in self.listeners() {
            listener();
        }
    }

    /// Snapshot of the registered listeners.
    pub fn listeners(&self) -> Vec<ResizeListener> {
        self.listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Make the next subscription attempt fail.
    pub fn fail_next_subscribe(&self) {
        self.fail_next.set(true);
    }
}

impl ResizeSource for ManualResize {
    type Subscription = u32;

    fn subscribe(&self, listener: ResizeListener) -> Result<u32, ChartError> {
        if self.fail_next.replace(false) {
            return Err(ChartError::Subscription("listener rejected".into()));
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        self.log.push(SurfaceEvent::Subscribed(id));
        Ok(id)
    }

    fn unsubscribe(&self, subscription: u32) {
        self.listeners.borrow_mut().retain(|(id, _)| *id != subscription);
        self.log.push(SurfaceEvent::Unsubscribed(subscription));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_resize_tracks_listeners() {
        let log = EventLog::default();
        let source = ManualResize::new(log.clone());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = source
            .subscribe(Rc::new(move || h.set(h.get() + 1)))
            .unwrap();
        source.notify();
        source.notify();
        assert_eq!(hits.get(), 2);
        source.unsubscribe(sub);
        source.notify();
        assert_eq!(hits.get(), 2);
        assert_eq!(source.listener_count(), 0);
        assert_eq!(
            log.events(),
            vec![SurfaceEvent::Subscribed(1), SurfaceEvent::Unsubscribed(1)]
        );
    }

    #[test]
    fn failed_subscribe_is_one_shot() {
        let source = ManualResize::new(EventLog::default());
        source.fail_next_subscribe();
        assert!(source.subscribe(Rc::new(|| {})).is_err());
        assert!(source.subscribe(Rc::new(|| {})).is_ok());
    }
}
