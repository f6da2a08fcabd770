use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};
use ts_core::{normalize, Bar, NormalizedSeries};

use crate::engine::{measure, ChartContainer, ChartEngine, SeriesPair};
use crate::error::ChartError;
use crate::surface::{ChartSurface, Frame};

/// Callback fired on every window resize.
pub type ResizeListener = Rc<dyn Fn()>;

/// A window-level resize notifier.
pub trait ResizeSource {
    /// Token needed to remove a listener again.
    type Subscription: 'static;

    fn subscribe(&self, listener: ResizeListener) -> Result<Self::Subscription, ChartError>;
    fn unsubscribe(&self, subscription: Self::Subscription);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    Unmounted,
    Initialized,
    Configured,
    Rendered,
}

struct MountInner<C, R: ResizeSource> {
    engine: ChartEngine,
    container: C,
    resize: R,
    data: Option<Rc<[Bar]>>,
    surface: Option<ChartSurface>,
    series: Option<SeriesPair>,
    subscription: Option<R::Subscription>,
    phase: MountPhase,
    generation: u64,
    disposed: bool,
}

impl<C: ChartContainer, R: ResizeSource> MountInner<C, R> {
    fn build(&mut self, series: NormalizedSeries, listener: ResizeListener) -> Result<(), ChartError> {
        let result = self.try_build(series, listener);
        if let Err(err) = &result {
            warn!(%err, phase = ?self.phase, "chart build failed");
            self.teardown();
        }
        result
    }

    fn try_build(
        &mut self,
        series: NormalizedSeries,
        listener: ResizeListener,
    ) -> Result<(), ChartError> {
        let bars = series.len();
        let surface = self.surface.insert(self.engine.initialize(&self.container)?);
        self.phase = MountPhase::Initialized;

        let pair = self.engine.configure(surface)?;
        self.series = Some(pair);
        self.phase = MountPhase::Configured;

        self.engine.render(surface, pair, series)?;
        self.phase = MountPhase::Rendered;

        self.subscription = Some(self.resize.subscribe(listener)?);
        self.generation += 1;
        debug!(generation = self.generation, bars, "chart mounted");
        Ok(())
    }

    fn on_resize(&mut self) {
        if self.phase != MountPhase::Rendered {
            return;
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let width = measure(&self.container);
        surface.apply_width(width);
        if let Err(err) = surface.paint() {
            warn!(%err, "repaint after resize failed");
        }
    }

    /// Unsubscribe first, then release the surface.
    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.resize.unsubscribe(subscription);
        }
        self.series = None;
        if self.surface.is_some() {
            debug!(generation = self.generation, "chart torn down");
        }
        self.engine.teardown(self.surface.take());
        self.phase = MountPhase::Unmounted;
    }
}

impl<C, R: ResizeSource> Drop for MountInner<C, R> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.resize.unsubscribe(subscription);
        }
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
    }
}

fn handle_resize<C: ChartContainer, R: ResizeSource>(inner: &RefCell<MountInner<C, R>>) {
    match inner.try_borrow_mut() {
        Ok(mut inner) => inner.on_resize(),
        Err(_) => debug!("resize ignored while chart is busy"),
    }
}

/// Owns one chart for as long as it is mounted in a container.
///
/// Feeding a new bar array (by identity) tears the chart down and builds it
/// again; the surface and the resize subscription are released on unmount,
/// on rebuild and on drop.
pub struct ChartMount<C, R>
where
    C: ChartContainer + 'static,
    R: ResizeSource + 'static,
{
    inner: Rc<RefCell<MountInner<C, R>>>,
}

impl<C, R> ChartMount<C, R>
where
    C: ChartContainer + 'static,
    R: ResizeSource + 'static,
{
    pub fn new(container: C, resize: R) -> Self {
        Self::with_engine(ChartEngine::default(), container, resize)
    }

    pub fn with_engine(engine: ChartEngine, container: C, resize: R) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MountInner {
                engine,
                container,
                resize,
                data: None,
                surface: None,
                series: None,
                subscription: None,
                phase: MountPhase::Unmounted,
                generation: 0,
                disposed: false,
            })),
        }
    }

    /// Hand the chart a new bar array.
    ///
    /// The same `Rc` again is a no-op. Anything else rebuilds from scratch,
    /// even if the content is equal. Empty or absent data leaves the chart
    /// unmounted; a malformed batch is rejected and nothing is drawn.
    /// After [`dispose`](Self::dispose) every call fails with
    /// [`ChartError::Released`].
    pub fn set_data(&self, data: Option<Rc<[Bar]>>) -> Result<MountPhase, ChartError> {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            debug!("data ignored, chart disposed");
            return Err(ChartError::Released);
        }
        let unchanged = match (&inner.data, &data) {
            (Some(current), Some(next)) => Rc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(inner.phase);
        }

        inner.teardown();
        inner.data = data.clone();

        let Some(bars) = data.filter(|bars| !bars.is_empty()) else {
            debug!("no market data, chart left unmounted");
            return Ok(MountPhase::Unmounted);
        };
        let series = match normalize(&bars) {
            Ok(series) => series,
            Err(err) => {
                warn!(%err, "market data rejected");
                return Err(err.into());
            }
        };

        inner.build(series, self.resize_trigger())?;
        Ok(inner.phase)
    }

    /// Tear the chart down; the next `set_data` may build it again.
    pub fn unmount(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.teardown();
        inner.data = None;
    }

    /// Tear the chart down for good. Later data is refused.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.teardown();
        inner.data = None;
        inner.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Re-measure the container and repaint, if a chart is rendered.
    pub fn notify_resize(&self) {
        handle_resize(&self.inner);
    }

    /// Listener that keeps only a weak hold on this mount.
    pub fn resize_trigger(&self) -> ResizeListener {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                handle_resize(&inner);
            }
        })
    }

    pub fn phase(&self) -> MountPhase {
        self.inner.borrow().phase
    }

    /// Number of successful builds so far.
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    pub fn has_surface(&self) -> bool {
        self.inner.borrow().surface.is_some()
    }

    pub fn width(&self) -> Option<f64> {
        self.inner.borrow().surface.as_ref().map(ChartSurface::width)
    }

    pub fn frame(&self) -> Option<Frame> {
        self.inner.borrow().surface.as_ref().map(ChartSurface::frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{EventLog, HeadlessContainer, ManualResize, SurfaceEvent};
    use crate::options::ChartOptions;

    type TestMount = ChartMount<HeadlessContainer, ManualResize>;

    struct Rig {
        mount: TestMount,
        container: HeadlessContainer,
        resize: ManualResize,
        log: EventLog,
    }

    fn rig(width: f64) -> Rig {
        let log = EventLog::default();
        let container = HeadlessContainer::new(width, log.clone());
        let resize = ManualResize::new(log.clone());
        let mount = ChartMount::new(container.clone(), resize.clone());
        Rig {
            mount,
            container,
            resize,
            log,
        }
    }

    fn bars(n: i64, base: f64) -> Rc<[Bar]> {
        (0..n)
            .map(|i| {
                let open = base + (i % 7) as f64;
                let close = if i % 2 == 0 { open + 1.0 } else { open - 1.0 };
                Bar::new(
                    1_700_000_000 + i * 3600,
                    open.to_string(),
                    (open.max(close) + 0.5).to_string(),
                    (open.min(close) - 0.5).to_string(),
                    close.to_string(),
                    (1000 + i * 10).to_string(),
                )
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn created(log: &EventLog) -> usize {
        log.count(|e| matches!(e, SurfaceEvent::Created { .. }))
    }

    fn released(log: &EventLog) -> usize {
        log.count(|e| matches!(e, SurfaceEvent::Released))
    }

    #[test]
    fn rendered_series_are_aligned() {
        let r = rig(800.0);
        let phase = r.mount.set_data(Some(bars(40, 100.0))).unwrap();
        assert_eq!(phase, MountPhase::Rendered);
        let frame = r.mount.frame().unwrap();
        assert_eq!(frame.candles.len(), 40);
        assert_eq!(frame.histogram.len(), 40);
        for (c, h) in frame.candles.iter().zip(&frame.histogram) {
            assert_eq!(c.x, h.x);
        }
        assert_eq!(
            r.log.last_paint(),
            Some(SurfaceEvent::Painted {
                width: 800.0,
                candles: 40,
                bars: 40
            })
        );
        assert_eq!(r.resize.listener_count(), 1);
    }

    #[test]
    fn single_bar_renders_one_of_each() {
        let r = rig(300.0);
        let data: Rc<[Bar]> = vec![Bar::new(1_i64, "100", "110", "95", "105", "1000")].into();
        r.mount.set_data(Some(data)).unwrap();
        let frame = r.mount.frame().unwrap();
        assert_eq!(frame.candles.len(), 1);
        assert_eq!(frame.histogram.len(), 1);
        assert_eq!(frame.candles[0].body_color, crate::options::UP_COLOR);
        assert_eq!(frame.histogram[0].color, crate::options::VOLUME_UP_COLOR);
        assert_eq!(frame.candles[0].x, 150.0);
    }

    #[test]
    fn empty_data_never_initializes() {
        let r = rig(800.0);
        let empty: Rc<[Bar]> = Vec::new().into();
        assert_eq!(
            r.mount.set_data(Some(empty.clone())).unwrap(),
            MountPhase::Unmounted
        );
        assert_eq!(
            r.mount.set_data(Some(empty)).unwrap(),
            MountPhase::Unmounted
        );
        assert_eq!(r.mount.set_data(None).unwrap(), MountPhase::Unmounted);
        assert_eq!(
            r.mount.set_data(Some(Vec::new().into())).unwrap(),
            MountPhase::Unmounted
        );
        assert!(!r.mount.has_surface());
        assert_eq!(r.mount.generation(), 0);
        assert!(r.log.events().is_empty());
    }

    #[test]
    fn resize_after_teardown_is_ignored() {
        let r = rig(800.0);
        r.mount.set_data(Some(bars(10, 50.0))).unwrap();
        let stale = r.resize.listeners();
        let trigger = r.mount.resize_trigger();
        r.mount.unmount();
        assert_eq!(r.resize.listener_count(), 0);

        r.log.clear();
        r.container.set_width(1200.0);
        r.resize.notify();
        for listener in &stale {
            listener();
        }
        trigger();
        r.mount.notify_resize();

        assert!(r.log.events().is_empty());
        assert!(!r.mount.has_surface());
        assert_eq!(r.mount.phase(), MountPhase::Unmounted);
    }

    #[test]
    fn resize_after_drop_is_ignored() {
        let r = rig(800.0);
        r.mount.set_data(Some(bars(10, 50.0))).unwrap();
        let stale = r.resize.listeners();
        drop(r.mount);
        r.log.clear();
        for listener in &stale {
            listener();
        }
        assert!(r.log.events().is_empty());
    }

    #[test]
    fn resize_reapplies_width_and_repaints() {
        let r = rig(800.0);
        r.mount.set_data(Some(bars(8, 10.0))).unwrap();
        r.container.set_width(400.0);
        r.resize.notify();
        assert_eq!(r.mount.width(), Some(400.0));
        let frame = r.mount.frame().unwrap();
        assert_eq!(frame.height, 400.0);
        assert_eq!(frame.candles[0].x, 25.0);
        assert_eq!(
            r.log.last_paint(),
            Some(SurfaceEvent::Painted {
                width: 400.0,
                candles: 8,
                bars: 8
            })
        );
        // Still the same surface.
        assert_eq!(created(&r.log), 1);
    }

    #[test]
    fn zero_width_container_is_corrected_by_resize() {
        let r = rig(0.0);
        r.mount.set_data(Some(bars(4, 10.0))).unwrap();
        assert_eq!(r.mount.width(), Some(0.0));
        assert!(r.mount.frame().unwrap().candles.iter().all(|c| c.x == 0.0));

        r.container.set_width(400.0);
        r.resize.notify();
        let frame = r.mount.frame().unwrap();
        assert_eq!(frame.width, 400.0);
        let xs: Vec<f64> = frame.candles.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![50.0, 150.0, 250.0, 350.0]);
    }

    #[test]
    fn different_length_replaces_everything() {
        let r = rig(600.0);
        r.mount.set_data(Some(bars(30, 100.0))).unwrap();
        r.mount.set_data(Some(bars(3, 100.0))).unwrap();
        let frame = r.mount.frame().unwrap();
        assert_eq!(frame.candles.len(), 3);
        assert_eq!(frame.histogram.len(), 3);
        assert_eq!(created(&r.log), 2);
        assert_eq!(released(&r.log), 1);
        assert_eq!(r.resize.listener_count(), 1);
    }

    #[test]
    fn same_identity_is_a_noop_but_equal_content_rebuilds() {
        let r = rig(600.0);
        let a = bars(5, 20.0);
        r.mount.set_data(Some(a.clone())).unwrap();
        r.mount.set_data(Some(a.clone())).unwrap();
        assert_eq!(r.mount.generation(), 1);
        assert_eq!(created(&r.log), 1);

        let copy: Rc<[Bar]> = a.iter().cloned().collect::<Vec<_>>().into();
        r.mount.set_data(Some(copy)).unwrap();
        assert_eq!(r.mount.generation(), 2);
        assert_eq!(created(&r.log), 2);
    }

    #[test]
    fn a_b_a_ends_like_a_single_render() {
        let a = bars(12, 100.0);
        let b = bars(5, 3000.0);

        let single = rig(700.0);
        single.mount.set_data(Some(a.clone())).unwrap();
        let expected = single.mount.frame().unwrap();

        let r = rig(700.0);
        r.mount.set_data(Some(a.clone())).unwrap();
        r.mount.set_data(Some(b)).unwrap();
        r.mount.set_data(Some(a)).unwrap();

        assert_eq!(r.mount.generation(), 3);
        assert_eq!(r.mount.frame().unwrap(), expected);
        assert_eq!(created(&r.log), 3);
        assert_eq!(released(&r.log), 2);
        assert_eq!(r.resize.listener_count(), 1);
    }

    #[test]
    fn teardown_unsubscribes_before_release() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        r.log.clear();
        r.mount.unmount();
        assert_eq!(
            r.log.events(),
            vec![SurfaceEvent::Unsubscribed(1), SurfaceEvent::Released]
        );
        // A second unmount has nothing left to do.
        r.mount.unmount();
        assert_eq!(r.log.events().len(), 2);
    }

    #[test]
    fn rebuild_unsubscribes_before_release() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        r.log.clear();
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        let events = r.log.events();
        assert_eq!(events[0], SurfaceEvent::Unsubscribed(1));
        assert_eq!(events[1], SurfaceEvent::Released);
        assert!(events.contains(&SurfaceEvent::Subscribed(2)));
    }

    #[test]
    fn disposed_mount_refuses_new_data() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        r.log.clear();
        r.mount.dispose();
        assert!(r.mount.is_disposed());
        assert_eq!(
            r.log.events(),
            vec![SurfaceEvent::Unsubscribed(1), SurfaceEvent::Released]
        );

        r.log.clear();
        let err = r.mount.set_data(Some(bars(9, 20.0))).unwrap_err();
        assert!(matches!(err, ChartError::Released));
        r.container.set_width(900.0);
        r.mount.notify_resize();
        assert!(r.log.events().is_empty());
        assert!(!r.mount.has_surface());
        assert_eq!(r.mount.phase(), MountPhase::Unmounted);
        assert_eq!(r.resize.listener_count(), 0);
        assert_eq!(r.mount.generation(), 1);
    }

    #[test]
    fn unmount_allows_a_later_rebuild() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        r.mount.unmount();
        assert!(!r.mount.is_disposed());
        assert_eq!(
            r.mount.set_data(Some(bars(6, 10.0))).unwrap(),
            MountPhase::Rendered
        );
        assert_eq!(r.mount.generation(), 2);
    }

    /// Fires the listener as soon as it is registered, while the mount is
    /// still borrowed by the build.
    #[derive(Clone)]
    struct EagerResize(ManualResize);

    impl ResizeSource for EagerResize {
        type Subscription = u32;

        fn subscribe(&self, listener: ResizeListener) -> Result<u32, ChartError> {
            listener();
            self.0.subscribe(listener)
        }

        fn unsubscribe(&self, subscription: u32) {
            self.0.unsubscribe(subscription)
        }
    }

    #[test]
    fn resize_during_build_is_skipped() {
        let log = EventLog::default();
        let container = HeadlessContainer::new(600.0, log.clone());
        let resize = ManualResize::new(log.clone());
        let mount = ChartMount::new(container.clone(), EagerResize(resize.clone()));

        assert_eq!(
            mount.set_data(Some(bars(6, 10.0))).unwrap(),
            MountPhase::Rendered
        );
        assert_eq!(log.count(|e| matches!(e, SurfaceEvent::Painted { .. })), 1);
        assert_eq!(mount.width(), Some(600.0));

        // A rebuild goes through the same path.
        assert_eq!(
            mount.set_data(Some(bars(4, 10.0))).unwrap(),
            MountPhase::Rendered
        );
        assert_eq!(resize.listener_count(), 1);

        container.set_width(300.0);
        resize.notify();
        assert_eq!(mount.width(), Some(300.0));
        assert_eq!(
            log.last_paint(),
            Some(SurfaceEvent::Painted {
                width: 300.0,
                candles: 4,
                bars: 4
            })
        );
    }

    #[test]
    fn drop_releases_everything() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        r.log.clear();
        drop(r.mount);
        assert_eq!(
            r.log.events(),
            vec![SurfaceEvent::Unsubscribed(1), SurfaceEvent::Released]
        );
        assert_eq!(r.resize.listener_count(), 0);
    }

    #[test]
    fn volume_stays_in_bottom_fifth() {
        let r = rig(900.0);
        r.mount.set_data(Some(bars(60, 25_000.0))).unwrap();
        let frame = r.mount.frame().unwrap();
        let split = frame.height * 0.8;
        assert!(frame
            .histogram
            .iter()
            .all(|h| h.top >= split - 1e-9 && h.bottom <= frame.height + 1e-9));
        assert!(frame.candles.iter().all(|c| c.wick_bottom <= split + 1e-9));
        assert!(frame.candles.iter().all(|c| c.wick_top >= 0.0));
    }

    #[test]
    fn malformed_batch_renders_nothing() {
        let r = rig(500.0);
        r.mount.set_data(Some(bars(6, 10.0))).unwrap();
        let bad: Rc<[Bar]> = vec![
            Bar::new(1_i64, "1", "2", "0.5", "1.5", "10"),
            Bar::new(2_i64, "1", "abc", "0.5", "1.5", "10"),
        ]
        .into();
        let err = r.mount.set_data(Some(bad)).unwrap_err();
        assert!(matches!(err, ChartError::Normalize(_)));
        assert_eq!(r.mount.phase(), MountPhase::Unmounted);
        assert!(!r.mount.has_surface());
        assert_eq!(created(&r.log), 1);
        assert_eq!(released(&r.log), 1);
    }

    #[test]
    fn partial_build_failures_leave_nothing_behind() {
        let r = rig(500.0);
        r.container.refuse_backend(true);
        let err = r.mount.set_data(Some(bars(6, 10.0))).unwrap_err();
        assert!(matches!(err, ChartError::Backend(_)));
        assert_eq!(r.mount.phase(), MountPhase::Unmounted);
        assert!(r.log.events().is_empty());

        r.container.refuse_backend(false);
        r.resize.fail_next_subscribe();
        let err = r.mount.set_data(Some(bars(6, 10.0))).unwrap_err();
        assert!(matches!(err, ChartError::Subscription(_)));
        assert!(!r.mount.has_surface());
        assert_eq!(released(&r.log), 1);
        assert_eq!(r.resize.listener_count(), 0);
        assert_eq!(r.mount.generation(), 0);

        assert_eq!(
            r.mount.set_data(Some(bars(6, 10.0))).unwrap(),
            MountPhase::Rendered
        );
        assert_eq!(r.mount.generation(), 1);
    }

    #[test]
    fn custom_options_flow_through() {
        let log = EventLog::default();
        let container = HeadlessContainer::new(300.0, log.clone());
        let options = ChartOptions {
            height: 250.0,
            ..ChartOptions::default()
        };
        let mount = ChartMount::with_engine(
            ChartEngine::new(options),
            container,
            ManualResize::new(log.clone()),
        );
        mount.set_data(Some(bars(3, 1.0))).unwrap();
        assert_eq!(mount.frame().unwrap().height, 250.0);
        assert_eq!(
            log.events()[0],
            SurfaceEvent::Created {
                width: 300.0,
                height: 250.0
            }
        );
    }
}
