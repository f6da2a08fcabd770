use std::collections::HashMap;
use std::rc::Rc;

use analysis_client::{
    Analysis, AnalysisClient, AnalyzeResponse, FearGreed, NewsItem, ScenarioReport, TrendStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_core::Bar;

pub mod logging;
pub mod views;

pub use views::*;

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::collections::VecDeque;

#[cfg(target_arch = "wasm32")]
use chart_frontend::ChartHandle;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::{future_to_promise, spawn_local};
#[cfg(target_arch = "wasm32")]
use web_sys::Storage;

pub const SYMBOLS: [&str; 3] = ["BTC/USDT", "ETH/USDT", "SOL/USDT"];
pub const DEFAULT_SYMBOL: &str = "BTC/USDT";

pub const ANALYSIS_FAILED_TEXT: &str = "Analysis failed, check the backend connection.";

pub fn is_supported_symbol(symbol: &str) -> bool {
    SYMBOLS.contains(&symbol)
}

/// User choices that survive a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardPrefs {
    pub symbol: String,
}

impl Default for DashboardPrefs {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
        }
    }
}

/// Everything the dashboard shows. Only [`DashboardStore::dispatch`] changes it.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub symbol: String,
    /// Shared with the chart; a new `Rc` means new data.
    pub market_data: Option<Rc<[Bar]>>,
    pub market_error: Option<String>,
    pub market_pending: Option<String>,
    pub analysis: Option<Analysis>,
    pub analysis_pending: Option<String>,
    pub news: Vec<NewsItem>,
    pub fng: Option<FearGreed>,
    pub ui_signals: HashMap<String, TrendStatus>,
    pub scenario: Option<ScenarioReport>,
    pub scenario_error: Option<String>,
    pub scenario_pending: Option<String>,
}

impl DashboardState {
    pub fn new(prefs: &DashboardPrefs) -> Self {
        let symbol = if is_supported_symbol(&prefs.symbol) {
            prefs.symbol.clone()
        } else {
            DEFAULT_SYMBOL.to_string()
        };
        Self {
            symbol,
            market_data: None,
            market_error: None,
            market_pending: None,
            analysis: None,
            analysis_pending: None,
            news: Vec::new(),
            fng: None,
            ui_signals: HashMap::new(),
            scenario: None,
            scenario_error: None,
            scenario_pending: None,
        }
    }

    pub fn prefs(&self) -> DashboardPrefs {
        DashboardPrefs {
            symbol: self.symbol.clone(),
        }
    }

    pub fn market_loading(&self) -> bool {
        self.market_pending.is_some()
    }

    pub fn analysis_loading(&self) -> bool {
        self.analysis_pending.is_some()
    }

    pub fn scenario_loading(&self) -> bool {
        self.scenario_pending.is_some()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(&DashboardPrefs::default())
    }
}

#[derive(Debug, Clone)]
pub enum DashboardAction {
    SelectSymbol(String),
    RefreshRequested,
    MarketDataLoaded { symbol: String, bars: Rc<[Bar]> },
    MarketDataFailed { symbol: String, error: String },
    AnalysisRequested,
    AnalysisLoaded { symbol: String, response: Box<AnalyzeResponse> },
    AnalysisFailed { symbol: String, error: String },
    ScenarioRequested,
    ScenarioLoaded { symbol: String, report: Box<ScenarioReport> },
    ScenarioFailed { symbol: String, error: String },
}

/// Backend call the shell has to make on behalf of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    MarketData(String),
    Analyze(String),
    Scenario(String),
}

impl Request {
    /// Run the call and turn its outcome into the follow-up action.
    pub async fn perform(self, client: &AnalysisClient) -> DashboardAction {
        match self {
            Request::MarketData(symbol) => match client.market_data(&symbol).await {
                Ok(md) => DashboardAction::MarketDataLoaded {
                    symbol,
                    bars: md.data.into(),
                },
                Err(err) => DashboardAction::MarketDataFailed {
                    symbol,
                    error: err.to_string(),
                },
            },
            Request::Analyze(symbol) => match client.analyze(&symbol).await {
                Ok(response) => DashboardAction::AnalysisLoaded {
                    symbol,
                    response: Box::new(response),
                },
                Err(err) => DashboardAction::AnalysisFailed {
                    symbol,
                    error: err.to_string(),
                },
            },
            Request::Scenario(symbol) => match client.scenario_analysis(&symbol).await {
                Ok(report) => DashboardAction::ScenarioLoaded {
                    symbol,
                    report: Box::new(report),
                },
                Err(err) => DashboardAction::ScenarioFailed {
                    symbol,
                    error: err.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(Request),
    /// Chart input changed; hand the current [`chart_view`] to the chart.
    UpdateChart,
    SavePrefs,
}

/// Clear `pending` if it was waiting for `symbol`.
fn settle(pending: &mut Option<String>, symbol: &str) {
    if pending.as_deref() == Some(symbol) {
        *pending = None;
    }
}

pub struct DashboardStore {
    state: DashboardState,
    revision: u64,
    closed: bool,
}

impl DashboardStore {
    pub fn new(initial: DashboardState) -> Self {
        Self {
            state: initial,
            revision: 0,
            closed: false,
        }
    }

    pub fn with_default() -> Self {
        Self::new(DashboardState::default())
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    /// Bumped by every action that was not ignored.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stop reacting to actions, e.g. results that land after the page
    /// tore the dashboard down.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn dispatch(&mut self, action: DashboardAction) -> Vec<Effect> {
        if self.closed {
            debug!("store closed, action dropped");
            return Vec::new();
        }
        match self.reduce(action) {
            Some(effects) => {
                self.revision += 1;
                effects
            }
            None => Vec::new(),
        }
    }

    /// `None` means the action was ignored.
    fn reduce(&mut self, action: DashboardAction) -> Option<Vec<Effect>> {
        let s = &mut self.state;
        match action {
            DashboardAction::SelectSymbol(symbol) => {
                if !is_supported_symbol(&symbol) {
                    warn!(%symbol, "unsupported symbol");
                    return None;
                }
                if symbol == s.symbol {
                    return None;
                }
                s.symbol = symbol;
                s.market_data = None;
                s.market_error = None;
                s.market_pending = Some(s.symbol.clone());
                Some(vec![
                    Effect::SavePrefs,
                    Effect::UpdateChart,
                    Effect::Fetch(Request::MarketData(s.symbol.clone())),
                ])
            }
            DashboardAction::RefreshRequested => {
                s.market_pending = Some(s.symbol.clone());
                Some(vec![Effect::Fetch(Request::MarketData(s.symbol.clone()))])
            }
            DashboardAction::MarketDataLoaded { symbol, bars } => {
                settle(&mut s.market_pending, &symbol);
                if symbol != s.symbol {
                    debug!(%symbol, "dropping market data for inactive symbol");
                    return Some(Vec::new());
                }
                s.market_data = Some(bars);
                s.market_error = None;
                Some(vec![Effect::UpdateChart])
            }
            DashboardAction::MarketDataFailed { symbol, error } => {
                settle(&mut s.market_pending, &symbol);
                warn!(%symbol, %error, "market data request failed");
                if symbol != s.symbol {
                    return Some(Vec::new());
                }
                s.market_error = Some(error);
                Some(vec![Effect::UpdateChart])
            }
            DashboardAction::AnalysisRequested => {
                if s.analysis_pending.is_some() {
                    return None;
                }
                s.analysis_pending = Some(s.symbol.clone());
                Some(vec![Effect::Fetch(Request::Analyze(s.symbol.clone()))])
            }
            DashboardAction::AnalysisLoaded { symbol, response } => {
                settle(&mut s.analysis_pending, &symbol);
                if symbol != s.symbol {
                    return Some(Vec::new());
                }
                let response = *response;
                s.analysis = Some(response.analysis);
                s.news = response.news;
                s.fng = response.fng;
                s.ui_signals = response.ui_signals;
                Some(Vec::new())
            }
            DashboardAction::AnalysisFailed { symbol, error } => {
                settle(&mut s.analysis_pending, &symbol);
                warn!(%symbol, %error, "analysis request failed");
                if symbol != s.symbol {
                    return Some(Vec::new());
                }
                s.analysis = Some(Analysis::Text(ANALYSIS_FAILED_TEXT.to_string()));
                Some(Vec::new())
            }
            DashboardAction::ScenarioRequested => {
                if s.scenario_pending.is_some() {
                    return None;
                }
                s.scenario_pending = Some(s.symbol.clone());
                Some(vec![Effect::Fetch(Request::Scenario(s.symbol.clone()))])
            }
            DashboardAction::ScenarioLoaded { symbol, report } => {
                settle(&mut s.scenario_pending, &symbol);
                if symbol != s.symbol {
                    return Some(Vec::new());
                }
                s.scenario = Some(*report);
                s.scenario_error = None;
                Some(Vec::new())
            }
            DashboardAction::ScenarioFailed { symbol, error } => {
                settle(&mut s.scenario_pending, &symbol);
                warn!(%symbol, %error, "scenario request failed");
                if symbol != s.symbol {
                    return Some(Vec::new());
                }
                s.scenario = None;
                s.scenario_error = Some(error);
                Some(Vec::new())
            }
        }
    }
}

// ---------- Persistence: localStorage ---------------------------------------
#[cfg(target_arch = "wasm32")]
fn local_storage() -> Result<Storage, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let storage = window
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("localStorage unavailable"))?;
    Ok(storage)
}

#[cfg(target_arch = "wasm32")]
pub fn save_prefs_to_local_storage(key: &str, prefs: &DashboardPrefs) -> Result<(), JsValue> {
    let storage = local_storage()?;
    let json = serde_json::to_string(prefs).map_err(|e| JsValue::from_str(&e.to_string()))?;
    storage.set_item(key, &json)?;
    Ok(())
}

/// Returns Ok(None) if nothing was stored.
#[cfg(target_arch = "wasm32")]
pub fn load_prefs_from_local_storage(key: &str) -> Result<Option<DashboardPrefs>, JsValue> {
    let storage = local_storage()?;
    match storage.get_item(key)? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| JsValue::from_str(&e.to_string())),
        None => Ok(None),
    }
}

// ---------- UI shell (wasm) -------------------------------------------------

#[cfg(target_arch = "wasm32")]
struct ShellInner {
    store: DashboardStore,
    client: AnalysisClient,
    chart: ChartHandle,
    persist_key: String,
    on_change: Option<js_sys::Function>,
}

#[cfg(target_arch = "wasm32")]
impl ShellInner {
    /// Apply `action`, run its local effects, return the backend calls it needs.
    fn apply(&mut self, action: DashboardAction) -> Vec<Request> {
        let mut requests = Vec::new();
        for effect in self.store.dispatch(action) {
            match effect {
                Effect::Fetch(request) => requests.push(request),
                Effect::UpdateChart => self.update_chart(),
                Effect::SavePrefs => {
                    if let Err(err) =
                        save_prefs_to_local_storage(&self.persist_key, &self.store.state().prefs())
                    {
                        web_sys::console::error_1(&err);
                    }
                }
            }
        }
        requests
    }

    fn update_chart(&self) {
        match chart_view(self.store.state()) {
            ChartView::Chart(bars) => {
                if let Err(err) = self.chart.set_bars(bars) {
                    web_sys::console::error_1(&JsValue::from_str(&err.to_string()));
                }
            }
            ChartView::Placeholder(_) | ChartView::Failed(_) => self.chart.clear(),
        }
    }
}

/// Hand the host a fresh snapshot. The callback runs with no borrow held so
/// it may call back into the shell.
#[cfg(target_arch = "wasm32")]
fn notify(inner: &Rc<RefCell<ShellInner>>) {
    let (cb, json) = {
        let inner = inner.borrow();
        let Some(cb) = inner.on_change.clone() else {
            return;
        };
        (cb, serde_json::to_string(&snapshot(inner.store.state())))
    };
    match json {
        Ok(json) => {
            if let Err(err) = cb.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                web_sys::console::error_1(&err);
            }
        }
        Err(err) => web_sys::console::error_1(&JsValue::from_str(&err.to_string())),
    }
}

#[cfg(target_arch = "wasm32")]
fn step(inner: &Rc<RefCell<ShellInner>>, action: DashboardAction) -> Vec<Request> {
    let requests = inner.borrow_mut().apply(action);
    notify(inner);
    requests
}

#[cfg(target_arch = "wasm32")]
async fn run(inner: Rc<RefCell<ShellInner>>, action: DashboardAction) {
    let mut pending: VecDeque<Request> = step(&inner, action).into();
    while let Some(request) = pending.pop_front() {
        let client = inner.borrow().client.clone();
        let next = request.perform(&client).await;
        pending.extend(step(&inner, next));
    }
}

/// Browser entry point: owns the store, the backend client and the chart.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct DashboardShell {
    inner: Rc<RefCell<ShellInner>>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl DashboardShell {
    #[wasm_bindgen(constructor)]
    pub fn new(
        chart_container_id: &str,
        persist_key: &str,
        api_base: &str,
    ) -> Result<DashboardShell, JsValue> {
        console_error_panic_hook::set_once();
        logging::init_console_logging();

        let chart = ChartHandle::new(chart_container_id)?;
        let config = analysis_client::ApiConfig::new(api_base);
        let client = AnalysisClient::new(config).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let prefs = load_prefs_from_local_storage(persist_key)?.unwrap_or_default();

        let inner = Rc::new(RefCell::new(ShellInner {
            store: DashboardStore::new(DashboardState::new(&prefs)),
            client,
            chart,
            persist_key: persist_key.to_string(),
            on_change: None,
        }));
        // Load the chart right away, like a first page visit.
        spawn_local(run(inner.clone(), DashboardAction::RefreshRequested));
        Ok(DashboardShell { inner })
    }

    /// Called with a JSON snapshot after every state change.
    pub fn set_on_change(&self, cb: js_sys::Function) {
        self.inner.borrow_mut().on_change = Some(cb);
    }

    pub fn select_symbol(&self, symbol: &str) -> js_sys::Promise {
        self.spawn(DashboardAction::SelectSymbol(symbol.to_string()))
    }

    pub fn refresh(&self) -> js_sys::Promise {
        self.spawn(DashboardAction::RefreshRequested)
    }

    pub fn ask_ai(&self) -> js_sys::Promise {
        self.spawn(DashboardAction::AnalysisRequested)
    }

    pub fn run_scenario(&self) -> js_sys::Promise {
        self.spawn(DashboardAction::ScenarioRequested)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&snapshot(self.inner.borrow().store.state()))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.store.close();
        inner.on_change = None;
        inner.chart.destroy();
    }
}

#[cfg(target_arch = "wasm32")]
impl DashboardShell {
    fn spawn(&self, action: DashboardAction) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            run(inner, action).await;
            Ok(JsValue::UNDEFINED)
        })
    }
}
