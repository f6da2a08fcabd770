use std::rc::Rc;

use analysis_client::{percent, Advice, Analysis, NewsItem, ScenarioInfo, TrendStatus};
use serde::Serialize;
use serde_json::Value;
use ts_core::{Bar, DecimalText, TimeFrame};

use crate::{DashboardState, SYMBOLS};

pub const LOADING_TEXT: &str = "Loading market data...";

// ---------- chart -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ChartView {
    Placeholder(&'static str),
    Failed(String),
    Chart(Rc<[Bar]>),
}

pub fn chart_view(state: &DashboardState) -> ChartView {
    match (&state.market_data, &state.market_error) {
        (Some(bars), _) if !bars.is_empty() => ChartView::Chart(bars.clone()),
        (_, Some(err)) => ChartView::Failed(format!("Failed to load market data: {err}")),
        _ => ChartView::Placeholder(LOADING_TEXT),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChartSummary {
    Placeholder { text: String },
    Failed { text: String },
    Chart { bars: usize },
}

impl From<&ChartView> for ChartSummary {
    fn from(view: &ChartView) -> Self {
        match view {
            ChartView::Placeholder(text) => ChartSummary::Placeholder {
                text: text.to_string(),
            },
            ChartView::Failed(text) => ChartSummary::Failed { text: text.clone() },
            ChartView::Chart(bars) => ChartSummary::Chart { bars: bars.len() },
        }
    }
}

// ---------- signal radar ----------------------------------------------------

pub const RADAR_TIMEFRAMES: [(TimeFrame, &str); 4] = [
    (TimeFrame::Days(1), "Daily"),
    (TimeFrame::Hours(4), "4 hours"),
    (TimeFrame::Hours(1), "1 hour"),
    (TimeFrame::Minutes(15), "15 minutes"),
];

pub fn trend_color(status: Option<TrendStatus>) -> &'static str {
    match status {
        Some(TrendStatus::Bullish) => "#22c55e",
        Some(TrendStatus::WeakBullish) => "#86efac",
        Some(TrendStatus::Bearish) => "#ef4444",
        Some(TrendStatus::WeakBearish) => "#fca5a5",
        _ => "#9ca3af",
    }
}

pub fn trend_text(status: Option<TrendStatus>) -> &'static str {
    match status {
        Some(TrendStatus::Bullish) => "Strong bullish",
        Some(TrendStatus::WeakBullish) => "Weak bullish",
        Some(TrendStatus::Bearish) => "Strong bearish",
        Some(TrendStatus::WeakBearish) => "Weak bearish",
        _ => "Ranging",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Up,
    Down,
    Flat,
}

impl From<Option<TrendStatus>> for Polarity {
    fn from(status: Option<TrendStatus>) -> Self {
        match status {
            Some(TrendStatus::Bullish | TrendStatus::WeakBullish) => Polarity::Up,
            Some(TrendStatus::Bearish | TrendStatus::WeakBearish) => Polarity::Down,
            _ => Polarity::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarCell {
    pub timeframe: String,
    pub label: &'static str,
    pub status: Option<TrendStatus>,
    pub color: &'static str,
    pub text: &'static str,
    pub polarity: Polarity,
}

/// One cell per radar timeframe; empty until an analysis delivered signals.
pub fn radar_cells(state: &DashboardState) -> Vec<RadarCell> {
    if state.ui_signals.is_empty() {
        return Vec::new();
    }
    RADAR_TIMEFRAMES
        .iter()
        .map(|&(tf, label)| {
            let name = tf.name();
            let status = state.ui_signals.get(&name).copied();
            RadarCell {
                timeframe: name,
                label,
                status,
                color: trend_color(status),
                text: trend_text(status),
                polarity: status.into(),
            }
        })
        .collect()
}

// ---------- fear & greed ----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FngTone {
    Greed,
    Neutral,
    Fear,
}

/// Whole-number reading: above 75 is greed, below 25 is fear.
pub fn fng_tone(value: f64) -> FngTone {
    let v = value.trunc();
    if v > 75.0 {
        FngTone::Greed
    } else if v < 25.0 {
        FngTone::Fear
    } else {
        FngTone::Neutral
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FngGauge {
    pub value: f64,
    pub classification: String,
    pub tone: FngTone,
    pub fill_pct: f64,
    /// Yellow→green fill above 50, red→yellow otherwise.
    pub upper_gradient: bool,
}

pub fn fng_gauge(state: &DashboardState) -> Option<FngGauge> {
    let fng = state.fng.as_ref()?;
    let value = fng.score()?;
    Some(FngGauge {
        value,
        classification: fng.value_classification.clone(),
        tone: fng_tone(value),
        fill_pct: value.clamp(0.0, 100.0),
        upper_gradient: value.trunc() > 50.0,
    })
}

// ---------- advice ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTone {
    High,
    Medium,
    Low,
}

impl ConfidenceTone {
    pub fn gradient(&self) -> (&'static str, &'static str) {
        match self {
            ConfidenceTone::High => ("#22c55e", "#16a34a"),
            ConfidenceTone::Medium => ("#eab308", "#ca8a04"),
            ConfidenceTone::Low => ("#ef4444", "#dc2626"),
        }
    }
}

pub fn confidence_tone(confidence: f64) -> ConfidenceTone {
    if confidence >= 7.0 {
        ConfidenceTone::High
    } else if confidence >= 5.0 {
        ConfidenceTone::Medium
    } else {
        ConfidenceTone::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionTone {
    Long,
    Short,
    Flat,
}

impl DirectionTone {
    /// `(background, foreground)`
    pub fn colors(&self) -> (&'static str, &'static str) {
        match self {
            DirectionTone::Long => ("#dcfce7", "#16a34a"),
            DirectionTone::Short => ("#fee2e2", "#dc2626"),
            DirectionTone::Flat => ("#f3f4f6", "#6b7280"),
        }
    }
}

/// Accepts the backend's labels (做多 / 做空 / 观望) and English ones.
pub fn direction_tone(direction: &str) -> DirectionTone {
    let d = direction.trim().to_ascii_lowercase();
    match d.as_str() {
        "做多" | "long" | "buy" => DirectionTone::Long,
        "做空" | "short" | "sell" => DirectionTone::Short,
        _ => DirectionTone::Flat,
    }
}

fn text(value: &Option<DecimalText>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceCard {
    pub direction: String,
    pub tone: DirectionTone,
    pub background: &'static str,
    pub color: &'static str,
    pub mtf_summary: Option<String>,
    pub technical_score: Option<String>,
    pub sentiment_score: Option<String>,
    pub news_score: Option<String>,
    pub entry_price: Option<String>,
    pub stop_loss: Option<String>,
    pub target_price: Option<String>,
    pub position_size: Option<String>,
    pub confidence: Option<f64>,
    pub confidence_tone: Option<ConfidenceTone>,
    pub confidence_fill_pct: Option<f64>,
    pub reasoning: Option<String>,
}

impl AdviceCard {
    pub fn new(advice: &Advice) -> Self {
        let tone = direction_tone(&advice.direction);
        let (background, color) = tone.colors();
        let confidence = advice.confidence_value();
        Self {
            direction: advice.direction.clone(),
            tone,
            background,
            color,
            mtf_summary: advice.mtf_summary.clone(),
            technical_score: text(&advice.technical_score),
            sentiment_score: text(&advice.sentiment_score),
            news_score: text(&advice.news_score),
            entry_price: text(&advice.entry_price),
            stop_loss: text(&advice.stop_loss),
            target_price: text(&advice.target_price),
            position_size: advice.position_size.clone().filter(|s| !s.is_empty()),
            confidence,
            confidence_tone: confidence.map(confidence_tone),
            confidence_fill_pct: confidence.map(|c| (c * 10.0).clamp(0.0, 100.0)),
            reasoning: advice.reasoning.clone(),
        }
    }

    pub fn has_scores(&self) -> bool {
        self.technical_score.is_some() || self.sentiment_score.is_some() || self.news_score.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AnalysisView {
    Empty,
    Advice(Box<AdviceCard>),
    Text(String),
}

pub fn analysis_view(state: &DashboardState) -> AnalysisView {
    match &state.analysis {
        None => AnalysisView::Empty,
        Some(Analysis::Advice(advice)) => AnalysisView::Advice(Box::new(AdviceCard::new(advice))),
        Some(Analysis::Text(text)) => AnalysisView::Text(text.clone()),
    }
}

// ---------- scenarios -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioPalette {
    pub bg: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

const SCENARIO_PALETTES: [ScenarioPalette; 4] = [
    ScenarioPalette {
        bg: "#dcfce7",
        border: "#22c55e",
        text: "#166534",
    },
    ScenarioPalette {
        bg: "#dbeafe",
        border: "#3b82f6",
        text: "#1e40af",
    },
    ScenarioPalette {
        bg: "#fef3c7",
        border: "#f59e0b",
        text: "#92400e",
    },
    ScenarioPalette {
        bg: "#fee2e2",
        border: "#ef4444",
        text: "#991b1b",
    },
];

const DEFAULT_PALETTE: ScenarioPalette = ScenarioPalette {
    bg: "#f3f4f6",
    border: "#9ca3af",
    text: "#374151",
};

/// Palette by scenario number, taken from the first digit in its name.
pub fn scenario_palette(name: &str) -> ScenarioPalette {
    name.chars()
        .find_map(|c| c.to_digit(10))
        .and_then(|n| (n as usize).checked_sub(1))
        .and_then(|i| SCENARIO_PALETTES.get(i).copied())
        .unwrap_or(DEFAULT_PALETTE)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub name: String,
    pub probability_pct: Option<f64>,
    pub raw_score: Option<f64>,
    /// First three matched factors.
    pub factors: Vec<String>,
    pub palette: ScenarioPalette,
}

impl ScenarioRow {
    fn new(name: &str, info: &ScenarioInfo) -> Self {
        Self {
            name: name.to_string(),
            probability_pct: info.probability_pct(),
            raw_score: info.raw_score.as_ref().and_then(DecimalText::to_f64),
            factors: info.matched_factors.iter().take(3).map(display_value).collect(),
            palette: scenario_palette(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostLikely {
    pub name: String,
    pub probability_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioPanel {
    pub most_likely: Option<MostLikely>,
    pub rows: Vec<ScenarioRow>,
    pub macro_rows: Vec<(String, String)>,
    pub ai_analysis: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ScenarioView {
    Loading,
    Idle,
    Error(String),
    Report(Box<ScenarioPanel>),
}

pub fn scenario_view(state: &DashboardState) -> ScenarioView {
    if state.scenario_loading() {
        return ScenarioView::Loading;
    }
    if let Some(err) = &state.scenario_error {
        return ScenarioView::Error(err.clone());
    }
    let Some(report) = &state.scenario else {
        return ScenarioView::Idle;
    };
    if let Some(err) = &report.error {
        return ScenarioView::Error(err.clone());
    }
    ScenarioView::Report(Box::new(ScenarioPanel {
        most_likely: report.most_likely_scenario.as_ref().map(|m| MostLikely {
            name: m.name.clone(),
            probability_pct: percent(&m.probability),
        }),
        rows: report
            .scenario_probabilities
            .iter()
            .map(|(name, info)| ScenarioRow::new(name, info))
            .collect(),
        macro_rows: report
            .macro_data
            .iter()
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect(),
        ai_analysis: report.ai_analysis.clone(),
    }))
}

// ---------- snapshot --------------------------------------------------------

/// Everything a host page needs to draw the dashboard around the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub symbol: String,
    pub symbols: Vec<&'static str>,
    pub chart: ChartSummary,
    pub market_loading: bool,
    pub analysis_loading: bool,
    pub radar: Vec<RadarCell>,
    pub fng: Option<FngGauge>,
    pub analysis: AnalysisView,
    pub news: Vec<NewsItem>,
    pub scenario: ScenarioView,
}

pub fn snapshot(state: &DashboardState) -> DashboardSnapshot {
    DashboardSnapshot {
        symbol: state.symbol.clone(),
        symbols: SYMBOLS.to_vec(),
        chart: ChartSummary::from(&chart_view(state)),
        market_loading: state.market_loading(),
        analysis_loading: state.analysis_loading(),
        radar: radar_cells(state),
        fng: fng_gauge(state),
        analysis: analysis_view(state),
        news: state.news.clone(),
        scenario: scenario_view(state),
    }
}
