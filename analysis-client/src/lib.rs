use std::collections::{BTreeMap, HashMap};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use ts_core::{Bar, DecimalText, TimeFrame};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const BASE_URL_ENV: &str = "TRADING_API_BASE";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self { base_url }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------- wire types ------------------------------------------------------

/// Response of `GET /api/market-data/{symbol}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub symbol: Option<String>,
    pub data: Vec<Bar>,
}

#[derive(Debug, Clone, Serialize)]
struct SymbolRequest<'a> {
    symbol: &'a str,
}

/// Per-timeframe trend classification used by the signal radar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Bullish,
    WeakBullish,
    Bearish,
    WeakBearish,
    #[serde(other)]
    Neutral,
}

/// Structured trading advice.
///
/// The backend fills these from a language model, so numbers may come as
/// text and most fields can be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Advice {
    pub direction: String,
    pub mtf_summary: Option<String>,
    pub technical_score: Option<DecimalText>,
    pub sentiment_score: Option<DecimalText>,
    pub news_score: Option<DecimalText>,
    pub entry_price: Option<DecimalText>,
    pub stop_loss: Option<DecimalText>,
    pub target_price: Option<DecimalText>,
    pub position_size: Option<String>,
    pub confidence: Option<DecimalText>,
    pub reasoning: Option<String>,
}

impl Advice {
    pub fn confidence_value(&self) -> Option<f64> {
        self.confidence.as_ref().and_then(DecimalText::to_f64)
    }
}

/// The `analysis` field: parsed advice, or the model's raw text when the
/// backend could not parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Advice(Box<Advice>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Fear & greed index reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreed {
    pub value: DecimalText,
    #[serde(default)]
    pub value_classification: String,
}

impl FearGreed {
    pub fn score(&self) -> Option<f64> {
        self.value.to_f64()
    }
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: Analysis,
    #[serde(default)]
    pub news: Vec<NewsItem>,
    #[serde(default)]
    pub fng: Option<FearGreed>,
    #[serde(default)]
    pub ui_signals: HashMap<String, TrendStatus>,
}

impl AnalyzeResponse {
    pub fn signal(&self, tf: TimeFrame) -> Option<TrendStatus> {
        self.ui_signals.get(&tf.name()).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInfo {
    pub probability: DecimalText,
    #[serde(default)]
    pub raw_score: Option<DecimalText>,
    #[serde(default)]
    pub matched_factors: Vec<Value>,
}

/// Percent value of a probability that may be written as `45.2` or `"45.2%"`.
pub fn percent(text: &DecimalText) -> Option<f64> {
    DecimalText::new(text.as_str().trim().trim_end_matches('%')).to_f64()
}

impl ScenarioInfo {
    pub fn probability_pct(&self) -> Option<f64> {
        percent(&self.probability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostLikelyScenario {
    pub name: String,
    pub probability: DecimalText,
}

/// Response of `POST /api/scenario-analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioReport {
    pub scenario_probabilities: BTreeMap<String, ScenarioInfo>,
    pub most_likely_scenario: Option<MostLikelyScenario>,
    pub macro_data: BTreeMap<String, Value>,
    pub ai_analysis: Value,
    pub error: Option<String>,
}

// ---------- client ----------------------------------------------------------

/// `BTC/USDT` becomes `BTC-USDT` in URL paths.
pub fn path_symbol(symbol: &str) -> String {
    symbol.replace('/', "-")
}

#[derive(Clone)]
pub struct AnalysisClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl AnalysisClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        {
            builder = builder
                .user_agent("trading-dashboard-client/0.1")
                .timeout(Duration::from_secs(120));
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(ApiConfig::default())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub async fn market_data(&self, symbol: &str) -> Result<MarketData, ApiError> {
        let url = self.url(&format!("/api/market-data/{}", path_symbol(symbol)));
        debug!(%url, "fetching market data");
        let resp = self.http.get(&url).send().await?;
        decode(resp).await
    }

    pub async fn analyze(&self, symbol: &str) -> Result<AnalyzeResponse, ApiError> {
        self.post_symbol("/api/analyze", symbol).await
    }

    pub async fn scenario_analysis(&self, symbol: &str) -> Result<ScenarioReport, ApiError> {
        self.post_symbol("/api/scenario-analysis", symbol).await
    }

    async fn post_symbol<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, symbol, "posting analysis request");
        let resp = self
            .http
            .post(&url)
            .json(&SymbolRequest { symbol })
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "backend request failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
