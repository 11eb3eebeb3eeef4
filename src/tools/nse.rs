//! NSE equity quotes and the stock market overview tool

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{ensure_object_parameters, Tool, ToolContext};
use crate::error::AgentError;
use crate::format;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://www.nseindia.com";

/// Divisor turning rupees into crores.
const CRORE: f64 = 10_000_000.0;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Source of raw equity quote payloads.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Quote payload for `symbol`, or `None` when the provider has no data.
    async fn quote_equity(&self, symbol: &str) -> Result<Option<Value>>;
}

/// HTTP client for the NSE quote API.
///
/// NSE rejects API calls without the cookies handed out by its home page, so
/// the first request primes the cookie jar.
pub struct NseQuoteClient {
    client: Client,
    base_url: String,
    primed: OnceCell<()>,
}

impl NseQuoteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            primed: OnceCell::new(),
        })
    }

    async fn prime_session(&self) -> Result<()> {
        self.primed
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(format!("{}/", self.base_url))
                    .send()
                    .await
                    .map_err(|e| AgentError::UpstreamError(format!("NSE session request failed: {}", e)))?;

                if !response.status().is_success() {
                    warn!(status = %response.status(), "NSE home page did not return success");
                }
                debug!("NSE session cookies primed");
                Ok::<(), AgentError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QuoteSource for NseQuoteClient {
    async fn quote_equity(&self, symbol: &str) -> Result<Option<Value>> {
        self.prime_session().await?;

        info!(symbol, "Fetching NSE quote");

        let response = self
            .client
            .get(format!("{}/api/quote-equity", self.base_url))
            .query(&[("symbol", symbol)])
            .header(header::REFERER, format!("{}/get-quotes/equity?symbol={}", self.base_url, symbol))
            .send()
            .await
            .map_err(|e| AgentError::UpstreamError(format!("NSE request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AgentError::UpstreamError(format!(
                "NSE returned {} for {}",
                status, symbol
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::UpstreamError(format!("Invalid NSE response: {}", e)))?;

        let empty = match &body {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };

        Ok(if empty { None } else { Some(body) })
    }
}

/// Market overview of one listed equity. Every field is optional because the
/// provider omits sections freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockOverview {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub price: Option<Number>,
    pub change: Option<Number>,
    pub percent_change: Option<Number>,
    pub week_high: Option<Number>,
    pub week_low: Option<Number>,
    /// Market capitalisation in crores, already formatted (`1,234.56`).
    pub market_cap: Option<String>,
    pub pe_ratio: Option<Number>,
}

impl StockOverview {
    pub fn market_cap_display(&self) -> &str {
        self.market_cap.as_deref().unwrap_or("Data unavailable")
    }

    /// Markdown block shown in the chat transcript.
    pub fn to_markdown(&self) -> String {
        format!(
            "**Company Name:** {}\n\n\
             **Symbol:** {}\n\n\
             **Current Price:** ₹{}\n\n\
             **Change:** ₹{} ({}%)\n\n\
             **52 Week High:** ₹{}\n\n\
             **52 Week Low:** ₹{}\n\n\
             **Market Cap (Cr):** {}\n\n\
             **P/E Ratio:** {}",
            text_or_na(&self.company_name),
            text_or_na(&self.symbol),
            number_or_na(&self.price),
            number_or_na(&self.change),
            number_or_na(&self.percent_change),
            number_or_na(&self.week_high),
            number_or_na(&self.week_low),
            self.market_cap_display(),
            number_or_na(&self.pe_ratio),
        )
    }
}

fn text_or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

fn number_or_na(value: &Option<Number>) -> String {
    value
        .as_ref()
        .map(Number::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

/// Either an overview or an `{ "error": ... }` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StockOverviewResult {
    Error { error: String },
    Overview(StockOverview),
}

impl StockOverviewResult {
    /// Text for the chat transcript.
    pub fn to_markdown(&self) -> String {
        match self {
            StockOverviewResult::Error { error } => error.clone(),
            StockOverviewResult::Overview(overview) => overview.to_markdown(),
        }
    }
}

/// Build an overview from a raw quote payload. Returns `None` when the
/// payload has no `priceInfo` section.
pub fn overview_from_quote(data: &Value) -> Option<StockOverview> {
    data.get("priceInfo")?;

    let last_price = number_at(data, "/priceInfo/lastPrice");
    let issued_size = number_at(data, "/securityInfo/issuedSize");

    let market_cap = match (
        last_price.as_ref().and_then(Number::as_f64),
        issued_size.as_ref().and_then(Number::as_f64),
    ) {
        (Some(price), Some(size)) => Some(format::grouped(market_cap_crore(price, size), 2)),
        _ => None,
    };

    Some(StockOverview {
        symbol: text_at(data, "/info/symbol"),
        company_name: text_at(data, "/info/companyName"),
        price: last_price,
        change: number_at(data, "/priceInfo/change"),
        percent_change: number_at(data, "/priceInfo/pChange"),
        week_high: number_at(data, "/priceInfo/weekHighLow/max"),
        week_low: number_at(data, "/priceInfo/weekHighLow/min"),
        market_cap,
        pe_ratio: number_at(data, "/metadata/pdSymbolPe"),
    })
}

pub fn market_cap_crore(last_price: f64, issued_size: f64) -> f64 {
    (last_price * issued_size) / CRORE
}

fn text_at(data: &Value, pointer: &str) -> Option<String> {
    match data.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_at(data: &Value, pointer: &str) -> Option<Number> {
    match data.pointer(pointer)? {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    }
}

/// Fetch a market overview for `symbol`.
///
/// Never fails: provider errors and unknown symbols come back as
/// [`StockOverviewResult::Error`].
pub async fn get_stock_market_overview(source: &dyn QuoteSource, symbol: &str) -> StockOverviewResult {
    let invalid = || StockOverviewResult::Error {
        error: format!(
            "Could not retrieve data for symbol {}. It might be an invalid symbol.",
            symbol
        ),
    };

    match source.quote_equity(symbol).await {
        Ok(Some(data)) => match overview_from_quote(&data) {
            Some(overview) => StockOverviewResult::Overview(overview),
            None => invalid(),
        },
        Ok(None) => invalid(),
        Err(e) => {
            warn!(symbol, error = %e, "Stock overview fetch failed");
            StockOverviewResult::Error {
                error: format!(
                    "An error occurred while fetching stock overview for {}: {}",
                    symbol, e
                ),
            }
        }
    }
}

pub struct StockOverviewTool {
    source: Arc<dyn QuoteSource>,
}

impl StockOverviewTool {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for StockOverviewTool {
    fn name(&self) -> &'static str {
        "get_stock_market_overview"
    }

    fn description(&self) -> &'static str {
        "Provides a market overview for a given NSE stock symbol. Includes current price, \
         market cap, 52-week high/low, and P/E ratio."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "NSE ticker symbol, e.g. INFY or RELIANCE"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput, _ctx: &ToolContext) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        let symbol = input
            .parameters
            .get("symbol")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AgentError::InvalidToolInput("Expected 'symbol' in tool_input".to_string())
            })?;

        Ok(match get_stock_market_overview(self.source.as_ref(), &symbol).await {
            StockOverviewResult::Error { error } => ToolOutput::failed(error),
            StockOverviewResult::Overview(overview) => ToolOutput::ok(serde_json::to_value(overview)?),
        })
    }
}
