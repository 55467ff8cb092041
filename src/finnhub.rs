use anyhow::Context;
use reqwest::{Client, ClientBuilder};
use reqwest_websocket::{RequestBuilderExt, WebSocket};
use tokio::time::Duration;

use crate::quotes::Quote;
use crate::security::{Security, SecurityType};

const REST_ENDPOINT: &str = "https://finnhub.io/api/v1";
const STREAM_ENDPOINT: &str = "wss://ws.finnhub.io";

#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRequest {
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
}

impl StreamRequest {
    pub fn subscribe(symbol: &str) -> StreamRequest {
        StreamRequest::Subscribe {
            symbol: symbol.to_string(),
        }
    }

    pub fn unsubscribe(symbol: &str) -> StreamRequest {
        StreamRequest::Unsubscribe {
            symbol: symbol.to_string(),
        }
    }
}

/// Inbound stream frame. Messages other than `trade` carry no data and
/// are ignored by the feed.
#[derive(Debug, serde::Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<TradeData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TradeData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    /// Epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchResult>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    description: String,
    #[serde(default)]
    display_symbol: String,
    symbol: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// REST quote payload; prices in the listing currency, `t` in epoch
/// seconds. `d`/`dp` come back null outside trading data coverage.
#[derive(Debug, serde::Deserialize)]
struct QuoteResponse {
    #[serde(rename = "c")]
    current: f64,
    #[serde(rename = "d", default)]
    change: Option<f64>,
    #[serde(rename = "dp", default)]
    change_percent: Option<f64>,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "pc")]
    prev_close: f64,
    #[serde(rename = "t")]
    timestamp: i64,
}

#[derive(Clone)]
pub struct MarketClient {
    client: Client,
    token: String,
}

impl MarketClient {
    pub fn new(token: &str) -> Result<MarketClient, anyhow::Error> {
        Ok(MarketClient {
            client: build_http_client()?,
            token: token.to_string(),
        })
    }

    /// Symbol search; command resolution consumes only the first ranked
    /// match, `None` when the query matches nothing.
    pub async fn resolve_security(&self, query: &str) -> Result<Option<Security>, anyhow::Error> {
        let response = self
            .client
            .get(format!("{REST_ENDPOINT}/search"))
            .query(&[("q", query), ("token", self.token.as_str())])
            .send()
            .await
            .with_context(|| format!("searching symbols for {query}"))?
            .error_for_status()
            .with_context(|| format!("symbol search status for {query}"))?
            .json::<SearchResponse>()
            .await
            .with_context(|| format!("decoding symbol search for {query}"))?;
        Ok(response.result.into_iter().next().map(security_from_match))
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, anyhow::Error> {
        let response = self
            .client
            .get(format!("{REST_ENDPOINT}/quote"))
            .query(&[("symbol", symbol), ("token", self.token.as_str())])
            .send()
            .await
            .with_context(|| format!("requesting quote for {symbol}"))?
            .error_for_status()
            .with_context(|| format!("quote response status for {symbol}"))?
            .json::<QuoteResponse>()
            .await
            .with_context(|| format!("decoding quote for {symbol}"))?;
        Ok(quote_from_response(symbol, response))
    }
}

pub async fn connect_stream(client: &Client, token: &str) -> Result<WebSocket, anyhow::Error> {
    let query = serde_urlencoded::to_string([("token", token)])
        .context("encoding stream token query")?;
    let response = client
        .get(format!("{STREAM_ENDPOINT}/?{query}"))
        .upgrade()
        .send()
        .await?;
    Ok(response.into_websocket().await?)
}

pub fn build_http_client() -> Result<Client, anyhow::Error> {
    Ok(ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .build()?)
}

fn security_from_match(result: SearchResult) -> Security {
    let name = if result.description.is_empty() {
        result.symbol.clone()
    } else {
        result.description.clone()
    };
    let exchange = if result.display_symbol.is_empty() {
        None
    } else {
        Some(result.display_symbol.clone())
    };
    Security {
        kind: security_kind(&result.kind),
        symbol: result.symbol,
        name,
        exchange,
        currency: None,
    }
}

fn security_kind(label: &str) -> SecurityType {
    let label = label.to_uppercase();
    if label.contains("CRYPTO") {
        SecurityType::Crypto
    } else if label.contains("FOREX") {
        SecurityType::Forex
    } else if label.contains("INDEX") || label.contains("INDICES") {
        SecurityType::Index
    } else if label.contains("BOND") {
        SecurityType::Bond
    } else if label.contains("COMMODITY") {
        SecurityType::Commodity
    } else {
        SecurityType::Equity
    }
}

fn quote_from_response(symbol: &str, response: QuoteResponse) -> Quote {
    let change = response
        .change
        .unwrap_or(response.current - response.prev_close);
    let change_percent = response.change_percent.unwrap_or_else(|| {
        if response.prev_close.abs() > f64::EPSILON {
            change / response.prev_close * 100.0
        } else {
            0.0
        }
    });
    Quote {
        symbol: symbol.to_string(),
        price: response.current,
        change,
        change_percent,
        high: response.high,
        low: response.low,
        open: response.open,
        prev_close: response.prev_close,
        // REST timestamps are epoch seconds; ticks arrive in milliseconds.
        timestamp: response.timestamp * 1000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_requests_serialize_to_wire_shape() {
        let subscribe = serde_json::to_string(&StreamRequest::subscribe("AAPL"))
            .expect("should serialize subscribe");
        assert_eq!(subscribe, r#"{"type":"subscribe","symbol":"AAPL"}"#);
        let unsubscribe = serde_json::to_string(&StreamRequest::unsubscribe("MSFT"))
            .expect("should serialize unsubscribe");
        assert_eq!(unsubscribe, r#"{"type":"unsubscribe","symbol":"MSFT"}"#);
    }

    #[test]
    fn parses_trade_batches() {
        let raw = r#"{
            "type": "trade",
            "data": [
                {"s": "AAPL", "p": 189.25, "t": 1700000000000, "v": 25},
                {"s": "MSFT", "p": 377.5, "t": 1700000000100}
            ]
        }"#;
        let message: StreamMessage = serde_json::from_str(raw).expect("should parse trades");
        assert_eq!(message.kind, "trade");
        assert_eq!(message.data.len(), 2);
        assert_eq!(message.data[0].symbol, "AAPL");
        assert!((message.data[0].price - 189.25).abs() < 1e-9);
        assert_eq!(message.data[1].timestamp, 1_700_000_000_100);
    }

    #[test]
    fn non_trade_messages_parse_with_empty_data() {
        let message: StreamMessage =
            serde_json::from_str(r#"{"type":"ping"}"#).expect("should parse ping");
        assert_eq!(message.kind, "ping");
        assert!(message.data.is_empty());
    }

    #[test]
    fn quote_conversion_scales_seconds_and_derives_change() {
        let response: QuoteResponse = serde_json::from_str(
            r#"{"c": 110.0, "d": null, "dp": null, "h": 112.0, "l": 99.0, "o": 100.5, "pc": 100.0, "t": 1700000000}"#,
        )
        .expect("should parse quote");
        let quote = quote_from_response("AAPL", response);
        assert_eq!(quote.timestamp, 1_700_000_000_000);
        assert!((quote.change - 10.0).abs() < 1e-9);
        assert!((quote.change_percent - 10.0).abs() < 1e-9);
        assert!((quote.prev_close - 100.0).abs() < 1e-9);
    }

    #[test]
    fn first_search_match_becomes_the_security() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"count": 2, "result": [
                {"description": "APPLE INC", "displaySymbol": "AAPL", "symbol": "AAPL", "type": "Common Stock"},
                {"description": "APPLE HOSPITALITY", "displaySymbol": "APLE", "symbol": "APLE", "type": "Common Stock"}
            ]}"#,
        )
        .expect("should parse search response");
        let security = response
            .result
            .into_iter()
            .next()
            .map(security_from_match)
            .expect("should map first match");
        assert_eq!(security.symbol, "AAPL");
        assert_eq!(security.name, "APPLE INC");
        assert_eq!(security.exchange.as_deref(), Some("AAPL"));
        assert_eq!(security.kind, SecurityType::Equity);
    }

    #[test]
    fn search_match_falls_back_to_symbol_name() {
        let result = SearchResult {
            description: String::new(),
            display_symbol: String::new(),
            symbol: "BINANCE:BTCUSDT".to_string(),
            kind: "Crypto".to_string(),
        };
        let security = security_from_match(result);
        assert_eq!(security.name, "BINANCE:BTCUSDT");
        assert!(security.exchange.is_none());
        assert_eq!(security.kind, SecurityType::Crypto);
    }
}
