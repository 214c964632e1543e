use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use common::{
    Balance, Candle, CandleSeries, Error, Fill, MarketData, OrderErrorKind, OrderExecution, OrderOutcome, OrderSide,
    Result,
};

const BASE_URL: &str = "https://api.binance.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// Binance caps a klines request at this many rows.
const MAX_KLINES: usize = 1000;
/// Binance error code for a rejected new order, which in practice means the
/// account cannot cover it.
const CODE_ORDER_REJECTED: i64 = -2010;

struct Credentials {
    api_key: String,
    secret: String,
}

/// REST client for Binance spot. Serves market data to every mode and
/// signed market orders to live mode.
///
/// Transport errors and 5xx responses are retried up to three times.
/// Orders carry a client order id so a retried duplicate is rejected by the
/// exchange instead of filling twice.
pub struct BinanceClient {
    credentials: Option<Credentials>,
    http: Client,
}

/// "BTC/USDT" → "BTCUSDT".
pub fn to_exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

impl BinanceClient {
    /// Market data works without credentials; orders and balances need both.
    pub fn new(api_key: Option<String>, secret: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        let credentials = match (api_key, secret) {
            (Some(api_key), Some(secret)) => Some(Credentials { api_key, secret }),
            _ => None,
        };
        Ok(Self { credentials, http })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    async fn request(&self, method: Method, path: &str, params: &str, signed: bool) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.request_once(method.clone(), path, params, signed).await {
                Err(e) if is_retriable(&e) && attempt < MAX_ATTEMPTS => {
                    warn!(%path, attempt, error = %e, "Binance request failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn request_once(&self, method: Method, path: &str, params: &str, signed: bool) -> Result<String> {
        let query = if signed {
            let creds = self
                .credentials
                .as_ref()
                .ok_or_else(|| Error::Config("Binance API key and secret are not configured".into()))?;
            let ts = Utc::now().timestamp_millis();
            let query = if params.is_empty() { format!("timestamp={ts}") } else { format!("{params}&timestamp={ts}") };
            let signature = sign(&creds.secret, &query)?;
            format!("{query}&signature={signature}")
        } else {
            params.to_string()
        };
        let url = if query.is_empty() { format!("{BASE_URL}{path}") } else { format!("{BASE_URL}{path}?{query}") };

        let mut req = self.http.request(method, &url);
        if let Some(creds) = &self.credentials {
            req = req.header("X-MBX-APIKEY", &creds.api_key);
        }
        let resp = req.send().await.map_err(network)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify(status.as_u16(), &body))
        }
    }

    async fn klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<CandleSeries> {
        let params = format!(
            "symbol={}&interval={timeframe}&limit={}",
            to_exchange_symbol(symbol),
            limit.clamp(1, MAX_KLINES)
        );
        let body = self.request(Method::GET, "/api/v3/klines", &params, false).await?;
        parse_klines(&body)
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let params = format!("symbol={}", to_exchange_symbol(symbol));
        let body = self.request(Method::GET, "/api/v3/ticker/price", &params, false).await?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;
        parse_decimal(&ticker.price)
    }

    async fn balance(&self, currency: &str) -> Result<Option<Balance>> {
        let body = self.request(Method::GET, "/api/v3/account", "", true).await?;
        let account: AccountResponse = serde_json::from_str(&body)?;
        account
            .balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(currency))
            .map(|b| {
                let free = parse_decimal(&b.free)?;
                let used = parse_decimal(&b.locked)?;
                Ok(Balance { currency: b.asset, total: free + used, free, used })
            })
            .transpose()
    }

    async fn market_order(&self, symbol: &str, side: OrderSide, amount: f64) -> Result<Fill> {
        let client_order_id = format!("tb{}", Utc::now().timestamp_micros());
        let params = format!(
            "symbol={}&side={side}&type=MARKET&quantity={}&newOrderRespType=FULL&newClientOrderId={client_order_id}",
            to_exchange_symbol(symbol),
            format_quantity(amount)
        );
        debug!(%symbol, %side, amount, %client_order_id, "Submitting market order to Binance");
        let body = self.request(Method::POST, "/api/v3/order", &params, true).await?;
        parse_order(&body)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn get_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> CandleSeries {
        match self.klines(symbol, timeframe, limit).await {
            Ok(series) => series,
            Err(e) => {
                warn!(%symbol, %timeframe, error = %e, "Candle fetch failed");
                CandleSeries::empty()
            }
        }
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        match self.ticker_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(%symbol, error = %e, "Price fetch failed");
                None
            }
        }
    }

    async fn get_account_balance(&self, currency: &str) -> Option<Balance> {
        match self.balance(currency).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(%currency, error = %e, "Balance fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl OrderExecution for BinanceClient {
    async fn place_market_order(&self, symbol: &str, side: OrderSide, amount: f64) -> OrderOutcome {
        match self.market_order(symbol, side, amount).await {
            Ok(fill) => OrderOutcome::Filled(fill),
            Err(Error::OrderFailed { kind, message }) => OrderOutcome::Failed { kind, message },
            Err(Error::Config(message)) => OrderOutcome::Failed { kind: OrderErrorKind::InvalidOrder, message },
            Err(e) => OrderOutcome::Failed { kind: OrderErrorKind::Unknown, message: e.to_string() },
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::Config(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn network(e: reqwest::Error) -> Error {
    Error::OrderFailed { kind: OrderErrorKind::Network, message: e.to_string() }
}

fn is_retriable(e: &Error) -> bool {
    matches!(e, Error::OrderFailed { kind: OrderErrorKind::Network, .. })
}

/// Map a non-success response to the order failure taxonomy.
fn classify(status: u16, body: &str) -> Error {
    let api: Option<ApiError> = serde_json::from_str(body).ok();
    let message = match &api {
        Some(e) => format!("HTTP {status} ({}): {}", e.code, e.msg),
        None => format!("HTTP {status}: {body}"),
    };
    let kind = match (status, api.map(|e| e.code)) {
        (_, Some(CODE_ORDER_REJECTED)) => OrderErrorKind::InsufficientFunds,
        (429, _) | (500..=599, _) => OrderErrorKind::Network,
        (400..=499, _) => OrderErrorKind::InvalidOrder,
        _ => OrderErrorKind::Unknown,
    };
    Error::OrderFailed { kind, message }
}

fn parse_decimal(s: &str) -> Result<f64> {
    s.parse::<f64>().map_err(|e| Error::Exchange(format!("bad decimal {s:?}: {e}")))
}

/// Up to 8 decimals with trailing zeros removed.
fn format_quantity(amount: f64) -> String {
    let s = format!("{amount:.8}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Kline rows are arrays: `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
fn parse_klines(body: &str) -> Result<CandleSeries> {
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)?;
    let field = |row: &[serde_json::Value], i: usize| -> Result<f64> {
        row.get(i)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Exchange(format!("kline field {i} missing")))
            .and_then(parse_decimal)
    };

    let candles = rows
        .iter()
        .map(|row| {
            let open_ms = row
                .first()
                .and_then(|v| v.as_i64())
                .ok_or_else(|| Error::Exchange("kline open time missing".into()))?;
            let timestamp = Utc
                .timestamp_millis_opt(open_ms)
                .single()
                .ok_or_else(|| Error::Exchange(format!("bad kline time {open_ms}")))?;
            Ok(Candle {
                timestamp,
                open: field(row, 1)?,
                high: field(row, 2)?,
                low: field(row, 3)?,
                close: field(row, 4)?,
                volume: field(row, 5)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    CandleSeries::new(candles)
}

fn parse_order(body: &str) -> Result<Fill> {
    let resp: OrderResponse = serde_json::from_str(body)?;
    let filled_amount = parse_decimal(&resp.executed_qty)?;
    let quote = parse_decimal(&resp.cummulative_quote_qty)?;
    let average_price = if filled_amount > 0.0 { quote / filled_amount } else { 0.0 };
    Ok(Fill { order_id: resp.order_id.to_string(), filled_amount, average_price })
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    executed_qty: String,
    cummulative_quote_qty: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}
