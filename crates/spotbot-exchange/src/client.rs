//! Signed HTTP client for the exchange REST API.
//!
//! All trading endpoints require an HMAC-SHA256 signature over the query
//! string plus a timestamp; public market-data endpoints are unsigned.
//! Order placement is submitted at most once — there is no retry path for
//! writes. Read-only history pagination retries with a fixed delay and
//! tolerates partial results.

use crate::error::{ExchangeError, ExchangeResult};
use crate::models::{
    AccountInfo, ApiErrorBody, ExchangeInfoResponse, OcoAck, OpenOrder, OrderAck, Ticker24h,
    TickerPrice, TradeRecord,
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use spotbot_core::{OrderSide, OrderType, TimeInForce};
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Window in which a signed request stays valid on the exchange side.
const RECV_WINDOW_MS: u64 = 5_000;

/// Fixed delay between read-only retry attempts.
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Page size for trade-history pagination.
const TRADES_PAGE_LIMIT: u32 = 1_000;

/// Parameters for a new order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Wire-formatted quantity (already grid-snapped and rendered).
    pub quantity: String,
    /// Limit price, wire-formatted. Required for stop/profit limit orders.
    pub price: Option<String>,
    /// Trigger price, wire-formatted.
    pub stop_price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// A plain market order for an exact formatted quantity.
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: String) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }

    fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.to_string()),
            ("type".to_string(), self.order_type.to_string()),
            ("quantity".to_string(), self.quantity.clone()),
        ];
        if let Some(price) = &self.price {
            params.push(("price".to_string(), price.clone()));
        }
        if let Some(stop) = &self.stop_price {
            params.push(("stopPrice".to_string(), stop.clone()));
        }
        if let Some(tif) = &self.time_in_force {
            params.push(("timeInForce".to_string(), tif.to_string()));
        }
        if let Some(id) = &self.client_order_id {
            params.push(("newClientOrderId".to_string(), id.clone()));
        }
        params
    }
}

/// Parameters for a combined conditional order: one leg triggers and
/// cancels the other.
#[derive(Debug, Clone)]
pub struct OcoRequest {
    pub symbol: String,
    /// Side of both legs (opposite of the filled primary order).
    pub side: OrderSide,
    /// Wire-formatted quantity shared by both legs.
    pub quantity: String,
    /// Limit price of the take-profit leg.
    pub price: String,
    /// Trigger price of the stop leg.
    pub stop_price: String,
    /// Limit price of the stop leg once triggered.
    pub stop_limit_price: String,
    pub stop_limit_time_in_force: TimeInForce,
}

impl OcoRequest {
    fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.to_string()),
            ("quantity".to_string(), self.quantity.clone()),
            ("price".to_string(), self.price.clone()),
            ("stopPrice".to_string(), self.stop_price.clone()),
            ("stopLimitPrice".to_string(), self.stop_limit_price.clone()),
            (
                "stopLimitTimeInForce".to_string(),
                self.stop_limit_time_in_force.to_string(),
            ),
        ]
    }
}

/// Client for the exchange REST API.
pub struct RestClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: Vec<u8>,
}

impl RestClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g. "https://api.exchange.example")
    /// * `api_key` / `api_secret` - trading credentials
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::HttpClient(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into().into_bytes(),
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.api_secret)
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn encode_params(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ExchangeError::Parse(format!("failed to decode response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
            return Err(ExchangeError::Api {
                code: err.code,
                message: err.msg,
            });
        }
        Err(ExchangeError::HttpClient(format!("HTTP {status}: {body}")))
    }

    /// Unsigned GET against a public market-data endpoint.
    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ExchangeResult<T> {
        let mut url = format!("{}{path}", self.base_url);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&Self::encode_params(params));
        }
        debug!(%url, "GET");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::HttpClient(format!("HTTP request failed: {e}")))?;
        Self::parse_response(response).await
    }

    /// Signed request against a trading/account endpoint.
    async fn signed<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> ExchangeResult<T> {
        params.push((
            "recvWindow".to_string(),
            RECV_WINDOW_MS.to_string(),
        ));
        params.push((
            "timestamp".to_string(),
            chrono::Utc::now().timestamp_millis().to_string(),
        ));

        let query = Self::encode_params(&params);
        let signature = self.sign(&query);
        let url = format!("{}{path}?{query}&signature={signature}", self.base_url);
        debug!(%path, method = %method, "signed request");

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::HttpClient(format!("HTTP request failed: {e}")))?;
        Self::parse_response(response).await
    }

    /// Fetch exchange info: all symbols, their status and trading filters.
    pub async fn exchange_info(&self) -> ExchangeResult<ExchangeInfoResponse> {
        info!("fetching exchange info");
        self.get_public("/api/v3/exchangeInfo", &[]).await
    }

    /// Current price for one symbol.
    pub async fn ticker_price(&self, symbol: &str) -> ExchangeResult<TickerPrice> {
        self.get_public(
            "/api/v3/ticker/price",
            &[("symbol".to_string(), symbol.to_string())],
        )
        .await
    }

    /// Current prices for all symbols.
    pub async fn all_ticker_prices(&self) -> ExchangeResult<Vec<TickerPrice>> {
        self.get_public("/api/v3/ticker/price", &[]).await
    }

    /// 24-hour statistics for one symbol.
    pub async fn ticker_24h(&self, symbol: &str) -> ExchangeResult<Ticker24h> {
        self.get_public(
            "/api/v3/ticker/24hr",
            &[("symbol".to_string(), symbol.to_string())],
        )
        .await
    }

    /// 24-hour statistics for all symbols.
    pub async fn all_tickers_24h(&self) -> ExchangeResult<Vec<Ticker24h>> {
        self.get_public("/api/v3/ticker/24hr", &[]).await
    }

    /// Account snapshot including balances.
    pub async fn account(&self) -> ExchangeResult<AccountInfo> {
        self.signed(reqwest::Method::GET, "/api/v3/account", Vec::new())
            .await
    }

    /// Submit a new order. Called at most once per confirmed trade.
    pub async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderAck> {
        info!(
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            quantity = %request.quantity,
            "placing order"
        );
        self.signed(reqwest::Method::POST, "/api/v3/order", request.to_params())
            .await
    }

    /// Submit a combined conditional (one-cancels-other) order.
    pub async fn place_oco_order(&self, request: &OcoRequest) -> ExchangeResult<OcoAck> {
        info!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            stop = %request.stop_price,
            target = %request.price,
            "placing combined conditional order"
        );
        self.signed(
            reqwest::Method::POST,
            "/api/v3/order/oco",
            request.to_params(),
        )
        .await
    }

    /// Cancel an open order.
    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> ExchangeResult<OrderAck> {
        self.signed(
            reqwest::Method::DELETE,
            "/api/v3/order",
            vec![
                ("symbol".to_string(), symbol.to_string()),
                ("orderId".to_string(), order_id.to_string()),
            ],
        )
        .await
    }

    /// List open orders, optionally narrowed to one symbol.
    pub async fn open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>> {
        let params = match symbol {
            Some(s) => vec![("symbol".to_string(), s.to_string())],
            None => Vec::new(),
        };
        self.signed(reqwest::Method::GET, "/api/v3/openOrders", params)
            .await
    }

    /// One page of trade history for a symbol.
    pub async fn my_trades(
        &self,
        symbol: &str,
        limit: u32,
        from_id: Option<u64>,
        start_time: Option<i64>,
    ) -> ExchangeResult<Vec<TradeRecord>> {
        let mut params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(id) = from_id {
            params.push(("fromId".to_string(), id.to_string()));
        }
        if let Some(ts) = start_time {
            params.push(("startTime".to_string(), ts.to_string()));
        }
        self.signed(reqwest::Method::GET, "/api/v3/myTrades", params)
            .await
    }

    /// Full trade history for a symbol, paginated by trade id.
    ///
    /// Each page is retried once after a fixed delay; a page that still
    /// fails ends the walk and whatever was gathered so far is returned
    /// rather than failing the whole lookup.
    pub async fn all_my_trades(&self, symbol: &str) -> ExchangeResult<Vec<TradeRecord>> {
        let mut all = Vec::new();
        let mut from_id: Option<u64> = None;

        loop {
            let page = match self.my_trades(symbol, TRADES_PAGE_LIMIT, from_id, None).await {
                Ok(page) => page,
                Err(first_err) => {
                    warn!(symbol, error = %first_err, "trade page fetch failed, retrying once");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                    match self.my_trades(symbol, TRADES_PAGE_LIMIT, from_id, None).await {
                        Ok(page) => page,
                        Err(err) => {
                            warn!(
                                symbol,
                                gathered = all.len(),
                                error = %err,
                                "trade pagination aborted, returning partial history"
                            );
                            return Ok(all);
                        }
                    }
                }
            };

            let page_len = page.len();
            if let Some(last) = page.last() {
                from_id = Some(last.id + 1);
            }
            all.extend(page);

            if page_len < TRADES_PAGE_LIMIT as usize {
                return Ok(all);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::new("https://api.example.com/", "key", "secret").unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let c = client();
        assert_eq!(c.base_url, "https://api.example.com");
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let c = client();
        let sig = c.sign("symbol=BTCUSDT&side=BUY");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, c.sign("symbol=BTCUSDT&side=BUY"));
        assert_ne!(sig, c.sign("symbol=BTCUSDT&side=SELL"));
    }

    #[test]
    fn test_market_order_params() {
        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, "0.002".to_string());
        let query = RestClient::encode_params(&request.to_params());
        assert_eq!(query, "symbol=BTCUSDT&side=BUY&type=MARKET&quantity=0.002");
    }

    #[test]
    fn test_stop_limit_order_params() {
        let request = OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::StopLossLimit,
            quantity: "0.002".to_string(),
            price: Some("95.00".to_string()),
            stop_price: Some("95.00".to_string()),
            time_in_force: Some(TimeInForce::GoodTilCancelled),
            client_order_id: None,
        };
        let query = RestClient::encode_params(&request.to_params());
        assert!(query.contains("type=STOP_LOSS_LIMIT"));
        assert!(query.contains("stopPrice=95.00"));
        assert!(query.contains("timeInForce=GTC"));
    }

    #[test]
    fn test_oco_params() {
        let request = OcoRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            quantity: "0.002".to_string(),
            price: "103.00".to_string(),
            stop_price: "95.00".to_string(),
            stop_limit_price: "95.00".to_string(),
            stop_limit_time_in_force: TimeInForce::GoodTilCancelled,
        };
        let query = RestClient::encode_params(&request.to_params());
        assert!(query.contains("price=103.00"));
        assert!(query.contains("stopLimitPrice=95.00"));
        assert!(query.contains("stopLimitTimeInForce=GTC"));
    }
}
