// Kraken WebSocket v2 message shapes seen or produced by the intercept
//
// Field names are the exchange's wire names and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProxyError, ProxyResult};
use crate::orderbook::PriceLevel;
use crate::recorder::Recorded;

pub const EXECUTIONS_CHANNEL: &str = "executions";
pub const BOOK_CHANNEL: &str = "book";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Fixed microsecond UTC timestamp used on every synthetic message
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> exchange

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub limit_price: f64,
    pub order_type: String,
    pub order_userref: i64,
    pub order_qty: f64,
    pub side: Side,
    pub symbol: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub margin: bool,
}

impl OrderParams {
    /// Second half of "BASE/QUOTE"
    pub fn quote_asset(&self) -> Option<&str> {
        self.symbol.split_once('/').map(|(_, quote)| quote)
    }

    /// False for zero, negative and NaN quantities
    pub fn has_quantity(&self) -> bool {
        self.order_qty > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub method: String,
    pub params: OrderParams,
    #[serde(default)]
    pub req_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CancelParams {
    #[serde(default)]
    order_userref: Vec<i64>,
    #[serde(default)]
    orders: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CancelOrderMsg {
    #[serde(default)]
    params: CancelParams,
    #[serde(default)]
    req_id: i64,
}

/// Which pending orders a cancel request addresses
#[derive(Debug, Clone, PartialEq)]
pub enum CancelScope {
    Orders {
        order_userrefs: Vec<i64>,
        order_ids: Vec<String>,
    },
    All,
}

/// Shadow copy of a client cancel, correlated FIFO with exchange acks
#[derive(Debug, Clone, PartialEq)]
pub struct CancelRequest {
    pub scope: CancelScope,
    pub req_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    AddOrder(OrderRequest),
    Cancel(CancelRequest),
    Subscribe { channel: String },
    Other,
}

/// Classify a northbound payload. Payloads that are not JSON objects, or have
/// no known method, come back as `Other`; a known method with the wrong shape
/// is an error.
pub fn parse_client_message(raw: &[u8]) -> ProxyResult<ClientMessage> {
    let Some((method, value)) = method_of(raw) else {
        return Ok(ClientMessage::Other);
    };

    match method.as_str() {
        "add_order" => {
            let request: OrderRequest = serde_json::from_value(value)
                .map_err(|e| ProxyError::MalformedMessage(format!("add_order: {}", e)))?;
            if request.params.quote_asset().is_none() {
                return Err(ProxyError::MissingField("add_order".to_string(), "params.symbol".to_string()));
            }
            Ok(ClientMessage::AddOrder(request))
        }
        "cancel_order" => {
            let msg: CancelOrderMsg = serde_json::from_value(value)
                .map_err(|e| ProxyError::MalformedMessage(format!("cancel_order: {}", e)))?;
            if msg.params.order_userref.is_empty() && msg.params.orders.is_empty() {
                return Err(ProxyError::MissingField(
                    "cancel_order".to_string(),
                    "params.order_userref".to_string(),
                ));
            }
            Ok(ClientMessage::Cancel(CancelRequest {
                scope: CancelScope::Orders {
                    order_userrefs: msg.params.order_userref,
                    order_ids: msg.params.orders,
                },
                req_id: msg.req_id,
            }))
        }
        "cancel_all" => Ok(ClientMessage::Cancel(CancelRequest {
            scope: CancelScope::All,
            req_id: value.get("req_id").and_then(Value::as_i64).unwrap_or_default(),
        })),
        "subscribe" => {
            let channel = value
                .get("params")
                .and_then(|params| params.get("channel"))
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::MissingField("subscribe".to_string(), "params.channel".to_string()))?;
            Ok(ClientMessage::Subscribe {
                channel: channel.to_string(),
            })
        }
        _ => Ok(ClientMessage::Other),
    }
}

// ---------------------------------------------------------------------------
// Exchange -> client

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub order_userref: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub method: String,
    #[serde(default)]
    pub req_id: i64,
    #[serde(default)]
    pub result: Option<OrderResult>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancelAck {
    pub method: String,
    #[serde(default)]
    pub req_id: i64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookLevels {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// `data` is a single object in the compact form and an array in the
/// exchange's native v2 form
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BookData {
    Many(Vec<BookLevels>),
    Single(BookLevels),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookMessage {
    pub channel: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub data: BookData,
}

impl BookMessage {
    /// Per-symbol level batches, with the symbol taken from the entry or the
    /// enclosing message. Entries naming no symbol are skipped.
    pub fn updates(&self) -> Vec<(&str, &BookLevels)> {
        let entries: Vec<&BookLevels> = match &self.data {
            BookData::Many(levels) => levels.iter().collect(),
            BookData::Single(levels) => vec![levels],
        };
        entries
            .into_iter()
            .filter_map(|levels| {
                levels
                    .symbol
                    .as_deref()
                    .or(self.symbol.as_deref())
                    .map(|symbol| (symbol, levels))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeMessage {
    AddOrderAck(OrderAck),
    CancelOrderAck(CancelAck),
    CancelAllAck(CancelAck),
    Book(BookMessage),
    Other,
}

/// Classify a southbound payload
pub fn parse_exchange_message(raw: &[u8]) -> ProxyResult<ExchangeMessage> {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Ok(ExchangeMessage::Other),
    };

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return match method {
            "add_order" => {
                let ack: OrderAck = serde_json::from_value(value)
                    .map_err(|e| ProxyError::MalformedMessage(format!("add_order ack: {}", e)))?;
                if ack.success && ack.result.is_none() {
                    return Err(ProxyError::MissingField("add_order".to_string(), "result".to_string()));
                }
                Ok(ExchangeMessage::AddOrderAck(ack))
            }
            "cancel_order" => serde_json::from_value(value)
                .map(ExchangeMessage::CancelOrderAck)
                .map_err(|e| ProxyError::MalformedMessage(format!("cancel_order ack: {}", e))),
            "cancel_all" => serde_json::from_value(value)
                .map(ExchangeMessage::CancelAllAck)
                .map_err(|e| ProxyError::MalformedMessage(format!("cancel_all ack: {}", e))),
            _ => Ok(ExchangeMessage::Other),
        };
    }

    if value.get("channel").and_then(Value::as_str) == Some(BOOK_CHANNEL) {
        // Subscription status and heartbeats on the book channel carry no data
        if value.get("data").is_none() {
            return Ok(ExchangeMessage::Other);
        }
        let book: BookMessage = serde_json::from_value(value)
            .map_err(|e| ProxyError::MalformedMessage(format!("book update: {}", e)))?;
        return Ok(ExchangeMessage::Book(book));
    }

    Ok(ExchangeMessage::Other)
}

fn method_of(raw: &[u8]) -> Option<(String, Value)> {
    let value: Value = serde_json::from_slice(raw).ok()?;
    let method = value.as_object()?.get("method")?.as_str()?.to_string();
    Some((method, value))
}

// ---------------------------------------------------------------------------
// Synthetic messages

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub asset: String,
    pub qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub cost: f64,
    pub exec_id: String,
    pub exec_type: String,
    pub fees: Vec<Fee>,
    #[serde(rename = "liquidity_ind")]
    pub liquidity_indicator: String,
    pub ord_type: String,
    pub order_id: String,
    pub last_qty: f64,
    pub order_userref: i64,
    pub last_price: f64,
    pub side: Side,
    pub symbol: String,
    pub timestamp: String,
    pub trade_id: i64,
}

impl Recorded for Execution {
    fn channel(&self) -> &str {
        EXECUTIONS_CHANNEL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    pub channel: String,
    pub data: Vec<Execution>,
    pub sequence: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ExecutionMessage {
    pub fn snapshot(data: Vec<Execution>, sequence: i64) -> Self {
        Self {
            channel: EXECUTIONS_CHANNEL.to_string(),
            data,
            sequence,
            kind: "snapshot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CancelResult {
    UserRef { order_userref: i64 },
    OrderId { order_id: String },
    Count { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub method: String,
    pub req_id: i64,
    pub result: CancelResult,
    pub success: bool,
    pub time_in: String,
    pub time_out: String,
}

impl CancelResponse {
    pub fn succeeded(method: &str, req_id: i64, result: CancelResult, at: DateTime<Utc>) -> Self {
        let stamp = wire_timestamp(at);
        Self {
            method: method.to_string(),
            req_id,
            result,
            success: true,
            time_in: stamp.clone(),
            time_out: stamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(wire_timestamp(at), "2024-03-01T12:30:05.000042Z");
    }

    #[test]
    fn test_parse_add_order() {
        let raw = bytes(json!({
            "method": "add_order",
            "params": {
                "limit_price": 100.5, "order_type": "limit", "order_userref": 7,
                "order_qty": 1.5, "side": "sell", "symbol": "BTC/USD",
                "token": "abc", "validate": false, "margin": false
            },
            "req_id": 3
        }));
        match parse_client_message(&raw).unwrap() {
            ClientMessage::AddOrder(req) => {
                assert_eq!(req.params.order_userref, 7);
                assert_eq!(req.params.side, Side::Sell);
                assert_eq!(req.params.quote_asset(), Some("USD"));
                assert_eq!(req.req_id, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_add_order_missing_price_is_error() {
        let raw = bytes(json!({
            "method": "add_order",
            "params": { "order_type": "limit", "order_userref": 7, "order_qty": 1.5,
                        "side": "buy", "symbol": "BTC/USD" },
            "req_id": 3
        }));
        assert!(matches!(parse_client_message(&raw), Err(ProxyError::MalformedMessage(_))));
    }

    #[test]
    fn test_add_order_symbol_without_quote_is_error() {
        let raw = bytes(json!({
            "method": "add_order",
            "params": { "limit_price": 1.0, "order_type": "limit", "order_userref": 7,
                        "order_qty": 1.5, "side": "buy", "symbol": "BTCUSD" },
            "req_id": 3
        }));
        assert!(matches!(parse_client_message(&raw), Err(ProxyError::MissingField(_, _))));
    }

    #[test]
    fn test_parse_cancel_variants() {
        let by_ref = bytes(json!({"method": "cancel_order", "params": {"order_userref": [1, 2]}, "req_id": 9}));
        assert_eq!(
            parse_client_message(&by_ref).unwrap(),
            ClientMessage::Cancel(CancelRequest {
                scope: CancelScope::Orders { order_userrefs: vec![1, 2], order_ids: vec![] },
                req_id: 9,
            })
        );

        let by_id = bytes(json!({"method": "cancel_order", "params": {"orders": ["OABC"]}, "req_id": 10}));
        assert_eq!(
            parse_client_message(&by_id).unwrap(),
            ClientMessage::Cancel(CancelRequest {
                scope: CancelScope::Orders { order_userrefs: vec![], order_ids: vec!["OABC".to_string()] },
                req_id: 10,
            })
        );

        let all = bytes(json!({"method": "cancel_all", "params": {"token": "t"}, "req_id": 11}));
        assert_eq!(
            parse_client_message(&all).unwrap(),
            ClientMessage::Cancel(CancelRequest { scope: CancelScope::All, req_id: 11 })
        );
    }

    #[test]
    fn test_non_object_payloads_pass() {
        assert_eq!(parse_client_message(b"ping").unwrap(), ClientMessage::Other);
        assert_eq!(parse_client_message(b"[1,2,3]").unwrap(), ClientMessage::Other);
        assert_eq!(parse_client_message(br#"{"event":"ping"}"#).unwrap(), ClientMessage::Other);
        assert_eq!(parse_exchange_message(b"not json").unwrap(), ExchangeMessage::Other);
    }

    #[test]
    fn test_subscribe_without_channel_is_error() {
        let raw = bytes(json!({"method": "subscribe", "params": {}}));
        assert!(parse_client_message(&raw).is_err());
    }

    #[test]
    fn test_parse_add_order_ack() {
        let raw = bytes(json!({
            "method": "add_order",
            "req_id": 3,
            "result": {"order_id": "OXYZ", "order_userref": 7},
            "success": true,
            "time_in": "2024-01-01T00:00:00.000000Z",
            "time_out": "2024-01-01T00:00:00.000100Z"
        }));
        match parse_exchange_message(&raw).unwrap() {
            ExchangeMessage::AddOrderAck(ack) => {
                let result = ack.result.unwrap();
                assert_eq!(result.order_id, "OXYZ");
                assert_eq!(result.order_userref, Some(7));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_successful_ack_without_result_is_error() {
        let raw = bytes(json!({"method": "add_order", "req_id": 3, "success": true}));
        assert!(parse_exchange_message(&raw).is_err());
    }

    #[test]
    fn test_cancel_ack_without_success_is_error() {
        let raw = bytes(json!({"method": "cancel_order", "req_id": 3}));
        assert!(parse_exchange_message(&raw).is_err());
    }

    #[test]
    fn test_book_compact_and_native_forms() {
        let compact = bytes(json!({
            "channel": "book", "symbol": "BTC/USD",
            "data": {"bids": [{"price": 10.0, "qty": 1.0}], "asks": [{"price": 11.0, "qty": 2.0}]}
        }));
        let ExchangeMessage::Book(book) = parse_exchange_message(&compact).unwrap() else {
            panic!("expected book");
        };
        let updates = book.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "BTC/USD");
        assert_eq!(updates[0].1.asks, vec![PriceLevel::new(11.0, 2.0)]);

        let native = bytes(json!({
            "channel": "book", "type": "update",
            "data": [{"symbol": "ETH/USD", "bids": [], "asks": [{"price": 3000.0, "qty": 0.0}], "checksum": 1}]
        }));
        let ExchangeMessage::Book(book) = parse_exchange_message(&native).unwrap() else {
            panic!("expected book");
        };
        let updates = book.updates();
        assert_eq!(updates[0].0, "ETH/USD");
        assert_eq!(updates[0].1.asks[0].qty, 0.0);
    }

    #[test]
    fn test_book_subscribe_ack_is_other() {
        let raw = bytes(json!({"method": "subscribe", "result": {"channel": "book"}, "success": true}));
        assert_eq!(parse_exchange_message(&raw).unwrap(), ExchangeMessage::Other);
    }

    #[test]
    fn test_execution_wire_names() {
        let exec = Execution {
            cost: 1.0,
            exec_id: "E1".to_string(),
            exec_type: "trade".to_string(),
            fees: vec![Fee { asset: "USD".to_string(), qty: 0.1 }],
            liquidity_indicator: "m".to_string(),
            ord_type: "limit".to_string(),
            order_id: "O1".to_string(),
            last_qty: 1.0,
            order_userref: 5,
            last_price: 10.0,
            side: Side::Buy,
            symbol: "BTC/USD".to_string(),
            timestamp: "t".to_string(),
            trade_id: 1,
        };
        let msg = serde_json::to_value(ExecutionMessage::snapshot(vec![exec], 4)).unwrap();
        assert_eq!(msg["channel"], "executions");
        assert_eq!(msg["type"], "snapshot");
        assert_eq!(msg["sequence"], 4);
        let data = &msg["data"][0];
        for field in [
            "cost", "exec_id", "exec_type", "fees", "liquidity_ind", "ord_type", "order_id",
            "last_qty", "order_userref", "last_price", "side", "symbol", "timestamp", "trade_id",
        ] {
            assert!(data.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(data["side"], "buy");
    }

    #[test]
    fn test_cancel_result_shapes() {
        let by_ref = serde_json::to_value(CancelResult::UserRef { order_userref: 4 }).unwrap();
        assert_eq!(by_ref, json!({"order_userref": 4}));
        let count = serde_json::to_value(CancelResult::Count { count: 2 }).unwrap();
        assert_eq!(count, json!({"count": 2}));
    }
}
