// Common test utilities and helpers

#![allow(dead_code)]

use kraken_test_proxy::{
    Config, Execution, MessageReplay, SharedOrderbook, TradeIntercept, TradeInterceptConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub use kraken_test_proxy::intercept::Intercept;

pub const SYMBOL: &str = "BTC/USD";

/// Intercept settings used across the suite: fee 1%, no log filters
pub fn intercept_config(match_order_book: bool) -> TradeInterceptConfig {
    TradeInterceptConfig {
        enabled: true,
        fee_ratio: 0.01,
        match_order_book,
        log_filters: Vec::new(),
    }
}

/// A fresh intercept with its own book registry and history
pub fn create_intercept(match_order_book: bool) -> TradeIntercept {
    create_intercept_with(
        &intercept_config(match_order_book),
        Arc::new(SharedOrderbook::new(&[SYMBOL])),
        Arc::new(MessageReplay::new()),
    )
}

pub fn create_intercept_with(
    config: &TradeInterceptConfig,
    orderbooks: Arc<SharedOrderbook>,
    replay: Arc<MessageReplay<Execution>>,
) -> TradeIntercept {
    TradeIntercept::new(config, false, orderbooks, replay)
}

/// Proxy configuration pointing both routes at `upstream`
pub fn create_test_config(upstream: &str, match_order_book: bool) -> Config {
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".to_string();
    config.kraken.url_private = upstream.to_string();
    config.kraken.url_public = upstream.to_string();
    config.kraken.timeout_secs = 5;
    config.trade_intercept = intercept_config(match_order_book);
    config
}

pub fn to_bytes(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).expect("serializable test message")
}

pub fn add_order(order_userref: i64, side: &str, price: f64, qty: f64, req_id: i64) -> Vec<u8> {
    to_bytes(json!({
        "method": "add_order",
        "params": {
            "limit_price": price,
            "order_type": "limit",
            "order_userref": order_userref,
            "order_qty": qty,
            "side": side,
            "symbol": SYMBOL,
            "token": "test-token",
            "validate": false,
            "margin": false
        },
        "req_id": req_id
    }))
}

pub fn add_order_ack(order_userref: i64, order_id: &str, req_id: i64) -> Vec<u8> {
    to_bytes(json!({
        "method": "add_order",
        "req_id": req_id,
        "result": {"order_id": order_id, "order_userref": order_userref},
        "success": true,
        "time_in": "2024-01-01T00:00:00.000000Z",
        "time_out": "2024-01-01T00:00:00.000100Z"
    }))
}

pub fn add_order_rejected(req_id: i64) -> Vec<u8> {
    to_bytes(json!({
        "method": "add_order",
        "req_id": req_id,
        "success": false,
        "error": "EOrder:Insufficient funds"
    }))
}

pub fn cancel_order(order_userrefs: &[i64], req_id: i64) -> Vec<u8> {
    to_bytes(json!({
        "method": "cancel_order",
        "params": {"order_userref": order_userrefs, "token": "test-token"},
        "req_id": req_id
    }))
}

pub fn cancel_by_order_id(order_ids: &[&str], req_id: i64) -> Vec<u8> {
    to_bytes(json!({
        "method": "cancel_order",
        "params": {"orders": order_ids, "token": "test-token"},
        "req_id": req_id
    }))
}

pub fn cancel_all(req_id: i64) -> Vec<u8> {
    to_bytes(json!({"method": "cancel_all", "params": {"token": "test-token"}, "req_id": req_id}))
}

pub fn cancel_ack(method: &str, success: bool, req_id: i64) -> Vec<u8> {
    if success {
        to_bytes(json!({"method": method, "req_id": req_id, "success": true}))
    } else {
        to_bytes(json!({
            "method": method,
            "req_id": req_id,
            "success": false,
            "error": "EOrder:Unknown order"
        }))
    }
}

pub fn subscribe_executions() -> Vec<u8> {
    to_bytes(json!({
        "method": "subscribe",
        "params": {"channel": "executions", "snap_orders": true, "token": "test-token"}
    }))
}

pub fn book_update(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> Vec<u8> {
    let levels = |side: &[(f64, f64)]| -> Vec<Value> {
        side.iter().map(|(price, qty)| json!({"price": price, "qty": qty})).collect()
    };
    to_bytes(json!({
        "channel": "book",
        "symbol": SYMBOL,
        "data": {"bids": levels(bids), "asks": levels(asks)}
    }))
}

pub fn heartbeat() -> Vec<u8> {
    to_bytes(json!({"channel": "heartbeat"}))
}

/// Every message the intercept has queued for the client, parsed
pub fn drain_injected<I: Intercept>(intercept: &I) -> Vec<Value> {
    let mut injected = Vec::new();
    while let Some(raw) = intercept.inject_south().expect("inject_south") {
        injected.push(serde_json::from_slice(&raw).expect("injected message is JSON"));
    }
    injected
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
