// Synthetic trade execution for orders placed through the proxy
//
// Northbound add_order/cancel_order requests are queued; the southbound pump
// drains the queues, fabricates executions and correlates them with the
// exchange's acknowledgements. Fills happen either on the add_order ack
// (immediate mode) or when the simulated book crosses the order.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TradeInterceptConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::intercept::filters::LogFilters;
use crate::intercept::messages::{
    parse_client_message, parse_exchange_message, wire_timestamp, BookMessage, CancelAck,
    CancelRequest, CancelResponse, CancelResult, CancelScope, ClientMessage, ExchangeMessage,
    Execution, ExecutionMessage, Fee, OrderAck, OrderRequest, Side, EXECUTIONS_CHANNEL,
};
use crate::intercept::Intercept;
use crate::orderbook::SharedOrderbook;
use crate::recorder::MessageReplay;

/// Capacity of each northbound -> southbound queue
pub const QUEUE_CAPACITY: usize = 100;

/// Amount given up for the trade including fees: base asset for a buy,
/// quote asset for a sell
pub fn trade_cost(side: Side, qty: f64, price: f64, fee_ratio: f64) -> f64 {
    match side {
        Side::Buy => qty + qty * fee_ratio,
        Side::Sell => qty * price + qty * price * fee_ratio,
    }
}

/// Fee in the quote asset
pub fn trade_fee(qty: f64, price: f64, fee_ratio: f64) -> f64 {
    qty * price * fee_ratio
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptStats {
    /// Order refs with a synthetic fill still to come, ascending
    pub pending: Vec<i64>,
    /// Order refs cancelled before they filled, ascending
    pub cancelled: Vec<i64>,
    pub emitted: u64,
    /// Exchange order ids still resolvable by cancel-by-id
    pub tracked_order_ids: usize,
}

#[derive(Debug)]
struct PendingTrade {
    execution: Execution,
    req_id: i64,
}

/// State owned by the southbound pump. The northbound side never locks it.
#[derive(Debug)]
struct SouthboundState {
    order_rx: mpsc::Receiver<OrderRequest>,
    /// Cancels are correlated strictly FIFO with exchange acks, so two cancels
    /// in flight at once on one connection can be matched to the wrong ack.
    cancel_rx: mpsc::Receiver<CancelRequest>,
    replay_rx: mpsc::Receiver<Vec<Execution>>,

    pending: HashMap<i64, PendingTrade>,
    past: HashMap<i64, Execution>,
    exchange_order_ids: HashMap<String, i64>,

    exec_batches: VecDeque<Vec<Execution>>,
    cancel_responses: VecDeque<CancelResponse>,

    next_id: i64,
    sequence: i64,
    emitted: u64,
}

impl SouthboundState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn cancel_pending(&mut self, order_userref: i64) -> bool {
        match self.pending.remove(&order_userref) {
            Some(trade) => {
                self.exchange_order_ids.remove(&trade.execution.order_id);
                self.past.insert(order_userref, trade.execution);
                true
            }
            None => false,
        }
    }
}

pub struct TradeIntercept {
    enabled: bool,
    fee_ratio: f64,
    match_order_book: bool,
    enable_logging: bool,
    filters: LogFilters,

    orderbooks: Arc<SharedOrderbook>,
    replay: Arc<MessageReplay<Execution>>,

    order_tx: mpsc::Sender<OrderRequest>,
    cancel_tx: mpsc::Sender<CancelRequest>,
    replay_tx: mpsc::Sender<Vec<Execution>>,

    south: Mutex<SouthboundState>,
}

impl TradeIntercept {
    pub fn new(
        config: &TradeInterceptConfig,
        enable_logging: bool,
        orderbooks: Arc<SharedOrderbook>,
        replay: Arc<MessageReplay<Execution>>,
    ) -> Self {
        let (order_tx, order_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (cancel_tx, cancel_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (replay_tx, replay_rx) = mpsc::channel(QUEUE_CAPACITY);

        Self {
            enabled: config.enabled,
            fee_ratio: config.fee_ratio,
            match_order_book: config.match_order_book,
            enable_logging,
            filters: LogFilters::new(&config.log_filters),
            orderbooks,
            replay,
            order_tx,
            cancel_tx,
            replay_tx,
            south: Mutex::new(SouthboundState {
                order_rx,
                cancel_rx,
                replay_rx,
                pending: HashMap::new(),
                past: HashMap::new(),
                exchange_order_ids: HashMap::new(),
                exec_batches: VecDeque::new(),
                cancel_responses: VecDeque::new(),
                next_id: 0,
                sequence: 0,
                emitted: 0,
            }),
        }
    }

    pub fn stats(&self) -> ProxyResult<InterceptStats> {
        let south = self.lock_south()?;
        let mut pending: Vec<i64> = south.pending.keys().copied().collect();
        let mut cancelled: Vec<i64> = south.past.keys().copied().collect();
        pending.sort_unstable();
        cancelled.sort_unstable();
        Ok(InterceptStats {
            pending,
            cancelled,
            emitted: south.emitted,
            tracked_order_ids: south.exchange_order_ids.len(),
        })
    }

    fn lock_south(&self) -> ProxyResult<MutexGuard<'_, SouthboundState>> {
        self.south
            .lock()
            .map_err(|_| ProxyError::StatePoisoned("southbound trade state".to_string()))
    }

    /// Turn every queued order request into a pending execution
    fn drain_order_requests(&self, south: &mut SouthboundState) {
        while let Ok(request) = south.order_rx.try_recv() {
            let id = south.allocate_id();
            let params = request.params;
            let now = Utc::now();

            let execution = Execution {
                cost: trade_cost(params.side, params.order_qty, params.limit_price, self.fee_ratio),
                exec_id: format!("SIMX-{}", id),
                exec_type: "trade".to_string(),
                fees: vec![Fee {
                    asset: params.quote_asset().unwrap_or_default().to_string(),
                    qty: trade_fee(params.order_qty, params.limit_price, self.fee_ratio),
                }],
                liquidity_indicator: "m".to_string(),
                ord_type: "limit".to_string(),
                order_id: format!("SIMO-{}", id),
                last_qty: params.order_qty,
                order_userref: params.order_userref,
                last_price: params.limit_price,
                side: params.side,
                symbol: params.symbol,
                timestamp: wire_timestamp(now),
                trade_id: id,
            };

            if self.enable_logging {
                info!(
                    "Pending synthetic {} {} {} @ {} for order_userref {} ({})",
                    execution.side.as_str(),
                    execution.last_qty,
                    execution.symbol,
                    execution.last_price,
                    execution.order_userref,
                    execution.exec_id
                );
            }

            let trade = PendingTrade {
                execution,
                req_id: request.req_id,
            };
            if let Some(previous) = south.pending.insert(params.order_userref, trade) {
                south.exchange_order_ids.remove(&previous.execution.order_id);
                debug!(
                    "order_userref {} reused, replacing pending {}",
                    params.order_userref, previous.execution.exec_id
                );
            }
        }
    }

    /// Fill whatever the simulated book now crosses
    fn match_pending(&self, south: &mut SouthboundState) {
        let mut order_refs: Vec<i64> = south.pending.keys().copied().collect();
        order_refs.sort_unstable();

        for order_userref in order_refs {
            let Some(trade) = south.pending.get_mut(&order_userref) else {
                continue;
            };
            let execution = &mut trade.execution;
            let Some(book) = self.orderbooks.get(&execution.symbol) else {
                continue;
            };

            let fill = match execution.side {
                Side::Buy => book.match_bid(execution.last_price, execution.last_qty),
                Side::Sell => book.match_ask(execution.last_price, execution.last_qty),
            };
            let Some(fill) = fill else {
                continue;
            };

            execution.last_price = fill.price;
            execution.last_qty = fill.qty;
            execution.cost = trade_cost(execution.side, fill.qty, fill.price, self.fee_ratio);
            for fee in execution.fees.iter_mut() {
                fee.qty = trade_fee(fill.qty, fill.price, self.fee_ratio);
            }

            if let Some(trade) = south.pending.remove(&order_userref) {
                if self.enable_logging {
                    info!(
                        "Book crossed order_userref {}: filled {} @ {}",
                        order_userref, fill.qty, fill.price
                    );
                }
                self.emit(south, trade.execution);
            }
        }
    }

    fn emit(&self, south: &mut SouthboundState, execution: Execution) {
        south.exchange_order_ids.remove(&execution.order_id);
        south.exec_batches.push_back(vec![execution.clone()]);
        self.replay.add_message(execution);
        south.emitted += 1;
    }

    fn handle_order_ack(&self, south: &mut SouthboundState, ack: OrderAck) {
        if !ack.success {
            let rejected: Vec<i64> = south
                .pending
                .iter()
                .filter(|(_, trade)| trade.req_id == ack.req_id)
                .map(|(order_userref, _)| *order_userref)
                .collect();
            if let [order_userref] = rejected[..] {
                south.pending.remove(&order_userref);
                warn!(
                    "add_order req_id {} rejected by exchange ({}), dropping synthetic fill for order_userref {}",
                    ack.req_id,
                    ack.error.as_deref().unwrap_or("no reason given"),
                    order_userref
                );
            }
            return;
        }

        let Some(result) = ack.result else {
            return;
        };
        let Some(order_userref) = result.order_userref else {
            debug!("add_order ack {} carries no order_userref", result.order_id);
            return;
        };

        let Some(trade) = south.pending.get_mut(&order_userref) else {
            debug!("No pending trade for acknowledged order_userref {}", order_userref);
            return;
        };
        if !result.order_id.is_empty() {
            south
                .exchange_order_ids
                .insert(result.order_id.clone(), order_userref);
            trade.execution.order_id = result.order_id;
        }

        if !self.match_order_book {
            if let Some(trade) = south.pending.remove(&order_userref) {
                if self.enable_logging {
                    info!("Injecting execution for order_userref {}", order_userref);
                }
                self.emit(south, trade.execution);
            }
        }
    }

    /// Returns whether the genuine ack is forwarded
    fn handle_cancel_ack(&self, south: &mut SouthboundState, ack: CancelAck) -> bool {
        let Ok(request) = south.cancel_rx.try_recv() else {
            // Nothing queued to build a replacement from, so the exchange's answer stands
            debug!("{} ack with no queued cancel request", ack.method);
            return true;
        };

        let mut results = Vec::new();
        match request.scope {
            CancelScope::Orders {
                order_userrefs,
                order_ids,
            } => {
                for order_userref in order_userrefs {
                    south.cancel_pending(order_userref);
                    results.push(CancelResult::UserRef { order_userref });
                }
                for order_id in order_ids {
                    if let Some(order_userref) = south.exchange_order_ids.get(&order_id).copied() {
                        south.cancel_pending(order_userref);
                    }
                    results.push(CancelResult::OrderId { order_id });
                }
            }
            CancelScope::All => {
                let order_refs: Vec<i64> = south.pending.keys().copied().collect();
                let count = order_refs
                    .into_iter()
                    .filter(|order_userref| south.cancel_pending(*order_userref))
                    .count();
                results.push(CancelResult::Count { count });
            }
        }

        if ack.success {
            return true;
        }

        if self.enable_logging {
            info!(
                "Replacing failed {} req_id {} ({}) with {} successful response(s)",
                ack.method,
                ack.req_id,
                ack.error.as_deref().unwrap_or("no reason given"),
                results.len()
            );
        }
        let now = Utc::now();
        for result in results {
            south
                .cancel_responses
                .push_back(CancelResponse::succeeded(&ack.method, ack.req_id, result, now));
        }
        false
    }

    fn ingest_book(&self, book: &BookMessage) {
        for (symbol, levels) in book.updates() {
            let Some(orderbook) = self.orderbooks.get(symbol) else {
                debug!("Ignoring book update for untracked symbol {}", symbol);
                continue;
            };
            orderbook.add_bids(&levels.bids);
            orderbook.add_asks(&levels.asks);
            orderbook.process();
        }
    }
}

impl Intercept for TradeIntercept {
    async fn northbound(&self, msg: &[u8]) -> ProxyResult<bool> {
        if !self.enabled {
            return Ok(true);
        }

        match parse_client_message(msg)? {
            ClientMessage::AddOrder(request) if !request.params.has_quantity() => {
                warn!(
                    "add_order req_id {} has order_qty {}, no synthetic fill will be made",
                    request.req_id, request.params.order_qty
                );
            }
            ClientMessage::AddOrder(request) => {
                debug!("Queueing add_order req_id {}", request.req_id);
                self.order_tx
                    .send(request)
                    .await
                    .map_err(|_| ProxyError::ConnectionClosed("order request queue".to_string()))?;
            }
            ClientMessage::Cancel(request) => {
                debug!("Queueing cancel req_id {}", request.req_id);
                self.cancel_tx
                    .send(request)
                    .await
                    .map_err(|_| ProxyError::ConnectionClosed("cancel request queue".to_string()))?;
            }
            ClientMessage::Subscribe { channel } if channel == EXECUTIONS_CHANNEL => {
                let history = self.replay.replay(EXECUTIONS_CHANNEL);
                if !history.is_empty() {
                    if self.enable_logging {
                        info!("Replaying {} execution(s) on resubscribe", history.len());
                    }
                    self.replay_tx
                        .send(history)
                        .await
                        .map_err(|_| ProxyError::ConnectionClosed("execution replay queue".to_string()))?;
                }
            }
            ClientMessage::Subscribe { .. } | ClientMessage::Other => {}
        }
        Ok(true)
    }

    fn southbound(&self, msg: &[u8]) -> ProxyResult<bool> {
        if !self.enabled {
            return Ok(true);
        }

        let mut south = self.lock_south()?;
        self.drain_order_requests(&mut south);
        if self.match_order_book {
            self.match_pending(&mut south);
        }

        match parse_exchange_message(msg)? {
            ExchangeMessage::AddOrderAck(ack) => {
                self.handle_order_ack(&mut south, ack);
                Ok(true)
            }
            ExchangeMessage::CancelOrderAck(ack) | ExchangeMessage::CancelAllAck(ack) => {
                Ok(self.handle_cancel_ack(&mut south, ack))
            }
            ExchangeMessage::Book(book) => {
                if self.match_order_book {
                    self.ingest_book(&book);
                }
                Ok(true)
            }
            ExchangeMessage::Other => Ok(true),
        }
    }

    fn inject_south(&self) -> ProxyResult<Option<Vec<u8>>> {
        if !self.enabled {
            return Ok(None);
        }

        let mut south = self.lock_south()?;
        while let Ok(batch) = south.replay_rx.try_recv() {
            south.exec_batches.push_back(batch);
        }

        if let Some(batch) = south.exec_batches.pop_front() {
            south.sequence += 1;
            let msg = ExecutionMessage::snapshot(batch, south.sequence);
            return Ok(Some(serde_json::to_vec(&msg)?));
        }

        if let Some(response) = south.cancel_responses.pop_front() {
            return Ok(Some(serde_json::to_vec(&response)?));
        }

        Ok(None)
    }

    fn check_filters(&self, msg: &[u8]) -> bool {
        self.filters.should_log(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeInterceptConfig;
    use serde_json::{json, Value};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn intercept(match_order_book: bool) -> TradeIntercept {
        let config = TradeInterceptConfig {
            enabled: true,
            fee_ratio: 0.01,
            match_order_book,
            log_filters: Vec::new(),
        };
        TradeIntercept::new(
            &config,
            false,
            Arc::new(SharedOrderbook::new(&["BTC/USD"])),
            Arc::new(MessageReplay::new()),
        )
    }

    fn add_order(order_userref: i64, side: &str, price: f64, qty: f64, req_id: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "method": "add_order",
            "params": {
                "limit_price": price, "order_type": "limit", "order_userref": order_userref,
                "order_qty": qty, "side": side, "symbol": "BTC/USD", "token": "t",
                "validate": false, "margin": false
            },
            "req_id": req_id
        }))
        .unwrap()
    }

    fn injected(intercept: &TradeIntercept) -> Option<Value> {
        intercept
            .inject_south()
            .unwrap()
            .map(|raw| serde_json::from_slice(&raw).unwrap())
    }

    #[test]
    fn test_sell_cost_and_fee() {
        assert!(close(trade_cost(Side::Sell, 2.0, 100.0, 0.01), 202.0));
        assert!(close(trade_fee(2.0, 100.0, 0.01), 2.0));
    }

    #[test]
    fn test_buy_cost_is_in_base_asset() {
        assert!(close(trade_cost(Side::Buy, 2.0, 100.0, 0.01), 2.02));
        assert!(close(trade_fee(2.0, 100.0, 0.01), 2.0));
    }

    #[tokio::test]
    async fn test_synthesized_execution_fields() {
        let intercept = intercept(false);
        intercept.northbound(&add_order(42, "sell", 100.0, 2.0, 1)).await.unwrap();
        intercept
            .southbound(br#"{"method":"add_order","req_id":1,"result":{"order_id":"OEXCH-1","order_userref":42},"success":true}"#)
            .unwrap();

        let msg = injected(&intercept).expect("execution injected");
        let exec = &msg["data"][0];
        assert_eq!(exec["order_userref"], 42);
        assert_eq!(exec["order_id"], "OEXCH-1");
        assert_eq!(exec["exec_type"], "trade");
        assert_eq!(exec["liquidity_ind"], "m");
        assert_eq!(exec["ord_type"], "limit");
        assert_eq!(exec["fees"][0]["asset"], "USD");
        assert!(close(exec["fees"][0]["qty"].as_f64().unwrap(), 2.0));
        assert!(close(exec["cost"].as_f64().unwrap(), 202.0));
        assert_eq!(exec["timestamp"].as_str().unwrap().len(), "2024-01-01T00:00:00.000000Z".len());
    }

    #[tokio::test]
    async fn test_execution_ids_are_unique() {
        let intercept = intercept(false);
        for order_userref in 1..=3 {
            intercept
                .northbound(&add_order(order_userref, "buy", 10.0, 1.0, order_userref))
                .await
                .unwrap();
        }
        intercept.southbound(br#"{"channel":"heartbeat"}"#).unwrap();
        for order_userref in 1..=3 {
            let ack = json!({"method": "add_order", "req_id": order_userref,
                             "result": {"order_id": "", "order_userref": order_userref}, "success": true});
            intercept.southbound(&serde_json::to_vec(&ack).unwrap()).unwrap();
        }

        let mut exec_ids = Vec::new();
        let mut sequences = Vec::new();
        while let Some(msg) = injected(&intercept) {
            exec_ids.push(msg["data"][0]["exec_id"].as_str().unwrap().to_string());
            sequences.push(msg["sequence"].as_i64().unwrap());
        }
        exec_ids.dedup();
        assert_eq!(exec_ids.len(), 3);
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reused_userref_overwrites_pending() {
        let intercept = intercept(true);
        intercept.northbound(&add_order(5, "buy", 10.0, 1.0, 1)).await.unwrap();
        intercept.northbound(&add_order(5, "buy", 11.0, 3.0, 2)).await.unwrap();
        intercept.southbound(br#"{"channel":"heartbeat"}"#).unwrap();

        assert_eq!(intercept.stats().unwrap().pending, vec![5]);
    }

    fn order_ack(order_userref: i64, order_id: &str, req_id: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "method": "add_order",
            "req_id": req_id,
            "result": {"order_id": order_id, "order_userref": order_userref},
            "success": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_order_ids_released_on_fill_and_cancel() {
        let intercept = intercept(true);
        intercept.northbound(&add_order(1, "buy", 10.0, 1.0, 1)).await.unwrap();
        intercept.northbound(&add_order(2, "buy", 10.0, 1.0, 2)).await.unwrap();
        intercept.southbound(&order_ack(1, "OEX-1", 1)).unwrap();
        intercept.southbound(&order_ack(2, "OEX-2", 2)).unwrap();
        assert_eq!(intercept.stats().unwrap().tracked_order_ids, 2);

        intercept
            .northbound(br#"{"method":"cancel_order","params":{"orders":["OEX-1"]},"req_id":3}"#)
            .await
            .unwrap();
        intercept
            .southbound(br#"{"method":"cancel_order","req_id":3,"success":true,"result":{"order_id":"OEX-1"}}"#)
            .unwrap();
        assert_eq!(intercept.stats().unwrap().tracked_order_ids, 1);

        intercept
            .southbound(br#"{"channel":"book","type":"update","data":[{"symbol":"BTC/USD","bids":[],"asks":[{"price":9.0,"qty":5.0}]}]}"#)
            .unwrap();
        intercept.southbound(br#"{"channel":"heartbeat"}"#).unwrap();

        let stats = intercept.stats().unwrap();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.tracked_order_ids, 0);
    }

    #[tokio::test]
    async fn test_ack_for_unknown_userref_is_not_tracked() {
        let intercept = intercept(false);
        intercept.southbound(&order_ack(77, "OEX-77", 1)).unwrap();
        assert_eq!(intercept.stats().unwrap().tracked_order_ids, 0);
    }

    #[tokio::test]
    async fn test_zero_quantity_order_is_not_simulated() {
        let intercept = intercept(true);
        let forward = intercept.northbound(&add_order(3, "sell", 10.0, 0.0, 1)).await.unwrap();
        assert!(forward);

        intercept.southbound(&order_ack(3, "OEX-3", 1)).unwrap();
        let stats = intercept.stats().unwrap();
        assert!(stats.pending.is_empty());
        assert_eq!(stats.tracked_order_ids, 0);
        assert!(injected(&intercept).is_none());
    }

    #[tokio::test]
    async fn test_failed_cancel_with_empty_queue_is_forwarded() {
        let intercept = intercept(false);
        let forward = intercept
            .southbound(br#"{"method":"cancel_order","req_id":1,"success":false,"error":"EOrder:Unknown order"}"#)
            .unwrap();
        assert!(forward);
        assert!(injected(&intercept).is_none());
    }

    #[tokio::test]
    async fn test_injection_prefers_executions() {
        let intercept = intercept(false);
        intercept.northbound(&add_order(1, "buy", 10.0, 1.0, 1)).await.unwrap();
        intercept
            .northbound(br#"{"method":"cancel_order","params":{"order_userref":[99]},"req_id":2}"#)
            .await
            .unwrap();
        intercept.southbound(br#"{"channel":"heartbeat"}"#).unwrap();
        intercept
            .southbound(br#"{"method":"cancel_order","req_id":2,"success":false}"#)
            .unwrap();
        intercept
            .southbound(br#"{"method":"add_order","req_id":1,"result":{"order_id":"O1","order_userref":1},"success":true}"#)
            .unwrap();

        let first = injected(&intercept).unwrap();
        assert_eq!(first["channel"], "executions");
        let second = injected(&intercept).unwrap();
        assert_eq!(second["method"], "cancel_order");
        assert_eq!(second["result"]["order_userref"], 99);
        assert!(injected(&intercept).is_none());
    }

    #[tokio::test]
    async fn test_partial_fill_uses_resting_quantity() {
        let intercept = intercept(true);
        intercept.northbound(&add_order(8, "buy", 101.0, 2.0, 1)).await.unwrap();
        intercept
            .southbound(br#"{"channel":"book","symbol":"BTC/USD","data":{"bids":[],"asks":[{"price":100.0,"qty":0.5}]}}"#)
            .unwrap();
        assert!(injected(&intercept).is_none());

        intercept.southbound(br#"{"channel":"heartbeat"}"#).unwrap();
        let msg = injected(&intercept).expect("fill after book update");
        let exec = &msg["data"][0];
        assert!(close(exec["last_qty"].as_f64().unwrap(), 0.5));
        assert!(close(exec["last_price"].as_f64().unwrap(), 101.0));
        assert!(close(exec["cost"].as_f64().unwrap(), 0.505));
        assert!(close(exec["fees"][0]["qty"].as_f64().unwrap(), 0.505));
        assert!(intercept.stats().unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_known_method_is_fatal() {
        let intercept = intercept(false);
        let err = intercept
            .northbound(br#"{"method":"add_order","params":{"side":"buy"},"req_id":1}"#)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "protocol");
    }
}
