// Message interception between the trading client and the exchange
//
// The proxy pumps call into an `Intercept` from two tasks at once: the
// northbound pump (client -> exchange) and the southbound pump
// (exchange -> client, plus injected messages).

pub mod filters;
pub mod messages;
pub mod trades;

use std::future::Future;

use crate::error::ProxyResult;

pub use filters::LogFilters;
pub use messages::{
    CancelRequest, CancelResponse, CancelResult, CancelScope, Execution, ExecutionMessage, Fee,
    OrderParams, OrderRequest, Side, EXECUTIONS_CHANNEL,
};
pub use trades::{trade_cost, trade_fee, InterceptStats, TradeIntercept};

pub trait Intercept: Send + Sync {
    /// Inspect a client message before it goes upstream. Returns whether to
    /// forward it. May wait when the engine's queues are full.
    fn northbound(&self, msg: &[u8]) -> impl Future<Output = ProxyResult<bool>> + Send;

    /// Inspect an exchange message before it goes to the client. Returns
    /// whether to forward it.
    fn southbound(&self, msg: &[u8]) -> ProxyResult<bool>;

    /// A message to deliver to the client with no exchange counterpart
    fn inject_south(&self) -> ProxyResult<Option<Vec<u8>>>;

    /// Whether `msg` should be written to the diagnostic log
    fn check_filters(&self, msg: &[u8]) -> bool;
}

/// Relays everything untouched
#[derive(Debug, Clone, Default)]
pub struct PassThrough {
    filters: LogFilters,
}

impl PassThrough {
    pub fn new(filters: LogFilters) -> Self {
        Self { filters }
    }
}

impl Intercept for PassThrough {
    async fn northbound(&self, _msg: &[u8]) -> ProxyResult<bool> {
        Ok(true)
    }

    fn southbound(&self, _msg: &[u8]) -> ProxyResult<bool> {
        Ok(true)
    }

    fn inject_south(&self) -> ProxyResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn check_filters(&self, msg: &[u8]) -> bool {
        self.filters.should_log(msg)
    }
}
