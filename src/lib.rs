// Kraken WebSocket v2 Test Proxy Library
//
// A TLS proxy that relays a trading client's Kraken traffic while fabricating
// trade executions and cancel acknowledgements for orders placed through it

pub mod config;
pub mod error;     // Unified error handling
pub mod intercept; // Synthetic execution engine
pub mod orderbook;
pub mod recorder;  // Channel replay history
pub mod relay;     // Upstream exchange connection
pub mod server;

// Re-export error types
pub use error::{ProxyError, ProxyResult};

// Re-export configuration
pub use config::{Config, ConfigError, KrakenConfig, LogFilter, OrderbookConfig, ServerConfig, TradeInterceptConfig};

// Re-export the intercept engine
pub use intercept::{Execution, Intercept, InterceptStats, LogFilters, PassThrough, TradeIntercept};

// Re-export order book and replay components
pub use orderbook::{Fill, Orderbook, PriceLevel, SharedOrderbook};
pub use recorder::{MessageReplay, Recorded};
