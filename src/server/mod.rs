// TLS listener and WebSocket upgrade routing
//
// `/private` connections are relayed to the exchange's authenticated
// endpoint, `/public` to the market data endpoint. Each accepted connection
// gets its own upstream relay and trade intercept; the order books and the
// execution history are shared by all of them.

pub mod proxy;

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::intercept::{Execution, LogFilters, PassThrough, TradeIntercept};
use crate::orderbook::SharedOrderbook;
use crate::recorder::MessageReplay;
use crate::relay;

pub use proxy::WebSockProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Private,
    Public,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/private" => Some(Route::Private),
            "/public" => Some(Route::Public),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Private => "private",
            Route::Public => "public",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Route::Private)
    }
}

/// State shared by every connection the proxy serves
pub struct ProxyContext {
    pub config: Config,
    pub orderbooks: Arc<SharedOrderbook>,
    pub replay: Arc<MessageReplay<Execution>>,
}

impl ProxyContext {
    pub fn new(config: Config) -> Self {
        let orderbooks = Arc::new(SharedOrderbook::new(config.orderbook.symbols.as_slice()));
        Self {
            config,
            orderbooks,
            replay: Arc::new(MessageReplay::new()),
        }
    }

    fn logging_enabled(&self, route: Route) -> bool {
        match route {
            Route::Private => self.config.server.log_private,
            Route::Public => self.config.server.log_public,
        }
    }
}

/// Build the TLS acceptor from a PEM certificate chain and PKCS#8 key
pub fn load_tls_acceptor(cert_file: &str, key_file: &str) -> ProxyResult<tokio_native_tls::TlsAcceptor> {
    let cert = fs::read(cert_file).map_err(|e| ProxyError::Tls(format!("{}: {}", cert_file, e)))?;
    let key = fs::read(key_file).map_err(|e| ProxyError::Tls(format!("{}: {}", key_file, e)))?;

    let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
    let acceptor = native_tls::TlsAcceptor::new(identity)?;
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}

/// Serve TLS connections. Returns only when the certificate or the bind fails
pub async fn listen(ctx: Arc<ProxyContext>) -> ProxyResult<()> {
    let server = &ctx.config.server;
    let acceptor = load_tls_acceptor(&server.cert_file, &server.key_file)?;
    let listener = TcpListener::bind(&server.listen_addr).await?;
    info!("Proxy listening on wss://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };
            report(peer, serve_connection(stream, peer, ctx).await);
        });
    }
}

fn report(peer: SocketAddr, result: ProxyResult<()>) {
    match result {
        Ok(()) => info!("Connection from {} finished", peer),
        Err(e @ ProxyError::ConnectionClosed(_)) => info!("Connection from {} closed: {}", peer, e),
        Err(e) => error!("Connection from {} failed [{}]: {}", peer, e.category(), e),
    }
}

/// Upgrade one client connection, dial the matching upstream endpoint and
/// pump messages until either side goes away
pub async fn serve_connection<S>(stream: S, peer: SocketAddr, ctx: Arc<ProxyContext>) -> ProxyResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut route = None;
    let client = accept_hdr_async(stream, |request: &Request, response: Response| {
        let path = request.uri().path();
        match Route::from_path(path) {
            Some(matched) => {
                route = Some(matched);
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some(format!("no route for {}", path)));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    })
    .await
    .map_err(|e| ProxyError::Handshake(format!("{}: {}", peer, e)))?;

    let route = route.ok_or_else(|| ProxyError::Internal("upgrade completed without a route".to_string()))?;
    info!("Client {} connected on the {} channel", peer, route.as_str());

    let kraken = &ctx.config.kraken;
    let (relay_tx, relay_rx) = relay::connect(kraken.url(route.is_private()), kraken.timeout()).await?;

    let enable_logging = ctx.logging_enabled(route);
    let settings = &ctx.config.trade_intercept;
    if !settings.enabled {
        let intercept = Arc::new(PassThrough::new(LogFilters::new(&settings.log_filters)));
        return WebSockProxy::new(intercept, enable_logging, route.as_str())
            .run(client, relay_tx, relay_rx)
            .await;
    }

    let intercept = Arc::new(TradeIntercept::new(
        settings,
        enable_logging,
        Arc::clone(&ctx.orderbooks),
        Arc::clone(&ctx.replay),
    ));

    WebSockProxy::new(intercept, enable_logging, route.as_str())
        .run(client, relay_tx, relay_rx)
        .await
}
