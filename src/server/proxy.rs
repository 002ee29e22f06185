// Per-connection message pumps
//
// The northbound pump reads the client and writes upstream; the southbound
// pump reads upstream, writes the client and delivers injected messages.
// Whichever pump stops first tears the connection down.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

use crate::error::ProxyResult;
use crate::intercept::Intercept;
use crate::relay::{RelayReceiver, RelaySender};

/// How often the southbound pump polls for injections while the exchange is
/// quiet
pub const INJECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

type ClientSink<S> = SplitSink<WebSocketStream<S>, Message>;
type ClientStream<S> = SplitStream<WebSocketStream<S>>;

pub struct WebSockProxy<I> {
    intercept: Arc<I>,
    enable_logging: bool,
    label: &'static str,
}

impl<I: Intercept> WebSockProxy<I> {
    pub fn new(intercept: Arc<I>, enable_logging: bool, label: &'static str) -> Self {
        Self {
            intercept,
            enable_logging,
            label,
        }
    }

    /// Pump until either side fails or the client hangs up
    pub async fn run<S>(
        &self,
        client: WebSocketStream<S>,
        relay_tx: RelaySender,
        relay_rx: RelayReceiver,
    ) -> ProxyResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (client_tx, client_rx) = client.split();

        tokio::select! {
            result = self.northbound(client_rx, relay_tx) => {
                debug!("[{}] northbound pump finished", self.label);
                result
            }
            result = self.southbound(relay_rx, client_tx) => {
                debug!("[{}] southbound pump finished", self.label);
                result
            }
        }
    }

    async fn northbound<S>(
        &self,
        mut client_rx: ClientStream<S>,
        mut relay_tx: RelaySender,
    ) -> ProxyResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(message) = client_rx.next().await {
            let payload = match message? {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(data) => data,
                Message::Close(_) => {
                    info!("[{}] client closed the connection", self.label);
                    let _ = relay_tx.close().await;
                    return Ok(());
                }
                _ => continue,
            };

            let forward = self.intercept.northbound(&payload).await?;
            self.log_message("n", &payload, forward);
            if forward {
                relay_tx.send(payload).await?;
            }
        }

        info!("[{}] client stream ended", self.label);
        let _ = relay_tx.close().await;
        Ok(())
    }

    async fn southbound<S>(
        &self,
        mut relay_rx: RelayReceiver,
        mut client_tx: ClientSink<S>,
    ) -> ProxyResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut ticker = interval(INJECT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.flush_injections(&mut client_tx).await?;

            // Keep one receive in flight across ticks so the upstream
            // deadline is not restarted by injection polling
            let payload = {
                let recv = relay_rx.recv();
                tokio::pin!(recv);
                loop {
                    tokio::select! {
                        payload = &mut recv => break payload?,
                        _ = ticker.tick() => self.flush_injections(&mut client_tx).await?,
                    }
                }
            };

            let forward = self.intercept.southbound(&payload)?;
            self.log_message("s", &payload, forward);
            if forward {
                client_tx.send(Message::Binary(payload)).await?;
            }
        }
    }

    async fn flush_injections<S>(&self, client_tx: &mut ClientSink<S>) -> ProxyResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(injected) = self.intercept.inject_south()? {
            self.log_message("s-inj", &injected, true);
            client_tx.send(Message::Binary(injected)).await?;
        }
        Ok(())
    }

    fn log_message(&self, direction: &str, msg: &[u8], forwarded: bool) {
        if !self.enable_logging || !self.intercept.check_filters(msg) {
            return;
        }
        if forwarded {
            info!("[{}] {}: {}", self.label, direction, String::from_utf8_lossy(msg));
        } else {
            info!("[{}] {} (suppressed): {}", self.label, direction, String::from_utf8_lossy(msg));
        }
    }
}
