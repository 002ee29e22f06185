// WebSocket connection to the exchange
//
// Every send and receive carries the configured deadline. The connection is
// split so the two proxy pumps can own one half each.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{ProxyError, ProxyResult};

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RelaySender {
    sink: SplitSink<UpstreamStream, Message>,
    timeout: Duration,
}

pub struct RelayReceiver {
    stream: SplitStream<UpstreamStream>,
    timeout: Duration,
}

/// Dial `url`, prefixing `wss://` when no scheme is given
pub async fn connect(url: &str, deadline: Duration) -> ProxyResult<(RelaySender, RelayReceiver)> {
    let url = if url.contains("://") {
        url.to_string()
    } else {
        format!("wss://{}", url)
    };

    info!("Connecting upstream to {}", url);
    let (ws_stream, _) = timeout(deadline, connect_async(url.as_str()))
        .await?
        .map_err(|e| ProxyError::UpstreamConnection(format!("{}: {}", url, e)))?;
    info!("Connected upstream to {}", url);

    let (sink, stream) = ws_stream.split();
    Ok((
        RelaySender {
            sink,
            timeout: deadline,
        },
        RelayReceiver {
            stream,
            timeout: deadline,
        },
    ))
}

impl RelaySender {
    pub async fn send(&mut self, data: Vec<u8>) -> ProxyResult<()> {
        timeout(self.timeout, self.sink.send(Message::Binary(data))).await??;
        Ok(())
    }

    pub async fn close(&mut self) -> ProxyResult<()> {
        timeout(self.timeout, self.sink.close()).await??;
        Ok(())
    }
}

impl RelayReceiver {
    /// Next data frame from the exchange. Control frames are skipped; a close
    /// frame or end of stream is an error.
    pub async fn recv(&mut self) -> ProxyResult<Vec<u8>> {
        timeout(self.timeout, next_payload(&mut self.stream)).await?
    }
}

async fn next_payload(stream: &mut SplitStream<UpstreamStream>) -> ProxyResult<Vec<u8>> {
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => return Ok(text.into_bytes()),
            Message::Binary(data) => return Ok(data),
            Message::Close(frame) => {
                return Err(ProxyError::ConnectionClosed(format!(
                    "exchange closed the connection: {:?}",
                    frame
                )));
            }
            other => debug!("Skipping upstream control frame: {:?}", other),
        }
    }
    Err(ProxyError::ConnectionClosed("exchange stream ended".to_string()))
}
