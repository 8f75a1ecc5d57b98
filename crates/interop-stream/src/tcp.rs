//! TCP transport for the pub/sub channel.
//!
//! A subscriber connects and sends one line holding its topic filter
//! (`cot`, `vmf`, `cot,vmf`, or an empty line for everything). The server
//! then streams one line per message:
//!
//! ```text
//! <topic> <json>\n
//! ```
//!
//! where `<topic>` is the message type and `<json>` the compact canonical
//! message. The receiving side validates every frame again before handing
//! it out.

use crate::channel::{Publisher, RecvError, SubscriberStats};
use crate::filter::TopicFilter;
use futures::{SinkExt, StreamExt};
use interop_core::{InteropError, MessageType, Result, ValidatedMessage, Validator};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest accepted frame, in bytes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

fn stream_error(err: impl std::fmt::Display) -> InteropError {
    InteropError::Stream {
        reason: err.to_string(),
    }
}

/// Formats one wire frame (without the trailing newline).
pub fn encode_frame(message: &ValidatedMessage) -> Result<String> {
    let json = serde_json::to_string(message).map_err(stream_error)?;
    Ok(format!("{} {}", message.topic(), json))
}

/// Splits a wire frame into its topic and JSON body.
///
/// The topic must agree with the body's `message_type`.
pub fn decode_frame(line: &str) -> Result<(MessageType, Value)> {
    let (topic, json) = line
        .split_once(' ')
        .ok_or_else(|| stream_error("frame has no topic separator"))?;
    let topic: MessageType = topic.parse().map_err(stream_error)?;
    let body: Value = serde_json::from_str(json).map_err(stream_error)?;

    match body.get("message_type").and_then(Value::as_str) {
        Some(declared) if declared == topic.as_str() => Ok((topic, body)),
        Some(declared) => Err(stream_error(format!(
            "topic '{topic}' does not match message_type '{declared}'"
        ))),
        None => Err(stream_error("frame body has no message_type")),
    }
}

/// Serves a [`Publisher`] to TCP subscribers.
pub struct TcpPublisher {
    listener: TcpListener,
    publisher: Publisher,
}

impl TcpPublisher {
    pub async fn bind<A: ToSocketAddrs>(addr: A, publisher: Publisher) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| InteropError::io("binding publisher socket", e))?;
        Ok(Self {
            listener,
            publisher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| InteropError::io("reading publisher address", e))
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Accepts subscribers until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "TCP publisher listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("TCP publisher shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "Failed to accept subscriber");
                            continue;
                        }
                    };
                    let publisher = self.publisher.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = serve_subscriber(stream, peer, publisher, cancel).await {
                            warn!(%peer, error = %e, "Subscriber connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    publisher: Publisher,
    cancel: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_SIZE));

    let filter = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        line = framed.next() => match line {
            Some(line) => line.map_err(stream_error)?.parse::<TopicFilter>()?,
            None => return Ok(()),
        },
    };

    info!(%peer, filter = %filter, "Subscriber connected");
    let mut subscription = publisher.subscribe(filter);
    // Only the owner's handle may keep the channel open.
    drop(publisher);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscription.recv() => match message {
                Some(message) => message,
                None => break,
            },
            incoming = framed.next() => match incoming {
                Some(Ok(line)) => {
                    debug!(%peer, len = line.len(), "Ignoring subscriber input after filter");
                    continue;
                }
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "Subscriber read failed");
                    break;
                }
                None => {
                    debug!(%peer, "Subscriber closed the connection");
                    break;
                }
            },
        };

        let frame = encode_frame(&message)?;
        if let Err(e) = framed.send(frame).await {
            debug!(%peer, error = %e, "Subscriber went away");
            break;
        }
    }

    info!(%peer, stats = ?subscription.stats(), "Subscriber disconnected");
    Ok(())
}

/// Client side of the TCP transport.
pub struct TcpSubscription {
    framed: Framed<TcpStream, LinesCodec>,
    validator: Arc<Validator>,
    filter: TopicFilter,
    stats: SubscriberStats,
}

impl TcpSubscription {
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        filter: TopicFilter,
        validator: Arc<Validator>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| InteropError::io("connecting to publisher", e))?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_SIZE));
        framed
            .send(filter.to_string())
            .await
            .map_err(stream_error)?;

        debug!(filter = %filter, "Subscribed over TCP");
        Ok(Self {
            framed,
            validator,
            filter,
            stats: SubscriberStats::default(),
        })
    }

    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    /// Waits for the next valid message.
    ///
    /// Frames that do not parse or validate are logged and skipped.
    /// Returns `Ok(None)` when the publisher closes the connection.
    pub async fn recv(&mut self) -> Result<Option<ValidatedMessage>> {
        while let Some(line) = self.framed.next().await {
            let line = line.map_err(stream_error)?;

            let (topic, body) = match decode_frame(&line) {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.stats.rejected += 1;
                    warn!(error = %e, "Dropping malformed frame");
                    continue;
                }
            };

            if !self.filter.accepts(topic) {
                self.stats.filtered += 1;
                continue;
            }

            match self.validator.validate_json(body) {
                Ok(message) => {
                    self.stats.received += 1;
                    return Ok(Some(message));
                }
                Err(violation) => {
                    self.stats.rejected += 1;
                    warn!(%topic, error = %violation, "Dropping invalid frame");
                }
            }
        }
        Ok(None)
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<ValidatedMessage> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Ok(Some(message))) => Ok(message),
            Ok(Ok(None)) => Err(RecvError::Closed.into()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecvError::Timeout(timeout).into()),
        }
    }
}
