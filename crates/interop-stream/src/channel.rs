//! In-process publish/subscribe over a tokio broadcast channel.

use crate::filter::TopicFilter;
use futures::Stream;
use interop_core::config::StreamConfig;
use interop_core::{CanonicalMessage, SchemaViolation, ValidatedMessage, Validator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delivery guarantee offered by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Delivery {
    /// Each subscriber sees a message at most once. Nothing is replayed to
    /// late subscribers, nothing is persisted, and a subscriber that falls
    /// more than the channel capacity behind loses the oldest messages.
    AtMostOnce,
}

/// Why a subscriber stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("channel closed")]
    Closed,
    #[error("no message within {0:?}")]
    Timeout(Duration),
}

impl From<RecvError> for interop_core::InteropError {
    fn from(err: RecvError) -> Self {
        interop_core::InteropError::Stream {
            reason: err.to_string(),
        }
    }
}

/// Sending side of the channel.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: broadcast::Sender<Arc<ValidatedMessage>>,
    validator: Arc<Validator>,
}

impl Publisher {
    pub fn new(validator: Arc<Validator>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, validator }
    }

    pub fn from_config(validator: Arc<Validator>, config: &StreamConfig) -> Self {
        Self::new(validator, config.channel_capacity)
    }

    pub fn delivery(&self) -> Delivery {
        Delivery::AtMostOnce
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Validates and broadcasts a candidate message.
    ///
    /// Returns how many subscribers the message was handed to. A rejected
    /// message is reported to the caller only; subscribers never see it.
    pub fn publish(&self, message: CanonicalMessage) -> Result<usize, SchemaViolation> {
        let validated = self.validator.validate(message)?;
        Ok(self.publish_validated(validated))
    }

    /// Broadcasts an already validated message.
    pub fn publish_validated(&self, message: ValidatedMessage) -> usize {
        let topic = message.topic();
        match self.tx.send(Arc::new(message)) {
            Ok(receivers) => {
                debug!(topic, receivers, "message published");
                receivers
            }
            Err(e) => {
                debug!(topic, "No subscribers: {}", e);
                0
            }
        }
    }

    /// Publishes each message once, in order, pausing `delay` between them.
    ///
    /// Stops early when `cancel` fires.
    pub async fn publish_all(
        &self,
        messages: &[CanonicalMessage],
        delay: Duration,
        cancel: &CancellationToken,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        self.publish_pass(messages, delay, cancel, &mut summary).await;
        summary
    }

    /// Cycles through `messages` until `cancel` fires.
    pub async fn publish_continuous(
        &self,
        messages: &[CanonicalMessage],
        delay: Duration,
        cancel: &CancellationToken,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        if messages.is_empty() {
            return summary;
        }

        info!(messages = messages.len(), ?delay, "continuous publishing started");
        while !summary.cancelled {
            self.publish_pass(messages, delay, cancel, &mut summary).await;
            if !summary.cancelled && !pause(delay, cancel).await {
                summary.cancelled = true;
            }
        }
        info!(
            published = summary.published,
            rejected = summary.rejected,
            "continuous publishing stopped"
        );
        summary
    }

    async fn publish_pass(
        &self,
        messages: &[CanonicalMessage],
        delay: Duration,
        cancel: &CancellationToken,
        summary: &mut PublishSummary,
    ) {
        for (i, message) in messages.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return;
            }

            match self.publish(message.clone()) {
                Ok(_) => summary.published += 1,
                Err(violation) => {
                    warn!(uid = %message.uid, error = %violation, "message rejected");
                    summary.rejected += 1;
                }
            }

            if i + 1 < messages.len() && !pause(delay, cancel).await {
                summary.cancelled = true;
                return;
            }
        }
    }

    pub fn subscribe(&self, filter: TopicFilter) -> Subscription {
        debug!(filter = %filter, "subscriber attached");
        Subscription {
            rx: self.tx.subscribe(),
            filter,
            stats: SubscriberStats::default(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Sleeps for `delay`; false when cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Outcome of a publishing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub published: usize,
    pub rejected: usize,
    pub cancelled: bool,
}

/// Per-subscriber counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    /// Messages handed to the subscriber
    pub received: u64,
    /// Messages dropped by the topic filter
    pub filtered: u64,
    /// Messages lost because the subscriber fell behind
    pub lagged: u64,
    /// Wire frames that failed to parse or validate
    pub rejected: u64,
}

/// Receiving side of the channel for one topic filter.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Arc<ValidatedMessage>>,
    filter: TopicFilter,
    stats: SubscriberStats,
}

impl Subscription {
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    /// Waits for the next message matching the filter.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<ValidatedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if !self.filter.matches(&message) {
                        self.stats.filtered += 1;
                        continue;
                    }
                    self.stats.received += 1;
                    return Some(Arc::unwrap_or_clone(message));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.stats.lagged += missed;
                    warn!(missed, "subscriber lagged, skipping missed messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<ValidatedMessage, RecvError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(RecvError::Closed),
            Err(_) => Err(RecvError::Timeout(timeout)),
        }
    }

    /// Waits forever when `timeout` is `None`.
    pub async fn recv_with(&mut self, timeout: Option<Duration>) -> Result<ValidatedMessage, RecvError> {
        match timeout {
            Some(timeout) => self.recv_timeout(timeout).await,
            None => self.recv().await.ok_or(RecvError::Closed),
        }
    }

    /// Turns the subscription into an async stream that ends when the
    /// channel closes.
    pub fn into_stream(self) -> impl Stream<Item = ValidatedMessage> {
        futures::stream::unfold(self, |mut sub| async move {
            let message = sub.recv().await?;
            Some((message, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use interop_core::MessageType;

    fn validator() -> Arc<Validator> {
        Arc::new(Validator::with_embedded_schema().unwrap())
    }

    fn cot(uid: &str) -> CanonicalMessage {
        CanonicalMessage::new(
            MessageType::Cot,
            uid,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            37.7749,
            -122.4194,
        )
    }

    fn vmf(uid: &str) -> CanonicalMessage {
        CanonicalMessage::new(
            MessageType::Vmf,
            uid,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            1.0,
            2.0,
        )
        .with_altitude(3.0)
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let publisher = Publisher::new(validator(), 16);
        let mut sub = publisher.subscribe(TopicFilter::all());

        assert_eq!(publisher.publish(cot("a")).unwrap(), 1);
        let received = sub.recv().await.unwrap();
        assert_eq!(received.uid, "a");
        assert_eq!(sub.stats().received, 1);
    }

    #[tokio::test]
    async fn test_topic_filter() {
        let publisher = Publisher::new(validator(), 16);
        let mut vmf_only = publisher.subscribe(TopicFilter::from(MessageType::Vmf));

        publisher.publish(cot("c1")).unwrap();
        publisher.publish(vmf("v1")).unwrap();

        let received = vmf_only.recv().await.unwrap();
        assert_eq!(received.uid, "v1");
        assert_eq!(vmf_only.stats().filtered, 1);
    }

    #[tokio::test]
    async fn test_rejected_message_not_delivered() {
        let publisher = Publisher::new(validator(), 16);
        let mut sub = publisher.subscribe(TopicFilter::all());

        let mut invalid = cot("bad");
        invalid.latitude = 91.0;
        assert!(publisher.publish(invalid).is_err());

        let err = sub.recv_timeout(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, RecvError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let publisher = Publisher::new(validator(), 16);
        assert_eq!(publisher.publish(cot("lonely")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_messages() {
        let publisher = Publisher::new(validator(), 16);
        let _early = publisher.subscribe(TopicFilter::all());
        publisher.publish(cot("before")).unwrap();

        let mut late = publisher.subscribe(TopicFilter::all());
        publisher.publish(cot("after")).unwrap();

        assert_eq!(late.recv().await.unwrap().uid, "after");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips() {
        let publisher = Publisher::new(validator(), 2);
        let mut sub = publisher.subscribe(TopicFilter::all());

        for i in 0..5 {
            publisher.publish(cot(&format!("m{i}"))).unwrap();
        }

        let first = sub.recv().await.unwrap();
        assert_eq!(first.uid, "m3");
        assert_eq!(sub.stats().lagged, 3);
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let publisher = Publisher::new(validator(), 4);
        let mut sub = publisher.subscribe(TopicFilter::all());
        drop(publisher);

        assert!(sub.recv().await.is_none());
        assert_eq!(
            sub.recv_timeout(Duration::from_secs(1)).await.unwrap_err(),
            RecvError::Closed
        );
    }

    #[tokio::test]
    async fn test_publish_all_preserves_order() {
        let publisher = Publisher::new(validator(), 16);
        let mut sub = publisher.subscribe(TopicFilter::all());
        let cancel = CancellationToken::new();

        let mut bad = cot("bad");
        bad.uid.clear();
        let messages = vec![cot("1"), bad, vmf("2"), cot("3")];

        let summary = publisher.publish_all(&messages, Duration::ZERO, &cancel).await;
        assert_eq!(
            summary,
            PublishSummary {
                published: 3,
                rejected: 1,
                cancelled: false
            }
        );

        for expected in ["1", "2", "3"] {
            assert_eq!(sub.recv().await.unwrap().uid, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_continuous_cancel() {
        let publisher = Publisher::new(validator(), 64);
        let mut sub = publisher.subscribe(TopicFilter::all());
        let cancel = CancellationToken::new();

        let task = {
            let publisher = publisher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                publisher
                    .publish_continuous(&[cot("a"), cot("b")], Duration::from_millis(100), &cancel)
                    .await
            })
        };

        let uids: Vec<String> = {
            let mut uids = Vec::new();
            for _ in 0..5 {
                uids.push(sub.recv().await.unwrap().uid.clone());
            }
            uids
        };
        assert_eq!(uids, ["a", "b", "a", "b", "a"]);

        cancel.cancel();
        let summary = task.await.unwrap();
        assert!(summary.cancelled);
        assert!(summary.published >= 5);
    }

    #[tokio::test]
    async fn test_into_stream() {
        use futures::StreamExt;

        let publisher = Publisher::new(validator(), 16);
        let stream = publisher.subscribe(TopicFilter::all()).into_stream();

        publisher.publish(cot("x")).unwrap();
        publisher.publish(cot("y")).unwrap();
        drop(publisher);

        let uids: Vec<String> = stream.map(|m| m.uid.clone()).collect().await;
        assert_eq!(uids, ["x", "y"]);
    }
}
