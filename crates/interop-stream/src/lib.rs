//! # Interop Stream
//!
//! Topic-filtered publish/subscribe for validated messages.
//!
//! - [`Publisher`] validates each candidate and broadcasts it on a tokio
//!   broadcast channel; the topic is the message type.
//! - [`Subscription`] receives the messages its [`TopicFilter`] accepts.
//! - [`tcp`] carries the same channel across processes as
//!   `"<topic> <json>\n"` lines.
//!
//! Delivery is [`Delivery::AtMostOnce`]: no replay for late subscribers, no
//! persistence, and slow subscribers skip what they missed instead of
//! holding up the publisher.
//!
//! ## Example
//!
//! ```
//! # async fn example() {
//! use std::sync::Arc;
//! use chrono::Utc;
//! use interop_core::{CanonicalMessage, MessageType, Validator};
//! use interop_stream::{Publisher, TopicFilter};
//!
//! let validator = Arc::new(Validator::with_embedded_schema().unwrap());
//! let publisher = Publisher::new(validator, 64);
//! let mut cot = publisher.subscribe(TopicFilter::from(MessageType::Cot));
//!
//! let message = CanonicalMessage::new(MessageType::Cot, "A-1", Utc::now(), 1.0, 2.0);
//! publisher.publish(message).unwrap();
//!
//! assert_eq!(cot.recv().await.unwrap().uid, "A-1");
//! # }
//! ```

pub mod channel;
pub mod filter;
pub mod tcp;

pub use channel::{Delivery, PublishSummary, Publisher, RecvError, SubscriberStats, Subscription};
pub use filter::TopicFilter;
pub use tcp::{TcpPublisher, TcpSubscription};
pub use tokio_util::sync::CancellationToken;
