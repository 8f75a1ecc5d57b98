//! Topic filters.
//!
//! A topic is a message type (`cot`, `vmf`). A filter names the topics a
//! subscriber wants; the empty filter wants everything.

use interop_core::{CanonicalMessage, InteropError, MessageType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter {
    topics: BTreeSet<MessageType>,
}

impl TopicFilter {
    /// Accepts every topic.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I: IntoIterator<Item = MessageType>>(topics: I) -> Self {
        Self {
            topics: topics.into_iter().collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn accepts(&self, topic: MessageType) -> bool {
        self.is_all() || self.topics.contains(&topic)
    }

    pub fn matches(&self, message: &CanonicalMessage) -> bool {
        self.accepts(message.message_type)
    }

    pub fn topics(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.topics.iter().copied()
    }
}

impl From<MessageType> for TopicFilter {
    fn from(topic: MessageType) -> Self {
        Self::only([topic])
    }
}

impl From<Option<MessageType>> for TopicFilter {
    fn from(topic: Option<MessageType>) -> Self {
        topic.map(Self::from).unwrap_or_default()
    }
}

/// Comma-separated topics; empty for all.
impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for topic in &self.topics {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(topic.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for TopicFilter {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut topics = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "*" || part.eq_ignore_ascii_case("all") {
                return Ok(Self::all());
            }
            let topic = part.parse::<MessageType>().map_err(|_| InteropError::Stream {
                reason: format!("unknown topic '{part}'"),
            })?;
            topics.insert(topic);
        }
        Ok(Self { topics })
    }
}
