use std::collections::HashMap;

use crate::error::DelayError;

/// Immutable topic name to outbound handle map, built once at startup and
/// shared with every sender.
#[derive(Debug)]
pub struct TopicRegistry<H> {
    handles: HashMap<String, H>,
}

impl<H> TopicRegistry<H> {
    pub fn new<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = (String, H)>,
    {
        Self {
            handles: handles.into_iter().collect(),
        }
    }

    /// Build a handle for each topic name with `connect`.
    pub fn from_topics<I, F>(topics: I, mut connect: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> H,
    {
        Self::new(topics.into_iter().map(|topic| {
            let handle = connect(&topic);
            (topic, handle)
        }))
    }

    pub fn resolve(&self, topic: &str) -> Result<&H, DelayError> {
        self.handles
            .get(topic)
            .ok_or_else(|| DelayError::UnknownTopic(topic.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
