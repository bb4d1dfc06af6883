pub mod handler;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use handler::{QueueHandler, TopicHandler};

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Settled push updates from the monitoring socket.
    ServerUpdate,
    /// State refreshes produced by reconciliation passes.
    PlatformUpdate,
}

impl Topic {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerUpdate => "server-update",
            Self::PlatformUpdate => "platform-update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Topic [{0}] has not been registered")]
    UnknownTopic(Topic),

    #[error("Topic [{0}] is empty")]
    Empty(Topic),

    #[error("Topic [{0}] already has a consumer")]
    TopicAlreadyBound(Topic),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Topic-keyed mailbox shared between producers and the drain loop.
///
/// Messages are delivered in the order they were pushed. Growth is
/// unbounded; the drain loop is expected to keep up.
#[derive(Debug)]
pub struct Queue<T> {
    topics: Mutex<BTreeMap<Topic, VecDeque<T>>>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            topics: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Topic, VecDeque<T>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a topic. Registering an existing topic keeps its messages.
    pub fn register_topic(&self, topic: Topic) {
        self.lock().entry(topic).or_default();
    }

    pub fn push(&self, topic: Topic, message: T) -> QueueResult<()> {
        self.lock()
            .get_mut(&topic)
            .ok_or(QueueError::UnknownTopic(topic))?
            .push_back(message);
        Ok(())
    }

    pub fn pop(&self, topic: Topic) -> QueueResult<T> {
        self.lock()
            .get_mut(&topic)
            .ok_or(QueueError::UnknownTopic(topic))?
            .pop_front()
            .ok_or(QueueError::Empty(topic))
    }

    pub fn len(&self, topic: Topic) -> QueueResult<usize> {
        self.lock()
            .get(&topic)
            .map(VecDeque::len)
            .ok_or(QueueError::UnknownTopic(topic))
    }
}
