use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::queue::{Queue, QueueError, Topic};

#[async_trait]
pub trait TopicHandler<T>: Send + Sync {
    async fn handle_message(&self, message: T) -> ApiResult<()>;
}

/// Binds one consumer per topic, and drains all bound topics on request.
pub struct QueueHandler<T> {
    queue: Arc<Queue<T>>,
    handlers: BTreeMap<Topic, Arc<dyn TopicHandler<T>>>,
}

impl<T: Send + std::fmt::Debug> QueueHandler<T> {
    #[must_use]
    pub const fn new(queue: Arc<Queue<T>>) -> Self {
        Self {
            queue,
            handlers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<Queue<T>> {
        &self.queue
    }

    pub fn register_topic(
        &mut self,
        topic: Topic,
        handler: Arc<dyn TopicHandler<T>>,
    ) -> ApiResult<()> {
        if self.handlers.contains_key(&topic) {
            return Err(QueueError::TopicAlreadyBound(topic).into());
        }
        log::info!("Registered topic: [{topic}]");
        self.queue.register_topic(topic);
        self.handlers.insert(topic, handler);
        Ok(())
    }

    /// Deliver every queued message on every bound topic.
    ///
    /// An empty topic ends the pass for that topic only. Any other failure,
    /// including a consumer error, aborts the pass and is returned.
    pub async fn process_queue(&self) -> ApiResult<usize> {
        let mut processed = 0;
        for (topic, handler) in &self.handlers {
            loop {
                let message = match self.queue.pop(*topic) {
                    Ok(message) => message,
                    Err(QueueError::Empty(_)) => break,
                    Err(err) => return Err(err.into()),
                };
                log::debug!("Processing topic: [{topic}], message: {message:?}");
                handler.handle_message(message).await?;
                processed += 1;
            }
        }
        Ok(processed)
    }
}
