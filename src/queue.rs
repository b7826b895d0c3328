//! Message queue used to hand uploaded videos to background workers.
//!
//! [`MessageQueue`] is the publish/consume contract. [`InProcessQueue`]
//! implements it with one unbounded `tokio::sync::mpsc` channel per topic:
//! messages published before anyone consumes are buffered, each topic has
//! at most one consumer, and a handler error puts the message back at the
//! tail of the queue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Topic the upload path publishes to.
pub const VIDEO_UPLOADED: &str = "video_uploaded";

/// A message is dropped after this many failed deliveries.
pub const MAX_DELIVERIES: u32 = 5;

/// Callback invoked once per delivered message.
pub type MessageHandler =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
pub fn message_handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(
        move |body| -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> {
            Box::pin(f(body))
        },
    )
}

/// Async publish/consume contract.
pub trait MessageQueue: Send + Sync + 'static {
    /// Append `body` to `topic`.
    fn publish(
        &self,
        topic: &str,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Start delivering `topic` to `handler` until `token` is cancelled.
    fn consume(
        &self,
        topic: &str,
        handler: MessageHandler,
        token: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>>;
}

#[derive(Debug)]
struct Delivery {
    body: Bytes,
    attempts: u32,
}

struct Topic {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl Topic {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// Queue that lives inside the node process.
#[derive(Default)]
pub struct InProcessQueue {
    topics: Mutex<HashMap<String, Topic>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> mpsc::UnboundedSender<Delivery> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .tx
            .clone()
    }
}

impl MessageQueue for InProcessQueue {
    fn publish(
        &self,
        topic: &str,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let tx = self.sender(topic);
        let topic = topic.to_string();
        Box::pin(async move {
            tx.send(Delivery { body, attempts: 0 })
                .map_err(|_| anyhow::anyhow!("queue {topic} is closed"))?;
            debug!("Published message to {}", topic);
            Ok(())
        })
    }

    fn consume(
        &self,
        topic: &str,
        handler: MessageHandler,
        token: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>> {
        let (tx, mut rx) = {
            let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
            let rx = entry
                .rx
                .take()
                .ok_or_else(|| anyhow::anyhow!("topic {topic} already has a consumer"))?;
            (entry.tx.clone(), rx)
        };
        let topic = topic.to_string();

        Ok(tokio::spawn(async move {
            loop {
                let mut delivery = tokio::select! {
                    _ = token.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(d) => d,
                        None => break,
                    },
                };

                delivery.attempts += 1;
                if let Err(e) = handler(delivery.body.clone()).await {
                    if delivery.attempts >= MAX_DELIVERIES {
                        warn!(
                            "Dropping message on {} after {} attempts: {:#}",
                            topic, delivery.attempts, e
                        );
                    } else {
                        warn!("Handler error on {}, requeueing: {:#}", topic, e);
                        // The receiver is alive in this task, so this cannot fail.
                        let _ = tx.send(delivery);
                    }
                }
            }
            debug!("Consumer for {} stopped", topic);
        }))
    }
}
