//! Queue consumption: decode, gate, process, acknowledge.

mod events;
mod postgres_queue;
mod queue;

pub use events::{SourceChainEvent, SourceEventData, TargetChainEvent, TargetEventAttributes};
pub use postgres_queue::PostgresQueue;
pub use queue::{InMemoryQueue, Queue, QueueMessage};

use crate::{
    chain::ChainId,
    error::TrackerError,
    metrics,
    processor::{SourceTxProcessor, TargetTxProcessor},
    worker_pool::WorkerPool,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Whether a handled message is removed from the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    /// Leave the message for redelivery after its visibility timeout.
    Redeliver,
}

impl AckDecision {
    pub fn from_result(result: &Result<(), TrackerError>) -> Self {
        match result {
            Ok(()) => AckDecision::Ack,
            Err(TrackerError::AlreadyProcessed(_) | TrackerError::ChainNotSupported(_)) => {
                AckDecision::Ack
            }
            Err(TrackerError::TransactionNotFound { .. } | TrackerError::Cancelled) => {
                AckDecision::Redeliver
            }
            // everything else is acknowledged so it cannot loop forever
            Err(_) => AckDecision::Ack,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Event: DeserializeOwned + Send + Sync + 'static;

    /// Chain the event originates from; the oracle network is never resolved.
    fn chain_id(&self, event: &Self::Event) -> ChainId;

    async fn handle(&self, event: Self::Event, cancel: &CancellationToken) -> Result<(), TrackerError>;
}

pub struct SourceEventHandler {
    processor: SourceTxProcessor,
}

impl SourceEventHandler {
    pub fn new(processor: SourceTxProcessor) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl EventHandler for SourceEventHandler {
    type Event = SourceChainEvent;

    fn chain_id(&self, event: &SourceChainEvent) -> ChainId {
        event.data.chain_id
    }

    async fn handle(&self, event: SourceChainEvent, cancel: &CancellationToken) -> Result<(), TrackerError> {
        self.processor
            .process_source_tx(&event.to_params(false), cancel)
            .await
            .map(|_| ())
    }
}

pub struct TargetEventHandler {
    processor: TargetTxProcessor,
}

impl TargetEventHandler {
    pub fn new(processor: TargetTxProcessor) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl EventHandler for TargetEventHandler {
    type Event = TargetChainEvent;

    fn chain_id(&self, event: &TargetChainEvent) -> ChainId {
        event.attributes.emitter_chain
    }

    async fn handle(&self, event: TargetChainEvent, _cancel: &CancellationToken) -> Result<(), TrackerError> {
        self.processor.process_target_tx(&event.to_params()).await
    }
}

/// One receive loop over one queue, fanning messages out to a bounded worker pool.
pub struct Consumer<H: EventHandler> {
    name: String,
    queue: Arc<dyn Queue>,
    handler: Arc<H>,
    workers: usize,
}

impl<H: EventHandler> Consumer<H> {
    pub fn new(name: impl Into<String>, queue: Arc<dyn Queue>, handler: H, workers: usize) -> Self {
        Self {
            name: name.into(),
            queue,
            handler: Arc::new(handler),
            workers,
        }
    }

    /// Runs until `cancel` fires, then waits for in-flight messages to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(consumer = %self.name, workers = self.workers, "consumer started");
        let pool = WorkerPool::new(self.workers, self.workers);
        let mut messages = self.queue.receive(cancel.clone());
        while let Some(message) = messages.next().await {
            let name = self.name.clone();
            let handler = self.handler.clone();
            let cancel = cancel.clone();
            let task = async move { handle_message(&name, handler.as_ref(), message, &cancel).await };
            if let Err(err) = pool.submit(task).await {
                tracing::error!(consumer = %self.name, err = ?err, "failed to submit message");
                break;
            }
        }
        pool.join().await;
        tracing::info!(consumer = %self.name, "consumer stopped");
    }
}

fn count(consumer: &str, outcome: &str) {
    metrics::CONSUMER_EVENTS
        .with_label_values(&[consumer, outcome])
        .inc();
}

async fn acknowledge(consumer: &str, message: &dyn QueueMessage) {
    if let Err(err) = message.done().await {
        tracing::error!(consumer, err = ?err, "failed to acknowledge message");
    }
}

pub(crate) async fn handle_message<H: EventHandler>(
    consumer: &str,
    handler: &H,
    message: Box<dyn QueueMessage>,
    cancel: &CancellationToken,
) {
    let event: H::Event = match serde_json::from_value(message.data().clone()) {
        Ok(event) => event,
        Err(err) => {
            let err = TrackerError::InvalidEvent(err.into());
            tracing::error!(consumer, err = %err, "dropping undecodable message");
            count(consumer, "invalid");
            acknowledge(consumer, message.as_ref()).await;
            return;
        }
    };

    let chain_id = handler.chain_id(&event);
    if chain_id.is_oracle_network() {
        count(consumer, "oracle_network");
        acknowledge(consumer, message.as_ref()).await;
        return;
    }
    if message.is_expired() {
        tracing::warn!(consumer, chain_id = %chain_id, "message expired before processing");
        count(consumer, "expired");
        return;
    }

    let result = handler.handle(event, cancel).await;
    match &result {
        Ok(()) => {}
        Err(err @ (TrackerError::AlreadyProcessed(_) | TrackerError::Cancelled)) => {
            tracing::debug!(consumer, err = %err, "message not processed");
        }
        Err(err) => tracing::error!(consumer, chain_id = %chain_id, err = %err, "failed to process message"),
    }
    match AckDecision::from_result(&result) {
        AckDecision::Ack => {
            count(consumer, if result.is_ok() { "done" } else { "failed" });
            acknowledge(consumer, message.as_ref()).await;
        }
        AckDecision::Redeliver => {
            count(consumer, "redeliver");
            message.failed().await;
        }
    }
}
