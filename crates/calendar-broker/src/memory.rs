//! In-process broker.
//!
//! Implements the subset of AMQP semantics the service relies on: the
//! default exchange, per-queue round-robin between consumers, explicit
//! acknowledgement and requeue of unacknowledged messages. State lives
//! behind one mutex that is never held across an await.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{Acknowledger, BoxFuture, Broker, Consumer, Delivery};
use crate::config::{ConsumeConfig, PublishConfig, QueueConfig};
use crate::error::{BrokerError, BrokerResult};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    content_type: String,
    routing_key: String,
    redelivered: bool,
}

#[derive(Debug)]
struct ConsumerSlot {
    tag: String,
    auto_ack: bool,
    exclusive: bool,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct Unacked {
    consumer_tag: String,
    message: Message,
}

#[derive(Debug)]
struct QueueState {
    config: QueueConfig,
    ready: VecDeque<Message>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
    unacked: BTreeMap<u64, Unacked>,
}

impl QueueState {
    fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: VecDeque::new(),
            consumers: Vec::new(),
            cursor: 0,
            unacked: BTreeMap::new(),
        }
    }

    /// Moves unacknowledged messages matching `predicate` back to the front
    /// of the queue, oldest first.
    fn requeue_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(u64, &Unacked) -> bool,
    {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(tag, u)| predicate(**tag, u))
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags.iter().rev() {
            if let Some(entry) = self.unacked.remove(tag) {
                let mut message = entry.message;
                message.redelivered = true;
                self.ready.push_front(message);
            }
        }
        tags.len()
    }
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    next_delivery_tag: u64,
    next_consumer: u64,
    queues: HashMap<String, QueueState>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // No critical section can panic halfway through a mutation.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: Option<bool>,
        this: Arc<dyn Acknowledger>,
    ) -> BrokerResult<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        // `multiple` covers earlier deliveries of the same consumer only.
        let owner = state.queues.iter().find_map(|(name, q)| {
            q.unacked
                .get(&delivery_tag)
                .map(|u| (name.clone(), u.consumer_tag.clone()))
        });
        let Some((name, consumer_tag)) = owner else {
            return Err(BrokerError::UnknownDeliveryTag(delivery_tag));
        };
        let Some(queue) = state.queues.get_mut(&name) else {
            return Err(BrokerError::UnknownDeliveryTag(delivery_tag));
        };

        let tags: Vec<u64> = match multiple {
            true => queue
                .unacked
                .range(..=delivery_tag)
                .filter(|(_, u)| u.consumer_tag == consumer_tag)
                .map(|(t, _)| *t)
                .collect(),
            false => vec![delivery_tag],
        };
        match requeue {
            Some(true) => {
                queue.requeue_where(|tag, _| tags.contains(&tag));
                dispatch(&mut state, &name, &this);
            }
            _ => {
                for tag in &tags {
                    queue.unacked.remove(tag);
                }
            }
        }
        Ok(())
    }
}

/// Hands ready messages of `queue` to its consumers in turn.
fn dispatch(state: &mut State, queue: &str, acker: &Arc<dyn Acknowledger>) {
    let State {
        next_delivery_tag,
        queues,
        ..
    } = state;
    let Some(q) = queues.get_mut(queue) else {
        return;
    };

    while !q.consumers.is_empty() {
        let Some(message) = q.ready.pop_front() else {
            break;
        };
        let index = q.cursor % q.consumers.len();
        q.cursor = index + 1;

        *next_delivery_tag += 1;
        let tag = *next_delivery_tag;
        let slot = &q.consumers[index];
        let delivery = Delivery::new(
            tag,
            message.body.clone(),
            message.content_type.clone(),
            message.routing_key.clone(),
            message.redelivered,
            Arc::clone(acker),
        );

        if slot.tx.send(delivery).is_err() {
            // Receiver went away without the drop hook having run yet.
            let gone = q.consumers.remove(index).tag;
            debug!(queue, consumer = %gone, "dropping closed consumer");
            q.ready.push_front(message);
            q.requeue_where(|_, u| u.consumer_tag == gone);
            continue;
        }
        if !slot.auto_ack {
            let consumer_tag = slot.tag.clone();
            q.unacked.insert(
                tag,
                Unacked {
                    consumer_tag,
                    message,
                },
            );
        }
    }
}

/// A broker that lives inside the process.
///
/// Cloning yields another handle to the same broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn acker(&self) -> Arc<dyn Acknowledger> {
        Arc::new(self.clone())
    }

    /// Returns every unacknowledged delivery to its queue, flagged as
    /// redelivered, and dispatches again.
    pub fn recover(&self) -> BrokerResult<usize> {
        let acker = self.acker();
        let mut state = self.shared.lock();
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        let names: Vec<String> = state.queues.keys().cloned().collect();
        let mut requeued = 0;
        for name in &names {
            if let Some(queue) = state.queues.get_mut(name) {
                requeued += queue.requeue_where(|_, _| true);
            }
            dispatch(&mut state, name, &acker);
        }
        Ok(requeued)
    }

    /// Number of messages waiting in `queue` (not yet handed out).
    pub fn ready_count(&self, queue: &str) -> BrokerResult<usize> {
        let state = self.shared.lock();
        state
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))
    }

    /// Number of messages handed out and awaiting acknowledgement in `queue`.
    pub fn unacked_count(&self, queue: &str) -> BrokerResult<usize> {
        let state = self.shared.lock();
        state
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))
    }
}

impl Acknowledger for MemoryBroker {
    fn ack(&self, delivery_tag: u64, multiple: bool) -> BoxFuture<'_, BrokerResult<()>> {
        let result = self
            .shared
            .settle(delivery_tag, multiple, None, self.acker());
        Box::pin(std::future::ready(result))
    }

    fn nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> BoxFuture<'_, BrokerResult<()>> {
        let result = self
            .shared
            .settle(delivery_tag, multiple, Some(requeue), self.acker());
        Box::pin(std::future::ready(result))
    }

    fn cancel(&self, queue: &str, consumer_tag: &str) {
        let acker = self.acker();
        let mut state = self.shared.lock();
        let Some(q) = state.queues.get_mut(queue) else {
            return;
        };
        let before = q.consumers.len();
        q.consumers.retain(|c| c.tag != consumer_tag);
        if q.consumers.len() == before {
            return;
        }
        let requeued = q.requeue_where(|_, u| u.consumer_tag == consumer_tag);
        debug!(queue, consumer = consumer_tag, requeued, "consumer cancelled");

        if q.consumers.is_empty() && q.config.auto_delete {
            state.queues.remove(queue);
            debug!(queue, "auto-delete queue removed");
            return;
        }
        dispatch(&mut state, queue, &acker);
    }
}

impl Broker for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    fn start(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if !state.connected {
                state.connected = true;
                info!("in-process broker started");
            }
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if !state.connected {
                return Ok(());
            }
            state.connected = false;
            for queue in state.queues.values_mut() {
                // Dropping the senders ends every consumer stream.
                queue.consumers.clear();
                queue.requeue_where(|_, _| true);
            }
            state.queues.retain(|_, q| q.config.durable);
            info!("in-process broker stopped");
            Ok(())
        })
    }

    fn queue_declare<'a>(&'a self, config: &'a QueueConfig) -> BoxFuture<'a, BrokerResult<()>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(BrokerError::NotConnected);
            }
            if state.queues.contains_key(&config.name) {
                debug!(queue = %config.name, "queue already declared");
                return Ok(());
            }
            state
                .queues
                .insert(config.name.clone(), QueueState::new(config.clone()));
            debug!(queue = %config.name, durable = config.durable, "queue declared");
            Ok(())
        })
    }

    fn consume<'a>(&'a self, config: &'a ConsumeConfig) -> BoxFuture<'a, BrokerResult<Consumer>> {
        Box::pin(async move {
            let acker = self.acker();
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(BrokerError::NotConnected);
            }
            state.next_consumer += 1;
            let generated = format!("ctag-{}", state.next_consumer);

            let q = state
                .queues
                .get_mut(&config.queue)
                .ok_or_else(|| BrokerError::QueueNotFound(config.queue.clone()))?;
            let locked = q.consumers.iter().any(|c| c.exclusive);
            let wants_exclusive = config.exclusive || q.config.exclusive;
            if locked || (wants_exclusive && !q.consumers.is_empty()) {
                return Err(BrokerError::ExclusiveQueue(config.queue.clone()));
            }

            let tag = if config.consumer.is_empty()
                || q.consumers.iter().any(|c| c.tag == config.consumer)
            {
                generated
            } else {
                config.consumer.clone()
            };

            let (tx, rx) = mpsc::unbounded_channel();
            q.consumers.push(ConsumerSlot {
                tag: tag.clone(),
                auto_ack: config.auto_ack,
                exclusive: wants_exclusive,
                tx,
            });
            debug!(queue = %config.queue, consumer = %tag, auto_ack = config.auto_ack, "consumer registered");

            dispatch(&mut state, &config.queue, &acker);
            Ok(Consumer::new(tag, config.queue.clone(), rx, acker))
        })
    }

    fn publish<'a>(
        &'a self,
        config: &'a PublishConfig,
        body: Vec<u8>,
    ) -> BoxFuture<'a, BrokerResult<()>> {
        Box::pin(async move {
            let acker = self.acker();
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(BrokerError::NotConnected);
            }

            let routed = config.exchange.is_empty() && state.queues.contains_key(&config.routing_key);
            if !routed {
                if config.mandatory {
                    return Err(BrokerError::Unroutable {
                        exchange: config.exchange.clone(),
                        routing_key: config.routing_key.clone(),
                    });
                }
                warn!(
                    exchange = %config.exchange,
                    routing_key = %config.routing_key,
                    "message dropped: no matching queue"
                );
                return Ok(());
            }

            if let Some(queue) = state.queues.get_mut(&config.routing_key) {
                queue.ready.push_back(Message {
                    body,
                    content_type: config.content_type.clone(),
                    routing_key: config.routing_key.clone(),
                    redelivered: false,
                });
            }
            dispatch(&mut state, &config.routing_key, &acker);
            Ok(())
        })
    }
}
