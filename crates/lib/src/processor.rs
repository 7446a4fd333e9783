//! Inbound processor: drains the inbound queue, runs the dispatcher and delivers replies
//! through the channel each message arrived on.
//!
//! With room serialization on, every room gets its own worker task fed in arrival order, so a
//! room's backend calls never overlap while other rooms keep moving. With it off, each message
//! runs in its own task and responses for the same room may land in any order.

use crate::channels::{ChannelRegistry, InboundMessage};
use crate::router::Dispatcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Dispatch one message and send its replies.
pub async fn process_inbound_message(
    dispatcher: &Dispatcher,
    channels: &ChannelRegistry,
    msg: InboundMessage,
) {
    let replies = dispatcher.dispatch(&msg).await;
    if replies.is_empty() {
        return;
    }
    let Some(handle) = channels.get(&msg.channel_id).await else {
        log::warn!(
            "inbound: no channel {} registered, dropping {} reply(ies)",
            msg.channel_id,
            replies.len()
        );
        return;
    };
    for reply in replies {
        if let Err(e) = handle.send_message(&msg.room_id, &reply).await {
            log::warn!("inbound: send_message to room {} failed: {}", msg.room_id, e);
        }
    }
}

/// Spawn the processor. The task ends once every inbound sender is dropped and all queued
/// messages have been handled.
pub fn spawn_processor(
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelRegistry>,
    serialize_rooms: bool,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let (mut workers, mut idle_rx) = RoomWorkers::new(dispatcher.clone(), channels.clone());
        loop {
            tokio::select! {
                msg = inbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if serialize_rooms {
                        workers.enqueue(&mut tasks, msg);
                    } else {
                        let dispatcher = dispatcher.clone();
                        let channels = channels.clone();
                        tasks.spawn(async move {
                            process_inbound_message(&dispatcher, &channels, msg).await;
                        });
                    }
                }
                Some(room_id) = idle_rx.recv() => {
                    workers.reap(&room_id);
                }
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        log::warn!("inbound: worker task failed: {}", e);
                    }
                }
            }
        }
        // Closing the room queues lets each worker finish its backlog and exit.
        workers.close();
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                log::warn!("inbound: worker task failed: {}", e);
            }
        }
        log::debug!("inbound: processor stopped");
    })
}

/// Wait up to `timeout` for the processor to handle what is queued, then stop the channels.
/// Channels stay open while draining so replies for queued messages are still delivered.
pub async fn drain_and_stop(processor: JoinHandle<()>, channels: &ChannelRegistry, timeout: Duration) {
    match tokio::time::timeout(timeout, processor).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("inbound: processor task failed: {}", e),
        Err(_) => log::warn!("inbound: queued messages did not finish within {:?}", timeout),
    }
    channels.stop_all().await;
}

struct RoomWorker {
    tx: mpsc::UnboundedSender<InboundMessage>,
    /// Messages sent to the worker and not yet handled.
    pending: Arc<AtomicUsize>,
}

/// One worker task per room that has messages in flight. When a worker runs out of work it
/// reports its room on `idle_tx`; the processor then drops the room's sender so the task exits.
/// Only the processor increments `pending`, so a zero count seen there cannot race a new message.
struct RoomWorkers {
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelRegistry>,
    rooms: HashMap<String, RoomWorker>,
    idle_tx: mpsc::UnboundedSender<String>,
}

impl RoomWorkers {
    fn new(
        dispatcher: Arc<Dispatcher>,
        channels: Arc<ChannelRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let workers = Self {
            dispatcher,
            channels,
            rooms: HashMap::new(),
            idle_tx,
        };
        (workers, idle_rx)
    }

    fn enqueue(&mut self, tasks: &mut JoinSet<()>, msg: InboundMessage) {
        let msg = match self.rooms.get(&msg.room_id) {
            Some(worker) => {
                worker.pending.fetch_add(1, Ordering::SeqCst);
                match worker.tx.send(msg) {
                    Ok(()) => return,
                    // Worker gone (panicked); start a fresh one below.
                    Err(mpsc::error::SendError(msg)) => msg,
                }
            }
            None => msg,
        };
        let room_id = msg.room_id.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let pending = Arc::new(AtomicUsize::new(1));
        let worker_pending = pending.clone();
        let worker_room = room_id.clone();
        let dispatcher = self.dispatcher.clone();
        let channels = self.channels.clone();
        let idle_tx = self.idle_tx.clone();
        tasks.spawn(async move {
            while let Some(m) = rx.recv().await {
                process_inbound_message(&dispatcher, &channels, m).await;
                if worker_pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = idle_tx.send(worker_room.clone());
                }
            }
        });
        if let Err(mpsc::error::SendError(msg)) = tx.send(msg) {
            log::warn!("inbound: room worker for {} unavailable, dropping message", msg.room_id);
            return;
        }
        log::debug!("inbound: started worker for room {}", room_id);
        self.rooms.insert(room_id, RoomWorker { tx, pending });
    }

    /// Drop the room's worker if nothing is pending for it. Returns true when it was dropped.
    fn reap(&mut self, room_id: &str) -> bool {
        let idle = self
            .rooms
            .get(room_id)
            .is_some_and(|w| w.pending.load(Ordering::SeqCst) == 0);
        if idle {
            self.rooms.remove(room_id);
            log::debug!(
                "inbound: room {} idle, worker released ({} active)",
                room_id,
                self.rooms.len()
            );
        }
        idle
    }

    fn close(&mut self) {
        self.rooms.clear();
    }
}
