//! Control-to-audio command plumbing and the deletion thread.
//!
//! Commands are the only way control threads mutate audio-thread state. The
//! queue is bounded and drained a bounded amount per block; producers spin
//! briefly when it is full. Anything the audio thread discards that might
//! free memory goes to the deletion thread instead of being dropped in the
//! callback.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::buffer::BufferData;
use crate::config::COMMAND_QUEUE_CAPACITY;
use crate::effects::echo::EchoTap;
use crate::effects::EffectObject;
use crate::generator::GeneratorObject;
use crate::handle::Handle;
use crate::properties::Property;
use crate::sources::SourceObject;

/// Values as they travel to the audio thread. Object references are resolved
/// control-side so the audio thread never touches the handle registry.
#[derive(Debug, Clone)]
pub(crate) enum CommandValue {
    F64(f64),
    I64(i64),
    Double3([f64; 3]),
    Double6([f64; 6]),
    Biquad(auralis_dsp::BiquadConfig),
    Buffer(Option<Arc<BufferData>>),
}

/// One control-thread mutation, applied at a block boundary.
pub(crate) enum Command {
    SetProperty {
        target: Handle,
        property: Property,
        value: CommandValue,
    },
    SetPaused {
        target: Handle,
        paused: bool,
    },
    RegisterSource {
        source: Box<SourceObject>,
    },
    RegisterEffect {
        effect: Box<EffectObject>,
    },
    RegisterGenerator {
        generator: Box<GeneratorObject>,
    },
    AddGenerator {
        source: Handle,
        generator: Handle,
    },
    RemoveGenerator {
        source: Handle,
        generator: Handle,
    },
    EstablishRoute {
        output: Handle,
        input: Handle,
        gain: f64,
        fade_in_blocks: u32,
    },
    RemoveRoute {
        output: Handle,
        input: Handle,
        fade_out_blocks: u32,
    },
    RemoveAllRoutes {
        output: Handle,
        fade_out_blocks: u32,
    },
    SetEchoTaps {
        effect: Handle,
        /// Converted and validated on the control side; the audio thread only
        /// swaps the box.
        taps: Box<[EchoTap]>,
    },
    FreeObject {
        target: Handle,
    },
}

/// Producer half of a context's command queue.
///
/// `post` never fails: on a full queue it yields and retries (the control side
/// is allowed to block briefly), and posts to a torn-down context are silently
/// dropped.
#[derive(Clone)]
pub(crate) struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    pub fn post(&self, command: Command) {
        let mut command = command;
        loop {
            match self.tx.try_send(command) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    command = returned;
                    thread::yield_now();
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

pub(crate) fn command_queue() -> (CommandSender, Receiver<Command>) {
    let (tx, rx) = bounded(COMMAND_QUEUE_CAPACITY);
    (CommandSender { tx }, rx)
}

/// Heap things the audio thread wants gone.
pub(crate) type Garbage = Box<dyn Any + Send>;

/// Hand-off point for deferred frees.
///
/// The audio thread calls [`discard`](DeletionQueue::discard); the deletion
/// thread runs the drops. If the channel is ever full the drop runs inline as
/// a last resort.
#[derive(Clone)]
pub struct DeletionQueue {
    tx: Sender<Garbage>,
}

impl DeletionQueue {
    pub(crate) fn discard(&self, garbage: Garbage) {
        if let Err(TrySendError::Full(garbage)) = self.tx.try_send(garbage) {
            tracing::debug!("deletion queue full; dropping inline");
            drop(garbage);
        }
    }
}

/// The deletion thread: drains reference drops off the audio path.
pub(crate) struct DeletionThread {
    queue: DeletionQueue,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl DeletionThread {
    pub fn start() -> Self {
        let (tx, rx) = bounded::<Garbage>(4096);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("auralis-deletion".into())
            .spawn(move || deletion_loop(rx, stop_rx))
            .expect("failed to spawn deletion thread");

        Self {
            queue: DeletionQueue { tx },
            stop_tx,
            thread: Some(thread),
        }
    }

    pub fn queue(&self) -> DeletionQueue {
        self.queue.clone()
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DeletionThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn deletion_loop(rx: Receiver<Garbage>, stop_rx: Receiver<()>) {
    let mut processed: u64 = 0;
    loop {
        let stopping = stop_rx.try_recv().is_ok();

        loop {
            match rx.try_recv() {
                Ok(garbage) => {
                    drop(garbage);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!(processed, "deletion thread exiting");
                    return;
                }
            }
        }

        if stopping {
            // Final drain so nothing the audio thread handed off is leaked.
            while let Ok(garbage) = rx.try_recv() {
                drop(garbage);
                processed += 1;
            }
            tracing::debug!(processed, "deletion thread stopped");
            return;
        }

        thread::sleep(Duration::from_millis(10));
    }
}
