//! Command dispatch.
//!
//! Events are queued to a fixed pool of workers. Each worker takes one event,
//! looks up the handler by the event's first token, runs it on the blocking
//! thread pool and marks the event done. A missing handler completes the event
//! with an empty reply; a failing or panicking handler is captured on the event
//! and queued on the context's error list.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::BusError;
use crate::event::{DispatchOutcome, Event};

pub struct Bus {
    ctx: Arc<Context>,
    queue: mpsc::Sender<Arc<Event>>,
    workers: Vec<JoinHandle<()>>,
}

impl Bus {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(ctx: Arc<Context>) -> Self {
        let size = ctx.config.workers.max(1);
        let (queue, rx) = mpsc::channel(ctx.config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..size)
            .map(|id| tokio::spawn(worker(id, Arc::clone(&ctx), Arc::clone(&rx))))
            .collect();
        info!(workers = size, "bus started");
        Self { ctx, queue, workers }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Queue an event. Waits while the queue is full.
    pub async fn submit(&self, event: Arc<Event>) -> Result<(), BusError> {
        self.queue.send(event).await.map_err(|_| BusError::Closed)
    }

    /// Queue a line of text and return its event for the caller to wait on.
    pub async fn handle(&self, txt: &str) -> Result<Arc<Event>, BusError> {
        let event = Arc::new(Event::new(txt));
        self.submit(Arc::clone(&event)).await?;
        Ok(event)
    }

    /// Stop accepting events and wait for queued ones to finish.
    pub async fn shutdown(self) {
        let Bus { queue, workers, .. } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }
        info!("bus stopped");
    }
}

async fn worker(id: usize, ctx: Arc<Context>, rx: Arc<Mutex<mpsc::Receiver<Arc<Event>>>>) {
    debug!(worker = id, "worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };
        dispatch(&ctx, event).await;
    }
    debug!(worker = id, "worker stopped");
}

/// Run one event to completion in the calling task.
pub async fn dispatch(ctx: &Arc<Context>, event: Arc<Event>) -> DispatchOutcome {
    ctx.track(Arc::clone(&event));

    let outcome = match ctx.commands.get(event.cmd()) {
        None => {
            debug!(command = %event.cmd(), event_id = event.id(), "no handler");
            DispatchOutcome::Miss
        }
        Some(handler) => {
            let task_ctx = Arc::clone(ctx);
            let task_event = Arc::clone(&event);
            let joined = tokio::task::spawn_blocking(move || {
                handler(task_ctx.as_ref(), task_event.as_ref())
            })
            .await;
            match joined {
                Ok(Ok(())) => DispatchOutcome::Ok,
                Ok(Err(e)) => DispatchOutcome::Failed { cause: e.to_string() },
                Err(e) if e.is_panic() => DispatchOutcome::Failed {
                    cause: panic_message(e.into_panic()),
                },
                Err(e) => DispatchOutcome::Failed { cause: e.to_string() },
            }
        }
    };

    ctx.with_metrics(|m| m.record(&outcome));
    match &outcome {
        DispatchOutcome::Failed { cause } => {
            warn!(command = %event.cmd(), event_id = event.id(), cause = %cause, "command failed");
            ctx.record_error(Arc::clone(&event), cause.clone());
        }
        DispatchOutcome::Ok => {
            debug!(command = %event.cmd(), event_id = event.id(), "command done");
            event.finish(DispatchOutcome::Ok);
        }
        DispatchOutcome::Miss => {
            event.finish(DispatchOutcome::Miss);
        }
    }
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
