// SPDX-License-Identifier: MIT OR Apache-2.0
//! The event dispatcher: the pipeline's single consumer.

use crate::events::{
    custom_event, debug_event, feature_event, identify_event, index_event, now_millis, InputEvent,
};
use crate::outbox::Outbox;
use crate::pool::WorkerPool;
use crate::redaction::RedactionConfig;
use crate::summarizer::Summarizer;
use crate::worker::{EventBatch, PermanentFailureCallback, ServerTimeCallback};
use flagkit_config::EventsConfig;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

enum Command {
    Send(Box<InputEvent>),
    Flush,
    Close,
}

/// Caller-facing handle to the pipeline. `send`, `flush`, and `close`
/// post commands that the dispatcher services in arrival order.
pub struct EventProcessor {
    tx: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    /// Spawn the dispatcher on `handle` and return the sending side.
    ///
    /// `client` must already carry authorization headers; `url` is the
    /// full bulk-delivery endpoint.
    pub fn start(
        config: EventsConfig,
        url: String,
        client: reqwest::Client,
        handle: &Handle,
        server_time: Option<ServerTimeCallback>,
        permanent_failure: Option<PermanentFailureCallback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(16));

        let disabled = Arc::new(AtomicBool::new(false));
        let last_server_time: Arc<Mutex<Option<i64>>> = Arc::new(Mutex::new(None));

        // Track the server clock for the debug-event cutoff, then forward
        // to any caller-supplied callback.
        let time_sink = last_server_time.clone();
        let server_time_combined: ServerTimeCallback = Arc::new(move |time| {
            *time_sink.lock().expect("server time lock poisoned") =
                Some(time.timestamp_millis());
            if let Some(callback) = &server_time {
                callback(time);
            }
        });

        // A permanent failure disables the pipeline outright.
        let disable_sink = disabled.clone();
        let permanent_combined: PermanentFailureCallback = Arc::new(move |status| {
            error!(status, "disabling event pipeline after permanent delivery failure");
            disable_sink.store(true, Ordering::SeqCst);
            if let Some(callback) = &permanent_failure {
                callback(status);
            }
        });

        let pool = WorkerPool::new(
            client,
            config.workers,
            config.delivery_retry_delay,
            server_time_combined,
            Some(permanent_combined),
        );

        let dispatcher = EventDispatcher {
            redaction: RedactionConfig {
                all_attributes_private: config.all_attributes_private,
                private_attributes: config.private_attributes.clone(),
            },
            outbox: Outbox::new(config.capacity),
            summarizer: Summarizer::new(),
            context_keys: HashSet::new(),
            full_outbox_seen: false,
            url,
            pool,
            disabled,
            disabled_warned: false,
            last_server_time,
            config,
        };

        let task = handle.spawn(dispatcher.run(rx));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an event. Drops (with a debug log) if the command queue is
    /// saturated; analytics must never block an evaluation.
    pub fn send(&self, event: InputEvent) {
        if self.tx.try_send(Command::Send(Box::new(event))).is_err() {
            debug!("event command queue saturated; dropping event");
        }
    }

    /// Request an immediate flush.
    pub fn flush(&self) {
        let _ = self.tx.try_send(Command::Flush);
    }

    /// Stop the dispatcher after one final flush, and wait for it.
    pub async fn close(&self) {
        let _ = self.tx.send(Command::Close).await;
        let task = self.task.lock().expect("task slot poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// The single-consumer loop: summarization, outbox management, periodic
/// flushes, payload construction.
pub struct EventDispatcher {
    config: EventsConfig,
    redaction: RedactionConfig,
    outbox: Outbox,
    summarizer: Summarizer,
    context_keys: HashSet<String>,
    full_outbox_seen: bool,
    url: String,
    pool: WorkerPool,
    disabled: Arc<AtomicBool>,
    disabled_warned: bool,
    last_server_time: Arc<Mutex<Option<i64>>>,
}

impl EventDispatcher {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut flush_timer = tokio::time::interval(self.config.flush_interval);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut keys_timer = tokio::time::interval(self.config.context_keys_flush_interval);
        keys_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Send(event)) => self.process(*event),
                    Some(Command::Flush) => self.flush(),
                    Some(Command::Close) | None => {
                        self.flush();
                        return;
                    }
                },
                _ = flush_timer.tick() => self.flush(),
                _ = keys_timer.tick() => self.context_keys.clear(),
            }
        }
    }

    fn process(&mut self, event: InputEvent) {
        if self.disabled.load(Ordering::SeqCst) {
            if !self.disabled_warned {
                warn!("event pipeline is disabled; discarding events");
                self.disabled_warned = true;
            }
            return;
        }

        let mut output = Vec::new();
        match event {
            InputEvent::Eval(event) => {
                self.summarizer.update(&event);
                if self.note_context(event.context.canonical_key()) {
                    output.push(index_event(
                        event.creation_date,
                        &event.context,
                        &self.redaction,
                    ));
                }
                if event.track_events {
                    output.push(feature_event(&event));
                }
                if self.debug_window_open(event.debug_events_until_date) {
                    output.push(debug_event(&event, &self.redaction));
                }
            }
            InputEvent::Identify(event) => {
                // An identify already carries the full context; it also
                // refreshes the dedup entry.
                self.note_context(event.context.canonical_key());
                output.push(identify_event(&event, &self.redaction));
            }
            InputEvent::Custom(event) => {
                if self.note_context(event.context.canonical_key()) {
                    output.push(index_event(
                        event.creation_date,
                        &event.context,
                        &self.redaction,
                    ));
                }
                output.push(custom_event(&event));
            }
        }

        let dropped = self.outbox.push_discard_overflow(output);
        if dropped && !self.full_outbox_seen {
            warn!(
                "exceeded event queue capacity of {}; increase capacity to avoid dropping events",
                self.config.capacity
            );
        }
        self.full_outbox_seen = dropped;
    }

    fn note_context(&mut self, canonical_key: &str) -> bool {
        self.context_keys.insert(canonical_key.to_owned())
    }

    fn debug_window_open(&self, until: Option<u64>) -> bool {
        let Some(until) = until else {
            return false;
        };
        let until = until as i64;
        if until <= now_millis() {
            return false;
        }
        // Guard against local clock skew: trust the server clock once a
        // delivery has reported it.
        match *self
            .last_server_time
            .lock()
            .expect("server time lock poisoned")
        {
            Some(server_now) => until > server_now,
            None => true,
        }
    }

    fn flush(&mut self) {
        if self.disabled.load(Ordering::SeqCst) {
            return;
        }
        if self.outbox.is_empty() && self.summarizer.is_empty() {
            return;
        }
        // Acquire first: with no free worker the events simply wait for a
        // later flush.
        let Some(worker) = self.pool.acquire() else {
            debug!("no free delivery worker; deferring flush");
            return;
        };

        let mut events = self.outbox.drain();
        // The summary always terminates the batch.
        if let Some(summary) = self.summarizer.finish(now_millis()) {
            events.push(summary);
        }
        self.full_outbox_seen = false;

        let body = match serde_json::to_string(&events) {
            Ok(body) => body,
            Err(err) => {
                error!("could not serialize event payload: {err}");
                return;
            }
        };
        let batch = EventBatch {
            url: self.url.clone(),
            body,
            payload_id: Uuid::new_v4().to_string(),
        };
        debug!(events = events.len(), "flushing event payload");
        tokio::spawn(async move { worker.deliver(batch).await });
    }
}
