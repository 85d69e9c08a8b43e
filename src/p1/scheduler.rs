use super::decoder::{LineDecoder, LineOutcome};
use super::registry::MetricRegistry;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Non blocking supply of telegram lines.
pub trait LineSource {
    /// Next line if one is available right now.
    fn next_line(&mut self) -> Option<Vec<u8>>;
}

impl LineSource for tokio::sync::mpsc::Receiver<Vec<u8>> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        self.try_recv().ok()
    }
}

impl LineSource for VecDeque<Vec<u8>> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        self.pop_front()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SinkError {
    #[error("Publish queue is full")]
    Full,
    #[error("Publish queue is closed")]
    Closed,
}

/// Receiver of the readings that have to go out.
pub trait MetricSink {
    fn publish(&mut self, name: &str, value: i64) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// Incremental interval not yet elapsed
    NotDue,
    /// Ran out of lines before the telegram ended, continues next poll
    AwaitingInput,
    /// Telegram failed the checksum, nothing was published
    Discarded,
    /// Telegram valid, this many readings went out
    Published(usize),
}

/// Decides when to decode and what to publish.
///
/// Two timers: the incremental one drives decoding and publishes what
/// changed, the full refresh one marks everything dirty so unchanged readings
/// are announced again once in a while.
pub struct PublishScheduler {
    update_interval: Duration,
    full_refresh_interval: Duration,
    last_update: Instant,
    last_full_refresh: Instant,
}

impl PublishScheduler {
    pub fn new(update_interval: Duration, full_refresh_interval: Duration, now: Instant) -> Self {
        Self {
            update_interval,
            full_refresh_interval,
            last_update: now,
            last_full_refresh: now,
        }
    }

    pub fn poll<S, P>(&mut self,
                      now: Instant,
                      registry: &mut MetricRegistry,
                      decoder: &mut LineDecoder,
                      source: &mut S,
                      sink: &mut P) -> PollOutcome
    where
        S: LineSource + ?Sized,
        P: MetricSink + ?Sized,
    {
        if now.saturating_duration_since(self.last_full_refresh) > self.full_refresh_interval {
            debug!("Full refresh, marking all {} metrics dirty", registry.len());
            registry.mark_all_dirty();
            self.last_full_refresh = now;
        }

        if now.saturating_duration_since(self.last_update) <= self.update_interval {
            return PollOutcome::NotDue;
        }

        /* Feed lines until the telegram ends or we run dry */
        while let Some(line) = source.next_line() {
            match decoder.decode_line(registry, &line) {
                LineOutcome::Continue => continue,
                LineOutcome::Invalid => {
                    warn!("Telegram with invalid checksum discarded");
                    return PollOutcome::Discarded;
                }
                LineOutcome::Valid => {
                    self.last_update = now;
                    return PollOutcome::Published(publish_dirty(registry, sink));
                }
            }
        }

        PollOutcome::AwaitingInput
    }
}

/// Sends every dirty metric to the sink. A metric the sink refused stays
/// dirty and goes out with the next telegram.
pub fn publish_dirty<P: MetricSink + ?Sized>(registry: &mut MetricRegistry, sink: &mut P) -> usize {
    let mut published = 0;

    for (definition, state) in registry.entries_mut() {
        if !state.dirty {
            continue;
        }

        debug!("Sending: {} value: {}", definition.name, state.value);
        match sink.publish(&definition.name, state.value) {
            Ok(_) => {
                state.dirty = false;
                published += 1;
            }
            Err(e) => {
                warn!("Unable to publish {}: {}", definition.name, e);
            }
        }
    }

    if published > 0 {
        info!("Published {} readings", published);
    }
    published
}
