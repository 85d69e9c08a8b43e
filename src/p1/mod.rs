use crate::config::P1Config;
use crate::mqtt::{MqttSink, Transmission};
use crate::obis_utils::get_obis_description;
use log::{debug, info, trace};
use std::time::Instant;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::MissedTickBehavior;

pub mod crc;
pub mod field;
pub mod registry;
pub mod decoder;
pub mod scheduler;
pub mod definitions;
pub mod reader;

use decoder::LineDecoder;
use registry::{MetricRegistry, RegistryError};
use scheduler::{LineSource, PollOutcome, PublishScheduler};

/// Lines buffered between the reader and the control loop
const LINE_QUEUE_SIZE: usize = 128;

/// Owns the decode engine and runs the control loop for one meter.
pub struct P1Manager {
    sender: Sender<Transmission>,
    config: P1Config,
    registry: MetricRegistry,
    decoder: LineDecoder,
}

impl P1Manager {
    /// Builds the metric registry, a broken metric list fails here at startup.
    pub fn new(sender: Sender<Transmission>, config: P1Config) -> Result<Self, RegistryError> {
        let registry = MetricRegistry::from_definitions(config.metrics.iter().cloned())?;

        info!("P1 metrics initialized:");
        for (definition, _) in registry.entries() {
            info!("  {} <- {} ({})", definition.name, definition.code,
                  get_obis_description(&definition.code).unwrap_or("unknown"));
        }

        Ok(Self {
            sender,
            config,
            registry,
            decoder: LineDecoder::new(),
        })
    }

    pub async fn start_thread(&mut self) {
        info!("Starting P1 thread");

        let (line_tx, mut line_rx) = tokio::sync::mpsc::channel(LINE_QUEUE_SIZE);
        tokio::spawn(reader::run_reader(self.config.source.clone(), self.config.reconnect_delay(), line_tx));

        let mut scheduler = PublishScheduler::new(
            self.config.update_interval(),
            self.config.full_refresh_interval(),
            Instant::now(),
        );
        let mut sink = MqttSink::new(self.sender.clone());

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let outcome = scheduler.poll(Instant::now(), &mut self.registry, &mut self.decoder, &mut line_rx, &mut sink);
            match outcome {
                PollOutcome::NotDue => drain_stale_lines(&mut line_rx),
                PollOutcome::Published(count) => debug!("Telegram done, {} readings sent", count),
                PollOutcome::Discarded | PollOutcome::AwaitingInput => {}
            }

            if line_rx.is_closed() && line_rx.is_empty() {
                info!("P1 reader is gone, stopping P1 thread");
                return;
            }
        }
    }
}

/// Between updates the lines queued up are old news, the next update should
/// see a fresh telegram.
fn drain_stale_lines(lines: &mut Receiver<Vec<u8>>) {
    let mut dropped = 0;
    while lines.next_line().is_some() {
        dropped += 1;
    }
    if dropped > 0 {
        trace!("Dropped {} stale lines", dropped);
    }
}
