//! The ingestion pipeline.
//!
//! Subscriber -> collapser -> filter -> delivery policy, then either the
//! sink registry directly or the update buffer until the next flush.
//!
//! A [`Pipeline`] is driven by two independent schedules: [`poll_tick`]
//! for ingestion and [`flush_tick`] for buffered values and deferred
//! redraws. It owns all of its state, so whoever drives both schedules
//! from one task needs no locking.
//!
//! [`poll_tick`]: Pipeline::poll_tick
//! [`flush_tick`]: Pipeline::flush_tick

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::config::PipelineConfig;
use crate::conflation::{self, BackpressurePolicy, DrainReport, UpdateBuffer};
use crate::dispatch::{DeliveryMode, DeliveryPolicy};
use crate::error::{ConfigError, TransportError};
use crate::filter::SignalFilter;
use crate::model::{DecodedEnvelope, Envelope, RawEnvelope, SignalSample};
use crate::network::{ConnectionState, Subscriber};
use crate::sink::{GateDecision, SinkRegistry};

/// Capacity of the event broadcast channel. Slow receivers lag and lose
/// the oldest events.
pub const EVENT_CAPACITY: usize = 1024;

/// Notifications published by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A value reached a sink.
    SignalApplied {
        name: String,
        value: f64,
        decision: GateDecision,
    },
    StatusChanged(String),
    ConnectionChanged(ConnectionState),
    ErrorOccurred(String),
    RawFrame(RawEnvelope),
    /// Header of a dispatched decoded envelope.
    DecodedFrame {
        id_hex: String,
        name: Option<String>,
        timestamp: f64,
    },
}

/// Running counters of one pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub envelopes_received: u64,
    pub envelopes_dispatched: u64,
    /// Superseded inside a collapsed burst.
    pub envelopes_collapsed: u64,
    /// Dropped by an explicit backlog discard.
    pub envelopes_discarded: u64,
    pub decode_errors: u64,
    pub signals_accepted: u64,
    /// Rejected by the filter, including entries past the envelope cap.
    pub signals_rejected: u64,
    pub value_errors: u64,
    pub immediate_applied: u64,
    pub buffered: u64,
    pub buffered_overwrites: u64,
    pub flushed: u64,
    /// Values for names no sink listens to.
    pub unknown_sink_drops: u64,
}

impl IngestStats {
    /// Envelopes that never reached dispatch for backpressure reasons.
    pub fn dropped(&self) -> u64 {
        self.envelopes_collapsed + self.envelopes_discarded
    }
}

/// What one poll tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub received: u64,
    pub dispatched: u64,
    pub limit_reached: bool,
}

pub struct Pipeline<S> {
    subscriber: S,
    filter: SignalFilter,
    delivery: DeliveryPolicy,
    buffer: UpdateBuffer,
    sinks: SinkRegistry,
    stats: IngestStats,
    events: broadcast::Sender<PipelineEvent>,
    last_state: ConnectionState,
}

impl<S: Subscriber> Pipeline<S> {
    /// Validate `config` and assemble a pipeline around `subscriber`.
    pub fn new(
        config: &PipelineConfig,
        subscriber: S,
        sinks: SinkRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let last_state = subscriber.state();

        Ok(Self {
            subscriber,
            filter: SignalFilter::new(config.filter.clone()),
            delivery: config.delivery_policy(),
            buffer: UpdateBuffer::new(),
            sinks,
            stats: IngestStats::default(),
            events,
            last_state,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    pub fn sinks_mut(&mut self) -> &mut SinkRegistry {
        &mut self.sinks
    }

    pub fn buffer(&self) -> &UpdateBuffer {
        &self.buffer
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    pub fn delivery(&self) -> &DeliveryPolicy {
        &self.delivery
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.subscriber.state()
    }

    /// Connect the subscriber to `endpoint`.
    pub async fn connect(&mut self, endpoint: &str) -> Result<(), TransportError> {
        let result = self.subscriber.connect(endpoint).await;
        match &result {
            Ok(()) => info!("Subscribed to {}", endpoint),
            Err(e) => {
                error!("Failed to connect to {}: {}", endpoint, e);
                self.emit(PipelineEvent::ErrorOccurred(e.to_string()));
            }
        }
        self.sync_state();
        result
    }

    /// Leave the disconnected state. Buffered values survive.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        let result = self.subscriber.reconnect().await;
        if let Err(e) = &result {
            error!("Reconnect failed: {}", e);
            self.emit(PipelineEvent::ErrorOccurred(e.to_string()));
        }
        self.sync_state();
        result
    }

    /// Close the subscriber. Nothing further is drained.
    pub fn close(&mut self) {
        self.subscriber.close();
        self.sync_state();
    }

    /// Drain the feed once under `policy` and dispatch the result.
    ///
    /// Does nothing while the subscriber is not connected.
    pub fn poll_tick(&mut self, policy: &BackpressurePolicy) -> TickReport {
        if !self.subscriber.state().is_connected() {
            return TickReport::default();
        }

        let DrainReport {
            envelopes,
            received,
            collapsed,
            decode_errors,
            limit_reached,
            transport_error,
        } = conflation::drain(&mut self.subscriber, policy);

        self.stats.envelopes_received += received;
        self.stats.envelopes_collapsed += collapsed;
        self.stats.decode_errors += decode_errors;

        let now = Instant::now();
        let dispatched = envelopes.len() as u64;
        for envelope in envelopes {
            self.dispatch(envelope, now);
        }
        self.stats.envelopes_dispatched += dispatched;

        if let Some(e) = transport_error {
            error!("Feed transport failed: {}", e);
            self.emit(PipelineEvent::ErrorOccurred(e.to_string()));
            self.emit(PipelineEvent::StatusChanged(
                "Feed disconnected, ingestion halted until reconnect".to_string(),
            ));
        }
        self.sync_state();

        TickReport {
            received,
            dispatched,
            limit_reached,
        }
    }

    /// Apply every buffered value, then redraw the dirty sinks.
    ///
    /// Returns how many buffered values were handed to sinks.
    pub fn flush_tick(&mut self) -> usize {
        let applied = self.flush_buffer();
        self.render_pass();
        applied
    }

    /// Apply and clear the buffered values. Empty buffer, no sink calls.
    pub fn flush_buffer(&mut self) -> usize {
        let pending = self.buffer.take();
        if pending.is_empty() {
            return 0;
        }

        let count = pending.len();
        for sample in pending.into_values() {
            self.apply(&sample);
        }
        self.stats.flushed += count as u64;
        trace!("Flushed {} buffered values", count);
        count
    }

    /// Redraw sinks marked dirty since the last pass.
    pub fn render_pass(&mut self) -> usize {
        self.sinks.render_pass()
    }

    /// Drop whatever is queued on the feed right now.
    pub fn discard_backlog(&mut self) -> usize {
        let discarded = conflation::discard_backlog(&mut self.subscriber);
        self.stats.envelopes_discarded += discarded as u64;
        info!("Discarded {} queued envelopes", discarded);
        self.emit(PipelineEvent::StatusChanged(format!(
            "Discarded {} queued envelopes",
            discarded
        )));
        self.sync_state();
        discarded
    }

    fn dispatch(&mut self, envelope: Envelope, now: Instant) {
        match envelope {
            Envelope::Raw(raw) => self.emit(PipelineEvent::RawFrame(raw)),
            Envelope::Decoded(decoded) => self.dispatch_decoded(&decoded, now),
        }
    }

    fn dispatch_decoded(&mut self, envelope: &DecodedEnvelope, now: Instant) {
        self.emit(PipelineEvent::DecodedFrame {
            id_hex: envelope.id_hex.clone(),
            name: envelope.name.clone(),
            timestamp: envelope.timestamp,
        });

        let outcome = self.filter.filter_envelope(envelope, now);
        self.stats.signals_accepted += outcome.accepted.len() as u64;
        self.stats.signals_rejected += outcome.rejected + outcome.truncated;
        self.stats.value_errors += outcome.value_errors;
        if outcome.value_errors > 0 {
            debug!(
                "{} non-numeric values dropped from {}",
                outcome.value_errors, envelope.id_hex
            );
        }

        for sample in outcome.accepted {
            match self.delivery.mode_for(&sample.name) {
                DeliveryMode::Immediate => {
                    self.stats.immediate_applied += 1;
                    self.apply(&sample);
                }
                DeliveryMode::Buffered => {
                    self.stats.buffered += 1;
                    if self.buffer.insert(sample) {
                        self.stats.buffered_overwrites += 1;
                    }
                }
            }
        }
    }

    fn apply(&mut self, sample: &SignalSample) {
        match self.sinks.apply(&sample.name, sample.value) {
            Some(decision) => self.emit(PipelineEvent::SignalApplied {
                name: sample.name.clone(),
                value: sample.value,
                decision,
            }),
            None => {
                trace!("No sink for '{}'", sample.name);
                self.stats.unknown_sink_drops += 1;
            }
        }
    }

    fn sync_state(&mut self) {
        let state = self.subscriber.state();
        if state != self.last_state {
            info!("Feed connection {} -> {}", self.last_state, state);
            self.last_state = state;
            self.emit(PipelineEvent::ConnectionChanged(state));
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}
