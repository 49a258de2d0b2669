//! Rate-bounded ingestion of decoded vehicle bus signals.
//!
//! A high-frequency feed of named numeric signals is drained, collapsed,
//! filtered and routed either straight to display sinks or through a
//! last-value-wins buffer flushed at the render rate. Each sink then
//! decides per update whether to redraw now, later, or not at all.

pub mod client;
pub mod config;
pub mod conflation;
pub mod dispatch;
mod error;
pub mod filter;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod sink;

pub use client::FeedClient;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use conflation::{BackpressurePolicy, UpdateBuffer};
pub use dispatch::{classify, DeliveryMode, DeliveryPolicy};
pub use error::{CommandError, ConfigError, DecodeError, FeedError, RecvError, TransportError};
pub use filter::{FilterConfig, SignalFilter};
pub use model::{DecodedEnvelope, Envelope, RawEnvelope, SignalSample};
pub use network::{CommandClient, ConnectionState, FeedSubscriber, Subscriber};
pub use pipeline::{IngestStats, Pipeline, PipelineEvent, TickReport};
pub use sink::{
    DisplaySink, GateDecision, GateThresholds, LogRenderer, Renderer, SinkConfig, SinkKind,
    SinkRegistry, ThresholdGate,
};
