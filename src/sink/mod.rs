//! Display sinks: per-sink threshold gates, display kinds and the registry
//! that routes signal names to sinks.

pub mod gate;
pub mod kind;
pub mod registry;

pub use gate::{GateDecision, GateThresholds, ThresholdGate};
pub use kind::SinkKind;
pub use registry::{
    DisplaySink, LogRenderer, RenderStats, Renderer, SinkConfig, SinkId, SinkRegistry,
};
