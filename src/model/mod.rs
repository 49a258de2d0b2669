pub mod command;
pub mod envelope;
pub mod sample;

pub use command::{CommandRequest, CommandResponse, CommandStatus};
pub use envelope::{signal_value, DecodedEnvelope, Envelope, RawEnvelope};
pub use sample::SignalSample;
