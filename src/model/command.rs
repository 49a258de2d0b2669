//! Wire types of the synchronous command/response exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// Always a JSON object; an absent argument list is sent as `{}`.
    pub args: Value,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, args: Option<Value>) -> Self {
        Self {
            command: command.into(),
            args: args.unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: CommandStatus,
    #[serde(default)]
    pub message: String,
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}
