use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Values carried by a tuple, in output-field order.
pub type Values = Vec<serde_json::Value>;

/// Topology options as handed to components (`conf` in the handshake).
pub type StormConfig = serde_json::Map<String, serde_json::Value>;

pub const SYSTEM_COMPONENT: &str = "__system";
pub const TICK_STREAM: &str = "__tick";
pub const HEARTBEAT_STREAM: &str = "__heartbeat";
pub const DEFAULT_STREAM: &str = "default";

/// Storm sends numeric ids from the JVM side but spouts may pick any string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TupleId {
    Int(i64),
    Str(String),
}

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleId::Int(id) => write!(f, "{}", id),
            TupleId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for TupleId {
    fn from(id: i64) -> Self {
        TupleId::Int(id)
    }
}

impl From<&str> for TupleId {
    fn from(id: &str) -> Self {
        TupleId::Str(id.to_string())
    }
}

impl From<String> for TupleId {
    fn from(id: String) -> Self {
        TupleId::Str(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub id: Option<TupleId>,
    pub component: String,
    pub stream: String,
    pub task: i64,
    pub values: Values,
}

impl Tuple {
    pub fn new(
        id: Option<TupleId>,
        component: impl Into<String>,
        stream: impl Into<String>,
        task: i64,
        values: Values,
    ) -> Self {
        Self {
            id,
            component: component.into(),
            stream: stream.into(),
            task,
            values,
        }
    }

    pub fn is_tick(&self) -> bool {
        self.component == SYSTEM_COMPONENT && self.stream == TICK_STREAM
    }

    pub fn is_heartbeat(&self) -> bool {
        self.task == -1 && self.stream == HEARTBEAT_STREAM
    }

    pub fn value(&self, index: usize) -> Option<&serde_json::Value> {
        self.values.get(index)
    }
}

/// The part of Storm's topology context a component needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyContext {
    #[serde(rename = "taskid", default)]
    pub task_id: i64,
    #[serde(rename = "componentid", default)]
    pub component_id: String,
    #[serde(rename = "task->component", default)]
    pub task_to_component: HashMap<String, String>,
    #[serde(rename = "source->stream->fields", default)]
    pub source_stream_fields: HashMap<String, HashMap<String, Vec<String>>>,
    #[serde(rename = "stream->outputfields", default)]
    pub stream_output_fields: HashMap<String, Vec<String>>,
}

/// Log levels understood by the multilang `log` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            LogLevel::Trace => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warn => 3,
            LogLevel::Error => 4,
        }
    }

    pub fn from_u8(level: u8) -> Self {
        match level {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}
