//! Storm multilang messages.
//!
//! Everything that crosses the component boundary is one of these types,
//! whether it travels as JSON over stdio or stays in memory inside the
//! local cluster.

use crate::domain::model::{StormConfig, TopologyContext, Tuple, TupleId, Values};
use serde::{Deserialize, Serialize};

/// First message Storm sends to a freshly spawned component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub conf: StormConfig,
    pub context: TopologyContext,
    #[serde(rename = "pidDir")]
    pub pid_dir: String,
}

/// A tuple delivered to a bolt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TupleId>,
    pub comp: String,
    pub stream: String,
    pub task: i64,
    pub tuple: Values,
}

impl From<TupleMessage> for Tuple {
    fn from(msg: TupleMessage) -> Self {
        Tuple {
            id: msg.id,
            component: msg.comp,
            stream: msg.stream,
            task: msg.task,
            values: msg.tuple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TupleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<TupleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<i64>,
    // Storm treats a missing flag as true and answers every emit with task ids.
    #[serde(default)]
    pub need_task_ids: bool,
    pub tuple: Values,
}

fn default_log_level() -> u8 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    Emit(EmitCommand),
    Ack {
        id: TupleId,
    },
    Fail {
        id: TupleId,
    },
    Log {
        msg: String,
        #[serde(default = "default_log_level")]
        level: u8,
    },
    Sync,
    Next,
    Activate,
    Deactivate,
    Error {
        msg: String,
    },
}

/// Anything Storm may write to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Handshake(Handshake),
    Tuple(TupleMessage),
    TaskIds(Vec<i64>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Command(_) => "command",
            Message::Handshake(_) => "handshake",
            Message::Tuple(_) => "tuple",
            Message::TaskIds(_) => "task ids",
        }
    }
}

/// Reply to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidReply {
    pub pid: u32,
}
