use crate::core::collector::OutputCollector;
use crate::core::protocol::{Command, Message};
use crate::domain::model::{StormConfig, TopologyContext};
use crate::domain::ports::Spout;
use crate::utils::error::{Result, SparseError};

/// A spout plus its collector, driven one message at a time.
pub struct SpoutInstance {
    name: String,
    spout: Box<dyn Spout>,
    out: OutputCollector,
}

impl SpoutInstance {
    pub fn new(name: impl Into<String>, spout: Box<dyn Spout>) -> Self {
        Self {
            name: name.into(),
            spout,
            out: OutputCollector::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn initialize(&mut self, conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        tracing::debug!("Initializing spout {} (task {})", self.name, ctx.task_id);
        self.spout.initialize(conf, ctx).await
    }

    /// Handles one command and queues the `sync` Storm waits for.
    pub async fn handle(&mut self, msg: Message) -> Result<()> {
        let command = match msg {
            Message::Command(command) => command,
            // only sent when need_task_ids is requested, which it never is
            Message::TaskIds(_) => return Ok(()),
            other => {
                return Err(SparseError::protocol(format!(
                    "spout {} cannot handle a {} message",
                    self.name,
                    other.kind()
                )))
            }
        };

        match command {
            Command::Next => self.spout.next_tuple(&mut self.out).await?,
            Command::Ack { id } => self.spout.ack(&id, &mut self.out).await?,
            Command::Fail { id } => self.spout.fail(&id, &mut self.out).await?,
            Command::Activate => self.spout.activate(&mut self.out).await?,
            Command::Deactivate => self.spout.deactivate(&mut self.out).await?,
            other => {
                return Err(SparseError::protocol(format!(
                    "spout {} received unexpected command {:?}",
                    self.name, other
                )))
            }
        }

        self.out.push(Command::Sync);
        Ok(())
    }

    pub fn drain(&mut self) -> Vec<Command> {
        self.out.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::Emit;
    use crate::core::protocol::TupleMessage;
    use crate::domain::model::TupleId;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Default)]
    struct CountingSpout {
        next: usize,
        acked: Vec<TupleId>,
        failed: Vec<TupleId>,
    }

    #[async_trait]
    impl Spout for CountingSpout {
        async fn next_tuple(&mut self, out: &mut OutputCollector) -> Result<()> {
            self.next += 1;
            out.send(Emit::new(vec![json!(self.next)]).tup_id(self.next as i64));
            Ok(())
        }

        async fn ack(&mut self, tup_id: &TupleId, _out: &mut OutputCollector) -> Result<()> {
            self.acked.push(tup_id.clone());
            Ok(())
        }

        async fn fail(&mut self, tup_id: &TupleId, _out: &mut OutputCollector) -> Result<()> {
            self.failed.push(tup_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_next_emits_then_syncs() {
        let mut instance = SpoutInstance::new("counter", Box::new(CountingSpout::default()));
        instance.handle(Message::Command(Command::Next)).await.unwrap();

        let commands = instance.drain();
        assert_eq!(commands.len(), 2);
        assert!(matches!(&commands[0], Command::Emit(e) if e.id == Some(TupleId::Int(1))));
        assert_eq!(commands[1], Command::Sync);
    }

    #[tokio::test]
    async fn test_ack_and_fail_sync_without_emitting() {
        let mut instance = SpoutInstance::new("counter", Box::new(CountingSpout::default()));
        instance
            .handle(Message::Command(Command::Ack { id: 1.into() }))
            .await
            .unwrap();
        instance
            .handle(Message::Command(Command::Fail { id: 2.into() }))
            .await
            .unwrap();

        assert_eq!(instance.drain(), vec![Command::Sync, Command::Sync]);
    }

    #[tokio::test]
    async fn test_tuple_is_a_protocol_error() {
        let mut instance = SpoutInstance::new("counter", Box::new(CountingSpout::default()));
        let err = instance
            .handle(Message::Tuple(TupleMessage {
                id: None,
                comp: "x".to_string(),
                stream: "default".to_string(),
                task: 1,
                tuple: vec![],
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, SparseError::ProtocolError { .. }));
        assert!(instance.drain().is_empty());
    }
}
