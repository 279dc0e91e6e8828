use crate::core::collector::OutputCollector;
use crate::core::protocol::{Command, Message};
use crate::domain::model::{StormConfig, TopologyContext, Tuple};
use crate::domain::ports::Bolt;
use crate::utils::error::{Result, SparseError};
use std::time::Duration;

/// A bolt plus its collector. Applies auto anchor/ack/fail around `process`.
pub struct BoltInstance {
    name: String,
    bolt: Box<dyn Bolt>,
    out: OutputCollector,
}

impl BoltInstance {
    pub fn new(name: impl Into<String>, bolt: Box<dyn Bolt>) -> Self {
        Self {
            name: name.into(),
            bolt,
            out: OutputCollector::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn initialize(&mut self, conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        tracing::debug!("Initializing bolt {} (task {})", self.name, ctx.task_id);
        self.bolt.initialize(conf, ctx).await
    }

    pub async fn handle(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Tuple(tuple) => self.process_tuple(tuple.into()).await,
            Message::TaskIds(_) => Ok(()),
            other => Err(SparseError::protocol(format!(
                "bolt {} cannot handle a {} message",
                self.name,
                other.kind()
            ))),
        }
    }

    async fn process_tuple(&mut self, tup: Tuple) -> Result<()> {
        if tup.is_heartbeat() {
            self.out.push(Command::Sync);
            return Ok(());
        }

        if tup.is_tick() {
            self.out.begin_tuple(Vec::new());
            self.bolt.process_tick(&tup, &mut self.out).await?;
            if self.bolt.auto_ack() && !self.out.is_settled(&tup) {
                self.out.ack(&tup);
            }
            return Ok(());
        }

        let anchors = if self.bolt.auto_anchor() {
            tup.id.iter().cloned().collect()
        } else {
            Vec::new()
        };
        self.out.begin_tuple(anchors);

        let result = match self.bolt.process(&tup, &mut self.out).await {
            Ok(()) => {
                if self.bolt.auto_ack() && !self.out.is_settled(&tup) {
                    self.out.ack(&tup);
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Bolt {} failed to process tuple {:?}: {}", self.name, tup.id, e);
                if self.bolt.auto_fail() && !self.out.is_settled(&tup) {
                    self.out.fail(&tup);
                }
                Err(e)
            }
        };

        self.out.set_implicit_anchors(Vec::new());
        result
    }

    pub fn timer_interval(&self) -> Option<Duration> {
        self.bolt.timer_interval()
    }

    pub async fn fire_timer(&mut self) -> Result<()> {
        self.out.begin_tuple(Vec::new());
        self.bolt.on_timer(&mut self.out).await
    }

    pub fn drain(&mut self) -> Vec<Command> {
        self.out.drain()
    }
}
