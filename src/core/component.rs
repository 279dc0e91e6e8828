use crate::core::batching::BatchingBoltAdapter;
use crate::core::bolt::BoltInstance;
use crate::core::protocol::{Command, Message};
use crate::core::spout::SpoutInstance;
use crate::domain::model::{StormConfig, TopologyContext};
use crate::domain::ports::{BatchingBolt, Bolt, Spout};
use crate::utils::error::Result;
use std::time::Duration;

/// A user component before it is bound to a task.
pub enum Component {
    Spout(Box<dyn Spout>),
    Bolt(Box<dyn Bolt>),
}

impl Component {
    pub fn spout(spout: impl Spout + 'static) -> Self {
        Component::Spout(Box::new(spout))
    }

    pub fn bolt(bolt: impl Bolt + 'static) -> Self {
        Component::Bolt(Box::new(bolt))
    }

    pub fn batching(bolt: impl BatchingBolt + 'static) -> Self {
        Component::Bolt(Box::new(BatchingBoltAdapter::new(bolt)))
    }

    pub fn is_spout(&self) -> bool {
        matches!(self, Component::Spout(_))
    }
}

pub enum ComponentInstance {
    Spout(SpoutInstance),
    Bolt(BoltInstance),
}

impl ComponentInstance {
    pub fn new(name: impl Into<String>, component: Component) -> Self {
        match component {
            Component::Spout(spout) => ComponentInstance::Spout(SpoutInstance::new(name, spout)),
            Component::Bolt(bolt) => ComponentInstance::Bolt(BoltInstance::new(name, bolt)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComponentInstance::Spout(spout) => spout.name(),
            ComponentInstance::Bolt(bolt) => bolt.name(),
        }
    }

    pub fn is_spout(&self) -> bool {
        matches!(self, ComponentInstance::Spout(_))
    }

    pub async fn initialize(&mut self, conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        match self {
            ComponentInstance::Spout(spout) => spout.initialize(conf, ctx).await,
            ComponentInstance::Bolt(bolt) => bolt.initialize(conf, ctx).await,
        }
    }

    pub async fn handle(&mut self, msg: Message) -> Result<()> {
        match self {
            ComponentInstance::Spout(spout) => spout.handle(msg).await,
            ComponentInstance::Bolt(bolt) => bolt.handle(msg).await,
        }
    }

    pub fn timer_interval(&self) -> Option<Duration> {
        match self {
            ComponentInstance::Spout(_) => None,
            ComponentInstance::Bolt(bolt) => bolt.timer_interval(),
        }
    }

    pub async fn fire_timer(&mut self) -> Result<()> {
        match self {
            ComponentInstance::Spout(_) => Ok(()),
            ComponentInstance::Bolt(bolt) => bolt.fire_timer().await,
        }
    }

    pub fn drain(&mut self) -> Vec<Command> {
        match self {
            ComponentInstance::Spout(spout) => spout.drain(),
            ComponentInstance::Bolt(bolt) => bolt.drain(),
        }
    }
}
