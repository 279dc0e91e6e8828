use crate::core::collector::OutputCollector;
use crate::domain::model::{StormConfig, TopologyContext, Tuple, TupleId};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Source of tuples.
#[async_trait]
pub trait Spout: Send {
    async fn initialize(&mut self, _conf: &StormConfig, _ctx: &TopologyContext) -> Result<()> {
        Ok(())
    }

    /// Called when Storm asks for more tuples. Emitting nothing is fine.
    async fn next_tuple(&mut self, out: &mut OutputCollector) -> Result<()>;

    /// The tuple tree rooted at `tup_id` completed.
    async fn ack(&mut self, _tup_id: &TupleId, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }

    /// The tuple tree rooted at `tup_id` failed or timed out.
    async fn fail(&mut self, _tup_id: &TupleId, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }

    async fn activate(&mut self, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&mut self, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }
}

/// Consumer of tuples.
///
/// With the defaults every tuple is anchored to the emits made while it is
/// processed, acked when `process` returns `Ok`, and failed when it returns
/// `Err`.
#[async_trait]
pub trait Bolt: Send {
    async fn initialize(&mut self, _conf: &StormConfig, _ctx: &TopologyContext) -> Result<()> {
        Ok(())
    }

    async fn process(&mut self, tup: &Tuple, out: &mut OutputCollector) -> Result<()>;

    async fn process_tick(&mut self, _tup: &Tuple, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }

    fn auto_anchor(&self) -> bool {
        true
    }

    fn auto_ack(&self) -> bool {
        true
    }

    fn auto_fail(&self) -> bool {
        true
    }

    /// How often `on_timer` should run, if at all.
    fn timer_interval(&self) -> Option<Duration> {
        None
    }

    async fn on_timer(&mut self, _out: &mut OutputCollector) -> Result<()> {
        Ok(())
    }
}

/// Bolt that handles tuples in groups.
///
/// Tuples are collected per `group_key` and handed to `process_batch` every
/// `secs_between_batches`, or every `ticks_between_batches` tick tuples when
/// that returns `Some`.
#[async_trait]
pub trait BatchingBolt: Send {
    async fn initialize(&mut self, _conf: &StormConfig, _ctx: &TopologyContext) -> Result<()> {
        Ok(())
    }

    /// Tuples with the same key end up in the same batch.
    fn group_key(&self, _tup: &Tuple) -> String {
        String::new()
    }

    async fn process_batch(
        &mut self,
        key: &str,
        tups: &[Tuple],
        out: &mut OutputCollector,
    ) -> Result<()>;

    fn secs_between_batches(&self) -> f64 {
        2.0
    }

    fn ticks_between_batches(&self) -> Option<u32> {
        None
    }

    fn auto_anchor(&self) -> bool {
        true
    }

    fn auto_ack(&self) -> bool {
        true
    }

    fn auto_fail(&self) -> bool {
        true
    }
}
