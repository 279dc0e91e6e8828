use crate::core::collector::OutputCollector;
use crate::domain::model::{StormConfig, TopologyContext, Tuple};
use crate::domain::ports::{BatchingBolt, Bolt};
use crate::utils::error::{Result, SparseError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Runs a [`BatchingBolt`] as a plain [`Bolt`].
///
/// Incoming tuples are only buffered. Anchoring, acking and failing happen
/// per batch when the buffer is flushed, so the per-tuple automatic behaviour
/// of the wrapping bolt is switched off.
pub struct BatchingBoltAdapter<B: BatchingBolt> {
    inner: B,
    batches: BTreeMap<String, Vec<Tuple>>,
    ticks_seen: u32,
}

impl<B: BatchingBolt> BatchingBoltAdapter<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            batches: BTreeMap::new(),
            ticks_seen: 0,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn pending_tuples(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }

    async fn flush(&mut self, out: &mut OutputCollector) -> Result<()> {
        if self.batches.is_empty() {
            return Ok(());
        }

        let mut remaining = std::mem::take(&mut self.batches).into_iter();
        while let Some((key, tups)) = remaining.next() {
            let anchors = if self.inner.auto_anchor() {
                tups.iter().filter_map(|t| t.id.clone()).collect()
            } else {
                Vec::new()
            };
            out.begin_tuple(anchors);

            tracing::debug!("Processing batch {:?} with {} tuples", key, tups.len());
            if let Err(e) = self.inner.process_batch(&key, &tups, out).await {
                tracing::error!("Batch {:?} failed: {}", key, e);
                if self.inner.auto_fail() {
                    for tup in &tups {
                        if !out.is_settled(tup) {
                            out.fail(tup);
                        }
                    }
                    // later batches never ran
                    for (_, rest) in remaining {
                        for tup in &rest {
                            out.fail(tup);
                        }
                    }
                }
                out.set_implicit_anchors(Vec::new());
                return Err(e);
            }

            if self.inner.auto_ack() {
                for tup in &tups {
                    if !out.is_settled(tup) {
                        out.ack(tup);
                    }
                }
            }
        }

        out.set_implicit_anchors(Vec::new());
        Ok(())
    }
}

// a timer-driven batch with no usable period would never be flushed
fn batch_interval(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|interval| !interval.is_zero())
        .ok_or_else(|| {
            SparseError::config(format!(
                "secs_between_batches must be a positive number of seconds, got {}",
                secs
            ))
        })
}

#[async_trait]
impl<B: BatchingBolt> Bolt for BatchingBoltAdapter<B> {
    async fn initialize(&mut self, conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        self.inner.initialize(conf, ctx).await?;
        if self.inner.ticks_between_batches().is_none() {
            batch_interval(self.inner.secs_between_batches())?;
        }
        Ok(())
    }

    async fn process(&mut self, tup: &Tuple, _out: &mut OutputCollector) -> Result<()> {
        let key = self.inner.group_key(tup);
        self.batches.entry(key).or_default().push(tup.clone());
        Ok(())
    }

    async fn process_tick(&mut self, _tup: &Tuple, out: &mut OutputCollector) -> Result<()> {
        let Some(every) = self.inner.ticks_between_batches() else {
            return Ok(());
        };

        self.ticks_seen += 1;
        if self.ticks_seen >= every.max(1) {
            self.ticks_seen = 0;
            self.flush(out).await?;
        }
        Ok(())
    }

    fn auto_anchor(&self) -> bool {
        false
    }

    fn auto_ack(&self) -> bool {
        false
    }

    fn auto_fail(&self) -> bool {
        false
    }

    fn timer_interval(&self) -> Option<Duration> {
        if self.inner.ticks_between_batches().is_some() {
            return None;
        }
        batch_interval(self.inner.secs_between_batches()).ok()
    }

    async fn on_timer(&mut self, out: &mut OutputCollector) -> Result<()> {
        self.flush(out).await
    }
}
