use crate::core::collector::{Emit, OutputCollector};
use crate::core::topology::{ComponentSpec, Grouping, InputSpec, StreamSpec, Topology};
use crate::domain::model::{StormConfig, TopologyContext, Tuple};
use crate::domain::ports::{BatchingBolt, Spout};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

pub const NAME: &str = "pixel_count";

const URLS: &[&str] = &[
    "http://example.com/",
    "http://example.com/about",
    "http://example.com/pricing",
    "http://example.com/blog/storm",
    "http://example.com/blog/rust",
];

/// Emits fake pageview pixels as `ip, ts, url`.
#[derive(Debug, Default)]
pub struct PixelSpout {
    task_id: i64,
    seq: u64,
}

#[async_trait]
impl Spout for PixelSpout {
    async fn initialize(&mut self, _conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        self.task_id = ctx.task_id;
        Ok(())
    }

    async fn next_tuple(&mut self, out: &mut OutputCollector) -> Result<()> {
        self.seq += 1;
        // spread over a handful of visitors and pages without a RNG
        let ip = format!("192.168.{}.{}", self.task_id.rem_euclid(256), self.seq % 50 + 1);
        let url = URLS[(self.seq.wrapping_mul(7) % URLS.len() as u64) as usize];
        let ts = Utc::now().to_rfc3339();

        out.send(
            Emit::new(vec![json!(ip), json!(ts), json!(url)])
                .tup_id(format!("pixel-{}-{}", self.task_id, self.seq)),
        );
        Ok(())
    }
}

/// Counts pageviews per url, one emit per batch.
#[derive(Debug)]
pub struct PixelCounterBolt {
    counts: HashMap<String, u64>,
    secs_between_batches: f64,
}

impl Default for PixelCounterBolt {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
            secs_between_batches: 1.0,
        }
    }
}

impl PixelCounterBolt {
    pub fn count(&self, url: &str) -> u64 {
        self.counts.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BatchingBolt for PixelCounterBolt {
    async fn initialize(&mut self, conf: &StormConfig, _ctx: &TopologyContext) -> Result<()> {
        if let Some(secs) = conf.get("pixel_count.secs_between_batches").and_then(|v| v.as_f64()) {
            self.secs_between_batches = secs;
        }
        Ok(())
    }

    fn group_key(&self, tup: &Tuple) -> String {
        tup.value(2)
            .and_then(|url| url.as_str())
            .unwrap_or_default()
            .to_string()
    }

    async fn process_batch(
        &mut self,
        key: &str,
        tups: &[Tuple],
        out: &mut OutputCollector,
    ) -> Result<()> {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += tups.len() as u64;
        out.emit(vec![json!(key), json!(*count)]);
        Ok(())
    }

    fn secs_between_batches(&self) -> f64 {
        self.secs_between_batches
    }
}

pub fn topology() -> Result<Topology> {
    Topology::builder(NAME)
        .add(
            ComponentSpec::spout("pixel_spout", PixelSpout::default)
                .output(StreamSpec::default_stream(["ip", "ts", "url"])),
        )
        .add(
            ComponentSpec::batching_bolt("pixel_counter", PixelCounterBolt::default)
                .input(InputSpec::new("pixel_spout").grouping(Grouping::fields(["url"])))
                .output(StreamSpec::default_stream(["url", "count"]))
                .parallelism(2),
        )
        .build()
}
