use crate::core::collector::{Emit, OutputCollector};
use crate::core::topology::{ComponentSpec, Grouping, InputSpec, Parallelism, StreamSpec, Topology};
use crate::domain::model::{StormConfig, TopologyContext, Tuple, TupleId};
use crate::domain::ports::{Bolt, Spout};
use crate::utils::error::{Result, SparseError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

pub const NAME: &str = "wordcount";

const WORDS: &[&str] = &["dog", "cat", "zebra", "elephant"];

/// Cycles through a fixed word list, one reliable tuple per call.
#[derive(Debug, Default)]
pub struct WordSpout {
    next_id: i64,
    failed: u64,
}

#[async_trait]
impl Spout for WordSpout {
    async fn initialize(&mut self, _conf: &StormConfig, ctx: &TopologyContext) -> Result<()> {
        // keep ids unique across spout tasks
        self.next_id = ctx.task_id * 1_000_000_000;
        Ok(())
    }

    async fn next_tuple(&mut self, out: &mut OutputCollector) -> Result<()> {
        let word = WORDS[(self.next_id.rem_euclid(WORDS.len() as i64)) as usize];
        self.next_id += 1;
        out.send(Emit::new(vec![json!(word)]).tup_id(self.next_id));
        Ok(())
    }

    async fn fail(&mut self, tup_id: &TupleId, _out: &mut OutputCollector) -> Result<()> {
        self.failed += 1;
        tracing::warn!("Word tuple {} failed ({} so far)", tup_id, self.failed);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct WordCountBolt {
    counts: HashMap<String, u64>,
    total: u64,
}

impl WordCountBolt {
    pub fn count(&self, word: &str) -> u64 {
        self.counts.get(word).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Bolt for WordCountBolt {
    async fn process(&mut self, tup: &Tuple, out: &mut OutputCollector) -> Result<()> {
        let word = tup
            .value(0)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SparseError::component("count_bolt", "expected a word string"))?;

        let count = self.counts.entry(word.to_string()).or_insert(0);
        *count += 1;
        out.emit(vec![json!(word), json!(*count)]);

        self.total += 1;
        if self.total % 1000 == 0 {
            tracing::info!("Counted {} words so far", self.total);
        }
        Ok(())
    }
}

pub fn topology() -> Result<Topology> {
    Topology::builder(NAME)
        .config("topology.max.spout.pending", json!(100))
        .add(
            ComponentSpec::spout("word_spout", WordSpout::default)
                .output(StreamSpec::default_stream(["word"]))
                .parallelism(2),
        )
        .add(
            ComponentSpec::bolt("count_bolt", WordCountBolt::default)
                .input(InputSpec::new("word_spout").grouping(Grouping::fields(["word"])))
                .output(StreamSpec::default_stream(["word", "count"]))
                .parallelism(Parallelism::PerEnv {
                    default: 2,
                    envs: HashMap::from([("prod".to_string(), 8)]),
                }),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::Command;

    fn tuple(word: &str) -> Tuple {
        Tuple::new(Some(1.into()), "word_spout", "default", 1, vec![json!(word)])
    }

    #[tokio::test]
    async fn test_spout_cycles_words_with_ids() {
        let mut spout = WordSpout::default();
        let mut out = OutputCollector::new();
        for _ in 0..5 {
            spout.next_tuple(&mut out).await.unwrap();
        }

        let emits: Vec<_> = out
            .drain()
            .into_iter()
            .filter_map(|c| match c {
                Command::Emit(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(emits.len(), 5);
        assert_eq!(emits[0].tuple, vec![json!("dog")]);
        assert_eq!(emits[4].tuple, vec![json!("dog")]);
        assert_eq!(emits[1].id, Some(TupleId::Int(2)));
    }

    #[tokio::test]
    async fn test_bolt_counts_words() {
        let mut bolt = WordCountBolt::default();
        let mut out = OutputCollector::new();
        bolt.process(&tuple("cat"), &mut out).await.unwrap();
        bolt.process(&tuple("cat"), &mut out).await.unwrap();
        bolt.process(&tuple("dog"), &mut out).await.unwrap();

        assert_eq!(bolt.count("cat"), 2);
        assert_eq!(bolt.count("dog"), 1);
        match out.drain().get(1) {
            Some(Command::Emit(e)) => assert_eq!(e.tuple, vec![json!("cat"), json!(2)]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bolt_rejects_non_string() {
        let mut bolt = WordCountBolt::default();
        let mut out = OutputCollector::new();
        let bad = Tuple::new(None, "word_spout", "default", 1, vec![json!(3)]);
        assert!(bolt.process(&bad, &mut out).await.is_err());
    }

    #[test]
    fn test_topology_is_valid() {
        let topology = topology().unwrap();
        assert_eq!(topology.specs().len(), 2);
        let bolt = topology.spec("count_bolt").unwrap();
        assert_eq!(bolt.parallelism.for_env(Some("prod")), 8);
        assert_eq!(bolt.parallelism.for_env(None), 2);
    }
}
