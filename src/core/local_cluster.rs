//! Single-process topology runner.
//!
//! Handy for debugging and tests; it is not meant to stand in for a Storm
//! cluster. Every task lives in this process and messages are passed through
//! in-memory inboxes, one task at a time.

use crate::core::acker::{AckOutcome, AckTracker, FailOutcome, Root};
use crate::core::component::ComponentInstance;
use crate::core::protocol::{Command, EmitCommand, Message, TupleMessage};
use crate::core::topology::{Grouping, StreamSpec, Topology};
use crate::domain::model::{
    LogLevel, StormConfig, TopologyContext, TupleId, Values, DEFAULT_STREAM, SYSTEM_COMPONENT,
    TICK_STREAM,
};
use crate::utils::error::{Result, SparseError};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

const LOG_EVERY: u64 = 20;
const MAX_DELIVERIES_PER_STEP: usize = 10_000;
const IDLE_PAUSE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub emitted: u64,
    pub acked: u64,
    pub failed: u64,
}

/// Per component, per stream counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClusterStats {
    streams: BTreeMap<String, BTreeMap<String, StreamCounts>>,
}

impl ClusterStats {
    fn entry(&mut self, component: &str, stream: &str) -> &mut StreamCounts {
        self.streams
            .entry(component.to_string())
            .or_default()
            .entry(stream.to_string())
            .or_default()
    }

    pub fn get(&self, component: &str, stream: &str) -> StreamCounts {
        self.streams
            .get(component)
            .and_then(|streams| streams.get(stream))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_emitted(&self) -> u64 {
        self.streams
            .values()
            .flat_map(|streams| streams.values())
            .map(|counts| counts.emitted)
            .sum()
    }
}

struct Task {
    task_id: i64,
    instance: ComponentInstance,
    inbox: VecDeque<Message>,
    last_timer: Instant,
}

enum RouteGrouping {
    RoundRobin { next: usize },
    Fields(Vec<usize>),
    All,
    Global,
    Direct,
}

struct Route {
    // (index into tasks, Storm task id)
    tasks: Vec<(usize, i64)>,
    grouping: RouteGrouping,
}

pub struct LocalCluster {
    topology_name: String,
    conf: StormConfig,
    tasks: Vec<Task>,
    streams: HashMap<String, HashMap<String, StreamSpec>>,
    routes: HashMap<(String, String), Vec<Route>>,
    tracker: AckTracker,
    stats: ClusterStats,
    ignored_spouts: HashSet<usize>,
    acking: bool,
    max_spout_pending: Option<usize>,
    tick_freq: Duration,
    last_tick: Instant,
    next_edge: i64,
}

impl LocalCluster {
    /// Instantiates and initializes every task of `topology`.
    ///
    /// `options` are layered over the topology's own config; `env_name`
    /// selects per-environment parallelism.
    pub async fn start(
        topology: &Topology,
        env_name: Option<&str>,
        options: StormConfig,
    ) -> Result<Self> {
        let mut conf = topology.config.clone();
        conf.extend(options);
        conf.entry("topology.name".to_string())
            .or_insert_with(|| serde_json::Value::String(topology.name.clone()));

        let acking = conf
            .get("topology.acker.executors")
            .and_then(serde_json::Value::as_i64)
            .map_or(true, |ackers| ackers != 0);
        let max_spout_pending = conf
            .get("topology.max.spout.pending")
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize);
        let tick_freq = conf
            .get("topology.tick.tuple.freq.secs")
            .and_then(serde_json::Value::as_f64)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|freq| !freq.is_zero())
            .unwrap_or(Duration::from_secs(1));

        let now = Instant::now();
        let mut tasks = Vec::new();
        let mut component_tasks: HashMap<String, Vec<(usize, i64)>> = HashMap::new();
        let mut task_to_component = HashMap::new();
        let mut streams = HashMap::new();

        for spec in topology.specs() {
            let count = spec.parallelism.for_env(env_name);
            for _ in 0..count {
                let index = tasks.len();
                let task_id = index as i64 + 1;
                tasks.push(Task {
                    task_id,
                    instance: ComponentInstance::new(spec.name.clone(), spec.instantiate()),
                    inbox: VecDeque::new(),
                    last_timer: now,
                });
                component_tasks
                    .entry(spec.name.clone())
                    .or_default()
                    .push((index, task_id));
                task_to_component.insert(task_id.to_string(), spec.name.clone());
            }

            let declared: HashMap<String, StreamSpec> = spec
                .outputs
                .iter()
                .map(|stream| (stream.name.clone(), stream.clone()))
                .collect();
            streams.insert(spec.name.clone(), declared);
        }

        let mut routes: HashMap<(String, String), Vec<Route>> = HashMap::new();
        for spec in topology.specs() {
            let targets = component_tasks.get(&spec.name).cloned().unwrap_or_default();
            for input in &spec.inputs {
                let grouping = match &input.grouping {
                    Grouping::Shuffle | Grouping::None | Grouping::LocalOrShuffle => {
                        RouteGrouping::RoundRobin { next: 0 }
                    }
                    Grouping::Fields(fields) => {
                        let source = streams
                            .get(&input.component)
                            .and_then(|declared: &HashMap<String, StreamSpec>| {
                                declared.get(&input.stream)
                            })
                            .ok_or_else(|| {
                                SparseError::topology(format!(
                                    "{} subscribes to undeclared stream {}:{}",
                                    spec.name, input.component, input.stream
                                ))
                            })?;
                        let indexes = fields
                            .iter()
                            .filter_map(|field| source.field_index(field))
                            .collect();
                        RouteGrouping::Fields(indexes)
                    }
                    Grouping::All => RouteGrouping::All,
                    Grouping::Global => RouteGrouping::Global,
                    Grouping::Direct => RouteGrouping::Direct,
                };
                routes
                    .entry((input.component.clone(), input.stream.clone()))
                    .or_default()
                    .push(Route {
                        tasks: targets.clone(),
                        grouping,
                    });
            }
        }

        let mut cluster = Self {
            topology_name: topology.name.clone(),
            conf,
            tasks,
            streams,
            routes,
            tracker: AckTracker::new(),
            stats: ClusterStats::default(),
            ignored_spouts: HashSet::new(),
            acking,
            max_spout_pending,
            tick_freq,
            last_tick: now,
            next_edge: 0,
        };

        for spec in topology.specs() {
            let mut sources: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
            for input in &spec.inputs {
                if let Some(stream) = topology
                    .spec(&input.component)
                    .and_then(|source| source.output_stream(&input.stream))
                {
                    sources
                        .entry(input.component.clone())
                        .or_default()
                        .insert(input.stream.clone(), stream.fields.clone());
                }
            }
            let outputs: HashMap<String, Vec<String>> = spec
                .outputs
                .iter()
                .map(|stream| (stream.name.clone(), stream.fields.clone()))
                .collect();

            for (index, task_id) in component_tasks.get(&spec.name).cloned().unwrap_or_default() {
                let ctx = TopologyContext {
                    task_id,
                    component_id: spec.name.clone(),
                    task_to_component: task_to_component.clone(),
                    source_stream_fields: sources.clone(),
                    stream_output_fields: outputs.clone(),
                };
                let task = &mut cluster.tasks[index];
                task.instance
                    .initialize(&cluster.conf, &ctx)
                    .await
                    .map_err(|e| wrap_component_error(&spec.name, e))?;
                let commands = task.instance.drain();
                cluster.route_outputs(index, commands)?;
            }
        }

        tracing::info!(
            "Started topology {} with {} tasks",
            cluster.topology_name,
            cluster.tasks.len()
        );
        Ok(cluster)
    }

    pub fn conf(&self) -> &StormConfig {
        &self.conf
    }

    pub fn stats(&self) -> &ClusterStats {
        &self.stats
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spout tuples whose trees have not completed yet.
    pub fn pending_spout_tuples(&self) -> usize {
        (0..self.tasks.len())
            .map(|index| self.tracker.pending_for(index))
            .sum()
    }

    /// One scheduling round: ticks and timers when due, `next` for every
    /// spout under its pending limit, then deliver until quiescent.
    pub async fn step(&mut self) -> Result<()> {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= self.tick_freq {
            self.enqueue_ticks(now);
        }
        self.fire_due_timers(now, false).await?;
        self.request_next_tuples();
        self.pump().await?;
        Ok(())
    }

    /// Sends a tick tuple to every bolt task right away and delivers.
    pub async fn tick(&mut self) -> Result<()> {
        self.enqueue_ticks(Instant::now());
        self.pump().await?;
        Ok(())
    }

    /// Fires every bolt timer regardless of its interval and delivers.
    pub async fn fire_timers(&mut self) -> Result<()> {
        self.fire_due_timers(Instant::now(), true).await?;
        self.pump().await?;
        Ok(())
    }

    /// Steps until `running_time` elapses, or until Ctrl-C when `None`.
    pub async fn run(&mut self, running_time: Option<Duration>) -> Result<ClusterStats> {
        let start = Instant::now();
        let deadline = running_time.map(|time| start + time);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            let emitted_before = self.stats.total_emitted();
            let interrupted = tokio::select! {
                result = self.step() => {
                    result?;
                    false
                }
                _ = &mut shutdown => true,
            };
            if interrupted {
                tracing::info!("Interrupted, stopping topology {}", self.topology_name);
                break;
            }
            if self.stats.total_emitted() == emitted_before {
                tokio::time::sleep(IDLE_PAUSE).await;
            }
        }

        tracing::info!(
            "Stopped execution after {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(self.stats.clone())
    }

    fn enqueue_ticks(&mut self, now: Instant) {
        self.last_tick = now;
        let freq = self.tick_freq.as_secs_f64();
        for task in self.tasks.iter_mut().filter(|t| !t.instance.is_spout()) {
            task.inbox.push_back(Message::Tuple(TupleMessage {
                id: None,
                comp: SYSTEM_COMPONENT.to_string(),
                stream: TICK_STREAM.to_string(),
                task: -1,
                tuple: vec![serde_json::json!(freq)],
            }));
        }
    }

    async fn fire_due_timers(&mut self, now: Instant, force: bool) -> Result<()> {
        for index in 0..self.tasks.len() {
            let task = &mut self.tasks[index];
            let Some(interval) = task.instance.timer_interval() else {
                continue;
            };
            if !force && now.duration_since(task.last_timer) < interval {
                continue;
            }
            task.last_timer = now;

            let result = task.instance.fire_timer().await;
            let name = task.instance.name().to_string();
            let commands = task.instance.drain();
            self.route_outputs(index, commands)?;
            result.map_err(|e| wrap_component_error(&name, e))?;
        }
        Ok(())
    }

    fn request_next_tuples(&mut self) {
        for index in 0..self.tasks.len() {
            if !self.tasks[index].instance.is_spout() {
                continue;
            }
            let pending = self.tracker.pending_for(index);
            if let Some(max) = self.max_spout_pending {
                if pending >= max {
                    tracing::debug!(
                        "{} tuples pending for {} (max {}), skipping next_tuple",
                        pending,
                        self.tasks[index].instance.name(),
                        max
                    );
                    continue;
                }
            }
            self.tasks[index]
                .inbox
                .push_back(Message::Command(Command::Next));
        }
    }

    async fn pump(&mut self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            let mut progressed = false;
            for index in 0..self.tasks.len() {
                while let Some(message) = self.tasks[index].inbox.pop_front() {
                    self.deliver(index, message).await?;
                    delivered += 1;
                    progressed = true;
                    if delivered >= MAX_DELIVERIES_PER_STEP {
                        tracing::debug!("Delivery limit reached, continuing next step");
                        return Ok(delivered);
                    }
                }
            }
            if !progressed {
                return Ok(delivered);
            }
        }
    }

    async fn deliver(&mut self, index: usize, message: Message) -> Result<()> {
        // a new command from us ends the spout's previous sync
        self.ignored_spouts.remove(&index);

        let task = &mut self.tasks[index];
        let result = task.instance.handle(message).await;
        let name = task.instance.name().to_string();
        let commands = task.instance.drain();
        self.route_outputs(index, commands)?;
        result.map_err(|e| wrap_component_error(&name, e))
    }

    fn route_outputs(&mut self, source: usize, commands: Vec<Command>) -> Result<()> {
        let name = self.tasks[source].instance.name().to_string();
        for command in commands {
            if self.ignored_spouts.contains(&source) {
                tracing::warn!(
                    "Ignoring unrequested output from spout {}: {:?}",
                    name,
                    command
                );
                continue;
            }

            match command {
                Command::Log { msg, level } => log_component(&name, level, &msg),
                Command::Emit(emit) => self.handle_emit(source, emit)?,
                Command::Sync => {
                    if self.tasks[source].instance.is_spout() {
                        self.ignored_spouts.insert(source);
                    }
                }
                Command::Ack { id } => self.handle_ack(id),
                Command::Fail { id } => self.handle_fail(id),
                Command::Error { msg } => tracing::error!("{} reported an error: {}", name, msg),
                other => tracing::warn!("Missed this command from {}: {:?}", name, other),
            }
        }
        Ok(())
    }

    fn handle_emit(&mut self, source: usize, emit: EmitCommand) -> Result<()> {
        let component = self.tasks[source].instance.name().to_string();
        let is_spout = self.tasks[source].instance.is_spout();
        let stream = emit
            .stream
            .clone()
            .unwrap_or_else(|| DEFAULT_STREAM.to_string());

        let direct = self
            .streams
            .get(&component)
            .and_then(|declared| declared.get(&stream))
            .map(|spec| spec.direct)
            .ok_or_else(|| SparseError::UndeclaredStream {
                component: component.clone(),
                stream: stream.clone(),
            })?;
        match (direct, emit.task) {
            (true, None) => {
                return Err(SparseError::protocol(format!(
                    "{} must name a task when emitting to direct stream {}",
                    component, stream
                )))
            }
            (false, Some(task)) => {
                return Err(SparseError::protocol(format!(
                    "{} emitted to task {} on non-direct stream {}",
                    component, task, stream
                )))
            }
            _ => {}
        }

        let counts = self.stats.entry(&component, &stream);
        counts.emitted += 1;
        if counts.emitted % LOG_EVERY == 0 {
            tracing::info!(
                "Cumulative count of tuples emitted for {}__{}: {}",
                component,
                stream,
                counts.emitted
            );
        }

        let roots = if is_spout {
            match emit.id.clone() {
                Some(message_id) if self.acking => {
                    vec![self
                        .tracker
                        .open_root(source, &component, &stream, message_id)]
                }
                Some(message_id) => {
                    self.tasks[source]
                        .inbox
                        .push_back(Message::Command(Command::Ack { id: message_id }));
                    Vec::new()
                }
                None => Vec::new(),
            }
        } else {
            self.tracker.roots_of(&emit.anchors)
        };

        let targets = self.select_targets(&component, &stream, &emit.tuple, emit.task);
        if direct && targets.is_empty() {
            tracing::warn!(
                "{} emitted to task {:?} on {}, which no subscriber owns",
                component,
                emit.task,
                stream
            );
        }

        let source_task = self.tasks[source].task_id;
        for target in targets {
            self.next_edge += 1;
            let edge_id = TupleId::Int(self.next_edge);
            self.tracker
                .add_edge(edge_id.clone(), &component, &stream, roots.clone());
            self.tasks[target]
                .inbox
                .push_back(Message::Tuple(TupleMessage {
                    id: Some(edge_id),
                    comp: component.clone(),
                    stream: stream.clone(),
                    task: source_task,
                    tuple: emit.tuple.clone(),
                }));
        }

        if is_spout {
            for root in roots {
                if let Some(done) = self.tracker.complete_if_idle(root) {
                    self.notify_spout(done, true);
                }
            }
        }
        Ok(())
    }

    fn select_targets(
        &mut self,
        component: &str,
        stream: &str,
        values: &Values,
        direct_task: Option<i64>,
    ) -> Vec<usize> {
        let Some(routes) = self
            .routes
            .get_mut(&(component.to_string(), stream.to_string()))
        else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        for route in routes.iter_mut() {
            if route.tasks.is_empty() {
                continue;
            }
            let count = route.tasks.len();
            match &mut route.grouping {
                RouteGrouping::RoundRobin { next } => {
                    targets.push(route.tasks[*next % count].0);
                    *next = (*next + 1) % count;
                }
                RouteGrouping::Fields(indexes) => {
                    let mut hasher = DefaultHasher::new();
                    for index in indexes.iter() {
                        values
                            .get(*index)
                            .map(|value| value.to_string())
                            .hash(&mut hasher);
                    }
                    let slot = (hasher.finish() % count as u64) as usize;
                    targets.push(route.tasks[slot].0);
                }
                RouteGrouping::All => targets.extend(route.tasks.iter().map(|(index, _)| *index)),
                RouteGrouping::Global => targets.push(route.tasks[0].0),
                RouteGrouping::Direct => targets.extend(
                    route
                        .tasks
                        .iter()
                        .filter(|(_, task_id)| Some(*task_id) == direct_task)
                        .map(|(index, _)| *index),
                ),
            }
        }
        targets
    }

    fn handle_ack(&mut self, id: TupleId) {
        match self.tracker.ack(&id) {
            AckOutcome::Unknown => tracing::warn!("Ignoring ack for unknown tuple: {}", id),
            AckOutcome::Acked { origin, completed } => {
                let counts = self.stats.entry(&origin.component, &origin.stream);
                counts.acked += 1;
                if counts.acked % LOG_EVERY == 0 {
                    tracing::info!(
                        "Cumulative count of tuples acked for {}__{}: {}",
                        origin.component,
                        origin.stream,
                        counts.acked
                    );
                }
                for root in completed {
                    self.notify_spout(root, true);
                }
            }
        }
    }

    fn handle_fail(&mut self, id: TupleId) {
        match self.tracker.fail(&id) {
            FailOutcome::Unknown => tracing::warn!("Failing already failed tuple: {}", id),
            FailOutcome::Failed { origin, failed } => {
                let counts = self.stats.entry(&origin.component, &origin.stream);
                counts.failed += 1;
                if counts.failed % LOG_EVERY == 0 {
                    tracing::info!(
                        "Cumulative count of tuples failed for {}__{}: {}",
                        origin.component,
                        origin.stream,
                        counts.failed
                    );
                }
                for root in failed {
                    self.notify_spout(root, false);
                }
            }
        }
    }

    fn notify_spout(&mut self, root: Root, acked: bool) {
        tracing::debug!(
            "Tuple tree {} from {}:{} {}",
            root.message_id,
            root.component,
            root.stream,
            if acked { "completed" } else { "failed" }
        );
        let command = if acked {
            Command::Ack {
                id: root.message_id,
            }
        } else {
            Command::Fail {
                id: root.message_id,
            }
        };
        if let Some(task) = self.tasks.get_mut(root.spout_task) {
            task.inbox.push_back(Message::Command(command));
        }
    }
}

fn wrap_component_error(component: &str, error: SparseError) -> SparseError {
    match error {
        SparseError::ComponentError { .. } | SparseError::UndeclaredStream { .. } => error,
        other => SparseError::component(component, other),
    }
}

fn log_component(component: &str, level: u8, msg: &str) {
    match LogLevel::from_u8(level) {
        LogLevel::Trace => tracing::trace!(component, "{}", msg),
        LogLevel::Debug => tracing::debug!(component, "{}", msg),
        LogLevel::Info => tracing::info!(component, "{}", msg),
        LogLevel::Warn => tracing::warn!(component, "{}", msg),
        LogLevel::Error => tracing::error!(component, "{}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::{Emit, OutputCollector};
    use crate::core::topology::{ComponentSpec, InputSpec};
    use crate::domain::model::Tuple;
    use crate::domain::ports::{Bolt, Spout};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Emits 1, 2, 3... one per `next`.
    #[derive(Default)]
    struct Numbers {
        next: i64,
    }

    #[async_trait]
    impl Spout for Numbers {
        async fn next_tuple(&mut self, out: &mut OutputCollector) -> Result<()> {
            self.next += 1;
            out.send(Emit::new(vec![json!(self.next)]).tup_id(self.next));
            Ok(())
        }
    }

    struct Sink;

    #[async_trait]
    impl Bolt for Sink {
        async fn process(&mut self, _tup: &Tuple, _out: &mut OutputCollector) -> Result<()> {
            Ok(())
        }
    }

    fn numbers_topology() -> Topology {
        Topology::builder("numbers")
            .add(
                ComponentSpec::spout("numbers", Numbers::default)
                    .output(StreamSpec::default_stream(["n"])),
            )
            .add(ComponentSpec::bolt("sink", || Sink).input(InputSpec::new("numbers")))
            .build()
            .unwrap()
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spout_output_after_sync_is_ignored() {
        let mut cluster = LocalCluster::start(&numbers_topology(), None, StormConfig::new())
            .await
            .unwrap();
        let spout = cluster
            .tasks
            .iter()
            .position(|task| task.instance.is_spout())
            .unwrap();
        let stray = Command::Emit(EmitCommand {
            id: Some(TupleId::Int(99)),
            stream: None,
            anchors: Vec::new(),
            task: None,
            need_task_ids: false,
            tuple: vec![json!(99)],
        });

        cluster
            .route_outputs(spout, vec![Command::Sync, stray])
            .unwrap();
        assert_eq!(cluster.stats().get("numbers", DEFAULT_STREAM).emitted, 0);
        assert_eq!(cluster.pending_spout_tuples(), 0);

        // the next command sent to the spout lifts the sync
        cluster.step().await.unwrap();
        assert_eq!(cluster.stats().get("numbers", DEFAULT_STREAM).emitted, 1);
    }

    #[tokio::test]
    async fn test_cumulative_counts_are_logged_every_20_emits() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut cluster = LocalCluster::start(&numbers_topology(), None, StormConfig::new())
            .await
            .unwrap();
        for _ in 0..45 {
            cluster.step().await.unwrap();
        }
        assert_eq!(cluster.stats().get("numbers", DEFAULT_STREAM).emitted, 45);

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let counts: Vec<&str> = logs
            .lines()
            .filter(|line| line.contains("tuples emitted for numbers__default"))
            .collect();
        assert_eq!(counts.len(), 2, "{}", logs);
        assert!(counts[0].ends_with(": 20"));
        assert!(counts[1].ends_with(": 40"));
    }
}
