use crate::core::component::Component;
use crate::domain::model::{StormConfig, DEFAULT_STREAM};
use crate::domain::ports::{BatchingBolt, Bolt, Spout};
use crate::utils::error::{Result, SparseError};
use crate::utils::validation::{validate_at_least, validate_non_empty_string};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub type ComponentFactory = Arc<dyn Fn() -> Component + Send + Sync>;

/// How tuples of a stream are spread over the tasks of a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    Shuffle,
    Fields(Vec<String>),
    All,
    Global,
    None,
    LocalOrShuffle,
    Direct,
}

impl Grouping {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Grouping::Fields(fields.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub direct: bool,
}

impl StreamSpec {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            direct: false,
        }
    }

    pub fn default_stream<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DEFAULT_STREAM, fields)
    }

    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub component: String,
    pub stream: String,
    pub grouping: Grouping,
}

impl InputSpec {
    /// Subscribes to the default stream of `component` with a shuffle grouping.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            stream: DEFAULT_STREAM.to_string(),
            grouping: Grouping::Shuffle,
        }
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parallelism {
    Fixed(usize),
    PerEnv {
        default: usize,
        envs: HashMap<String, usize>,
    },
}

impl Parallelism {
    pub fn for_env(&self, env_name: Option<&str>) -> usize {
        match self {
            Parallelism::Fixed(n) => *n,
            Parallelism::PerEnv { default, envs } => env_name
                .and_then(|env| envs.get(env))
                .copied()
                .unwrap_or(*default),
        }
    }

    fn values(&self) -> Vec<usize> {
        match self {
            Parallelism::Fixed(n) => vec![*n],
            Parallelism::PerEnv { default, envs } => {
                std::iter::once(*default).chain(envs.values().copied()).collect()
            }
        }
    }
}

impl From<usize> for Parallelism {
    fn from(n: usize) -> Self {
        Parallelism::Fixed(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Spout,
    Bolt,
}

pub struct ComponentSpec {
    pub name: String,
    pub kind: ComponentKind,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<StreamSpec>,
    pub parallelism: Parallelism,
    factory: ComponentFactory,
}

impl ComponentSpec {
    pub fn spout<F, S>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Spout + 'static,
    {
        Self::with_factory(name, ComponentKind::Spout, Arc::new(move || {
            Component::spout(factory())
        }))
    }

    pub fn bolt<F, B>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Bolt + 'static,
    {
        Self::with_factory(name, ComponentKind::Bolt, Arc::new(move || {
            Component::bolt(factory())
        }))
    }

    pub fn batching_bolt<F, B>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: BatchingBolt + 'static,
    {
        Self::with_factory(name, ComponentKind::Bolt, Arc::new(move || {
            Component::batching(factory())
        }))
    }

    fn with_factory(
        name: impl Into<String>,
        kind: ComponentKind,
        factory: ComponentFactory,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            parallelism: Parallelism::Fixed(1),
            factory,
        }
    }

    pub fn input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, stream: StreamSpec) -> Self {
        self.outputs.push(stream);
        self
    }

    pub fn parallelism(mut self, parallelism: impl Into<Parallelism>) -> Self {
        self.parallelism = parallelism.into();
        self
    }

    pub fn output_stream(&self, name: &str) -> Option<&StreamSpec> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn instantiate(&self) -> Component {
        (self.factory)()
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Topology {
    pub name: String,
    pub config: StormConfig,
    specs: Vec<ComponentSpec>,
}

impl Topology {
    pub fn builder(name: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder {
            name: name.into(),
            config: StormConfig::new(),
            specs: Vec::new(),
        }
    }

    pub fn specs(&self) -> &[ComponentSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&ComponentSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}

pub struct TopologyBuilder {
    name: String,
    config: StormConfig,
    specs: Vec<ComponentSpec>,
}

impl TopologyBuilder {
    /// Topology-level option, overriding config.json but not the command line.
    pub fn config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn add(mut self, spec: ComponentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<Topology> {
        validate_non_empty_string("topology.name", &self.name)?;
        validate_components(&self.specs)?;
        validate_acyclic(&self.specs)?;

        Ok(Topology {
            name: self.name,
            config: self.config,
            specs: self.specs,
        })
    }
}

fn validate_components(specs: &[ComponentSpec]) -> Result<()> {
    if !specs.iter().any(|s| s.kind == ComponentKind::Spout) {
        return Err(SparseError::topology("a topology needs at least one spout"));
    }

    let mut names = HashSet::new();
    for spec in specs {
        validate_non_empty_string("component name", &spec.name)?;
        if spec.name.starts_with("__") {
            return Err(SparseError::topology(format!(
                "component name {:?} is reserved for Storm",
                spec.name
            )));
        }
        if !names.insert(spec.name.as_str()) {
            return Err(SparseError::topology(format!(
                "duplicate component name {:?}",
                spec.name
            )));
        }
        for n in spec.parallelism.values() {
            validate_at_least(&format!("{}.parallelism", spec.name), n, 1)?;
        }

        let mut streams = HashSet::new();
        for stream in &spec.outputs {
            if !streams.insert(stream.name.as_str()) {
                return Err(SparseError::topology(format!(
                    "{} declares stream {:?} twice",
                    spec.name, stream.name
                )));
            }
        }

        match spec.kind {
            ComponentKind::Spout if !spec.inputs.is_empty() => {
                return Err(SparseError::topology(format!(
                    "spout {} cannot have inputs",
                    spec.name
                )))
            }
            ComponentKind::Bolt if spec.inputs.is_empty() => {
                return Err(SparseError::topology(format!(
                    "bolt {} has no inputs",
                    spec.name
                )))
            }
            _ => {}
        }
    }

    for spec in specs {
        for input in &spec.inputs {
            validate_input(specs, spec, input)?;
        }
    }
    Ok(())
}

fn validate_input(specs: &[ComponentSpec], spec: &ComponentSpec, input: &InputSpec) -> Result<()> {
    let source = specs
        .iter()
        .find(|s| s.name == input.component)
        .ok_or_else(|| {
            SparseError::topology(format!(
                "{} subscribes to unknown component {:?}",
                spec.name, input.component
            ))
        })?;

    let stream = source.output_stream(&input.stream).ok_or_else(|| {
        SparseError::topology(format!(
            "{} subscribes to {}:{}, which is not declared in {}'s outputs",
            spec.name, input.component, input.stream, input.component
        ))
    })?;

    match &input.grouping {
        Grouping::Fields(fields) => {
            if fields.is_empty() {
                return Err(SparseError::topology(format!(
                    "{} uses a fields grouping without fields",
                    spec.name
                )));
            }
            if let Some(missing) = fields.iter().find(|f| stream.field_index(f).is_none()) {
                return Err(SparseError::topology(format!(
                    "{} groups on field {:?}, which {}:{} does not declare",
                    spec.name, missing, input.component, input.stream
                )));
            }
        }
        Grouping::Direct if !stream.direct => {
            return Err(SparseError::topology(format!(
                "{} uses a direct grouping on non-direct stream {}:{}",
                spec.name, input.component, input.stream
            )))
        }
        _ => {}
    }

    if stream.direct && input.grouping != Grouping::Direct {
        return Err(SparseError::topology(format!(
            "direct stream {}:{} needs a direct grouping in {}",
            input.component, input.stream, spec.name
        )));
    }
    Ok(())
}

/// Kahn's algorithm over component -> subscriber edges.
fn validate_acyclic(specs: &[ComponentSpec]) -> Result<()> {
    let mut in_degree: HashMap<&str, usize> =
        specs.iter().map(|s| (s.name.as_str(), 0)).collect();
    let mut subscribers: HashMap<&str, Vec<&str>> = HashMap::new();

    for spec in specs {
        let sources: HashSet<&str> = spec.inputs.iter().map(|i| i.component.as_str()).collect();
        for source in sources {
            subscribers.entry(source).or_default().push(spec.name.as_str());
            *in_degree.entry(spec.name.as_str()).or_default() += 1;
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0;

    while let Some(name) = ready.pop() {
        visited += 1;
        for subscriber in subscribers.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(subscriber) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(*subscriber);
                }
            }
        }
    }

    if visited != specs.len() {
        return Err(SparseError::topology("the component graph contains a cycle"));
    }
    Ok(())
}

/// Topologies compiled into a binary, looked up by name.
#[derive(Debug, Default)]
pub struct TopologyRegistry {
    topologies: BTreeMap<String, Topology>,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, topology: Topology) {
        self.topologies.insert(topology.name.clone(), topology);
    }

    pub fn get(&self, name: &str) -> Option<&Topology> {
        self.topologies.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.topologies.keys().map(String::as_str).collect()
    }

    pub fn topologies(&self) -> impl Iterator<Item = &Topology> {
        self.topologies.values()
    }

    /// Named topology, or the only one when no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Topology> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                SparseError::config(format!(
                    "topology {:?} not found. Available topologies: {}",
                    name,
                    self.names().join(", ")
                ))
            }),
            None => {
                let mut all = self.topologies.values();
                match (all.next(), all.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(SparseError::config("no topologies are registered")),
                    _ => Err(SparseError::config(format!(
                        "more than one topology is available, pick one with --name: {}",
                        self.names().join(", ")
                    ))),
                }
            }
        }
    }

    /// Finds `component` or `topology.component`.
    pub fn find_component(&self, name: &str) -> Result<(&Topology, &ComponentSpec)> {
        if let Some((topology_name, component)) = name.split_once('.') {
            let topology = self.resolve(Some(topology_name))?;
            let spec = topology.spec(component).ok_or_else(|| {
                SparseError::config(format!(
                    "topology {} has no component {:?}",
                    topology_name, component
                ))
            })?;
            return Ok((topology, spec));
        }

        let matches: Vec<_> = self
            .topologies
            .values()
            .filter_map(|t| t.spec(name).map(|s| (t, s)))
            .collect();
        match matches.as_slice() {
            [found] => Ok(*found),
            [] => Err(SparseError::config(format!("no component named {:?}", name))),
            _ => Err(SparseError::config(format!(
                "component {:?} exists in several topologies, use TOPOLOGY.{}",
                name, name
            ))),
        }
    }
}
