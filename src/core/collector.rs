use crate::core::protocol::{Command, EmitCommand};
use crate::domain::model::{LogLevel, Tuple, TupleId, Values};
use crate::utils::error::{Result, SparseError};
use std::collections::HashSet;

/// Options for a single emit. `Emit::new(values)` targets the default stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emit {
    pub values: Values,
    pub stream: Option<String>,
    pub anchors: Vec<TupleId>,
    pub tup_id: Option<TupleId>,
    pub direct_task: Option<i64>,
}

impl Emit {
    pub fn new(values: Values) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Anchor to the given tuples. Tuples without an id are skipped.
    pub fn anchors<'a>(mut self, tuples: impl IntoIterator<Item = &'a Tuple>) -> Self {
        self.anchors = tuples.into_iter().filter_map(|t| t.id.clone()).collect();
        self
    }

    /// Message id for a spout emit; emits without one are not tracked.
    pub fn tup_id(mut self, id: impl Into<TupleId>) -> Self {
        self.tup_id = Some(id.into());
        self
    }

    pub fn direct_task(mut self, task: i64) -> Self {
        self.direct_task = Some(task);
        self
    }
}

/// Buffers the commands a component produces while handling one message.
#[derive(Debug, Default)]
pub struct OutputCollector {
    outbox: Vec<Command>,
    implicit_anchors: Vec<TupleId>,
    acked: HashSet<TupleId>,
    failed: HashSet<TupleId>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, values: Values) {
        self.send(Emit::new(values));
    }

    pub fn send(&mut self, emit: Emit) {
        let anchors = if emit.anchors.is_empty() {
            self.implicit_anchors.clone()
        } else {
            emit.anchors
        };

        self.outbox.push(Command::Emit(EmitCommand {
            id: emit.tup_id,
            stream: emit.stream,
            anchors,
            task: emit.direct_task,
            need_task_ids: false,
            tuple: emit.values,
        }));
    }

    /// Emits every values list with the options of `template`.
    ///
    /// A message id tracks exactly one tuple, so a template `tup_id` is
    /// rejected when there is more than one values list. Nothing is emitted
    /// in that case.
    pub fn emit_many(&mut self, tuples: Vec<Values>, template: Emit) -> Result<()> {
        if let Some(id) = &template.tup_id {
            if tuples.len() > 1 {
                return Err(SparseError::InvalidEmit {
                    message: format!(
                        "message id {} would be shared by {} tuples",
                        id,
                        tuples.len()
                    ),
                });
            }
        }

        for values in tuples {
            self.send(Emit {
                values,
                ..template.clone()
            });
        }
        Ok(())
    }

    pub fn ack(&mut self, tup: &Tuple) {
        if let Some(id) = &tup.id {
            self.ack_id(id.clone());
        }
    }

    pub fn fail(&mut self, tup: &Tuple) {
        if let Some(id) = &tup.id {
            self.fail_id(id.clone());
        }
    }

    pub fn ack_id(&mut self, id: TupleId) {
        self.acked.insert(id.clone());
        self.outbox.push(Command::Ack { id });
    }

    pub fn fail_id(&mut self, id: TupleId) {
        self.failed.insert(id.clone());
        self.outbox.push(Command::Fail { id });
    }

    pub fn log(&mut self, msg: impl Into<String>, level: LogLevel) {
        self.outbox.push(Command::Log {
            msg: msg.into(),
            level: level.as_u8(),
        });
    }

    /// Whether `tup` was acked or failed since the last `begin_tuple`.
    pub fn is_settled(&self, tup: &Tuple) -> bool {
        match &tup.id {
            Some(id) => self.acked.contains(id) || self.failed.contains(id),
            None => true,
        }
    }

    pub(crate) fn begin_tuple(&mut self, anchors: Vec<TupleId>) {
        self.implicit_anchors = anchors;
        self.acked.clear();
        self.failed.clear();
    }

    pub(crate) fn set_implicit_anchors(&mut self, anchors: Vec<TupleId>) {
        self.implicit_anchors = anchors;
    }

    pub(crate) fn push(&mut self, command: Command) {
        self.outbox.push(command);
    }

    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending(&self) -> &[Command] {
        &self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tuple(id: i64) -> Tuple {
        Tuple::new(Some(id.into()), "word_spout", "default", 1, vec![json!("dog")])
    }

    #[test]
    fn test_emit_uses_implicit_anchors_only_without_explicit_ones() {
        let mut out = OutputCollector::new();
        out.begin_tuple(vec![TupleId::Int(1)]);

        out.emit(vec![json!("a")]);
        out.send(Emit::new(vec![json!("b")]).anchors([&tuple(2)]));

        let commands = out.drain();
        match (&commands[0], &commands[1]) {
            (Command::Emit(first), Command::Emit(second)) => {
                assert_eq!(first.anchors, vec![TupleId::Int(1)]);
                assert_eq!(second.anchors, vec![TupleId::Int(2)]);
            }
            other => panic!("unexpected commands {:?}", other),
        }
        assert!(out.pending().is_empty());
    }

    #[test]
    fn test_emit_many_shares_options() {
        let mut out = OutputCollector::new();
        out.emit_many(
            vec![vec![json!("a")], vec![json!("b")]],
            Emit::default().stream("words").direct_task(3),
        )
        .unwrap();

        let commands = out.drain();
        assert_eq!(commands.len(), 2);
        for command in &commands {
            let Command::Emit(emit) = command else {
                panic!("expected emit, got {:?}", command);
            };
            assert_eq!(emit.stream.as_deref(), Some("words"));
            assert_eq!(emit.task, Some(3));
            assert_eq!(emit.id, None);
        }
    }

    #[test]
    fn test_emit_many_keeps_a_message_id_to_one_tuple() {
        let mut out = OutputCollector::new();
        let err = out
            .emit_many(
                vec![vec![json!("a")], vec![json!("b")]],
                Emit::default().tup_id("m1"),
            )
            .unwrap_err();
        assert!(matches!(err, SparseError::InvalidEmit { .. }));
        assert!(out.pending().is_empty());

        out.emit_many(vec![vec![json!("a")]], Emit::default().tup_id("m1"))
            .unwrap();
        match out.drain().as_slice() {
            [Command::Emit(emit)] => assert_eq!(emit.id, Some(TupleId::from("m1"))),
            other => panic!("unexpected commands {:?}", other),
        }
    }

    #[test]
    fn test_settled_tracking() {
        let mut out = OutputCollector::new();
        let first = tuple(1);
        let second = tuple(2);

        out.begin_tuple(vec![]);
        out.ack(&first);
        assert!(out.is_settled(&first));
        assert!(!out.is_settled(&second));

        out.begin_tuple(vec![]);
        assert!(!out.is_settled(&first));

        let unanchored = Tuple::new(None, "__system", "__tick", -1, vec![]);
        out.ack(&unanchored);
        assert!(out.is_settled(&unanchored));
        assert_eq!(out.drain().len(), 1);
    }

    #[test]
    fn test_log_command_level() {
        let mut out = OutputCollector::new();
        out.log("counted", LogLevel::Debug);
        assert_eq!(
            out.drain(),
            vec![Command::Log {
                msg: "counted".to_string(),
                level: 1
            }]
        );
    }
}
