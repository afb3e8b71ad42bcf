//! Line-oriented scripts and the command registry they are dispatched to.
//!
//! A script file holds one command per line: the first whitespace-separated
//! field names the command, the rest are passed through as text arguments.
//! Each registered command declares the shape of its arguments. The
//! dispatcher rejects a wrong argument count before the handler runs; a value
//! of the wrong kind is read as that kind's default. A failing line costs one
//! command instead of the whole run.

mod core_actions;
mod value;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::app::EngineError;

pub use core_actions::register_core_actions;
pub use value::{Coerced, Value};

/// One command invocation: a name plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub command: String,
    pub arguments: Vec<Value>,
}

impl Action {
    pub fn new(command: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            arguments,
        }
    }

    /// Splits on whitespace. Blank lines and lines starting with `#` yield
    /// `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let command = fields.next()?;
        if command.starts_with('#') {
            return None;
        }
        Some(Self::new(command, fields.map(Value::from).collect()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for argument in &self.arguments {
            write!(f, " {argument}")?;
        }
        Ok(())
    }
}

/// An ordered list of actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    actions: Vec<Action>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_str(raw: &str) -> Self {
        Self {
            actions: raw.lines().filter_map(Action::parse_line).collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let mut script = Self::new();
        script.load(path, false)?;
        Ok(script)
    }

    /// Appends an action and returns its index.
    pub fn add(&mut self, command: impl Into<String>, arguments: Vec<Value>) -> usize {
        self.actions.push(Action::new(command, arguments));
        self.actions.len() - 1
    }

    /// Reads `path`, replacing the current actions unless `append` is set.
    /// On error the script is left untouched.
    pub fn load(&mut self, path: &Path, append: bool) -> Result<(), ScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = Self::parse_str(&raw);
        if !append {
            self.actions.clear();
        }
        self.actions.extend(parsed.actions);
        debug!(path = %path.display(), actions = self.actions.len(), append, "script_loaded");
        Ok(())
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("{command} expects {expected} argument(s), got {found}. usage: {usage}")]
    ArgumentCount {
        command: String,
        expected: String,
        found: usize,
        usage: String,
    },
    #[error("script '{name}' is already running ({chain})")]
    RecursiveScript { name: String, chain: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Text,
    Number,
    Bool,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Bool => "bool",
        })
    }
}

/// Declared positional arguments, optionally followed by a variable tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandShape {
    params: Vec<(&'static str, ArgKind)>,
    rest: Option<(&'static str, ArgKind)>,
}

impl CommandShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, name: &'static str) -> Self {
        self.param(name, ArgKind::Text)
    }

    pub fn number(self, name: &'static str) -> Self {
        self.param(name, ArgKind::Number)
    }

    pub fn flag(self, name: &'static str) -> Self {
        self.param(name, ArgKind::Bool)
    }

    pub fn param(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.params.push((name, kind));
        self
    }

    /// Zero or more trailing arguments of one kind.
    pub fn rest(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.rest = Some((name, kind));
        self
    }

    pub fn usage(&self, command: &str) -> String {
        let mut usage = command.to_string();
        for (name, kind) in &self.params {
            match kind {
                ArgKind::Text => usage.push_str(&format!(" <{name}>")),
                _ => usage.push_str(&format!(" <{name}:{kind}>")),
            }
        }
        if let Some((name, _)) = self.rest {
            usage.push_str(&format!(" <{name}...>"));
        }
        usage
    }

    /// Checks the argument count only. Values that do not convert to their
    /// declared kind are coerced by [`Args`].
    fn validate(&self, command: &str, arguments: &[Value]) -> Result<(), ScriptError> {
        let flattened = flatten(arguments);
        let required = self.params.len();
        let count_ok = match self.rest {
            Some(_) => flattened.len() >= required,
            None => flattened.len() == required,
        };
        if !count_ok {
            let expected = match self.rest {
                Some(_) => format!("at least {required}"),
                None => required.to_string(),
            };
            return Err(ScriptError::ArgumentCount {
                command: command.to_string(),
                expected,
                found: flattened.len(),
                usage: self.usage(command),
            });
        }
        Ok(())
    }
}

/// List values are spliced in place so a variable tail can be passed as one
/// argument from code.
fn flatten(arguments: &[Value]) -> Vec<&Value> {
    let mut flattened = Vec::with_capacity(arguments.len());
    for argument in arguments {
        match argument {
            Value::List(items) => flattened.extend(flatten(items)),
            other => flattened.push(other),
        }
    }
    flattened
}

/// Arguments handed to a command handler. Accessors never fail: a value of
/// the wrong kind reads as that kind's default (`""`, `0.0`, `false`).
#[derive(Debug)]
pub struct Args<'a> {
    command: &'a str,
    values: Vec<&'a Value>,
}

impl<'a> Args<'a> {
    pub fn new(command: &'a str, values: &'a [Value]) -> Self {
        Self {
            command,
            values: flatten(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, index: usize) -> String {
        self.values
            .get(index)
            .map(|value| value.to_text().value)
            .unwrap_or_default()
    }

    pub fn number(&self, index: usize) -> f32 {
        self.coerced(index, Value::to_number).map_or(0.0, |number| number as f32)
    }

    pub fn flag(&self, index: usize) -> bool {
        self.coerced(index, Value::to_bool).unwrap_or(false)
    }

    fn coerced<T>(&self, index: usize, convert: fn(&Value) -> Coerced<T>) -> Option<T> {
        let value = self.values.get(index)?;
        let converted = convert(value);
        if !converted.exact {
            debug!(
                command = self.command,
                position = index + 1,
                value = %value,
                "script_argument_coerced"
            );
        }
        Some(converted.value)
    }

    /// Every argument from `start` on, as text.
    pub fn rest_text(&self, start: usize) -> Vec<String> {
        self.values
            .iter()
            .skip(start)
            .map(|value| value.to_text().value)
            .collect()
    }
}

pub type CommandResult = Result<Option<Value>, ScriptError>;

type CommandFn<C> = dyn Fn(&mut C, &Args<'_>) -> CommandResult;

pub struct ScriptCommand<C> {
    name: String,
    help: String,
    shape: CommandShape,
    handler: Box<CommandFn<C>>,
}

impl<C> ScriptCommand<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn shape(&self) -> &CommandShape {
        &self.shape
    }

    fn invoke(&self, context: &mut C, arguments: &[Value]) -> CommandResult {
        self.shape.validate(&self.name, arguments)?;
        (self.handler)(context, &Args::new(&self.name, arguments))
    }
}

impl<C> fmt::Debug for ScriptCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCommand")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Name to handler registry. Command names are case-sensitive and the last
/// registration under a name wins.
pub struct ScriptEngine<C> {
    commands: Vec<Rc<ScriptCommand<C>>>,
    lookup: HashMap<String, usize>,
}

impl<C> Default for ScriptEngine<C> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<C> ScriptEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when an existing command of the same name was replaced.
    /// A replaced command keeps its place in [`ScriptEngine::commands`].
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        shape: CommandShape,
        handler: F,
    ) -> bool
    where
        F: Fn(&mut C, &Args<'_>) -> CommandResult + 'static,
    {
        let name = name.into();
        let command = Rc::new(ScriptCommand {
            name: name.clone(),
            help: help.into(),
            shape,
            handler: Box::new(handler),
        });
        match self.lookup.get(&name) {
            Some(&index) => {
                debug!(command = %name, "script_command_replaced");
                self.commands[index] = command;
                true
            }
            None => {
                self.lookup.insert(name, self.commands.len());
                self.commands.push(command);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScriptCommand<C>> {
        self.lookup
            .get(name)
            .map(|&index| self.commands[index].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in first-registration order.
    pub fn commands(&self) -> impl Iterator<Item = &ScriptCommand<C>> {
        self.commands.iter().map(Rc::as_ref)
    }

    fn resolve(&self, command: &str) -> Result<Rc<ScriptCommand<C>>, ScriptError> {
        self.lookup
            .get(command)
            .map(|&index| Rc::clone(&self.commands[index]))
            .ok_or_else(|| ScriptError::UnknownCommand {
                command: command.to_string(),
            })
    }
}

impl<C> fmt::Debug for ScriptEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// A context that carries its own command registry.
pub trait ScriptHost: Sized {
    fn script_engine(&self) -> &ScriptEngine<Self>;
}

/// Runs one action. Unknown names and malformed arguments are reported
/// without touching `context`.
pub fn dispatch<C: ScriptHost>(context: &mut C, action: &Action) -> CommandResult {
    let command = context.script_engine().resolve(&action.command)?;
    command.invoke(context, &action.arguments)
}

#[derive(Debug)]
pub struct ScriptFailure {
    pub index: usize,
    pub command: String,
    pub error: ScriptError,
}

/// Outcome of running a sequence of actions.
#[derive(Debug, Default)]
pub struct ScriptRun {
    pub executed: usize,
    pub failures: Vec<ScriptFailure>,
}

impl ScriptRun {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dispatches every action in order. A failing command is logged and
/// skipped; the rest of the run continues.
pub fn run<C: ScriptHost>(context: &mut C, actions: &[Action]) -> ScriptRun {
    let mut report = ScriptRun::default();
    for (index, action) in actions.iter().enumerate() {
        match dispatch(context, action) {
            Ok(_) => report.executed += 1,
            Err(error) => {
                warn!(
                    index,
                    command = %action.command,
                    error = %error,
                    "script_command_failed"
                );
                report.failures.push(ScriptFailure {
                    index,
                    command: action.command.clone(),
                    error,
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        scripts: ScriptEngine<Recorder>,
        log: Vec<String>,
        total: f32,
    }

    impl ScriptHost for Recorder {
        fn script_engine(&self) -> &ScriptEngine<Self> {
            &self.scripts
        }
    }

    fn recorder() -> Recorder {
        let mut recorder = Recorder::default();
        recorder.scripts.register(
            "Say",
            "Record a word",
            CommandShape::new().text("word"),
            |ctx: &mut Recorder, args| {
                ctx.log.push(args.text(0));
                Ok(None)
            },
        );
        recorder.scripts.register(
            "Add",
            "Accumulate numbers",
            CommandShape::new().number("amount").flag("twice"),
            |ctx: &mut Recorder, args| {
                let factor = if args.flag(1) { 2.0 } else { 1.0 };
                ctx.total += args.number(0) * factor;
                Ok(Some(Value::from(ctx.total)))
            },
        );
        recorder.scripts.register(
            "Each",
            "Record every word",
            CommandShape::new().text("prefix").rest("word", ArgKind::Text),
            |ctx: &mut Recorder, args| {
                let prefix = args.text(0);
                for word in args.rest_text(1) {
                    ctx.log.push(format!("{prefix}{word}"));
                }
                Ok(None)
            },
        );
        recorder
    }

    #[test]
    fn parse_skips_blank_lines_and_comments() {
        let script = Script::parse_str("Say hi\n\n   \n# Say nope\nAdd 2 true\n");
        assert_eq!(script.len(), 2);
        assert_eq!(script.actions()[0], Action::new("Say", vec![Value::from("hi")]));
        assert_eq!(script.actions()[1].to_string(), "Add 2 true");
    }

    #[test]
    fn add_returns_index_of_new_action() {
        let mut script = Script::new();
        assert_eq!(script.add("Say", vec![Value::from("a")]), 0);
        assert_eq!(script.add("Say", vec![Value::from("b")]), 1);
    }

    #[test]
    fn load_replaces_or_appends() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("intro.script");
        fs::write(&path, "Say one\nSay two\n").expect("write");

        let mut script = Script::parse_str("Say zero");
        script.load(&path, true).expect("append");
        assert_eq!(script.len(), 3);
        script.load(&path, false).expect("replace");
        assert_eq!(script.len(), 2);

        let error = script
            .load(&temp.path().join("absent.script"), false)
            .expect_err("must fail");
        assert!(matches!(error, ScriptError::Read { .. }));
        assert_eq!(script.len(), 2);
    }

    #[test]
    fn dispatch_runs_the_named_handler() {
        let mut ctx = recorder();
        let result = dispatch(&mut ctx, &Action::new("Add", vec!["1.5".into(), "t".into()]))
            .expect("dispatch");
        assert_eq!(result, Some(Value::Number(3.0)));
    }

    #[test]
    fn unknown_command_leaves_context_untouched() {
        let mut ctx = recorder();
        let error =
            dispatch(&mut ctx, &Action::new("say", vec!["hi".into()])).expect_err("unknown");
        assert!(matches!(error, ScriptError::UnknownCommand { ref command } if command == "say"));
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn unparsable_arguments_fall_back_to_defaults() {
        let mut ctx = recorder();
        let result = dispatch(&mut ctx, &Action::new("Add", vec!["lots".into(), "true".into()]))
            .expect("coerced");
        assert_eq!(result, Some(Value::Number(0.0)));

        dispatch(&mut ctx, &Action::new("Add", vec!["4".into(), "twice".into()]))
            .expect("coerced");
        assert_eq!(ctx.total, 4.0);
    }

    #[test]
    fn wrong_argument_count_is_rejected_before_the_handler_runs() {
        let mut ctx = recorder();
        let error = dispatch(&mut ctx, &Action::new("Say", vec![])).expect_err("count");
        assert!(matches!(error, ScriptError::ArgumentCount { found: 0, .. }));
        let error = dispatch(&mut ctx, &Action::new("Say", vec!["a".into(), "b".into()]))
            .expect_err("count");
        assert!(matches!(error, ScriptError::ArgumentCount { found: 2, .. }));
        let error = dispatch(&mut ctx, &Action::new("Add", vec!["1".into()])).expect_err("count");
        assert!(matches!(error, ScriptError::ArgumentCount { found: 1, .. }));
        assert_eq!(ctx.total, 0.0);
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn variable_tail_accepts_loose_and_listed_values() {
        let mut ctx = recorder();
        dispatch(&mut ctx, &Action::new("Each", vec!["-".into()])).expect("empty tail");
        dispatch(
            &mut ctx,
            &Action::new(
                "Each",
                vec!["+".into(), "a".into(), Value::List(vec!["b".into(), "c".into()])],
            ),
        )
        .expect("tail");
        assert_eq!(ctx.log, vec!["+a", "+b", "+c"]);
    }

    #[test]
    fn last_registration_wins_and_keeps_its_slot() {
        let mut ctx = recorder();
        let replaced = ctx.scripts.register(
            "Say",
            "Shout a word",
            CommandShape::new().text("word"),
            |ctx: &mut Recorder, args| {
                ctx.log.push(args.text(0).to_uppercase());
                Ok(None)
            },
        );
        assert!(replaced);
        assert_eq!(ctx.scripts.len(), 3);
        assert_eq!(ctx.scripts.commands().next().map(ScriptCommand::help), Some("Shout a word"));

        dispatch(&mut ctx, &Action::new("Say", vec!["hey".into()])).expect("dispatch");
        assert_eq!(ctx.log, vec!["HEY"]);
    }

    #[test]
    fn run_reports_failures_and_keeps_going() {
        let mut ctx = recorder();
        let script = Script::parse_str("Say a\nNope\nAdd 1\nAdd x y\nSay b\n");
        let report = run(&mut ctx, script.actions());

        assert_eq!(report.executed, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[1].index, 2);
        assert_eq!(report.failures[1].command, "Add");
        assert!(!report.succeeded());
        assert_eq!(ctx.log, vec!["a", "b"]);
        assert_eq!(ctx.total, 0.0);
    }

    #[test]
    fn usage_lists_typed_parameters() {
        let shape = CommandShape::new()
            .text("scene_id")
            .number("x")
            .flag("instant")
            .rest("view_id", ArgKind::Text);
        assert_eq!(
            shape.usage("Demo"),
            "Demo <scene_id> <x:number> <instant:bool> <view_id...>"
        );
    }
}
