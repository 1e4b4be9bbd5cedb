//! Suspendable script execution.
//!
//! Listeners that run inside the interpreter can stop at breakpoints or
//! cooperative yield points. They hand back a [`ScriptGenerator`] which the
//! context never steps itself: it is passed, as an opaque handle, to the
//! injected [`RuntimeInterpreterGeneratorProcessor`].

use std::fmt;

use serde_json::Value;

use crate::interface::RuntimeInterpreterGeneratorProcessor;

/// One step of a suspended script.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorStep {
    /// The script stopped and can be resumed
    Yield(Value),
    /// The script finished
    Return(Value),
}

impl GeneratorStep {
    /// Whether the script finished.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Return(_))
    }
}

/// A script suspended mid-execution.
pub trait ScriptGenerator: Send {
    /// Resume the script, feeding `input` back in as the continuation value.
    fn resume(&mut self, input: Value) -> GeneratorStep;
}

/// What a listener, module or timer callback produced.
pub enum ListenerOutput {
    /// The script ran to completion
    Value(Value),
    /// The script suspended and must be stepped by the interpreter
    Generator(Box<dyn ScriptGenerator>),
}

impl ListenerOutput {
    /// Output of a script that returned nothing.
    pub fn done() -> Self {
        Self::Value(Value::Null)
    }
}

impl fmt::Debug for ListenerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl From<Value> for ListenerOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Hand a timer or listener result to the interpreter if it suspended.
///
/// Completed values need no further work and are dropped.
pub fn process_bot_timer_result(
    processor: &dyn RuntimeInterpreterGeneratorProcessor,
    result: ListenerOutput,
) {
    if let ListenerOutput::Generator(generator) = result {
        processor.process_generator(generator);
    }
}
