//! Mocked return values for functions called by scripts.
//!
//! Mocks are explicit: asking for a return value that was not configured is
//! always an error.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use super::GlobalContext;
use crate::types::{Result, RuntimeError};

/// Key an argument can carry to override how it is printed in errors.
pub const DEBUG_STRING_KEY: &str = "$debugString";

/// Mock return registry.
#[derive(Debug, Default)]
pub struct MockReturns {
    /// Values returned in order, regardless of arguments
    queued: HashMap<String, VecDeque<Value>>,
    /// Values returned for exact argument lists
    by_args: HashMap<String, Vec<(Vec<Value>, Value)>>,
}

impl MockReturns {
    /// Queue values returned on successive calls.
    pub fn set_returns(&mut self, function: &str, values: Vec<Value>) {
        self.queued.insert(function.to_string(), values.into());
    }

    /// Return `value` when called with exactly `args`.
    pub fn set_return(&mut self, function: &str, args: Vec<Value>, value: Value) {
        let returns = self.by_args.entry(function.to_string()).or_default();
        match returns.iter_mut().find(|(existing, _)| *existing == args) {
            Some((_, existing)) => *existing = value,
            None => returns.push((args, value)),
        }
    }

    /// Next value for a call.
    ///
    /// Queued values take precedence over argument-matched ones.
    pub fn next_return(&mut self, function: &str, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(queue) = self.queued.get_mut(function) {
            return queue
                .pop_front()
                .ok_or_else(|| RuntimeError::MockValuesExhausted(describe_call(name, args)));
        }
        if let Some(returns) = self.by_args.get(function) {
            return returns
                .iter()
                .find(|(expected, _)| expected.as_slice() == args)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| RuntimeError::NoMatchingMockInput(describe_call(name, args)));
        }
        Err(RuntimeError::NoMockData(describe_call(name, args)))
    }
}

/// `name(arg1, arg2)` with every argument pretty printed.
fn describe_call(name: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(debug_string).collect();
    format!("{}({})", name, args.join(", "))
}

fn debug_string(arg: &Value) -> String {
    if let Some(custom) = arg.get(DEBUG_STRING_KEY).and_then(Value::as_str) {
        return custom.to_string();
    }
    serde_json::to_string_pretty(arg).unwrap_or_else(|_| arg.to_string())
}

impl GlobalContext {
    /// Queue values returned on successive calls to `function`.
    pub fn set_mock_returns(&mut self, function: &str, values: Vec<Value>) {
        self.mocks.set_returns(function, values);
    }

    /// Return `value` when `function` is called with exactly `args`.
    pub fn set_mock_return(&mut self, function: &str, args: Vec<Value>, value: Value) {
        self.mocks.set_return(function, args, value);
    }

    /// Next mocked value for a call to `function`, displayed as `name` in
    /// errors.
    pub fn get_next_mock_return(&mut self, function: &str, name: &str, args: &[Value]) -> Result<Value> {
        self.mocks.next_return(function, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queued_values_in_order() {
        let mut mocks = MockReturns::default();
        mocks.set_returns("os.toast", vec![json!(1), json!(2)]);

        assert_eq!(mocks.next_return("os.toast", "os.toast", &[]).unwrap(), json!(1));
        assert_eq!(mocks.next_return("os.toast", "os.toast", &[]).unwrap(), json!(2));
        let err = mocks.next_return("os.toast", "os.toast", &[json!("hi")]).unwrap_err();
        assert!(matches!(err, RuntimeError::MockValuesExhausted(_)));
        assert_eq!(err.to_string(), "No more mock values for os.toast(\"hi\")");
    }

    #[test]
    fn test_values_matched_by_args() {
        let mut mocks = MockReturns::default();
        mocks.set_return("web.get", vec![json!("a")], json!("first"));
        mocks.set_return("web.get", vec![json!("b")], json!("second"));

        assert_eq!(
            mocks.next_return("web.get", "web.get", &[json!("b")]).unwrap(),
            json!("second")
        );
        // Argument-matched values are not consumed.
        assert_eq!(
            mocks.next_return("web.get", "web.get", &[json!("b")]).unwrap(),
            json!("second")
        );
        let err = mocks.next_return("web.get", "web.get", &[json!("c")]).unwrap_err();
        assert!(matches!(err, RuntimeError::NoMatchingMockInput(_)));
    }

    #[test]
    fn test_unconfigured_function() {
        let mut mocks = MockReturns::default();
        let err = mocks
            .next_return("os.sleep", "os.sleep", &[json!({ "$debugString": "bot(abc)" }), json!(5)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NoMockData(_)));
        assert_eq!(err.to_string(), "No mock data configured for os.sleep(bot(abc), 5)");
    }
}
