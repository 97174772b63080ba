// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Types and runner for the WebAssembly specification test format (the
//! JSON command records emitted by wast2json).
//!
//! The core library consumes binary modules only; a test script references
//! its modules as `.wasm` files relative to the script. The [`Runner`]
//! drives the records against the runtime facade.

mod runner;

pub use runner::{Failure, Runner};

use serde::{Deserialize, Serialize};

/// Top-level structure of a test script file.
#[derive(Debug, Deserialize, Serialize)]
pub struct TestFile {
    pub source_filename: String,
    pub commands: Vec<Command>,
}

/// A command in a test script.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "module")]
    Module(ModuleCommand),
    #[serde(rename = "register")]
    Register(RegisterCommand),
    #[serde(rename = "action")]
    Action(ActionCommand),
    #[serde(rename = "assert_return")]
    AssertReturn(AssertReturnCommand),
    #[serde(rename = "assert_return_canonical_nan")]
    AssertReturnCanonicalNan(AssertNanCommand),
    #[serde(rename = "assert_return_arithmetic_nan")]
    AssertReturnArithmeticNan(AssertNanCommand),
    #[serde(rename = "assert_trap")]
    AssertTrap(AssertTrapCommand),
    #[serde(rename = "assert_exhaustion")]
    AssertExhaustion(AssertTrapCommand),
    #[serde(rename = "assert_invalid")]
    AssertInvalid(AssertModuleErrorCommand),
    #[serde(rename = "assert_malformed")]
    AssertMalformed(AssertModuleErrorCommand),
    #[serde(rename = "assert_unlinkable")]
    AssertUnlinkable(AssertModuleErrorCommand),
    #[serde(rename = "assert_uninstantiable")]
    AssertUninstantiable(AssertModuleErrorCommand),
}

impl Command {
    /// The source line the command originated from.
    pub fn line(&self) -> u32 {
        match self {
            Command::Module(c) => c.line,
            Command::Register(c) => c.line,
            Command::Action(c) => c.line,
            Command::AssertReturn(c) => c.line,
            Command::AssertReturnCanonicalNan(c) | Command::AssertReturnArithmeticNan(c) => c.line,
            Command::AssertTrap(c) | Command::AssertExhaustion(c) => c.line,
            Command::AssertInvalid(c)
            | Command::AssertMalformed(c)
            | Command::AssertUnlinkable(c)
            | Command::AssertUninstantiable(c) => c.line,
        }
    }
}

/// Load a WebAssembly module and make it current.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleCommand {
    pub line: u32,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Register a module's exports under an import namespace.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterCommand {
    pub line: u32,
    #[serde(rename = "as")]
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Execute an action for its effects, ignoring results.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionCommand {
    pub line: u32,
    pub action: Action,
    #[serde(default)]
    pub expected: Vec<TestValue>,
}

/// Assert that an action returns the expected values, bit-exactly.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertReturnCommand {
    pub line: u32,
    pub action: Action,
    pub expected: Vec<TestValue>,
}

/// Assert that an action returns a single NaN of the named class.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertNanCommand {
    pub line: u32,
    pub action: Action,
    #[serde(default)]
    pub expected: Vec<TestValue>,
}

/// Assert that an action traps (or exhausts the call stack) with the given
/// message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertTrapCommand {
    pub line: u32,
    pub action: Action,
    pub text: String,
    #[serde(default)]
    pub expected: Vec<TestValue>,
}

/// Assert that a module file fails to decode, validate, link, or
/// instantiate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertModuleErrorCommand {
    pub line: u32,
    pub filename: String,
    pub text: String,
    pub module_type: ModuleType,
}

/// An action performed against a module instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "invoke")]
    Invoke(InvokeAction),
    #[serde(rename = "get")]
    Get(GetAction),
}

/// Call an exported function.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvokeAction {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub args: Vec<TestValue>,
}

/// Read an exported global.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetAction {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// A typed value whose payload is the decimal rendering of its bit pattern.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestValue {
    #[serde(rename = "type")]
    pub value_type: TestValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// WASM 1.0 value types as the test format spells them.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestValueType {
    I32,
    I64,
    F32,
    F64,
}

/// Whether a module under an error assertion is binary or text. Text
/// modules are outside the core's scope and are skipped.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Text,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_by_tag() {
        let json = r#"{
          "source_filename": "t.wast",
          "commands": [
            {"type": "module", "line": 1, "filename": "t.0.wasm", "name": "$t"},
            {"type": "register", "line": 2, "as": "t", "name": "$t"},
            {"type": "assert_return", "line": 3,
             "action": {"type": "invoke", "field": "f",
                        "args": [{"type": "i64", "value": "18446744073709551615"}]},
             "expected": [{"type": "f64", "value": "4618441417868443648"}]},
            {"type": "assert_malformed", "line": 4, "filename": "t.1.wasm",
             "text": "unexpected end", "module_type": "binary"}
          ]
        }"#;
        let file: TestFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.source_filename, "t.wast");
        assert_eq!(file.commands.len(), 4);
        assert_eq!(file.commands[0].line(), 1);

        match &file.commands[2] {
            Command::AssertReturn(cmd) => {
                let Action::Invoke(invoke) = &cmd.action else {
                    panic!("expected an invoke action");
                };
                assert_eq!(invoke.field, "f");
                assert_eq!(invoke.args[0].value_type, TestValueType::I64);
                assert_eq!(
                    invoke.args[0].value.as_deref(),
                    Some("18446744073709551615")
                );
            }
            other => panic!("unexpected command {other:?}"),
        }

        match &file.commands[3] {
            Command::AssertMalformed(cmd) => {
                assert_eq!(cmd.module_type, ModuleType::Binary);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn get_actions_have_no_args() {
        let json = r#"{"type": "get", "field": "g", "module": "$m"}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert!(matches!(action, Action::Get(get) if get.field == "g"));
    }
}
