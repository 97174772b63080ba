// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Drives specification test scripts against the runtime facade.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use thiserror::Error as ThisError;

use galette::types::{ElemType, FunctionType, GlobalType, Limits, MemType, Mutability, TableType, ValType};
use galette::values::{
    f32_is_arithmetic_nan, f32_is_canonical_nan, f64_is_arithmetic_nan, f64_is_canonical_nan,
};
use galette::{
    Error, ExternVal, Imports, ModuleAddr, Store, Value, instantiate, invoke, load, validate,
};

use crate::{
    Action, AssertModuleErrorCommand, Command, ModuleType, TestFile, TestValue, TestValueType,
};

/// A command that did not behave as its script asserted.
#[derive(Debug, ThisError)]
#[error("{file}:{line}: {message}")]
pub struct Failure {
    pub file: String,
    pub line: u32,
    pub message: String,
}

/// Executes test scripts: tracks the current and named module instances, a
/// registry of importable namespaces (seeded with the conventional
/// `spectest` host entries), and the store everything lives in.
pub struct Runner {
    store: Store,
    registry: Imports,
    current: Option<ModuleAddr>,
    named: HashMap<String, ModuleAddr>,
    dir: PathBuf,
}

impl Runner {
    /// Create a runner resolving module filenames against `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut store = Store::new();
        let mut registry = Imports::new();
        seed_spectest(&mut store, &mut registry);
        Self {
            store,
            registry,
            current: None,
            named: HashMap::new(),
            dir: dir.into(),
        }
    }

    /// Run every command of a script, stopping at the first failure.
    pub fn run_file(&mut self, file: &TestFile) -> Result<(), Failure> {
        for command in &file.commands {
            self.run_command(command).map_err(|message| Failure {
                file: file.source_filename.clone(),
                line: command.line(),
                message,
            })?;
        }
        Ok(())
    }

    fn run_command(&mut self, command: &Command) -> Result<(), String> {
        match command {
            Command::Module(cmd) => {
                let module = self
                    .load_file(&cmd.filename)
                    .map_err(|err| format!("failed to load module: {err}"))?;
                let addr = instantiate(&mut self.store, &module, &self.registry)
                    .map_err(|err| format!("failed to instantiate module: {err}"))?;
                self.current = Some(addr);
                if let Some(name) = &cmd.name {
                    self.named.insert(name.clone(), addr);
                }
                Ok(())
            }
            Command::Register(cmd) => {
                let addr = self.instance_for(cmd.name.as_deref());
                let instance = self
                    .store
                    .instance(addr)
                    .map_err(|err| err.to_string())?
                    .clone();
                self.registry.register_instance(&cmd.alias, &instance);
                Ok(())
            }
            Command::Action(cmd) => {
                self.perform(&cmd.action).map_err(|err| err.to_string())?;
                Ok(())
            }
            Command::AssertReturn(cmd) => {
                let results = self
                    .perform(&cmd.action)
                    .map_err(|err| format!("action failed: {err}"))?;
                if results.len() != cmd.expected.len() {
                    return Err(format!(
                        "expected {} results, got {}",
                        cmd.expected.len(),
                        results.len()
                    ));
                }
                for (got, want) in results.iter().zip(&cmd.expected) {
                    let want = parse_value(want);
                    if got.ty() != want.ty() || got.to_bits() != want.to_bits() {
                        return Err(format!("expected {want:?}, got {got:?}"));
                    }
                }
                Ok(())
            }
            Command::AssertReturnCanonicalNan(cmd) => {
                let results = self
                    .perform(&cmd.action)
                    .map_err(|err| format!("action failed: {err}"))?;
                match results.as_slice() {
                    [Value::F32(v)] if f32_is_canonical_nan(*v) => Ok(()),
                    [Value::F64(v)] if f64_is_canonical_nan(*v) => Ok(()),
                    other => Err(format!("expected a canonical NaN, got {other:?}")),
                }
            }
            Command::AssertReturnArithmeticNan(cmd) => {
                let results = self
                    .perform(&cmd.action)
                    .map_err(|err| format!("action failed: {err}"))?;
                match results.as_slice() {
                    [Value::F32(v)] if f32_is_arithmetic_nan(*v) => Ok(()),
                    [Value::F64(v)] if f64_is_arithmetic_nan(*v) => Ok(()),
                    other => Err(format!("expected an arithmetic NaN, got {other:?}")),
                }
            }
            Command::AssertTrap(cmd) => match self.perform(&cmd.action) {
                Err(Error::Trap(trap)) => {
                    if text_matches(&cmd.text, &trap.to_string()) {
                        Ok(())
                    } else {
                        Err(format!("expected trap {:?}, got {trap}", cmd.text))
                    }
                }
                Err(other) => Err(format!("expected a trap, got error {other}")),
                Ok(results) => Err(format!("expected a trap, got {results:?}")),
            },
            Command::AssertExhaustion(cmd) => match self.perform(&cmd.action) {
                Err(Error::Exhaustion) => Ok(()),
                Err(other) => Err(format!("expected exhaustion, got error {other}")),
                Ok(results) => Err(format!("expected exhaustion, got {results:?}")),
            },
            Command::AssertMalformed(cmd) => {
                self.expect_module_error(cmd, |outcome| matches!(outcome, Err(Error::Malformed(_))))
            }
            Command::AssertInvalid(cmd) => {
                self.expect_module_error(cmd, |outcome| matches!(outcome, Err(Error::Invalid(_))))
            }
            Command::AssertUnlinkable(cmd) => self.expect_module_error(cmd, |outcome| {
                matches!(outcome, Err(Error::Unlinkable(_)))
            }),
            Command::AssertUninstantiable(cmd) => self.expect_module_error(cmd, |outcome| {
                matches!(outcome, Err(Error::Trap(_)) | Err(Error::Exhaustion))
            }),
        }
    }

    // Load, validate, and instantiate a module file expected to fail, and
    // check the failure class.
    fn expect_module_error(
        &mut self,
        cmd: &AssertModuleErrorCommand,
        accept: impl Fn(&Result<ModuleAddr, Error>) -> bool,
    ) -> Result<(), String> {
        // Text modules require a text-format front end, which is out of
        // scope.
        if cmd.module_type == ModuleType::Text {
            return Ok(());
        }
        let outcome = self
            .load_file(&cmd.filename)
            .and_then(|module| instantiate(&mut self.store, &module, &self.registry));
        if accept(&outcome) {
            Ok(())
        } else {
            Err(format!(
                "expected failure {:?}, got {outcome:?}",
                cmd.text
            ))
        }
    }

    fn load_file(&self, filename: &str) -> Result<galette::Module, Error> {
        let path = self.dir.join(filename);
        let bytes = std::fs::read(&path)
            .unwrap_or_else(|err| panic!("cannot read module file {}: {err}", path.display()));
        let module = load(&bytes)?;
        validate(&module)?;
        Ok(module)
    }

    // A reference to a module the script never established is a bug in the
    // script, not a behavior under test.
    fn instance_for(&self, name: Option<&str>) -> ModuleAddr {
        match name {
            Some(name) => *self
                .named
                .get(name)
                .unwrap_or_else(|| panic!("script references unknown module name {name:?}")),
            None => self.current.expect("script has no current module"),
        }
    }

    fn perform(&mut self, action: &Action) -> Result<Vec<Value>, Error> {
        match action {
            Action::Invoke(invoke_action) => {
                let addr = self.instance_for(invoke_action.module.as_deref());
                let func = self
                    .store
                    .instance(addr)
                    .map_err(Error::from)?
                    .export_func(&invoke_action.field)
                    .map_err(Error::from)?;
                let args: Vec<_> = invoke_action.args.iter().map(parse_value).collect();
                invoke(&mut self.store, func, &args)
            }
            Action::Get(get_action) => {
                let addr = self.instance_for(get_action.module.as_deref());
                let global = self
                    .store
                    .instance(addr)
                    .map_err(Error::from)?
                    .export_global(&get_action.field)
                    .map_err(Error::from)?;
                Ok(vec![self.store.read_global(global).map_err(Error::from)?])
            }
        }
    }
}

fn text_matches(expected: &str, actual: &str) -> bool {
    actual.contains(expected) || expected.contains(actual)
}

// Value payloads are decimal renderings of the raw bit pattern; a payload
// that does not parse is a bug in the script.
fn parse_value(value: &TestValue) -> Value {
    let ty = match value.value_type {
        TestValueType::I32 => ValType::I32,
        TestValueType::I64 => ValType::I64,
        TestValueType::F32 => ValType::F32,
        TestValueType::F64 => ValType::F64,
    };
    let payload = value.value.as_deref().expect("value payload missing");
    let bits: u64 = payload
        .parse()
        .unwrap_or_else(|err| panic!("bad value payload {payload:?}: {err}"));
    Value::from_bits(ty, bits)
}

// The conventional host entries that specification scripts import from the
// "spectest" namespace.
fn seed_spectest(store: &mut Store, registry: &mut Imports) {
    let print = |params: Vec<ValType>| {
        (
            FunctionType::new(params, vec![]),
            Rc::new(|_: &mut Store, _: &[Value]| Ok(Vec::new())) as galette::runtime::HostFunc,
        )
    };
    let prints = [
        ("print", print(vec![])),
        ("print_i32", print(vec![ValType::I32])),
        ("print_i64", print(vec![ValType::I64])),
        ("print_f32", print(vec![ValType::F32])),
        ("print_f64", print(vec![ValType::F64])),
        ("print_i32_f32", print(vec![ValType::I32, ValType::F32])),
        ("print_f64_f64", print(vec![ValType::F64, ValType::F64])),
    ];
    for (name, (ty, code)) in prints {
        let addr = store.alloc_host_func(ty, code);
        registry.register("spectest", name, ExternVal::Func(addr));
    }

    let constant = |value| GlobalType {
        value,
        mutability: Mutability::Const,
    };
    let globals = [
        ("global_i32", constant(ValType::I32), Value::I32(666)),
        ("global_i64", constant(ValType::I64), Value::I64(666)),
        ("global_f32", constant(ValType::F32), Value::F32(666.6)),
        ("global_f64", constant(ValType::F64), Value::F64(666.6)),
    ];
    for (name, ty, value) in globals {
        let addr = store.alloc_global(ty, value);
        registry.register("spectest", name, ExternVal::Global(addr));
    }

    let table = store.alloc_table(TableType {
        elemtype: ElemType::FuncRef,
        limits: Limits {
            min: 10,
            max: Some(20),
        },
    });
    registry.register("spectest", "table", ExternVal::Table(table));

    let memory = store.alloc_mem(MemType::new(Limits {
        min: 1,
        max: Some(2),
    }));
    registry.register("spectest", "memory", ExternVal::Mem(memory));
}
