// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The WebAssembly runtime: store, instances, instantiation, and the
//! structured stack machine that executes validated code.

mod exec;
mod instance;
mod instantiate;
mod numeric;
mod stack;
mod store;

pub use exec::invoke;
pub use instance::{ExportInst, ExternVal, ModuleInstance};
pub use instantiate::{Imports, instantiate};
pub use store::{
    FuncAddr, FuncInst, GlobalAddr, GlobalInst, HostFunc, MemAddr, MemInst, ModuleAddr, Store,
    TableAddr, TableInst,
};

use thiserror::Error as ThisError;

use crate::types::ValType;

/// The maximum number of live frames in a call stack. Exceeding it reports
/// exhaustion, not a trap.
pub const CALL_STACK_LIMIT: usize = 1024;

/// Abrupt termination of execution signaling a runtime error. Traps
/// propagate out of the current invocation; state changes made before the
/// trap are retained.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
}

/// Errors surfaced while executing or driving the runtime.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum RuntimeError {
    #[error(transparent)]
    Trap(#[from] Trap),
    /// Call-stack depth exceeded [`CALL_STACK_LIMIT`]; reported distinctly
    /// from traps.
    #[error("call stack exhausted")]
    StackExhausted,
    /// Invocation arguments do not match the function's parameter types.
    #[error("argument types do not match: expected {expected:?}, got {got:?}")]
    ArgumentTypes {
        expected: Vec<ValType>,
        got: Vec<ValType>,
    },
    #[error("global is immutable")]
    ImmutableGlobal,
    #[error("value type mismatch: expected {expected:?}, got {got:?}")]
    ValueType { expected: ValType, got: ValType },
    #[error("unknown export {0:?}")]
    UnknownExport(String),
    /// An invariant the validator should have established did not hold.
    /// Reported as a structured error rather than corrupting state.
    #[error("interpreter invariant violated: {0}")]
    Internal(&'static str),
}

/// Instantiation-time linking failures: missing or ill-typed imports, and
/// segments that do not fit their targets.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum LinkError {
    #[error("unknown import {module:?}.{name:?}")]
    UnknownImport { module: String, name: String },
    #[error("incompatible import type for {module:?}.{name:?}")]
    IncompatibleImportType { module: String, name: String },
    #[error("element segment does not fit in table")]
    ElementSegmentDoesNotFit,
    #[error("data segment does not fit in memory")]
    DataSegmentDoesNotFit,
}

/// Why instantiation failed: linking, or a trap from an initializer or the
/// start function.
#[derive(Debug, ThisError)]
pub enum InstantiationError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
