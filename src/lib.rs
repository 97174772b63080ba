// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A WebAssembly 1.0 decoding, validation, and interpretation library.
//!
//! The pipeline runs in stages, each consuming the previous stage's output
//! and never mutating its input: bytes decode into an immutable [`Module`]
//! AST; the validator type-checks it; instantiation allocates instances
//! inside a host-managed [`Store`] and runs initializers; invocation drives
//! a structured operand/control stack machine to completion.
//!
//! The [`load`], [`validate`], [`instantiate`], and [`invoke`] functions
//! form the facade over those stages; [`Store`] carries the accessors for
//! reading and writing tables, memories, and globals from the host side.
//!
//! Scope is the WASM 1.0 (MVP) core. There is no SIMD, no threads, no
//! reference types, nor any other post-1.0 proposal; text-format parsing is
//! left to front ends that produce the same [`Module`] AST.

pub mod decode;
pub mod runtime;
pub mod storage;
pub mod types;
pub mod validate;
pub mod values;

use std::fmt;

use thiserror::Error as ThisError;

use crate::storage::BytesStream;
use crate::types::ValType;

pub use crate::runtime::{
    ExternVal, FuncAddr, GlobalAddr, Imports, MemAddr, ModuleAddr, ModuleInstance, Store,
    TableAddr, Trap,
};
pub use crate::types::Module;
pub use crate::values::Value;

use crate::runtime::{InstantiationError, RuntimeError};

/// The disjoint error kinds the pipeline surfaces, generic over the storage
/// error type of the stream a module was decoded from.
#[derive(Debug, ThisError)]
pub enum Error<E: fmt::Debug = storage::EndOfStream> {
    /// The binary could not be decoded.
    #[error("malformed module: {0:?}")]
    Malformed(decode::ErrorWithContext<E>),
    /// The decoded module failed type or structural validation.
    #[error("invalid module: {0}")]
    Invalid(#[from] validate::Error),
    /// Instantiation failed to link: missing or ill-typed imports, or a
    /// segment that does not fit its target.
    #[error("unlinkable module: {0}")]
    Unlinkable(#[from] runtime::LinkError),
    /// Execution trapped.
    #[error(transparent)]
    Trap(#[from] Trap),
    /// Call-stack depth exceeded the implementation limit.
    #[error("call stack exhausted")]
    Exhaustion,
    /// Invocation arguments did not match the function's parameter types.
    #[error("argument types do not match: expected {expected:?}, got {got:?}")]
    Argument {
        expected: Vec<ValType>,
        got: Vec<ValType>,
    },
    /// A host-side runtime error outside the categories above (unknown
    /// export, forged address, host function misbehavior).
    #[error(transparent)]
    Runtime(RuntimeError),
}

impl<E: fmt::Debug> From<RuntimeError> for Error<E> {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Trap(trap) => Error::Trap(trap),
            RuntimeError::StackExhausted => Error::Exhaustion,
            RuntimeError::ArgumentTypes { expected, got } => Error::Argument { expected, got },
            other => Error::Runtime(other),
        }
    }
}

impl<E: fmt::Debug> From<InstantiationError> for Error<E> {
    fn from(err: InstantiationError) -> Self {
        match err {
            InstantiationError::Link(link) => Error::Unlinkable(link),
            InstantiationError::Runtime(runtime) => runtime.into(),
        }
    }
}

/// Decode a module from an in-memory binary. Custom sections are skipped;
/// use [`Module::decode`] directly to observe them or to read from a
/// stream.
pub fn load(bytes: &[u8]) -> Result<Module, Error> {
    Module::decode(
        BytesStream::new(bytes),
        &mut decode::NoCustomSectionVisitor {},
    )
    .map_err(Error::Malformed)
}

/// Validate a decoded module against the WASM 1.0 type system.
pub fn validate(module: &Module) -> Result<(), Error> {
    validate::validate_module(module).map_err(Error::Invalid)
}

/// Validate and instantiate a module: resolve its imports from the
/// registry, allocate its instances in the store, initialize segments, and
/// run its start function if declared.
pub fn instantiate(
    store: &mut Store,
    module: &Module,
    imports: &Imports,
) -> Result<ModuleAddr, Error> {
    validate(module)?;
    runtime::instantiate(store, module, imports).map_err(Error::from)
}

/// Invoke the function at the given address. Arguments are type-checked
/// before execution begins; results carry the function's declared result
/// types.
pub fn invoke(store: &mut Store, func: FuncAddr, args: &[Value]) -> Result<Vec<Value>, Error> {
    runtime::invoke(store, func, args).map_err(Error::from)
}
