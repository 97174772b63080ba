// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly module validation.
//!
//! Validation is a static type check over the whole module: every index is
//! bounds-checked against its index space (imports first), every expression
//! is checked against the abstract operand/control stack discipline of the
//! WASM 1.0 type system, and module-level structural rules (single
//! table/memory, unique export names, limit bounds) are enforced. A module
//! that validates cannot make the executor pop a wrong-typed or missing
//! operand.

mod expr;
mod validate_impls;

use thiserror::Error as ThisError;

use crate::types::{
    FuncIdx, FunctionType, GlobalIdx, GlobalType, ImportDescriptor, MemType, Module, SectionId,
    TableType, TypeIdx, ValType,
};

pub(crate) use expr::{ExpressionContext, validate_expression};

/// Represents errors that can arise during module validation.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum Error {
    #[error("alignment 2^{align} larger than natural alignment ({natural} bytes)")]
    AlignmentTooLarge { align: u32, natural: u32 },
    #[error("br_table targets have mismatched label types")]
    BrTableTypeMismatch,
    #[error("constant expression required")]
    ConstantExpressionRequired,
    #[error("constant expressions may only read imported immutable globals; global {0:?}")]
    ConstantExpressionGlobal(GlobalIdx),
    #[error("duplicate export name {0:?}")]
    DuplicateExportName(String),
    #[error("function and code sections have inconsistent lengths: {functions} vs {bodies}")]
    FunctionCodeCountMismatch { functions: u32, bodies: u32 },
    #[error("global {0:?} is immutable")]
    GlobalIsImmutable(GlobalIdx),
    #[error("{id:?} index {index} out of bounds (capacity {capacity})")]
    IndexOutOfBounds {
        id: SectionId,
        index: u32,
        capacity: u32,
    },
    #[error("invalid limits: minimum {min} exceeds maximum {max}")]
    LimitsMinExceedsMax { min: u32, max: u32 },
    #[error("start function {0:?} must have an empty signature")]
    InvalidStartFunction(FuncIdx),
    #[error("memory size of {0} pages exceeds the 65536-page bound")]
    MemorySizeTooLarge(u32),
    #[error("expression lacks an end terminator")]
    MissingEnd,
    #[error("at most one memory is allowed; found {0}")]
    MultipleMemories(usize),
    #[error("at most one table is allowed; found {0}")]
    MultipleTables(usize),
    #[error("operand type mismatch: expected {expected:?}, found {found:?}")]
    OperandMismatch { expected: ValType, found: ValType },
    #[error("select requires operands of matching type")]
    SelectTypeMismatch,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("unbalanced operand stack at block end: expected {expected} values, found {found}")]
    UnbalancedStack { expected: usize, found: usize },
    #[error("else terminator outside the consequent arm of an if")]
    UnexpectedElse,
    #[error("unknown label {index} at depth {depth}")]
    UnknownLabel { index: u32, depth: u32 },
    #[error("unknown local {index} (function has {count})")]
    UnknownLocal { index: u32, count: u32 },
}

/// The validation context: the module's index spaces flattened with imports
/// first, exactly as instruction indices see them.
pub(crate) struct Validator<'m> {
    module: &'m Module,

    // Function index space, as type indices.
    funcs: Vec<TypeIdx>,
    // Table, memory, and global index spaces.
    tables: Vec<TableType>,
    mems: Vec<MemType>,
    globals: Vec<GlobalType>,

    // Imported globals precede module-defined ones in the global index
    // space; constant expressions may only read the imported prefix.
    num_imported_globals: usize,
}

impl<'m> Validator<'m> {
    fn new(module: &'m Module) -> Self {
        let mut funcs = Vec::new();
        let mut tables = Vec::new();
        let mut mems = Vec::new();
        let mut globals = Vec::new();
        for import in module.importsec.iter() {
            match import.descriptor {
                ImportDescriptor::Function(typeidx) => funcs.push(typeidx),
                ImportDescriptor::Table(table) => tables.push(table),
                ImportDescriptor::Memory(mem) => mems.push(mem),
                ImportDescriptor::Global(global) => globals.push(global),
            }
        }
        let num_imported_globals = globals.len();

        funcs.extend(module.funcsec.iter().copied());
        tables.extend(module.tablesec.iter().copied());
        mems.extend(module.memsec.iter().copied());
        globals.extend(module.globalsec.iter().map(|global| global.ty));

        Self {
            module,
            funcs,
            tables,
            mems,
            globals,
            num_imported_globals,
        }
    }

    fn type_count(&self) -> usize {
        self.module.typesec.len()
    }

    fn function_count(&self) -> usize {
        self.funcs.len()
    }

    fn table_count(&self) -> usize {
        self.tables.len()
    }

    fn memory_count(&self) -> usize {
        self.mems.len()
    }

    fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub(crate) fn type_at(&self, typeidx: TypeIdx) -> Result<&'m FunctionType, Error> {
        self.module
            .typesec
            .get(*typeidx as usize)
            .ok_or(Error::IndexOutOfBounds {
                id: SectionId::Type,
                index: *typeidx,
                capacity: self.type_count() as u32,
            })
    }

    pub(crate) fn function_signature(&self, funcidx: FuncIdx) -> Result<&'m FunctionType, Error> {
        let typeidx = self
            .funcs
            .get(*funcidx as usize)
            .ok_or(Error::IndexOutOfBounds {
                id: SectionId::Function,
                index: *funcidx,
                capacity: self.function_count() as u32,
            })?;
        self.type_at(*typeidx)
    }

    pub(crate) fn global_at(&self, globalidx: GlobalIdx) -> Result<GlobalType, Error> {
        self.globals
            .get(*globalidx as usize)
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                id: SectionId::Global,
                index: *globalidx,
                capacity: self.global_count() as u32,
            })
    }

    pub(crate) fn has_table(&self) -> bool {
        !self.tables.is_empty()
    }

    pub(crate) fn has_memory(&self) -> bool {
        !self.mems.is_empty()
    }

    pub(crate) fn num_imported_globals(&self) -> usize {
        self.num_imported_globals
    }

    fn validate<T: Validate>(&mut self, value: &T) -> Result<(), Error> {
        value.validate(self)
    }
}

trait Validate {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error>;
}

/// Validate a decoded module against the WASM 1.0 type system.
pub(crate) fn validate_module(module: &Module) -> Result<(), Error> {
    let mut validator = Validator::new(module);

    // The type section is always valid.
    validator.validate(&module.importsec)?;
    validator.validate(&module.funcsec)?;
    validator.validate(&module.tablesec)?;
    validator.validate(&module.memsec)?;
    validator.validate(&module.globalsec)?;
    validator.validate(&module.exportsec)?;
    if let Some(startsec) = &module.startsec {
        validator.validate(startsec)?;
    }
    validator.validate(&module.elemsec)?;
    validator.validate(&module.codesec)?;
    validator.validate(&module.datasec)?;

    if validator.table_count() > 1 {
        return Err(Error::MultipleTables(validator.table_count()));
    }
    if validator.memory_count() > 1 {
        return Err(Error::MultipleMemories(validator.memory_count()));
    }

    Ok(())
}
