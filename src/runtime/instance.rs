// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module instances: the allocated, running form of a module.
//!
//! An instance holds the imported and internal addresses of its entities
//! (imports first, matching the index spaces validation saw) and its export
//! records. The structure is immutable after instantiation; the mutable
//! payloads the addresses point at live in the store.

use crate::runtime::RuntimeError;
use crate::runtime::store::{FuncAddr, GlobalAddr, MemAddr, TableAddr};
use crate::types::FunctionType;

/// The external value an export names or an import supplies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExternVal {
    Func(FuncAddr),
    Table(TableAddr),
    Mem(MemAddr),
    Global(GlobalAddr),
}

/// An export record: a name bound to an address.
#[derive(Clone, Debug)]
pub struct ExportInst {
    pub name: String,
    pub value: ExternVal,
}

/// An allocated, running copy of a module.
#[derive(Clone, Debug, Default)]
pub struct ModuleInstance {
    /// The module's function types, copied so that `call_indirect` checks
    /// need not refer back to the AST.
    pub types: Vec<FunctionType>,
    /// Function index space (imports first).
    pub funcaddrs: Vec<FuncAddr>,
    /// Table index space.
    pub tableaddrs: Vec<TableAddr>,
    /// Memory index space.
    pub memaddrs: Vec<MemAddr>,
    /// Global index space.
    pub globaladdrs: Vec<GlobalAddr>,
    /// Export records, in declaration order.
    pub exports: Vec<ExportInst>,
}

impl ModuleInstance {
    /// Look up an export by name.
    pub fn export(&self, name: &str) -> Option<ExternVal> {
        self.exports
            .iter()
            .find(|export| export.name == name)
            .map(|export| export.value)
    }

    /// Look up an exported function by name.
    pub fn export_func(&self, name: &str) -> Result<FuncAddr, RuntimeError> {
        match self.export(name) {
            Some(ExternVal::Func(addr)) => Ok(addr),
            _ => Err(RuntimeError::UnknownExport(name.to_owned())),
        }
    }

    /// Look up an exported global by name.
    pub fn export_global(&self, name: &str) -> Result<GlobalAddr, RuntimeError> {
        match self.export(name) {
            Some(ExternVal::Global(addr)) => Ok(addr),
            _ => Err(RuntimeError::UnknownExport(name.to_owned())),
        }
    }

    /// Look up an exported table by name.
    pub fn export_table(&self, name: &str) -> Result<TableAddr, RuntimeError> {
        match self.export(name) {
            Some(ExternVal::Table(addr)) => Ok(addr),
            _ => Err(RuntimeError::UnknownExport(name.to_owned())),
        }
    }

    /// Look up an exported memory by name.
    pub fn export_mem(&self, name: &str) -> Result<MemAddr, RuntimeError> {
        match self.export(name) {
            Some(ExternVal::Mem(addr)) => Ok(addr),
            _ => Err(RuntimeError::UnknownExport(name.to_owned())),
        }
    }
}
