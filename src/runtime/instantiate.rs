// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module instantiation: import resolution, allocation, segment
//! initialization, and the start function.
//!
//! Instantiation assumes a validated module. Imports resolve by
//! `(module, name)` against a host-provided registry and must match their
//! declared types (limits may widen, function and global types must be
//! equal). Global initializers are evaluated against the imported globals
//! only; element and data offsets are evaluated against the finished
//! instance and checked against their targets' current sizes before any
//! write happens.

use std::collections::HashMap;

use crate::runtime::instance::{ExportInst, ExternVal, ModuleInstance};
use crate::runtime::store::{GlobalAddr, ModuleAddr, Store};
use crate::runtime::{InstantiationError, LinkError, RuntimeError, exec};
use crate::types::{ExportDescriptor, Expression, ImportDescriptor, Instruction, Module};
use crate::values::Value;

/// A host-provided registry resolving `(module, name)` import paths to
/// external values.
#[derive(Debug, Default)]
pub struct Imports {
    map: HashMap<(String, String), ExternVal>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single external value under `module.name`.
    pub fn register(&mut self, module: &str, name: &str, value: ExternVal) {
        self.map
            .insert((module.to_owned(), name.to_owned()), value);
    }

    /// Register every export of an instance under the given namespace, as
    /// the spectest `register` command does.
    pub fn register_instance(&mut self, namespace: &str, instance: &ModuleInstance) {
        for export in &instance.exports {
            self.register(namespace, &export.name, export.value);
        }
    }

    /// Resolve an import path.
    pub fn resolve(&self, module: &str, name: &str) -> Option<ExternVal> {
        self.map
            .get(&(module.to_owned(), name.to_owned()))
            .copied()
    }
}

/// Instantiate a validated module in the store, returning the new
/// instance's address. Traps raised by the start function propagate as
/// runtime errors; the instance stays allocated either way, per the
/// semantics of a partially-completed instantiation.
pub fn instantiate(
    store: &mut Store,
    module: &Module,
    imports: &Imports,
) -> Result<ModuleAddr, InstantiationError> {
    // Resolve imports, checking each supplied address against the declared
    // type.
    let mut imported_funcs = Vec::new();
    let mut imported_tables = Vec::new();
    let mut imported_mems = Vec::new();
    let mut imported_globals = Vec::new();
    for import in module.importsec.iter() {
        let (module_name, field) = (import.module.as_str(), import.field.as_str());
        let supplied =
            imports
                .resolve(module_name, field)
                .ok_or_else(|| LinkError::UnknownImport {
                    module: module_name.to_owned(),
                    name: field.to_owned(),
                })?;
        let incompatible = || LinkError::IncompatibleImportType {
            module: module_name.to_owned(),
            name: field.to_owned(),
        };
        match (import.descriptor, supplied) {
            (ImportDescriptor::Function(typeidx), ExternVal::Func(addr)) => {
                let declared = &module.typesec[*typeidx as usize];
                let actual = store.func(addr)?.ty();
                if actual != declared {
                    return Err(incompatible().into());
                }
                imported_funcs.push(addr);
            }
            (ImportDescriptor::Table(declared), ExternVal::Table(addr)) => {
                let actual = store.table(addr)?.limits();
                if !actual.satisfies(&declared.limits) {
                    return Err(incompatible().into());
                }
                imported_tables.push(addr);
            }
            (ImportDescriptor::Memory(declared), ExternVal::Mem(addr)) => {
                let actual = store.mem(addr)?.limits();
                if !actual.satisfies(&declared) {
                    return Err(incompatible().into());
                }
                imported_mems.push(addr);
            }
            (ImportDescriptor::Global(declared), ExternVal::Global(addr)) => {
                let actual = store.global(addr)?.ty;
                if actual != declared {
                    return Err(incompatible().into());
                }
                imported_globals.push(addr);
            }
            // Kind mismatch.
            _ => return Err(incompatible().into()),
        }
    }

    // Evaluate global initializers in a context that sees only the imported
    // globals.
    let mut global_values = Vec::with_capacity(module.globalsec.len());
    for global in module.globalsec.iter() {
        global_values.push(eval_const_expr(store, &imported_globals, &global.init)?);
    }

    // Allocate. The instance address is reserved first so that function
    // instances can reference their owning module by index.
    let module_addr = store.push_module(ModuleInstance::default());

    let mut funcaddrs = imported_funcs;
    for (typeidx, function) in module.funcsec.iter().zip(module.codesec.iter()) {
        let ty = module.typesec[**typeidx as usize].clone();
        funcaddrs.push(store.alloc_func(ty, module_addr, function.clone()));
    }

    let mut tableaddrs = imported_tables;
    for table in module.tablesec.iter() {
        tableaddrs.push(store.alloc_table(*table));
    }

    let mut memaddrs = imported_mems;
    for mem in module.memsec.iter() {
        memaddrs.push(store.alloc_mem(*mem));
    }

    let mut globaladdrs = imported_globals;
    for (global, value) in module.globalsec.iter().zip(global_values) {
        globaladdrs.push(store.alloc_global(global.ty, value));
    }

    let exports = module
        .exportsec
        .iter()
        .map(|export| {
            let value = match export.descriptor {
                ExportDescriptor::Function(idx) => ExternVal::Func(funcaddrs[*idx as usize]),
                ExportDescriptor::Table(idx) => ExternVal::Table(tableaddrs[*idx as usize]),
                ExportDescriptor::Memory(idx) => ExternVal::Mem(memaddrs[*idx as usize]),
                ExportDescriptor::Global(idx) => ExternVal::Global(globaladdrs[*idx as usize]),
            };
            ExportInst {
                name: export.field.as_str().to_owned(),
                value,
            }
        })
        .collect();

    let instance = ModuleInstance {
        types: module.typesec.to_vec(),
        funcaddrs: funcaddrs.clone(),
        tableaddrs: tableaddrs.clone(),
        memaddrs: memaddrs.clone(),
        globaladdrs: globaladdrs.clone(),
        exports,
    };
    *store.module_mut(module_addr)? = instance;

    // Evaluate segment offsets and check that every segment fits its target
    // before writing anything.
    let mut elem_writes = Vec::with_capacity(module.elemsec.len());
    for segment in module.elemsec.iter() {
        let offset = eval_offset(store, &globaladdrs, &segment.offset)?;
        let table_addr = tableaddrs[*segment.table as usize];
        let table_len = store.table(table_addr)?.elem.len();
        (offset as usize)
            .checked_add(segment.init.len())
            .filter(|&end| end <= table_len)
            .ok_or(LinkError::ElementSegmentDoesNotFit)?;
        elem_writes.push((table_addr, offset as usize, &segment.init));
    }

    let mut data_writes = Vec::with_capacity(module.datasec.len());
    for segment in module.datasec.iter() {
        let offset = eval_offset(store, &globaladdrs, &segment.offset)?;
        let mem_addr = memaddrs[*segment.memory as usize];
        let mem_len = store.mem(mem_addr)?.data.len();
        (offset as usize)
            .checked_add(segment.init.len())
            .filter(|&end| end <= mem_len)
            .ok_or(LinkError::DataSegmentDoesNotFit)?;
        data_writes.push((mem_addr, offset as usize, &segment.init));
    }

    for (table_addr, offset, init) in elem_writes {
        let table = store.table_mut(table_addr)?;
        for (i, funcidx) in init.iter().enumerate() {
            table.elem[offset + i] = Some(funcaddrs[**funcidx as usize]);
        }
    }
    for (mem_addr, offset, init) in data_writes {
        let mem = store.mem_mut(mem_addr)?;
        mem.data[offset..offset + init.len()].copy_from_slice(init);
    }

    tracing::debug!(
        module = *module_addr,
        funcs = funcaddrs.len(),
        tables = tableaddrs.len(),
        mems = memaddrs.len(),
        globals = globaladdrs.len(),
        "instantiated module"
    );

    // The start function runs with no arguments; a trap aborts
    // instantiation but retains prior state changes.
    if let Some(start) = module.startsec {
        let addr = funcaddrs[**start as usize];
        exec::invoke(store, addr, &[])?;
    }

    Ok(module_addr)
}

// Evaluate a constant initializer expression. The validator has already
// restricted it to constants and reads of imported immutable globals, so
// anything else here is an internal inconsistency.
fn eval_const_expr(
    store: &Store,
    globaladdrs: &[GlobalAddr],
    expr: &Expression,
) -> Result<Value, RuntimeError> {
    let mut stack = Vec::new();
    for instr in expr.iter() {
        match instr {
            Instruction::I32Const(value) => stack.push(Value::I32(*value)),
            Instruction::I64Const(value) => stack.push(Value::I64(*value)),
            Instruction::F32Const(value) => stack.push(Value::F32(*value)),
            Instruction::F64Const(value) => stack.push(Value::F64(*value)),
            Instruction::GlobalGet(idx) => {
                let addr = globaladdrs
                    .get(**idx as usize)
                    .ok_or(RuntimeError::Internal("constant expression global index"))?;
                stack.push(store.global(*addr)?.value);
            }
            Instruction::End => break,
            _ => {
                return Err(RuntimeError::Internal(
                    "non-constant instruction in initializer",
                ));
            }
        }
    }
    match stack.as_slice() {
        [value] => Ok(*value),
        _ => Err(RuntimeError::Internal(
            "initializer did not produce exactly one value",
        )),
    }
}

fn eval_offset(
    store: &Store,
    globaladdrs: &[GlobalAddr],
    expr: &Expression,
) -> Result<u32, RuntimeError> {
    match eval_const_expr(store, globaladdrs, expr)? {
        Value::I32(offset) => Ok(offset),
        _ => Err(RuntimeError::Internal("segment offset must be an i32")),
    }
}
