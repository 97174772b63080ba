// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The store: the process-wide container of all allocated instances.
//!
//! Function, table, memory, and global instances live in parallel vectors
//! indexed by opaque address newtypes. Allocation appends and never reuses
//! addresses; an address stays live for the store's lifetime. Module
//! instances are stored alongside so that functions can reference their
//! owning module by index, with no back-pointers.

use std::fmt;
use std::rc::Rc;

use crate::runtime::instance::ModuleInstance;
use crate::runtime::{RuntimeError, Trap};
use crate::types::{
    Function, FunctionType, GlobalType, MemType, Mutability, TableType, newtype,
};
use crate::values::Value;

newtype!(
    /// The address of a function instance within a store.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FuncAddr(u32);
);

newtype!(
    /// The address of a table instance within a store.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TableAddr(u32);
);

newtype!(
    /// The address of a memory instance within a store.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemAddr(u32);
);

newtype!(
    /// The address of a global instance within a store.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GlobalAddr(u32);
);

newtype!(
    /// The address of a module instance within a store.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ModuleAddr(u32);
);

/// A host function: receives the store (the spec's configuration reference,
/// as the borrow checker renders it) and the argument values, and returns
/// results matching its declared type.
pub type HostFunc = Rc<dyn Fn(&mut Store, &[Value]) -> Result<Vec<Value>, Trap>>;

/// A function instance: module-defined code bound to its owning instance,
/// or a host callable.
#[derive(Clone)]
pub enum FuncInst {
    Wasm {
        ty: FunctionType,
        module: ModuleAddr,
        code: Function,
    },
    Host {
        ty: FunctionType,
        code: HostFunc,
    },
}

impl FuncInst {
    pub fn ty(&self) -> &FunctionType {
        match self {
            FuncInst::Wasm { ty, .. } | FuncInst::Host { ty, .. } => ty,
        }
    }
}

impl fmt::Debug for FuncInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncInst::Wasm { ty, module, .. } => f
                .debug_struct("Wasm")
                .field("ty", ty)
                .field("module", module)
                .finish_non_exhaustive(),
            FuncInst::Host { ty, .. } => f
                .debug_struct("Host")
                .field("ty", ty)
                .finish_non_exhaustive(),
        }
    }
}

/// A table instance: function references plus the recorded maximum.
#[derive(Clone, Debug)]
pub struct TableInst {
    /// The table's elements; `None` marks an uninitialized entry.
    pub elem: Vec<Option<FuncAddr>>,
    /// Declared maximum element count, if any.
    pub max: Option<u32>,
}

impl TableInst {
    pub(crate) fn new(ty: TableType) -> Self {
        Self {
            elem: vec![None; ty.min_elements() as usize],
            max: ty.max_elements(),
        }
    }

    /// The table's current type, for import matching.
    pub(crate) fn limits(&self) -> crate::types::Limits {
        crate::types::Limits {
            min: self.elem.len() as u32,
            max: self.max,
        }
    }
}

/// A linear memory instance: raw little-endian bytes plus the recorded
/// maximum page count.
#[derive(Clone, Debug)]
pub struct MemInst {
    pub data: Vec<u8>,
    pub max_pages: Option<u32>,
}

impl MemInst {
    pub(crate) fn new(ty: MemType) -> Self {
        Self {
            data: vec![0; ty.min_size_bytes()],
            max_pages: ty.max,
        }
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.data.len() / MemType::PAGE_SIZE) as u32
    }

    /// Grow the memory by `delta` pages, zero-filling the new region.
    /// Returns the previous size in pages, or `None` if the request exceeds
    /// the declared maximum or the hard 65536-page cap. Growth failure is
    /// not a trap.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old_pages = self.size_pages();
        let new_pages = old_pages.checked_add(delta)?;
        let cap = self.max_pages.unwrap_or(MemType::MAX_PAGES);
        if new_pages > cap.min(MemType::MAX_PAGES) {
            return None;
        }
        self.data
            .resize((new_pages as usize) * MemType::PAGE_SIZE, 0);
        Some(old_pages)
    }

    pub(crate) fn limits(&self) -> crate::types::Limits {
        crate::types::Limits {
            min: self.size_pages(),
            max: self.max_pages,
        }
    }
}

/// A global variable instance.
#[derive(Clone, Copy, Debug)]
pub struct GlobalInst {
    pub ty: GlobalType,
    pub value: Value,
}

/// The store owns every allocated instance. It is single-owner: only the
/// active configuration (or the host through the accessors below) mutates
/// it.
#[derive(Default)]
pub struct Store {
    funcs: Vec<FuncInst>,
    tables: Vec<TableInst>,
    mems: Vec<MemInst>,
    globals: Vec<GlobalInst>,
    modules: Vec<ModuleInstance>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // Allocation. Each returns a fresh address; addresses are never reused.

    pub(crate) fn alloc_func(
        &mut self,
        ty: FunctionType,
        module: ModuleAddr,
        code: Function,
    ) -> FuncAddr {
        let addr = FuncAddr::new(self.funcs.len() as u32);
        self.funcs.push(FuncInst::Wasm { ty, module, code });
        addr
    }

    /// Register a host function, returning its address for use as an
    /// import.
    pub fn alloc_host_func(&mut self, ty: FunctionType, code: HostFunc) -> FuncAddr {
        let addr = FuncAddr::new(self.funcs.len() as u32);
        self.funcs.push(FuncInst::Host { ty, code });
        addr
    }

    /// Allocate a table instance, e.g. to satisfy a table import.
    pub fn alloc_table(&mut self, ty: TableType) -> TableAddr {
        let addr = TableAddr::new(self.tables.len() as u32);
        self.tables.push(TableInst::new(ty));
        addr
    }

    /// Allocate a memory instance, e.g. to satisfy a memory import.
    pub fn alloc_mem(&mut self, ty: MemType) -> MemAddr {
        let addr = MemAddr::new(self.mems.len() as u32);
        self.mems.push(MemInst::new(ty));
        addr
    }

    /// Allocate a global instance, e.g. to satisfy a global import.
    pub fn alloc_global(&mut self, ty: GlobalType, value: Value) -> GlobalAddr {
        let addr = GlobalAddr::new(self.globals.len() as u32);
        self.globals.push(GlobalInst { ty, value });
        addr
    }

    pub(crate) fn push_module(&mut self, instance: ModuleInstance) -> ModuleAddr {
        let addr = ModuleAddr::new(self.modules.len() as u32);
        self.modules.push(instance);
        addr
    }

    pub(crate) fn module_mut(
        &mut self,
        addr: ModuleAddr,
    ) -> Result<&mut ModuleInstance, RuntimeError> {
        self.modules
            .get_mut(*addr as usize)
            .ok_or(RuntimeError::Internal("module address out of bounds"))
    }

    // Lookup. A bad address here means the caller mixed up stores or forged
    // an address; report it structurally instead of panicking.

    pub fn instance(&self, addr: ModuleAddr) -> Result<&ModuleInstance, RuntimeError> {
        self.modules
            .get(*addr as usize)
            .ok_or(RuntimeError::Internal("module address out of bounds"))
    }

    pub fn func(&self, addr: FuncAddr) -> Result<&FuncInst, RuntimeError> {
        self.funcs
            .get(*addr as usize)
            .ok_or(RuntimeError::Internal("function address out of bounds"))
    }

    pub fn table(&self, addr: TableAddr) -> Result<&TableInst, RuntimeError> {
        self.tables
            .get(*addr as usize)
            .ok_or(RuntimeError::Internal("table address out of bounds"))
    }

    pub(crate) fn table_mut(&mut self, addr: TableAddr) -> Result<&mut TableInst, RuntimeError> {
        self.tables
            .get_mut(*addr as usize)
            .ok_or(RuntimeError::Internal("table address out of bounds"))
    }

    pub fn mem(&self, addr: MemAddr) -> Result<&MemInst, RuntimeError> {
        self.mems
            .get(*addr as usize)
            .ok_or(RuntimeError::Internal("memory address out of bounds"))
    }

    pub(crate) fn mem_mut(&mut self, addr: MemAddr) -> Result<&mut MemInst, RuntimeError> {
        self.mems
            .get_mut(*addr as usize)
            .ok_or(RuntimeError::Internal("memory address out of bounds"))
    }

    pub fn global(&self, addr: GlobalAddr) -> Result<&GlobalInst, RuntimeError> {
        self.globals
            .get(*addr as usize)
            .ok_or(RuntimeError::Internal("global address out of bounds"))
    }

    pub(crate) fn global_mut(&mut self, addr: GlobalAddr) -> Result<&mut GlobalInst, RuntimeError> {
        self.globals
            .get_mut(*addr as usize)
            .ok_or(RuntimeError::Internal("global address out of bounds"))
    }

    // Host-facing accessors.

    /// Read a global's current value.
    pub fn read_global(&self, addr: GlobalAddr) -> Result<Value, RuntimeError> {
        Ok(self.global(addr)?.value)
    }

    /// Write a mutable global. The value must match the global's type.
    pub fn write_global(&mut self, addr: GlobalAddr, value: Value) -> Result<(), RuntimeError> {
        let global = self.global_mut(addr)?;
        if global.ty.mutability == Mutability::Const {
            return Err(RuntimeError::ImmutableGlobal);
        }
        if value.ty() != global.ty.value {
            return Err(RuntimeError::ValueType {
                expected: global.ty.value,
                got: value.ty(),
            });
        }
        global.value = value;
        Ok(())
    }

    /// Read a table entry.
    pub fn read_table(&self, addr: TableAddr, index: u32) -> Result<Option<FuncAddr>, RuntimeError> {
        self.table(addr)?
            .elem
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::Trap(Trap::UndefinedElement))
    }

    /// Write a table entry.
    pub fn write_table(
        &mut self,
        addr: TableAddr,
        index: u32,
        entry: Option<FuncAddr>,
    ) -> Result<(), RuntimeError> {
        let table = self.table_mut(addr)?;
        let slot = table
            .elem
            .get_mut(index as usize)
            .ok_or(RuntimeError::Trap(Trap::UndefinedElement))?;
        *slot = entry;
        Ok(())
    }

    /// Read a run of memory bytes.
    pub fn read_mem(&self, addr: MemAddr, offset: u32, len: u32) -> Result<Vec<u8>, RuntimeError> {
        let mem = self.mem(addr)?;
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= mem.data.len())
            .ok_or(RuntimeError::Trap(Trap::MemoryOutOfBounds))?;
        Ok(mem.data[start..end].to_vec())
    }

    /// Write a run of memory bytes.
    pub fn write_mem(
        &mut self,
        addr: MemAddr,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), RuntimeError> {
        let mem = self.mem_mut(addr)?;
        let start = offset as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= mem.data.len())
            .ok_or(RuntimeError::Trap(Trap::MemoryOutOfBounds))?;
        mem.data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("funcs", &self.funcs.len())
            .field("tables", &self.tables.len())
            .field("mems", &self.mems.len())
            .field("globals", &self.globals.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElemType, Limits};

    fn mem_type(min: u32, max: Option<u32>) -> MemType {
        MemType::new(Limits { min, max })
    }

    #[test]
    fn memory_grow_respects_declared_maximum() {
        let mut mem = MemInst::new(mem_type(1, Some(3)));
        assert_eq!(mem.size_pages(), 1);
        assert_eq!(mem.grow(1), Some(1));
        assert_eq!(mem.size_pages(), 2);
        assert_eq!(mem.grow(2), None);
        assert_eq!(mem.size_pages(), 2);
        assert_eq!(mem.grow(1), Some(2));
        assert_eq!(mem.grow(0), Some(3));
    }

    #[test]
    fn memory_grow_respects_hard_cap() {
        let mut mem = MemInst::new(mem_type(0, None));
        assert_eq!(mem.grow(MemType::MAX_PAGES + 1), None);
        assert_eq!(mem.grow(u32::MAX), None);
    }

    #[test]
    fn memory_grow_zero_fills() {
        let mut mem = MemInst::new(mem_type(0, None));
        assert_eq!(mem.grow(1), Some(0));
        assert!(mem.data.iter().all(|&b| b == 0));
        assert_eq!(mem.data.len(), MemType::PAGE_SIZE);
    }

    #[test]
    fn tables_are_initialized_empty() {
        let table = TableInst::new(TableType {
            elemtype: ElemType::FuncRef,
            limits: Limits {
                min: 4,
                max: Some(8),
            },
        });
        assert_eq!(table.elem.len(), 4);
        assert!(table.elem.iter().all(Option::is_none));
    }

    #[test]
    fn addresses_are_dense_and_stable() {
        let mut store = Store::new();
        let t0 = store.alloc_table(TableType {
            elemtype: ElemType::FuncRef,
            limits: Limits { min: 1, max: None },
        });
        let m0 = store.alloc_mem(mem_type(1, None));
        let g0 = store.alloc_global(
            GlobalType {
                value: crate::types::ValType::I32,
                mutability: Mutability::Var,
            },
            Value::I32(7),
        );
        assert_eq!(*t0, 0);
        assert_eq!(*m0, 0);
        assert_eq!(*g0, 0);
        assert_eq!(store.read_global(g0).unwrap(), Value::I32(7));
    }

    #[test]
    fn global_writes_are_checked() {
        let mut store = Store::new();
        let mutable = store.alloc_global(
            GlobalType {
                value: crate::types::ValType::I32,
                mutability: Mutability::Var,
            },
            Value::I32(0),
        );
        let immutable = store.alloc_global(
            GlobalType {
                value: crate::types::ValType::I32,
                mutability: Mutability::Const,
            },
            Value::I32(0),
        );

        store.write_global(mutable, Value::I32(3)).unwrap();
        assert_eq!(store.read_global(mutable).unwrap(), Value::I32(3));

        assert_eq!(
            store.write_global(immutable, Value::I32(3)),
            Err(RuntimeError::ImmutableGlobal)
        );
        assert_eq!(
            store.write_global(mutable, Value::F32(3.0)),
            Err(RuntimeError::ValueType {
                expected: crate::types::ValType::I32,
                got: crate::types::ValType::F32,
            })
        );
    }

    #[test]
    fn memory_accessors_are_bounds_checked() {
        let mut store = Store::new();
        let mem = store.alloc_mem(mem_type(1, None));

        store.write_mem(mem, 0xfffc, &[1, 2, 3, 4]).unwrap();
        assert_eq!(store.read_mem(mem, 0xfffc, 4).unwrap(), vec![1, 2, 3, 4]);

        assert_eq!(
            store.write_mem(mem, 0xfffd, &[1, 2, 3, 4]),
            Err(RuntimeError::Trap(Trap::MemoryOutOfBounds))
        );
        assert_eq!(
            store.read_mem(mem, 0x1_0000, 1),
            Err(RuntimeError::Trap(Trap::MemoryOutOfBounds))
        );
    }
}
