// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The execution engine: a structured stack machine over the instruction
//! AST.
//!
//! A [`Configuration`] drives a stack of frames, dispatching one
//! instruction per step from the active sequence (the topmost label's, or
//! the frame's own). Structured control instructions push and pop labels;
//! `end` and `else` terminate sequences uniformly; branches unwind labels,
//! carrying the target's arity worth of values. A frame finishing (its
//! final `end`, an explicit `return`, or a branch past all labels) pops it
//! and transfers its results to the caller, or out of the machine when no
//! caller remains.

use crate::runtime::instance::ModuleInstance;
use crate::runtime::stack::{Frame, Label, ValueStack};
use crate::runtime::store::{FuncAddr, FuncInst, GlobalAddr, MemAddr, ModuleAddr, Store};
use crate::runtime::{CALL_STACK_LIMIT, RuntimeError, Trap, numeric};
use crate::types::{Expression, Function, FunctionType, GlobalIdx, Instruction, MemArg, Opcode};
use crate::values::Value;

/// Invoke the function at `func` with the given arguments, running the
/// machine to completion. Argument count and types are checked against the
/// function's declared parameters before any frame is pushed.
pub fn invoke(store: &mut Store, func: FuncAddr, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
    let inst = store.func(func)?.clone();
    let ty = inst.ty().clone();
    check_arguments(&ty, args)?;

    tracing::debug!(func = *func, params = args.len(), "invoking function");

    match inst {
        FuncInst::Host { code, .. } => {
            let results = code(store, args).map_err(RuntimeError::Trap)?;
            check_host_results(&ty, &results)?;
            Ok(results)
        }
        FuncInst::Wasm { module, code, .. } => {
            let mut config = Configuration::new(store);
            config.push_frame(module, &ty, &code, args.to_vec())?;
            config.run()
        }
    }
}

fn check_arguments(ty: &FunctionType, args: &[Value]) -> Result<(), RuntimeError> {
    let got: Vec<_> = args.iter().map(Value::ty).collect();
    if got != ty.parameters {
        return Err(RuntimeError::ArgumentTypes {
            expected: ty.parameters.clone(),
            got,
        });
    }
    Ok(())
}

fn check_host_results(ty: &FunctionType, results: &[Value]) -> Result<(), RuntimeError> {
    let got: Vec<_> = results.iter().map(Value::ty).collect();
    if got != *ty.results {
        return Err(RuntimeError::Internal(
            "host function returned mismatched results",
        ));
    }
    Ok(())
}

/// Execution state: a store reference plus the frame stack.
pub(crate) struct Configuration<'s> {
    store: &'s mut Store,
    frames: Vec<Frame>,
}

impl<'s> Configuration<'s> {
    pub(crate) fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            frames: Vec::new(),
        }
    }

    /// Push a frame for a module-defined function, consuming `args` as the
    /// leading locals.
    pub(crate) fn push_frame(
        &mut self,
        module: ModuleAddr,
        ty: &FunctionType,
        code: &Function,
        args: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= CALL_STACK_LIMIT {
            return Err(RuntimeError::StackExhausted);
        }
        let mut locals = args;
        locals.extend(code.locals.iter().map(|&ty| Value::zero(ty)));
        self.frames.push(Frame {
            module,
            locals,
            instrs: code.body.clone(),
            ip: 0,
            arity: ty.results.len(),
            operands: ValueStack::new(),
            labels: Vec::new(),
        });
        Ok(())
    }

    /// Drive the machine until the root frame returns or a trap unwinds it.
    pub(crate) fn run(&mut self) -> Result<Vec<Value>, RuntimeError> {
        loop {
            // Fetch from the active sequence and advance the instruction
            // pointer past the fetched instruction.
            let frame = self
                .frames
                .last_mut()
                .ok_or(RuntimeError::Internal("no active frame"))?;
            let (seq, ip) = match frame.labels.last_mut() {
                Some(label) => {
                    let ip = label.ip;
                    label.ip += 1;
                    (label.instrs.clone(), ip)
                }
                None => {
                    let ip = frame.ip;
                    frame.ip += 1;
                    (frame.instrs.clone(), ip)
                }
            };
            let instr = seq
                .get(ip)
                .ok_or(RuntimeError::Internal("instruction pointer past sequence end"))?;

            tracing::trace!(ip, op = instr.mnemonic(), depth = self.frames.len(), "step");

            if let Some(results) = self.step(instr)? {
                return Ok(results);
            }
        }
    }

    // Execute one instruction. Returns the invocation's results once the
    // root frame has been popped.
    fn step(&mut self, instr: &Instruction) -> Result<Option<Vec<Value>>, RuntimeError> {
        match instr {
            Instruction::Unreachable => return Err(Trap::Unreachable.into()),
            Instruction::Nop => {}

            Instruction::Block { ty, body } => {
                self.push_label(ty.arity(), body, false)?;
            }
            Instruction::Loop { ty: _, body } => {
                // A branch to a loop re-enters it and carries no values.
                self.push_label(0, body, true)?;
            }
            Instruction::If {
                ty,
                then_body,
                else_body,
            } => {
                let condition = self.active_operands()?.pop_i32()?;
                let body = if condition != 0 { then_body } else { else_body };
                self.push_label(ty.arity(), body, false)?;
            }

            // Both arms of an if and all other structured sequences attach
            // their terminator, so `else` here means "the consequent ran to
            // completion" and behaves exactly like `end`.
            Instruction::End | Instruction::Else => return self.end_sequence(),

            Instruction::Br(label) => return self.branch(**label),
            Instruction::BrIf(label) => {
                let condition = self.active_operands()?.pop_i32()?;
                if condition != 0 {
                    return self.branch(**label);
                }
            }
            Instruction::BrTable(operands) => {
                let index = self.active_operands()?.pop_i32()? as usize;
                let target = operands
                    .labels
                    .get(index)
                    .copied()
                    .unwrap_or(operands.default);
                return self.branch(*target);
            }
            Instruction::Return => return self.finish_frame(),

            Instruction::Call(funcidx) => {
                let addr = self.func_addr(**funcidx)?;
                self.invoke_function(addr)?;
            }
            Instruction::CallIndirect(typeidx) => {
                let index = self.active_operands()?.pop_i32()?;
                let (table_addr, expected) = {
                    let instance = self.current_instance()?;
                    let table_addr = instance
                        .tableaddrs
                        .first()
                        .copied()
                        .ok_or(RuntimeError::Internal("no table bound to instance"))?;
                    let expected = instance
                        .types
                        .get(**typeidx as usize)
                        .cloned()
                        .ok_or(RuntimeError::Internal("type index out of bounds"))?;
                    (table_addr, expected)
                };
                let entry = self
                    .store
                    .table(table_addr)?
                    .elem
                    .get(index as usize)
                    .copied()
                    .ok_or(Trap::UndefinedElement)?;
                let addr = entry.ok_or(Trap::UninitializedElement)?;
                if *self.store.func(addr)?.ty() != expected {
                    return Err(Trap::IndirectCallTypeMismatch.into());
                }
                self.invoke_function(addr)?;
            }

            Instruction::Drop => {
                self.active_operands()?.pop()?;
            }
            Instruction::Select => {
                let stack = self.active_operands()?;
                let condition = stack.pop_i32()?;
                let second = stack.pop()?;
                let first = stack.pop()?;
                stack.push(if condition != 0 { first } else { second });
            }

            Instruction::LocalGet(idx) => {
                let frame = self.current_frame()?;
                let value = *frame
                    .locals
                    .get(**idx as usize)
                    .ok_or(RuntimeError::Internal("local index out of bounds"))?;
                frame.active_operands_mut().push(value);
            }
            Instruction::LocalSet(idx) => {
                let frame = self.current_frame()?;
                let value = frame.active_operands_mut().pop()?;
                let slot = frame
                    .locals
                    .get_mut(**idx as usize)
                    .ok_or(RuntimeError::Internal("local index out of bounds"))?;
                *slot = value;
            }
            Instruction::LocalTee(idx) => {
                let frame = self.current_frame()?;
                let value = frame.active_operands_mut().pop()?;
                frame.active_operands_mut().push(value);
                let slot = frame
                    .locals
                    .get_mut(**idx as usize)
                    .ok_or(RuntimeError::Internal("local index out of bounds"))?;
                *slot = value;
            }
            Instruction::GlobalGet(idx) => {
                let addr = self.global_addr(*idx)?;
                let value = self.store.global(addr)?.value;
                self.active_operands()?.push(value);
            }
            Instruction::GlobalSet(idx) => {
                let addr = self.global_addr(*idx)?;
                let value = self.active_operands()?.pop()?;
                self.store.global_mut(addr)?.value = value;
            }

            Instruction::Load(op, memarg) => self.exec_load(*op, *memarg)?,
            Instruction::Store(op, memarg) => self.exec_store(*op, *memarg)?,
            Instruction::MemorySize => {
                let addr = self.current_mem()?;
                let pages = self.store.mem(addr)?.size_pages();
                self.active_operands()?.push(Value::I32(pages));
            }
            Instruction::MemoryGrow => {
                let addr = self.current_mem()?;
                let delta = self.active_operands()?.pop_i32()?;
                // Failure pushes -1; growth failure is not a trap.
                let result = match self.store.mem_mut(addr)?.grow(delta) {
                    Some(old_pages) => old_pages,
                    None => u32::MAX,
                };
                self.active_operands()?.push(Value::I32(result));
            }

            Instruction::I32Const(value) => self.active_operands()?.push(Value::I32(*value)),
            Instruction::I64Const(value) => self.active_operands()?.push(Value::I64(*value)),
            Instruction::F32Const(value) => self.active_operands()?.push(Value::F32(*value)),
            Instruction::F64Const(value) => self.active_operands()?.push(Value::F64(*value)),

            Instruction::Numeric(op) => numeric::apply(*op, self.active_operands()?)?,
        }
        Ok(None)
    }

    fn current_frame(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or(RuntimeError::Internal("no active frame"))
    }

    fn active_operands(&mut self) -> Result<&mut ValueStack, RuntimeError> {
        Ok(self.current_frame()?.active_operands_mut())
    }

    fn current_instance(&self) -> Result<&ModuleInstance, RuntimeError> {
        let frame = self
            .frames
            .last()
            .ok_or(RuntimeError::Internal("no active frame"))?;
        self.store.instance(frame.module)
    }

    fn func_addr(&self, idx: u32) -> Result<FuncAddr, RuntimeError> {
        self.current_instance()?
            .funcaddrs
            .get(idx as usize)
            .copied()
            .ok_or(RuntimeError::Internal("function index out of bounds"))
    }

    fn global_addr(&self, idx: GlobalIdx) -> Result<GlobalAddr, RuntimeError> {
        self.current_instance()?
            .globaladdrs
            .get(*idx as usize)
            .copied()
            .ok_or(RuntimeError::Internal("global index out of bounds"))
    }

    fn current_mem(&self) -> Result<MemAddr, RuntimeError> {
        self.current_instance()?
            .memaddrs
            .first()
            .copied()
            .ok_or(RuntimeError::Internal("no memory bound to instance"))
    }

    fn push_label(
        &mut self,
        arity: usize,
        body: &Expression,
        is_loop: bool,
    ) -> Result<(), RuntimeError> {
        let frame = self.current_frame()?;
        frame.labels.push(Label {
            arity,
            instrs: body.clone(),
            ip: 0,
            operands: ValueStack::new(),
            is_loop,
        });
        Ok(())
    }

    // `end` (or `else`) of the active sequence: pop the topmost label,
    // carrying its accumulated operands, or finish the frame when the
    // function body itself ended.
    fn end_sequence(&mut self) -> Result<Option<Vec<Value>>, RuntimeError> {
        let frame = self.current_frame()?;
        match frame.labels.pop() {
            Some(label) => {
                let values = label.operands.into_values();
                frame.active_operands_mut().extend(values);
                Ok(None)
            }
            None => self.finish_frame(),
        }
    }

    // Pop the current frame, transferring its arity worth of results to the
    // caller's active stack — or out of the machine if this was the root
    // frame. (The RETURNING transition.)
    fn finish_frame(&mut self) -> Result<Option<Vec<Value>>, RuntimeError> {
        let frame = self.current_frame()?;
        let arity = frame.arity;
        let results = frame.active_operands_mut().split_off_top(arity)?;
        self.frames.pop();
        match self.frames.last_mut() {
            Some(caller) => {
                caller.active_operands_mut().extend(results);
                Ok(None)
            }
            None => Ok(Some(results)),
        }
    }

    // Take a branch to the label at relative `depth`. Branching past every
    // label targets the function itself and behaves like `return`.
    fn branch(&mut self, depth: u32) -> Result<Option<Vec<Value>>, RuntimeError> {
        let frame = self.current_frame()?;
        let depth = depth as usize;
        let num_labels = frame.labels.len();
        if depth >= num_labels {
            return self.finish_frame();
        }

        let target = num_labels - 1 - depth;
        let (arity, is_loop) = {
            let label = &frame.labels[target];
            (label.arity, label.is_loop)
        };
        let values = frame.active_operands_mut().split_off_top(arity)?;
        if is_loop {
            // Keep the loop label; restart its sequence with a fresh
            // operand stack.
            frame.labels.truncate(target + 1);
            let label = &mut frame.labels[target];
            label.operands.clear();
            label.operands.extend(values);
            label.ip = 0;
        } else {
            // Remove the target label too; control continues after the
            // construct, in the enclosing sequence.
            frame.labels.truncate(target);
            frame.active_operands_mut().extend(values);
        }
        Ok(None)
    }

    // Call the function at `addr`, consuming its arguments from the current
    // active stack.
    fn invoke_function(&mut self, addr: FuncAddr) -> Result<(), RuntimeError> {
        let inst = self.store.func(addr)?.clone();
        match inst {
            FuncInst::Host { ty, code } => {
                let argc = ty.parameters.len();
                let args = self.active_operands()?.split_off_top(argc)?;
                let results = code(self.store, &args).map_err(RuntimeError::Trap)?;
                check_host_results(&ty, &results)?;
                self.active_operands()?.extend(results);
                Ok(())
            }
            FuncInst::Wasm { ty, module, code } => {
                let argc = ty.parameters.len();
                let args = self.active_operands()?.split_off_top(argc)?;
                self.push_frame(module, &ty, &code, args)
            }
        }
    }

    fn exec_load(&mut self, op: Opcode, memarg: MemArg) -> Result<(), RuntimeError> {
        let kind = op
            .load_kind()
            .ok_or(RuntimeError::Internal("non-load opcode dispatched as load"))?;
        let mem_addr = self.current_mem()?;
        let base = self.active_operands()?.pop_i32()?;

        // Effective address in u64: the u32 base and offset cannot overflow
        // the wider bounds check.
        let ea = u64::from(base) + u64::from(memarg.offset);
        let width = u64::from(kind.storage_bytes);
        let mem = self.store.mem(mem_addr)?;
        if ea + width > mem.data.len() as u64 {
            return Err(Trap::MemoryOutOfBounds.into());
        }
        let start = ea as usize;
        let bytes = &mem.data[start..start + kind.storage_bytes as usize];

        // Assemble little-endian, then extend narrow reads.
        let mut raw = 0u64;
        for (i, &byte) in bytes.iter().enumerate() {
            raw |= u64::from(byte) << (8 * i);
        }
        let storage_bits = kind.storage_bytes * 8;
        if kind.signed && storage_bits < 64 && (raw >> (storage_bits - 1)) & 1 == 1 {
            raw |= !0u64 << storage_bits;
        }
        let value = Value::from_bits(kind.ty, raw);
        self.active_operands()?.push(value);
        Ok(())
    }

    fn exec_store(&mut self, op: Opcode, memarg: MemArg) -> Result<(), RuntimeError> {
        let kind = op
            .store_kind()
            .ok_or(RuntimeError::Internal("non-store opcode dispatched as store"))?;
        let mem_addr = self.current_mem()?;
        let value = self.active_operands()?.pop()?;
        let base = self.active_operands()?.pop_i32()?;

        if value.ty() != kind.ty {
            return Err(RuntimeError::Internal("stored operand has the wrong type"));
        }
        // Narrow stores wrap the value modulo the storage width by writing
        // only the low bytes.
        let raw = value.to_bits();

        let ea = u64::from(base) + u64::from(memarg.offset);
        let width = u64::from(kind.storage_bytes);
        let mem = self.store.mem_mut(mem_addr)?;
        if ea + width > mem.data.len() as u64 {
            return Err(Trap::MemoryOutOfBounds.into());
        }
        let start = ea as usize;
        for i in 0..kind.storage_bytes as usize {
            mem.data[start + i] = (raw >> (8 * i)) as u8;
        }
        Ok(())
    }
}
