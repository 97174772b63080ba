// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Expression validation: the abstract operand/control stack type checker.
//!
//! The checker mirrors the WASM 1.0 validation algorithm: an operand stack
//! of known-or-unknown value types and a stack of control frames, one per
//! enclosing structured instruction. Code after an unconditional transfer is
//! checked in "unreachable" mode, where missing operands materialize as
//! `unknown` and unify with any expected type.
//!
//! Constant expressions (global initializers and segment offsets) are
//! checked by a much smaller walk that admits only `*.const` and reads of
//! imported immutable globals.

use crate::types::{
    Expression, FunctionType, Instruction, LabelIdx, Mutability, SectionId, ValType,
};

use super::{Error, Validator};

/// What an expression is being validated as.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ExpressionContext<'m> {
    /// A function body with the given signature and flattened locals
    /// (parameters first).
    Function {
        ty: &'m FunctionType,
        locals: &'m [ValType],
    },
    /// A constant initializer expression producing a single value of the
    /// given type.
    Constant(ValType),
}

pub(crate) fn validate_expression(
    validator: &Validator,
    expr: &Expression,
    context: ExpressionContext,
) -> Result<(), Error> {
    match context {
        ExpressionContext::Constant(expected) => {
            validate_const_expression(validator, expr, expected)
        }
        ExpressionContext::Function { ty, locals } => {
            let mut checker = Checker {
                validator,
                locals,
                ret: &ty.results,
                vals: Vec::new(),
                ctrls: Vec::new(),
            };
            match checker.check_block(expr, BlockKind::Func, ty.results.to_vec())? {
                Terminator::End => Ok(()),
                Terminator::Else => Err(Error::UnexpectedElse),
            }
        }
    }
}

// An operand whose type may be unknown (in unreachable code).
type Operand = Option<ValType>;

// The structured construct a control frame belongs to. Branches to a loop
// target its beginning and carry no values; branches to anything else
// target its end and carry its result types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockKind {
    Func,
    Block,
    Loop,
    Then,
    Else,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Terminator {
    End,
    Else,
}

struct CtrlFrame {
    kind: BlockKind,
    end_types: Vec<ValType>,
    // Operand stack height at frame entry.
    height: usize,
    // Set once control cannot reach the current program point.
    unreachable: bool,
}

struct Checker<'v, 'm> {
    validator: &'v Validator<'m>,
    locals: &'v [ValType],
    ret: &'v [ValType],
    vals: Vec<Operand>,
    ctrls: Vec<CtrlFrame>,
}

impl Checker<'_, '_> {
    fn push_val(&mut self, ty: ValType) {
        self.vals.push(Some(ty));
    }

    fn push_operand(&mut self, operand: Operand) {
        self.vals.push(operand);
    }

    fn push_vals(&mut self, types: &[ValType]) {
        for &ty in types {
            self.push_val(ty);
        }
    }

    fn pop_operand(&mut self) -> Result<Operand, Error> {
        let frame = self.ctrls.last().expect("no control frame");
        if self.vals.len() == frame.height {
            // In unreachable code, absent operands unify with anything.
            if frame.unreachable {
                return Ok(None);
            }
            return Err(Error::StackUnderflow);
        }
        Ok(self.vals.pop().expect("operand stack empty"))
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<(), Error> {
        match self.pop_operand()? {
            None => Ok(()),
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(Error::OperandMismatch { expected, found }),
        }
    }

    fn pop_vals(&mut self, types: &[ValType]) -> Result<(), Error> {
        for &ty in types.iter().rev() {
            self.pop_expect(ty)?;
        }
        Ok(())
    }

    fn push_ctrl(&mut self, kind: BlockKind, end_types: Vec<ValType>) {
        self.ctrls.push(CtrlFrame {
            kind,
            end_types,
            height: self.vals.len(),
            unreachable: false,
        });
    }

    // Pops the current control frame, checking that the operand stack holds
    // exactly its end types above the entry height. The end values are
    // consumed; the caller re-pushes them once per construct.
    fn pop_ctrl(&mut self) -> Result<(), Error> {
        let (end_types, height) = {
            let frame = self.ctrls.last().expect("no control frame");
            (frame.end_types.clone(), frame.height)
        };
        self.pop_vals(&end_types)?;
        if self.vals.len() != height {
            return Err(Error::UnbalancedStack {
                expected: height,
                found: self.vals.len(),
            });
        }
        self.ctrls.pop();
        Ok(())
    }

    // Marks the rest of the current frame unreachable, discarding the
    // operands it accumulated.
    fn set_unreachable(&mut self) {
        let frame = self.ctrls.last_mut().expect("no control frame");
        self.vals.truncate(frame.height);
        frame.unreachable = true;
    }

    // The types carried by a branch to the label at relative depth `idx`.
    fn label_types(&self, idx: LabelIdx) -> Result<Vec<ValType>, Error> {
        let depth = self.ctrls.len();
        let index = *idx as usize;
        if index >= depth {
            return Err(Error::UnknownLabel {
                index: *idx,
                depth: depth as u32,
            });
        }
        let frame = &self.ctrls[depth - 1 - index];
        Ok(match frame.kind {
            BlockKind::Loop => Vec::new(),
            _ => frame.end_types.clone(),
        })
    }

    // Checks one structured instruction sequence: pushes a control frame,
    // checks the body, and pops the frame at the terminator. End values are
    // consumed by pop_ctrl; the caller re-pushes the construct's results.
    fn check_block(
        &mut self,
        seq: &[Instruction],
        kind: BlockKind,
        end_types: Vec<ValType>,
    ) -> Result<Terminator, Error> {
        self.push_ctrl(kind, end_types);
        for instr in seq {
            match instr {
                Instruction::End => {
                    self.pop_ctrl()?;
                    return Ok(Terminator::End);
                }
                Instruction::Else => {
                    if kind != BlockKind::Then {
                        return Err(Error::UnexpectedElse);
                    }
                    self.pop_ctrl()?;
                    return Ok(Terminator::Else);
                }
                _ => self.check_instr(instr)?,
            }
        }
        Err(Error::MissingEnd)
    }

    fn check_instr(&mut self, instr: &Instruction) -> Result<(), Error> {
        match instr {
            Instruction::Unreachable => self.set_unreachable(),
            Instruction::Nop => {}

            Instruction::Block { ty, body } => {
                let results = ty.results().to_vec();
                match self.check_block(body, BlockKind::Block, results.clone())? {
                    Terminator::End => {}
                    Terminator::Else => return Err(Error::UnexpectedElse),
                }
                self.push_vals(&results);
            }
            Instruction::Loop { ty, body } => {
                let results = ty.results().to_vec();
                match self.check_block(body, BlockKind::Loop, results.clone())? {
                    Terminator::End => {}
                    Terminator::Else => return Err(Error::UnexpectedElse),
                }
                self.push_vals(&results);
            }
            Instruction::If {
                ty,
                then_body,
                else_body,
            } => {
                self.pop_expect(ValType::I32)?;
                let results = ty.results().to_vec();
                self.check_block(then_body, BlockKind::Then, results.clone())?;
                match self.check_block(else_body, BlockKind::Else, results.clone())? {
                    Terminator::End => {}
                    Terminator::Else => return Err(Error::UnexpectedElse),
                }
                self.push_vals(&results);
            }

            // Terminators are consumed by check_block; encountering one here
            // means a hand-constructed AST placed it outside any sequence.
            Instruction::End | Instruction::Else => return Err(Error::UnexpectedElse),

            Instruction::Br(label) => {
                let types = self.label_types(*label)?;
                self.pop_vals(&types)?;
                self.set_unreachable();
            }
            Instruction::BrIf(label) => {
                self.pop_expect(ValType::I32)?;
                let types = self.label_types(*label)?;
                self.pop_vals(&types)?;
                self.push_vals(&types);
            }
            Instruction::BrTable(operands) => {
                self.pop_expect(ValType::I32)?;
                let default_types = self.label_types(operands.default)?;
                for &label in operands.labels.iter() {
                    if self.label_types(label)? != default_types {
                        return Err(Error::BrTableTypeMismatch);
                    }
                }
                self.pop_vals(&default_types)?;
                self.set_unreachable();
            }
            Instruction::Return => {
                let types = self.ret.to_vec();
                self.pop_vals(&types)?;
                self.set_unreachable();
            }
            Instruction::Call(funcidx) => {
                let signature = self.validator.function_signature(*funcidx)?;
                let (parameters, results) =
                    (signature.parameters.clone(), signature.results.to_vec());
                self.pop_vals(&parameters)?;
                self.push_vals(&results);
            }
            Instruction::CallIndirect(typeidx) => {
                if !self.validator.has_table() {
                    return Err(Error::IndexOutOfBounds {
                        id: SectionId::Table,
                        index: 0,
                        capacity: 0,
                    });
                }
                let signature = self.validator.type_at(*typeidx)?;
                let (parameters, results) =
                    (signature.parameters.clone(), signature.results.to_vec());
                self.pop_expect(ValType::I32)?;
                self.pop_vals(&parameters)?;
                self.push_vals(&results);
            }

            Instruction::Drop => {
                self.pop_operand()?;
            }
            Instruction::Select => {
                self.pop_expect(ValType::I32)?;
                let first = self.pop_operand()?;
                let second = self.pop_operand()?;
                let result = match (first, second) {
                    (Some(a), Some(b)) if a != b => return Err(Error::SelectTypeMismatch),
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                };
                self.push_operand(result);
            }

            Instruction::LocalGet(idx) => {
                let ty = self.local_type(*idx)?;
                self.push_val(ty);
            }
            Instruction::LocalSet(idx) => {
                let ty = self.local_type(*idx)?;
                self.pop_expect(ty)?;
            }
            Instruction::LocalTee(idx) => {
                let ty = self.local_type(*idx)?;
                self.pop_expect(ty)?;
                self.push_val(ty);
            }
            Instruction::GlobalGet(idx) => {
                let global = self.validator.global_at(*idx)?;
                self.push_val(global.value);
            }
            Instruction::GlobalSet(idx) => {
                let global = self.validator.global_at(*idx)?;
                if global.mutability == Mutability::Const {
                    return Err(Error::GlobalIsImmutable(*idx));
                }
                self.pop_expect(global.value)?;
            }

            Instruction::Load(op, memarg) => {
                self.require_memory()?;
                let kind = op.load_kind().expect("load opcode");
                check_alignment(memarg.align, kind.storage_bytes)?;
                self.pop_expect(ValType::I32)?;
                self.push_val(kind.ty);
            }
            Instruction::Store(op, memarg) => {
                self.require_memory()?;
                let kind = op.store_kind().expect("store opcode");
                check_alignment(memarg.align, kind.storage_bytes)?;
                self.pop_expect(kind.ty)?;
                self.pop_expect(ValType::I32)?;
            }
            Instruction::MemorySize => {
                self.require_memory()?;
                self.push_val(ValType::I32);
            }
            Instruction::MemoryGrow => {
                self.require_memory()?;
                self.pop_expect(ValType::I32)?;
                self.push_val(ValType::I32);
            }

            Instruction::I32Const(_) => self.push_val(ValType::I32),
            Instruction::I64Const(_) => self.push_val(ValType::I64),
            Instruction::F32Const(_) => self.push_val(ValType::F32),
            Instruction::F64Const(_) => self.push_val(ValType::F64),

            Instruction::Numeric(op) => {
                if let Some((operand, result)) = op.conversion() {
                    self.pop_expect(operand)?;
                    self.push_val(result);
                } else {
                    let ty = op.value_type().expect("numeric opcode");
                    if op.is_testop() {
                        self.pop_expect(ty)?;
                        self.push_val(ValType::I32);
                    } else if op.is_relop() {
                        self.pop_expect(ty)?;
                        self.pop_expect(ty)?;
                        self.push_val(ValType::I32);
                    } else if op.is_unop() {
                        self.pop_expect(ty)?;
                        self.push_val(ty);
                    } else if op.is_binop() {
                        self.pop_expect(ty)?;
                        self.pop_expect(ty)?;
                        self.push_val(ty);
                    } else {
                        unreachable!("unclassified numeric opcode {op:?}");
                    }
                }
            }
        }
        Ok(())
    }

    fn local_type(&self, idx: crate::types::LocalIdx) -> Result<ValType, Error> {
        self.locals
            .get(*idx as usize)
            .copied()
            .ok_or(Error::UnknownLocal {
                index: *idx,
                count: self.locals.len() as u32,
            })
    }

    fn require_memory(&self) -> Result<(), Error> {
        if self.validator.has_memory() {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                id: SectionId::Memory,
                index: 0,
                capacity: 0,
            })
        }
    }
}

fn check_alignment(align: u32, storage_bytes: u32) -> Result<(), Error> {
    if align >= 32 || (1u32 << align) > storage_bytes {
        return Err(Error::AlignmentTooLarge {
            align,
            natural: storage_bytes,
        });
    }
    Ok(())
}

fn validate_const_expression(
    validator: &Validator,
    expr: &Expression,
    expected: ValType,
) -> Result<(), Error> {
    let mut stack: Vec<ValType> = Vec::new();
    let mut terminated = false;
    for instr in expr.iter() {
        match instr {
            Instruction::I32Const(_) => stack.push(ValType::I32),
            Instruction::I64Const(_) => stack.push(ValType::I64),
            Instruction::F32Const(_) => stack.push(ValType::F32),
            Instruction::F64Const(_) => stack.push(ValType::F64),
            Instruction::GlobalGet(idx) => {
                let global = validator.global_at(*idx)?;
                let imported = (**idx as usize) < validator.num_imported_globals();
                if !imported || global.mutability == Mutability::Var {
                    return Err(Error::ConstantExpressionGlobal(*idx));
                }
                stack.push(global.value);
            }
            Instruction::End => {
                terminated = true;
                break;
            }
            _ => return Err(Error::ConstantExpressionRequired),
        }
    }
    if !terminated {
        return Err(Error::MissingEnd);
    }
    match stack.as_slice() {
        [found] if *found == expected => Ok(()),
        [found] => Err(Error::OperandMismatch {
            expected,
            found: *found,
        }),
        _ => Err(Error::UnbalancedStack {
            expected: 1,
            found: stack.len(),
        }),
    }
}
