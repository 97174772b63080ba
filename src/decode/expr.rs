// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Parsing of WebAssembly expressions into the typed instruction AST.
//!
//! Expressions are opcode-driven: block-structured instructions recurse
//! until their terminating `end` (or `else`, inside an `if`), and the
//! terminator is attached as the final instruction of the parsed sequence
//! so the validator and executor can treat termination uniformly.

use crate::storage::Stream;
use crate::types::{
    BlockType, BrTableOperands, Expression, FuncIdx, GlobalIdx, Instruction, LabelIdx, LocalIdx,
    MemArg, Opcode, TypeIdx, ValType,
};

use super::{ContextStack, Decoder, Error};

// Structured control instructions must not nest beyond this depth; the
// parser recurses per nesting level and the input is untrusted.
const MAX_BLOCK_DEPTH: usize = 1024;

// What terminated an instruction sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SequenceEnd {
    End,
    Else,
}

/// Parse an expression: instructions up to and including the terminating
/// `end`.
pub(super) fn parse_expression<S: Stream>(
    decoder: &mut Decoder<S>,
    context: &mut ContextStack,
) -> Result<Expression, Error<S::Error>> {
    let (instrs, terminator) = parse_instr_seq(decoder, context, 0, false)?;
    debug_assert_eq!(terminator, SequenceEnd::End);
    Ok(Expression::new(instrs))
}

// Parse an instruction sequence up to and including its terminator. `else`
// is accepted as a terminator only for the consequent arm of an `if`.
fn parse_instr_seq<S: Stream>(
    decoder: &mut Decoder<S>,
    context: &mut ContextStack,
    depth: usize,
    allow_else: bool,
) -> Result<(Vec<Instruction>, SequenceEnd), Error<S::Error>> {
    if depth > MAX_BLOCK_DEPTH {
        return Err(Error::ExcessiveBlockNesting);
    }

    let mut instrs = Vec::new();
    loop {
        let byte = decoder.read_byte_raw()?;
        let op = Opcode::try_from(byte).map_err(|_| Error::InvalidToken(byte))?;

        let instr = match op {
            Opcode::End => {
                instrs.push(Instruction::End);
                return Ok((instrs, SequenceEnd::End));
            }
            Opcode::Else => {
                if !allow_else {
                    return Err(Error::InvalidToken(byte));
                }
                instrs.push(Instruction::Else);
                return Ok((instrs, SequenceEnd::Else));
            }

            Opcode::Unreachable => Instruction::Unreachable,
            Opcode::Nop => Instruction::Nop,
            Opcode::Block => {
                let ty = parse_block_type(decoder)?;
                let (body, _) = parse_instr_seq(decoder, context, depth + 1, false)?;
                Instruction::Block {
                    ty,
                    body: Expression::new(body),
                }
            }
            Opcode::Loop => {
                let ty = parse_block_type(decoder)?;
                let (body, _) = parse_instr_seq(decoder, context, depth + 1, false)?;
                Instruction::Loop {
                    ty,
                    body: Expression::new(body),
                }
            }
            Opcode::If => {
                let ty = parse_block_type(decoder)?;
                let (then_body, terminator) = parse_instr_seq(decoder, context, depth + 1, true)?;
                let else_body = match terminator {
                    SequenceEnd::Else => parse_instr_seq(decoder, context, depth + 1, false)?.0,
                    // An absent alternate behaves as an immediately-ending
                    // empty one.
                    SequenceEnd::End => vec![Instruction::End],
                };
                Instruction::If {
                    ty,
                    then_body: Expression::new(then_body),
                    else_body: Expression::new(else_body),
                }
            }
            Opcode::Br => Instruction::Br(LabelIdx::new(decoder.read_leb128_raw()?)),
            Opcode::BrIf => Instruction::BrIf(LabelIdx::new(decoder.read_leb128_raw()?)),
            Opcode::BrTable => {
                let count: u32 = decoder.read_leb128_raw()?;
                let mut labels = Vec::with_capacity((count as usize).min(0x1000));
                for _ in 0..count {
                    labels.push(LabelIdx::new(decoder.read_leb128_raw()?));
                }
                let default = LabelIdx::new(decoder.read_leb128_raw()?);
                Instruction::BrTable(BrTableOperands {
                    labels: labels.into_boxed_slice(),
                    default,
                })
            }
            Opcode::Return => Instruction::Return,
            Opcode::Call => Instruction::Call(FuncIdx::new(decoder.read_leb128_raw()?)),
            Opcode::CallIndirect => {
                let ty = TypeIdx::new(decoder.read_leb128_raw()?);
                // The table index is a reserved zero byte in WASM 1.0.
                decoder.read_zero_byte()?;
                Instruction::CallIndirect(ty)
            }

            Opcode::Drop => Instruction::Drop,
            Opcode::Select => Instruction::Select,

            Opcode::LocalGet => Instruction::LocalGet(LocalIdx::new(decoder.read_leb128_raw()?)),
            Opcode::LocalSet => Instruction::LocalSet(LocalIdx::new(decoder.read_leb128_raw()?)),
            Opcode::LocalTee => Instruction::LocalTee(LocalIdx::new(decoder.read_leb128_raw()?)),
            Opcode::GlobalGet => {
                Instruction::GlobalGet(GlobalIdx::new(decoder.read_leb128_raw()?))
            }
            Opcode::GlobalSet => {
                Instruction::GlobalSet(GlobalIdx::new(decoder.read_leb128_raw()?))
            }

            Opcode::MemorySize => {
                // Reserved zero byte: the memory index.
                decoder.read_zero_byte()?;
                Instruction::MemorySize
            }
            Opcode::MemoryGrow => {
                decoder.read_zero_byte()?;
                Instruction::MemoryGrow
            }

            Opcode::I32Const => Instruction::I32Const(decoder.read_leb128_raw::<i32>()? as u32),
            Opcode::I64Const => Instruction::I64Const(decoder.read_leb128_raw::<i64>()? as u64),
            Opcode::F32Const => {
                let mut buf = [0u8; 4];
                decoder.read_exact_raw(&mut buf)?;
                Instruction::F32Const(f32::from_le_bytes(buf))
            }
            Opcode::F64Const => {
                let mut buf = [0u8; 8];
                decoder.read_exact_raw(&mut buf)?;
                Instruction::F64Const(f64::from_le_bytes(buf))
            }

            op if op.load_kind().is_some() => Instruction::Load(op, parse_mem_arg(decoder)?),
            op if op.store_kind().is_some() => Instruction::Store(op, parse_mem_arg(decoder)?),
            op if op.is_numeric_op() => Instruction::Numeric(op),

            // Every remaining opcode has been handled above; reaching here
            // means the metadata tables are out of sync with the opcode
            // enum.
            _ => unreachable!("unclassified opcode {op:?}"),
        };
        instrs.push(instr);
    }
}

fn parse_block_type<S: Stream>(decoder: &mut Decoder<S>) -> Result<BlockType, Error<S::Error>> {
    // WASM 1.0 block types are a single byte: 0x40 for the empty type, or a
    // value type.
    let byte = decoder.read_byte_raw()?;
    if byte == 0x40 {
        Ok(BlockType::Empty)
    } else {
        match ValType::try_from(byte) {
            Ok(valtype) => Ok(BlockType::Value(valtype)),
            Err(_) => Err(Error::InvalidValType(byte)),
        }
    }
}

fn parse_mem_arg<S: Stream>(decoder: &mut Decoder<S>) -> Result<MemArg, Error<S::Error>> {
    Ok(MemArg {
        align: decoder.read_leb128_raw()?,
        offset: decoder.read_leb128_raw()?,
    })
}
