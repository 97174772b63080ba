// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decodable trait implementations for WebAssembly types.

use core::ops;

use num_enum::TryFromPrimitive;

use crate::storage::Stream;
use crate::types::*;

use super::{ContextId, ContextStack, Contextual, Decodable, Decoder, Error, Magic, expr};

// Maximum number of local variables per function. The spec's only bound is
// that the total count fit in a u32, which is unrealistically large given
// that locals are allocated upfront per frame.
const MAX_LOCALS_PER_FUNCTION: usize = 10_000;

macro_rules! impl_contextual {
    (Vec<$type:ty>, $id:path) => {
        impl Contextual for Vec<$type> {
            const ID: ContextId = $id;
        }
    };
    ($type:ty, $id:path) => {
        impl Contextual for $type {
            const ID: ContextId = $id;
        }
    };
}

// Byte-encoded enums decode via their TryFromPrimitive impls.
macro_rules! impl_decodable_for_u8_enum {
    ($type:ty) => {
        impl Decodable for $type {
            fn decode<S: Stream>(
                decoder: &mut Decoder<S>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<S::Error>> {
                let byte = decoder.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| Error::InvalidToken(byte))
            }
        }
    };
}

// Little-endian u32-encoded enums (the preamble's magic and version).
macro_rules! impl_decodable_for_le_u32_enum {
    ($type:ty, $make_err:path) => {
        impl Decodable for $type {
            fn decode<S: Stream>(
                decoder: &mut Decoder<S>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<S::Error>> {
                let mut buf = [0u8; 4];
                decoder.read_exact_raw(&mut buf)?;
                let val = u32::from_le_bytes(buf);
                Self::try_from(val).map_err(|_| $make_err(val))
            }
        }
    };
}

// Newtypes decode as their underlying type.
macro_rules! impl_decodable_for_newtype {
    ($type:ident) => {
        impl Decodable for $type {
            fn decode<S: Stream>(
                decoder: &mut Decoder<S>,
                context: &mut ContextStack,
            ) -> Result<Self, Error<S::Error>> {
                Ok(Self::new(<Self as ops::Deref>::Target::decode(
                    decoder, context,
                )?))
            }
        }
    };
}

impl<T: Decodable + Contextual> Decodable for Vec<T> {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let len: u32 = decoder.read(context)?;
        let mut vec = Vec::with_capacity((len as usize).min(0x1000));
        for _ in 0..len {
            vec.push(decoder.read(context)?);
        }
        Ok(vec)
    }
}

impl_contextual!(u8, ContextId::Byte);
impl_contextual!(u32, ContextId::U32);
impl_contextual!(i32, ContextId::I32);
impl_contextual!(i64, ContextId::I64);
impl_contextual!(f32, ContextId::F32);
impl_contextual!(f64, ContextId::F64);
impl_contextual!(CodeSection, ContextId::CodeSec);
impl_contextual!(DataSection, ContextId::DataSec);
impl_contextual!(DataSegment, ContextId::Data);
impl_contextual!(ElemType, ContextId::ElemType);
impl_contextual!(ElementSection, ContextId::ElemSec);
impl_contextual!(ElementSegment, ContextId::Elem);
impl_contextual!(Export, ContextId::Export);
impl_contextual!(ExportDescriptor, ContextId::ExportDesc);
impl_contextual!(ExportSection, ContextId::ExportSec);
impl_contextual!(Expression, ContextId::Expr);
impl_contextual!(Function, ContextId::Func);
impl_contextual!(FunctionSection, ContextId::FuncSec);
impl_contextual!(FunctionType, ContextId::FuncType);
impl_contextual!(FuncIdx, ContextId::FuncIdx);
impl_contextual!(Global, ContextId::Global);
impl_contextual!(GlobalIdx, ContextId::GlobalIdx);
impl_contextual!(GlobalSection, ContextId::GlobalSec);
impl_contextual!(GlobalType, ContextId::GlobalType);
impl_contextual!(Import, ContextId::Import);
impl_contextual!(ImportDescriptor, ContextId::ImportDesc);
impl_contextual!(ImportSection, ContextId::ImportSec);
impl_contextual!(LabelIdx, ContextId::LabelIdx);
impl_contextual!(Limits, ContextId::Limits);
impl_contextual!(LocalIdx, ContextId::LocalIdx);
impl_contextual!(Locals, ContextId::Locals);
impl_contextual!(Magic, ContextId::Magic);
impl_contextual!(MemArg, ContextId::MemArg);
impl_contextual!(MemIdx, ContextId::MemIdx);
impl_contextual!(MemorySection, ContextId::MemSec);
impl_contextual!(MemType, ContextId::MemType);
impl_contextual!(Mutability, ContextId::Mut);
impl_contextual!(Name, ContextId::Name);
impl_contextual!(Opcode, ContextId::Opcode);
impl_contextual!(ResultType, ContextId::VecValType);
impl_contextual!(SectionId, ContextId::SectionId);
impl_contextual!(StartSection, ContextId::StartSec);
impl_contextual!(TableIdx, ContextId::TableIdx);
impl_contextual!(TableSection, ContextId::TableSec);
impl_contextual!(TableType, ContextId::TableType);
impl_contextual!(TypeIdx, ContextId::TypeIdx);
impl_contextual!(TypeSection, ContextId::TypeSec);
impl_contextual!(ValType, ContextId::ValType);
impl_contextual!(Version, ContextId::Version);
impl_contextual!(Vec<u8>, ContextId::VecByte);
impl_contextual!(Vec<FuncIdx>, ContextId::VecFuncIdx);
impl_contextual!(Vec<ValType>, ContextId::VecValType);

impl_decodable_for_u8_enum!(ElemType);
impl_decodable_for_u8_enum!(Mutability);
impl_decodable_for_u8_enum!(Opcode);
impl_decodable_for_u8_enum!(SectionId);

impl_decodable_for_le_u32_enum!(Magic, Error::InvalidMagic);
impl_decodable_for_le_u32_enum!(Version, Error::UnknownVersion);

impl_decodable_for_newtype!(FuncIdx);
impl_decodable_for_newtype!(GlobalIdx);
impl_decodable_for_newtype!(LabelIdx);
impl_decodable_for_newtype!(LocalIdx);
impl_decodable_for_newtype!(MemIdx);
impl_decodable_for_newtype!(MemType);
impl_decodable_for_newtype!(ResultType);
impl_decodable_for_newtype!(StartSection);
impl_decodable_for_newtype!(TableIdx);
impl_decodable_for_newtype!(TypeIdx);
impl_decodable_for_newtype!(CodeSection);
impl_decodable_for_newtype!(DataSection);
impl_decodable_for_newtype!(ElementSection);
impl_decodable_for_newtype!(ExportSection);
impl_decodable_for_newtype!(FunctionSection);
impl_decodable_for_newtype!(GlobalSection);
impl_decodable_for_newtype!(ImportSection);
impl_decodable_for_newtype!(MemorySection);
impl_decodable_for_newtype!(TableSection);
impl_decodable_for_newtype!(TypeSection);

impl Decodable for u8 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        decoder.read_byte_raw()
    }
}

impl Decodable for u32 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        decoder.read_leb128_raw()
    }
}

impl Decodable for i32 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        decoder.read_leb128_raw()
    }
}

impl Decodable for i64 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        decoder.read_leb128_raw()
    }
}

impl Decodable for f32 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let mut buf = [0u8; 4];
        decoder.read_exact_raw(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

impl Decodable for f64 {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let mut buf = [0u8; 8];
        decoder.read_exact_raw(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
}

// ValTypes get a dedicated error so that reports can distinguish "not a
// value type" from a generally bad token.
impl Decodable for ValType {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let byte = decoder.read_byte_raw()?;
        Self::try_from(byte).map_err(|_| Error::InvalidValType(byte))
    }
}

impl Decodable for Name {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let len: u32 = decoder.read(context)?;
        let mut bytes = vec![0u8; len as usize];
        decoder.read_exact(context, &mut bytes)?;
        let string = String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
        Ok(Self::new(string.into_boxed_str()))
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum FunctionTypeToken {
    Value = 0x60,
}
impl_contextual!(FunctionTypeToken, ContextId::FuncType);
impl_decodable_for_u8_enum!(FunctionTypeToken);

impl Decodable for FunctionType {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        decoder.read::<FunctionTypeToken>(context)?;
        Ok(Self {
            parameters: decoder.read(context)?,
            results: decoder.read(context)?,
        })
    }
}

#[derive(Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
enum LimitsToken {
    WithoutMax = 0x00,
    WithMax = 0x01,
}
impl_contextual!(LimitsToken, ContextId::Limits);
impl_decodable_for_u8_enum!(LimitsToken);

impl Decodable for Limits {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let token: LimitsToken = decoder.read(context)?;
        let min: u32 = decoder.read(context)?;
        let max = match token {
            LimitsToken::WithoutMax => None,
            LimitsToken::WithMax => Some(decoder.read(context)?),
        };
        Ok(Self { min, max })
    }
}

impl Decodable for TableType {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            elemtype: decoder.read(context)?,
            limits: decoder.read(context)?,
        })
    }
}

impl Decodable for GlobalType {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            value: decoder.read(context)?,
            mutability: decoder.read(context)?,
        })
    }
}

impl Decodable for Expression {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        expr::parse_expression(decoder, context)
    }
}

#[derive(Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
enum ImportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}
impl_contextual!(ImportDescriptorToken, ContextId::ImportDesc);
impl_decodable_for_u8_enum!(ImportDescriptorToken);

impl Decodable for ImportDescriptor {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        type Token = ImportDescriptorToken;

        match decoder.read(context)? {
            Token::Function => Ok(ImportDescriptor::Function(decoder.read(context)?)),
            Token::Table => Ok(ImportDescriptor::Table(decoder.read(context)?)),
            Token::Memory => Ok(ImportDescriptor::Memory(decoder.read(context)?)),
            Token::Global => Ok(ImportDescriptor::Global(decoder.read(context)?)),
        }
    }
}

impl Decodable for Import {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            module: decoder.read(context)?,
            field: decoder.read(context)?,
            descriptor: decoder.read(context)?,
        })
    }
}

impl Decodable for Global {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            ty: decoder.read(context)?,
            init: decoder.read(context)?,
        })
    }
}

#[derive(Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
enum ExportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}
impl_contextual!(ExportDescriptorToken, ContextId::ExportDesc);
impl_decodable_for_u8_enum!(ExportDescriptorToken);

impl Decodable for ExportDescriptor {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        type Token = ExportDescriptorToken;

        match decoder.read(context)? {
            Token::Function => Ok(ExportDescriptor::Function(decoder.read(context)?)),
            Token::Table => Ok(ExportDescriptor::Table(decoder.read(context)?)),
            Token::Memory => Ok(ExportDescriptor::Memory(decoder.read(context)?)),
            Token::Global => Ok(ExportDescriptor::Global(decoder.read(context)?)),
        }
    }
}

impl Decodable for Export {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            field: decoder.read(context)?,
            descriptor: decoder.read(context)?,
        })
    }
}

impl Decodable for ElementSegment {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            table: decoder.read(context)?,
            offset: decoder.read(context)?,
            init: decoder.read(context)?,
        })
    }
}

impl Decodable for DataSegment {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        Ok(Self {
            memory: decoder.read(context)?,
            offset: decoder.read(context)?,
            init: decoder.read(context)?,
        })
    }
}

impl Decodable for Locals {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let num_groups: u32 = decoder.read(context)?;
        let mut locals = Vec::new();
        for _ in 0..num_groups {
            let count: u32 = decoder.read(context)?;
            let valtype: ValType = decoder.read(context)?;
            let subtotal = locals.len() + (count as usize);
            if subtotal > MAX_LOCALS_PER_FUNCTION {
                return Err(Error::TooManyLocals(subtotal));
            }
            locals.resize(subtotal, valtype);
        }
        Ok(Locals::new(locals))
    }
}

impl Decodable for Function {
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>> {
        let expected_size = decoder.read::<u32>(context)? as usize;
        let offset_start = decoder.offset();
        let locals = decoder.read(context)?;
        let body = decoder.read(context)?;
        let actual_size = decoder.offset() - offset_start;
        if expected_size != actual_size {
            return Err(Error::InvalidFunctionLength {
                expected: expected_size as u32,
                actual: actual_size as u32,
            });
        }
        Ok(Self { locals, body })
    }
}
