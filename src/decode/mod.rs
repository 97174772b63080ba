// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format parsing.
//!
//! The decoder is a recursive-descent parser over the section structure of
//! the 1.0 binary format. It produces the typed, immutable [`Module`] AST;
//! every structural problem in the input surfaces as a [`Error`] (the
//! "malformed" class of failures) annotated with a stack of parsing
//! contexts for reporting.

mod decodable_impls;
mod expr;
mod leb128;

use std::fmt;

use num_enum::TryFromPrimitive;

use leb128::Leb128;

use crate::storage::Stream;
use crate::types::{
    CodeSection, CustomSection, DataSection, ElementSection, ExportSection, FunctionSection,
    GlobalSection, ImportSection, MemorySection, Module, Name, SectionId, TableSection,
    TypeSection, Version,
};

// The maximum depth of the parsing-context stack used for error reporting.
// Context frames track section-level structure, not expression nesting, so a
// small constant bound suffices.
const MAX_DEPTH: usize = 8;

// We represent this as an enum with one value to leverage the existing
// "decode this u32 enum" machinery to check for a valid magic value.
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
#[repr(u32)]
enum Magic {
    Value = 0x6d_73_61_00, // '\0asm'
}

// Represents parsing context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
enum ContextId {
    #[default]
    Invalid,
    BlockType,
    Byte,
    CodeSec,
    CustomSec,
    Data,
    DataSec,
    Elem,
    ElemSec,
    ElemType,
    Export,
    ExportDesc,
    ExportSec,
    Expr,
    F32,
    F64,
    Func,
    FuncIdx,
    FuncSec,
    FuncType,
    Global,
    GlobalIdx,
    GlobalSec,
    GlobalType,
    I32,
    I64,
    Import,
    ImportDesc,
    ImportSec,
    LabelIdx,
    Limits,
    LocalIdx,
    Locals,
    Magic,
    MemArg,
    MemIdx,
    MemSec,
    MemType,
    Mut,
    Name,
    Opcode,
    ReadingBytes,
    SectionId,
    SkippingBytes,
    StartSec,
    TableIdx,
    TableSec,
    TableType,
    TypeIdx,
    TypeSec,
    U32,
    ValType,
    VecByte,
    VecFuncIdx,
    VecValType,
    Version,
}

impl From<ContextId> for &'static str {
    fn from(id: ContextId) -> Self {
        match id {
            ContextId::Invalid => unreachable!("invalid context somehow reached!?"),
            ContextId::BlockType => "blocktype",
            ContextId::Byte => "byte",
            ContextId::CodeSec => "codesec",
            ContextId::CustomSec => "customsec",
            ContextId::Data => "data",
            ContextId::DataSec => "datasec",
            ContextId::Elem => "elem",
            ContextId::ElemSec => "elemsec",
            ContextId::ElemType => "elemtype",
            ContextId::Export => "export",
            ContextId::ExportDesc => "exportdesc",
            ContextId::ExportSec => "exportsec",
            ContextId::Expr => "expr",
            ContextId::F32 => "f32",
            ContextId::F64 => "f64",
            ContextId::Func => "func",
            ContextId::FuncIdx => "funcidx",
            ContextId::FuncSec => "funcsec",
            ContextId::FuncType => "functype",
            ContextId::Global => "global",
            ContextId::GlobalIdx => "globalidx",
            ContextId::GlobalSec => "globalsec",
            ContextId::GlobalType => "globaltype",
            ContextId::I32 => "i32",
            ContextId::I64 => "i64",
            ContextId::Import => "import",
            ContextId::ImportDesc => "importdesc",
            ContextId::ImportSec => "importsec",
            ContextId::LabelIdx => "labelidx",
            ContextId::Limits => "limits",
            ContextId::LocalIdx => "localidx",
            ContextId::Locals => "locals",
            ContextId::Magic => "magic",
            ContextId::MemArg => "memarg",
            ContextId::MemIdx => "memidx",
            ContextId::MemSec => "memsec",
            ContextId::MemType => "memtype",
            ContextId::Mut => "mut",
            ContextId::Name => "name",
            ContextId::Opcode => "opcode",
            ContextId::ReadingBytes => "reading bytes",
            ContextId::SectionId => "section ID",
            ContextId::SkippingBytes => "skipping bytes",
            ContextId::StartSec => "startsec",
            ContextId::TableIdx => "tableidx",
            ContextId::TableSec => "tablesec",
            ContextId::TableType => "tabletype",
            ContextId::TypeIdx => "typeidx",
            ContextId::TypeSec => "typesec",
            ContextId::U32 => "u32",
            ContextId::ValType => "valtype",
            ContextId::VecByte => "vec(byte)",
            ContextId::VecFuncIdx => "vec(funcidx)",
            ContextId::VecValType => "vec(valtype)",
            ContextId::Version => "version",
        }
    }
}

trait Contextual {
    const ID: ContextId;
}

// A frame of parsing context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ContextFrame {
    // A description of what is being parsed.
    context: &'static str,

    // Byte offset in the stream where this context was entered.
    offset: usize,
}

/// Stack for tracking parsing context during error reporting.
#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    offsets: [usize; MAX_DEPTH],
    ids: [ContextId; MAX_DEPTH],
    depth: u8,
}

impl ContextStack {
    // Pushes a new context frame, returning true if successful.
    fn push(&mut self, id: ContextId, offset: usize) -> bool {
        let depth = self.depth as usize;
        if depth >= MAX_DEPTH {
            return false;
        }
        self.offsets[depth] = offset;
        self.ids[depth] = id;
        self.depth += 1;
        true
    }

    // Pop the top context frame.
    fn pop(&mut self) {
        debug_assert!(self.depth > 0, "{self:#?}");
        self.depth -= 1;
    }

    // Returns an iterator over frames in "pushed" order (outermost to
    // innermost).
    fn iter(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.offsets
            .iter()
            .zip(&self.ids)
            .take(self.depth as usize)
            .map(|(&offset, &id)| ContextFrame {
                context: id.into(),
                offset,
            })
    }
}

/// A parsing error with additional context around what hierarchy of things
/// were being decoded at the time.
pub struct ErrorWithContext<E> {
    /// The underlying parsing error.
    pub error: Error<E>,
    pub(crate) context: ContextStack,
}

impl<E: fmt::Debug> fmt::Debug for ErrorWithContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)?;
        for (i, frame) in self.context.iter().enumerate() {
            write!(f, "\n{:#x}: ", frame.offset)?;
            for _ in 0..i {
                write!(f, "  ")?;
            }
            write!(f, "{}", frame.context)?;
        }
        Ok(())
    }
}

/// Represents errors that can arise during module parsing, generic over the
/// underlying storage's error type.
#[derive(Clone, Eq, PartialEq)]
pub enum Error<E> {
    /// A given section appears more than once in the module.
    DuplicateSection(SectionId),
    /// Block-structured instructions nest beyond the implementation limit.
    ExcessiveBlockNesting,
    /// Parsing-context stack exceeded its depth bound.
    ExcessiveParsingDepth {
        context: &'static str,
        offset: usize,
    },
    /// The function and code sections declare different numbers of
    /// functions.
    FunctionCodeCountMismatch { functions: u32, bodies: u32 },
    /// Function body length doesn't match the declared length.
    InvalidFunctionLength { expected: u32, actual: u32 },
    /// Invalid LEB128 encoding encountered.
    InvalidLeb128,
    /// Invalid WebAssembly magic number.
    InvalidMagic(u32),
    /// Section length doesn't match the declared length.
    InvalidSectionLength {
        id: SectionId,
        expected: u32,
        actual: u32,
    },
    /// Invalid byte token encountered during parsing.
    InvalidToken(u8),
    /// Invalid UTF-8 encoding in a name field.
    InvalidUtf8,
    /// Invalid value type encoding encountered.
    InvalidValType(u8),
    /// (Non-custom) sections appear in the wrong order.
    OutOfOrderSection { before: SectionId, after: SectionId },
    /// Error from the underlying storage; unexpected EOF surfaces here.
    Storage(E),
    /// Function declares too many local variables (exceeding an
    /// implementation-defined limit).
    TooManyLocals(usize),
    /// Unsupported WebAssembly version number.
    UnknownVersion(u32),
}

impl<E: fmt::Debug> fmt::Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateSection(id) => write!(f, "duplicate of section ({id:?})"),
            Error::ExcessiveBlockNesting => write!(f, "block instructions nested too deeply"),
            Error::ExcessiveParsingDepth { context, offset } => {
                write!(f, "unexpected frame at {offset:#x}: {context}")
            }
            Error::FunctionCodeCountMismatch { functions, bodies } => write!(
                f,
                "function and code sections have inconsistent lengths: {functions} vs {bodies}"
            ),
            Error::InvalidFunctionLength { expected, actual } => write!(
                f,
                "invalid func length: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidLeb128 => write!(f, "invalid LEB128-encoding"),
            Error::InvalidMagic(magic) => write!(f, "invalid magic ({magic:#x})"),
            Error::InvalidSectionLength {
                id,
                expected,
                actual,
            } => write!(
                f,
                "invalid section length for {id:?}: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidToken(token) => write!(f, "invalid byte token ({token:#x})"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Error::InvalidValType(valtype) => write!(f, "invalid valtype ({valtype:#x})"),
            Error::OutOfOrderSection { before, after } => {
                write!(f, "out-of-order sections: {before:?} before {after:?}")
            }
            Error::Storage(err) => write!(f, "{err:?}"),
            Error::TooManyLocals(count) => {
                write!(f, "too many locals: at least {count} were specified")
            }
            Error::UnknownVersion(version) => write!(f, "unknown version ({version:#x})"),
        }
    }
}

impl<E> leb128::Error for Error<E> {
    fn invalid_leb128() -> Self {
        Error::InvalidLeb128
    }
}

pub(crate) struct Decoder<S: Stream> {
    stream: S,
}

impl<S: Stream> Decoder<S> {
    fn new(stream: S) -> Self {
        Self { stream }
    }

    // Pushes a context frame before a call, popping it if successful.
    fn with_context<F, R>(
        &mut self,
        context: &mut ContextStack,
        id: ContextId,
        f: F,
    ) -> Result<R, Error<S::Error>>
    where
        F: FnOnce(&mut Self, &mut ContextStack) -> Result<R, Error<S::Error>>,
    {
        let offset = self.stream.offset();
        if !context.push(id, offset) {
            return Err(Error::ExcessiveParsingDepth {
                context: id.into(),
                offset,
            });
        }
        let val = f(self, context)?;
        context.pop();
        Ok(val)
    }

    fn offset(&mut self) -> usize {
        self.stream.offset()
    }

    fn read_byte_raw(&mut self) -> Result<u8, Error<S::Error>> {
        self.stream.read_byte().map_err(Error::Storage)
    }

    fn read_leb128_raw<T: Leb128>(&mut self) -> Result<T, Error<S::Error>> {
        leb128::read(|| self.read_byte_raw())
    }

    fn read_zero_byte(&mut self) -> Result<(), Error<S::Error>> {
        let byte = self.read_byte_raw()?;
        if byte == 0 {
            Ok(())
        } else {
            Err(Error::InvalidToken(byte))
        }
    }

    fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<(), Error<S::Error>> {
        self.stream.read_exact(buf).map_err(Error::Storage)
    }

    fn read_exact(
        &mut self,
        context: &mut ContextStack,
        buf: &mut [u8],
    ) -> Result<(), Error<S::Error>> {
        self.with_context(context, ContextId::ReadingBytes, |decoder, _| {
            decoder.read_exact_raw(buf)
        })
    }

    fn skip_bytes(
        &mut self,
        context: &mut ContextStack,
        count: usize,
    ) -> Result<(), Error<S::Error>> {
        self.with_context(context, ContextId::SkippingBytes, |decoder, _| {
            decoder.stream.skip_bytes(count).map_err(Error::Storage)
        })
    }

    fn read_bytes(
        &mut self,
        context: &mut ContextStack,
        count: usize,
    ) -> Result<Box<[u8]>, Error<S::Error>> {
        let mut buf = vec![0u8; count];
        self.read_exact(context, &mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    fn read<T: Decodable + Contextual>(
        &mut self,
        context: &mut ContextStack,
    ) -> Result<T, Error<S::Error>> {
        self.with_context(context, T::ID, |decoder, context| {
            T::decode(decoder, context)
        })
    }
}

// Types that can be decoded from a storage stream.
trait Decodable: Sized {
    /// Parse this type from the binary stream.
    fn decode<S: Stream>(
        decoder: &mut Decoder<S>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<S::Error>>;
}

/// Visitor pattern for processing custom sections during module parsing.
pub trait CustomSectionVisitor {
    /// Returns whether this visitor wants to process the custom section with
    /// the given name.
    fn should_visit(&self, name: &str) -> bool;
    /// Process a custom section. Only called if `should_visit` returned
    /// true.
    fn visit(&mut self, custom: CustomSection);
}

/// No-op implementation of [`CustomSectionVisitor`] that skips all custom
/// sections.
pub struct NoCustomSectionVisitor {}

impl CustomSectionVisitor for NoCustomSectionVisitor {
    fn should_visit(&self, _: &str) -> bool {
        false
    }
    fn visit(&mut self, _: CustomSection) {
        unreachable!()
    }
}

impl Module {
    /// Parse a WebAssembly module from a storage stream.
    pub fn decode<S, V>(stream: S, visitor: &mut V) -> Result<Self, ErrorWithContext<S::Error>>
    where
        S: Stream,
        V: CustomSectionVisitor,
    {
        let mut context = ContextStack::default();
        match decode_module(stream, &mut context, visitor) {
            Ok(module) => Ok(module),
            Err(error) => Err(ErrorWithContext { error, context }),
        }
    }
}

// Parse a WebAssembly module from a storage stream.
fn decode_module<S, V>(
    storage: S,
    context: &mut ContextStack,
    customsec_visitor: &mut V,
) -> Result<Module, Error<S::Error>>
where
    S: Stream,
    V: CustomSectionVisitor,
{
    let mut decoder = Decoder::new(storage);
    decoder.read::<Magic>(context)?;
    let version: Version = decoder.read(context)?;

    let mut typesec = TypeSection::default();
    let mut importsec = ImportSection::default();
    let mut funcsec = FunctionSection::default();
    let mut tablesec = TableSection::default();
    let mut memsec = MemorySection::default();
    let mut globalsec = GlobalSection::default();
    let mut exportsec = ExportSection::default();
    let mut startsec = None;
    let mut elemsec = ElementSection::default();
    let mut codesec = CodeSection::default();
    let mut datasec = DataSection::default();

    // The last non-custom section ID seen.
    let mut last_id = None;
    loop {
        // There is no in-band signal in the WASM format for the end of a
        // module. The best we can generically do is expect an EOF at a
        // section boundary.
        let id = decoder.read(context);
        if let Err(Error::Storage(ref err)) = id {
            if S::is_eof(err) {
                break;
            }
        }
        let id: SectionId = id?;

        // Apart from custom sections, which can appear anywhere in the
        // format, sections must appear at most once and in increasing order.
        if id != SectionId::Custom {
            if let Some(last_id) = last_id {
                if id == last_id {
                    return Err(Error::DuplicateSection(id));
                }
                if id < last_id {
                    return Err(Error::OutOfOrderSection {
                        before: last_id,
                        after: id,
                    });
                }
            }
            last_id = Some(id);
        }

        let len: u32 = decoder.read(context)?;
        let offset_start = decoder.offset();
        match id {
            SectionId::Custom => {
                let name: Name = decoder.read(context)?;
                let name_len = decoder.offset() - offset_start;

                // The name alone must not exceed the declared section
                // length; if it does, we have read into the next section.
                if name_len > len as usize {
                    return Err(Error::InvalidSectionLength {
                        id,
                        expected: len,
                        actual: name_len as u32,
                    });
                }
                let content_len = (len as usize) - name_len;
                if customsec_visitor.should_visit(name.as_str()) {
                    let bytes = decoder.read_bytes(context, content_len)?;
                    customsec_visitor.visit(CustomSection { name, bytes });
                } else {
                    decoder.skip_bytes(context, content_len)?;
                }
            }
            SectionId::Type => typesec = decoder.read(context)?,
            SectionId::Import => importsec = decoder.read(context)?,
            SectionId::Function => funcsec = decoder.read(context)?,
            SectionId::Table => tablesec = decoder.read(context)?,
            SectionId::Memory => memsec = decoder.read(context)?,
            SectionId::Global => globalsec = decoder.read(context)?,
            SectionId::Export => exportsec = decoder.read(context)?,
            SectionId::Start => startsec = Some(decoder.read(context)?),
            SectionId::Element => elemsec = decoder.read(context)?,
            SectionId::Code => codesec = decoder.read(context)?,
            SectionId::Data => datasec = decoder.read(context)?,
        }
        let actual_section_len = decoder.offset() - offset_start;
        if actual_section_len != (len as usize) {
            return Err(Error::InvalidSectionLength {
                id,
                expected: len,
                actual: actual_section_len as u32,
            });
        }
    }

    // Function bodies pair by index with the type declarations in the
    // function section; a count mismatch means the sections cannot be
    // zipped.
    if funcsec.len() != codesec.len() {
        return Err(Error::FunctionCodeCountMismatch {
            functions: funcsec.len() as u32,
            bodies: codesec.len() as u32,
        });
    }

    tracing::trace!(
        types = typesec.len(),
        imports = importsec.len(),
        functions = funcsec.len(),
        exports = exportsec.len(),
        "decoded module"
    );

    Ok(Module {
        version,
        typesec,
        importsec,
        funcsec,
        tablesec,
        memsec,
        globalsec,
        exportsec,
        startsec,
        elemsec,
        codesec,
        datasec,
    })
}
