// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Validate trait implementations for the module's sections.

use std::collections::HashSet;

use crate::types::*;

use super::{Error, ExpressionContext, Validate, Validator, validate_expression};

macro_rules! impl_validate_for_idx {
    ($idx_type:ty, $id:path, $count_method:ident) => {
        impl Validate for $idx_type {
            fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
                let index: u32 = **self;
                let capacity = validator.$count_method() as u32;
                if index >= capacity {
                    Err(Error::IndexOutOfBounds {
                        id: $id,
                        index,
                        capacity,
                    })
                } else {
                    Ok(())
                }
            }
        }
    };
}

macro_rules! impl_validate_for_newtype {
    ($type:ty) => {
        impl Validate for $type {
            fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
                validator.validate(&**self)
            }
        }
    };
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        for elem in self {
            validator.validate(elem)?;
        }
        Ok(())
    }
}

impl_validate_for_idx!(FuncIdx, SectionId::Function, function_count);
impl_validate_for_idx!(GlobalIdx, SectionId::Global, global_count);
impl_validate_for_idx!(MemIdx, SectionId::Memory, memory_count);
impl_validate_for_idx!(TableIdx, SectionId::Table, table_count);
impl_validate_for_idx!(TypeIdx, SectionId::Type, type_count);

impl_validate_for_newtype!(FunctionSection);
impl_validate_for_newtype!(GlobalSection);
impl_validate_for_newtype!(ImportSection);
impl_validate_for_newtype!(MemorySection);
impl_validate_for_newtype!(TableSection);
impl_validate_for_newtype!(ElementSection);
impl_validate_for_newtype!(DataSection);

impl Validate for Limits {
    fn validate(&self, _validator: &mut Validator) -> Result<(), Error> {
        if let Some(max) = self.max {
            if self.min > max {
                return Err(Error::LimitsMinExceedsMax { min: self.min, max });
            }
        }
        Ok(())
    }
}

impl Validate for TableType {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        validator.validate(&self.limits)
    }
}

impl Validate for MemType {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        validator.validate(&**self)?;
        let upper = self.max.unwrap_or(self.min);
        if self.min > MemType::MAX_PAGES || upper > MemType::MAX_PAGES {
            return Err(Error::MemorySizeTooLarge(self.min.max(upper)));
        }
        Ok(())
    }
}

impl Validate for Import {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        match &self.descriptor {
            ImportDescriptor::Function(typeidx) => validator.validate(typeidx),
            ImportDescriptor::Table(table) => validator.validate(table),
            ImportDescriptor::Memory(mem) => validator.validate(mem),
            ImportDescriptor::Global(_) => Ok(()), // A GlobalType is always valid.
        }
    }
}

impl Validate for Global {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        validate_expression(
            validator,
            &self.init,
            ExpressionContext::Constant(self.ty.value),
        )
    }
}

impl Validate for Export {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        match &self.descriptor {
            ExportDescriptor::Function(funcidx) => validator.validate(funcidx),
            ExportDescriptor::Table(tableidx) => validator.validate(tableidx),
            ExportDescriptor::Memory(memidx) => validator.validate(memidx),
            ExportDescriptor::Global(globalidx) => validator.validate(globalidx),
        }
    }
}

impl Validate for ExportSection {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        let mut names = HashSet::new();
        for export in self.iter() {
            if !names.insert(export.field.as_str()) {
                return Err(Error::DuplicateExportName(export.field.as_str().to_owned()));
            }
        }
        validator.validate(&**self)
    }
}

impl Validate for StartSection {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        let funcidx = **self;
        validator.validate(&funcidx)?;
        let signature = validator.function_signature(funcidx)?;
        if !signature.parameters.is_empty() || !signature.results.is_empty() {
            return Err(Error::InvalidStartFunction(funcidx));
        }
        Ok(())
    }
}

impl Validate for ElementSegment {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        validator.validate(&self.table)?;
        validate_expression(
            validator,
            &self.offset,
            ExpressionContext::Constant(ValType::I32),
        )?;
        validator.validate(&self.init)
    }
}

impl Validate for DataSegment {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        validator.validate(&self.memory)?;
        validate_expression(
            validator,
            &self.offset,
            ExpressionContext::Constant(ValType::I32),
        )
    }
}

impl Validate for CodeSection {
    fn validate(&self, validator: &mut Validator) -> Result<(), Error> {
        let funcsec = &validator.module.funcsec;
        if funcsec.len() != self.len() {
            return Err(Error::FunctionCodeCountMismatch {
                functions: funcsec.len() as u32,
                bodies: self.len() as u32,
            });
        }

        for (typeidx, function) in funcsec.iter().copied().zip(self.iter()) {
            let signature = validator.type_at(typeidx)?;

            // The frame's locals are the parameters followed by the
            // declared locals.
            let mut locals = signature.parameters.clone();
            locals.extend(function.locals.iter().copied());

            validate_expression(
                validator,
                &function.body,
                ExpressionContext::Function {
                    ty: signature,
                    locals: &locals,
                },
            )?;
        }
        Ok(())
    }
}
