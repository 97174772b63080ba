// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Binary-level decoder tests over hand-assembled modules.

use galette::decode::{CustomSectionVisitor, Error as DecodeError};
use galette::storage::EndOfStream;
use galette::types::*;
use galette::{Error, Imports, Store, Value, instantiate, invoke, load};

const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
    let mut bytes = PREAMBLE.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

// (module
//   (func (export "add1") (param i32) (result i32)
//     local.get 0  i32.const 1  i32.add))
fn add1_bytes() -> Vec<u8> {
    module_bytes(&[
        // typesec: [(i32) -> (i32)]
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        // funcsec: [type 0]
        &[0x03, 0x02, 0x01, 0x00],
        // exportsec: [("add1", func 0)]
        &[0x07, 0x08, 0x01, 0x04, 0x61, 0x64, 0x64, 0x31, 0x00, 0x00],
        // codesec: [local.get 0; i32.const 1; i32.add; end]
        &[0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x41, 0x01, 0x6a, 0x0b],
    ])
}

fn malformed_error(bytes: &[u8]) -> DecodeError<EndOfStream> {
    match load(bytes) {
        Err(Error::Malformed(err)) => err.error,
        other => panic!("expected a malformed module, got {other:?}"),
    }
}

#[test]
fn empty_module_decodes() {
    let module = load(&PREAMBLE).unwrap();
    assert_eq!(module.version, Version::V1);
    assert!(module.typesec.is_empty());
    assert!(module.funcsec.is_empty());
    assert!(module.codesec.is_empty());
    assert!(module.startsec.is_none());
}

#[test]
fn bad_magic_is_malformed() {
    let mut bytes = PREAMBLE;
    bytes[0] = 0x01;
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::InvalidMagic(_)
    ));
}

#[test]
fn unknown_version_is_malformed() {
    let mut bytes = PREAMBLE;
    bytes[4] = 0x02;
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::UnknownVersion(2)
    ));
}

#[test]
fn truncated_preamble_is_malformed() {
    assert!(matches!(
        malformed_error(&PREAMBLE[..6]),
        DecodeError::Storage(EndOfStream)
    ));
}

#[test]
fn add1_decodes_to_the_expected_ast() {
    let module = load(&add1_bytes()).unwrap();

    assert_eq!(
        module.typesec[0],
        FunctionType::new(vec![ValType::I32], vec![ValType::I32])
    );
    assert_eq!(*module.funcsec[0], 0);

    let export = &module.exportsec[0];
    assert_eq!(export.field.as_str(), "add1");
    assert!(matches!(
        export.descriptor,
        ExportDescriptor::Function(idx) if *idx == 0
    ));

    let body: &[Instruction] = &module.codesec[0].body;
    assert_eq!(
        body,
        &[
            Instruction::LocalGet(LocalIdx::new(0)),
            Instruction::I32Const(1),
            Instruction::Numeric(Opcode::I32Add),
            Instruction::End,
        ]
    );
}

#[test]
fn add1_executes_from_the_binary() {
    let module = load(&add1_bytes()).unwrap();
    let mut store = Store::new();
    let addr = instantiate(&mut store, &module, &Imports::new()).unwrap();
    let add1 = store.instance(addr).unwrap().export_func("add1").unwrap();
    assert_eq!(
        invoke(&mut store, add1, &[Value::I32(0x7fff_ffff)]).unwrap(),
        vec![Value::I32(0x8000_0000)]
    );
}

#[test]
fn out_of_order_sections_are_malformed() {
    let bytes = module_bytes(&[
        // funcsec before typesec.
        &[0x03, 0x02, 0x01, 0x00],
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::OutOfOrderSection {
            before: SectionId::Function,
            after: SectionId::Type,
        }
    ));
}

#[test]
fn duplicate_sections_are_malformed() {
    let typesec: &[u8] = &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f];
    let bytes = module_bytes(&[typesec, typesec]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::DuplicateSection(SectionId::Type)
    ));
}

#[test]
fn section_length_must_match_content() {
    // The type section body is 6 bytes but declares 7.
    let bytes = module_bytes(&[
        &[0x01, 0x07, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        // Another section so the extra byte has somewhere to come from.
        &[0x03, 0x02, 0x01, 0x00],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::InvalidSectionLength {
            id: SectionId::Type,
            expected: 7,
            actual: 6,
        }
    ));
}

#[test]
fn invalid_utf8_in_names_is_malformed() {
    // exportsec: one export whose 1-byte name is 0xff.
    let bytes = module_bytes(&[&[0x07, 0x05, 0x01, 0x01, 0xff, 0x00, 0x00]]);
    assert!(matches!(malformed_error(&bytes), DecodeError::InvalidUtf8));
}

#[test]
fn overlong_leb128_is_malformed() {
    // typesec whose count is a 6-byte LEB128 (u32 allows at most 5).
    let bytes = module_bytes(&[&[0x01, 0x06, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00]]);
    assert!(matches!(malformed_error(&bytes), DecodeError::InvalidLeb128));
}

#[test]
fn function_and_code_counts_must_agree() {
    let bytes = module_bytes(&[
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        // One declared function, no code section.
        &[0x03, 0x02, 0x01, 0x00],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::FunctionCodeCountMismatch {
            functions: 1,
            bodies: 0,
        }
    ));
}

#[test]
fn truncated_code_section_is_malformed() {
    let mut bytes = add1_bytes();
    bytes.truncate(bytes.len() - 3);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::Storage(EndOfStream) | DecodeError::InvalidSectionLength { .. }
    ));
}

#[test]
fn function_body_size_must_match() {
    // Code body declares 8 bytes but holds 7.
    let bytes = module_bytes(&[
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x0a, 0x09, 0x01, 0x08, 0x00, 0x20, 0x00, 0x41, 0x01, 0x6a, 0x0b],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::InvalidFunctionLength {
            expected: 8,
            actual: 7,
        } | DecodeError::InvalidSectionLength { .. }
    ));
}

#[test]
fn call_indirect_requires_the_reserved_zero_byte() {
    // (func (call_indirect (type 0) with reserved byte 1)) — malformed.
    let bytes = module_bytes(&[
        &[0x01, 0x04, 0x01, 0x60, 0x00, 0x00],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x04, 0x04, 0x01, 0x70, 0x00, 0x01], // tablesec so the body parses
        &[0x0a, 0x08, 0x01, 0x06, 0x00, 0x41, 0x00, 0x11, 0x00, 0x01],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::InvalidToken(0x01) | DecodeError::InvalidSectionLength { .. }
    ));
}

#[test]
fn block_structure_decodes_with_terminators_attached() {
    // (func (result i32)
    //   i32.const 1
    //   if (result i32) i32.const 2 else i32.const 3 end)
    let body: &[u8] = &[
        0x00, // no locals
        0x41, 0x01, // i32.const 1
        0x04, 0x7f, // if (result i32)
        0x41, 0x02, // i32.const 2
        0x05, // else
        0x41, 0x03, // i32.const 3
        0x0b, // end (if)
        0x0b, // end (function)
    ];
    let mut code = vec![0x0a, (body.len() + 2) as u8, 0x01, body.len() as u8];
    code.extend_from_slice(body);
    let bytes = module_bytes(&[
        &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f],
        &[0x03, 0x02, 0x01, 0x00],
        &code,
    ]);

    let module = load(&bytes).unwrap();
    let instrs: &[Instruction] = &module.codesec[0].body;
    assert_eq!(
        instrs,
        &[
            Instruction::I32Const(1),
            Instruction::If {
                ty: BlockType::Value(ValType::I32),
                then_body: Expression::new(vec![
                    Instruction::I32Const(2),
                    Instruction::Else,
                ]),
                else_body: Expression::new(vec![
                    Instruction::I32Const(3),
                    Instruction::End,
                ]),
            },
            Instruction::End,
        ]
    );
}

#[test]
fn else_outside_if_is_malformed() {
    // (func else end) — else may only terminate an if arm.
    let bytes = module_bytes(&[
        &[0x01, 0x04, 0x01, 0x60, 0x00, 0x00],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x0a, 0x06, 0x01, 0x04, 0x00, 0x05, 0x0b, 0x0b],
    ]);
    assert!(matches!(
        malformed_error(&bytes),
        DecodeError::InvalidToken(0x05) | DecodeError::InvalidSectionLength { .. }
    ));
}

#[test]
fn custom_sections_are_skipped_but_named() {
    struct Collector(Vec<String>);
    impl CustomSectionVisitor for Collector {
        fn should_visit(&self, name: &str) -> bool {
            name == "keep"
        }
        fn visit(&mut self, custom: CustomSection) {
            self.0.push(format!("{}={}", custom.name.as_str(), custom.bytes.len()));
        }
    }

    // Custom sections may appear anywhere, including between ordered
    // sections.
    let bytes = module_bytes(&[
        // custom "skip" with 2 content bytes
        &[0x00, 0x07, 0x04, 0x73, 0x6b, 0x69, 0x70, 0xaa, 0xbb],
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        // custom "keep" with 3 content bytes
        &[0x00, 0x08, 0x04, 0x6b, 0x65, 0x65, 0x70, 0x01, 0x02, 0x03],
    ]);

    let mut collector = Collector(Vec::new());
    let module = Module::decode(
        galette::storage::BytesStream::new(bytes.as_slice()),
        &mut collector,
    )
    .unwrap();
    assert_eq!(module.typesec.len(), 1);
    assert_eq!(collector.0, vec!["keep=3".to_owned()]);
}

#[test]
fn memory_section_and_active_data_decode() {
    // (memory 1 2) (data (i32.const 5) "ab")
    let bytes = module_bytes(&[
        &[0x05, 0x04, 0x01, 0x01, 0x01, 0x02],
        &[
            0x0b, 0x08, 0x01, 0x00, 0x41, 0x05, 0x0b, 0x02, 0x61, 0x62,
        ],
    ]);
    let module = load(&bytes).unwrap();
    assert_eq!(module.memsec[0].min, 1);
    assert_eq!(module.memsec[0].max, Some(2));

    let segment = &module.datasec[0];
    assert_eq!(*segment.memory, 0);
    assert_eq!(segment.init, b"ab".to_vec());
    assert_eq!(
        *segment.offset,
        [Instruction::I32Const(5), Instruction::End]
    );
}
