// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Drives a small hand-assembled specification script end to end: modules
//! load from disk, assertions run against the runtime facade, and the
//! registry links one module's exports into another's imports.

use std::fs;
use std::path::PathBuf;

use spec_tests::{Runner, TestFile};

const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
    let mut bytes = PREAMBLE.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

// (func (export "add1") (param i32) (result i32)
//   local.get 0  i32.const 1  i32.add)
fn add1_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x08, 0x01, 0x04, 0x61, 0x64, 0x64, 0x31, 0x00, 0x00],
        &[0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x41, 0x01, 0x6a, 0x0b],
    ])
}

// (func (export "div_s") (param i32 i32) (result i32)
//   local.get 0  local.get 1  i32.div_s)
fn div_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x09, 0x01, 0x05, 0x64, 0x69, 0x76, 0x5f, 0x73, 0x00, 0x00],
        &[0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6d, 0x0b],
    ])
}

// (func (export "loop") call 0)
fn rec_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x01, 0x04, 0x01, 0x60, 0x00, 0x00],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x08, 0x01, 0x04, 0x6c, 0x6f, 0x6f, 0x70, 0x00, 0x00],
        &[0x0a, 0x06, 0x01, 0x04, 0x00, 0x10, 0x00, 0x0b],
    ])
}

// (global (export "g") i32 (i32.const 7))
fn global_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x06, 0x06, 0x01, 0x7f, 0x00, 0x41, 0x07, 0x0b],
        &[0x07, 0x05, 0x01, 0x01, 0x67, 0x03, 0x00],
    ])
}

// (import "globals" "g" (global i32))
// (func (export "f") (result i32) global.get 0  i32.const 1  i32.add)
fn importer_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f],
        &[
            0x02, 0x0e, 0x01, 0x07, 0x67, 0x6c, 0x6f, 0x62, 0x61, 0x6c, 0x73, 0x01, 0x67, 0x03,
            0x7f, 0x00,
        ],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x05, 0x01, 0x01, 0x66, 0x00, 0x00],
        &[0x0a, 0x09, 0x01, 0x07, 0x00, 0x23, 0x00, 0x41, 0x01, 0x6a, 0x0b],
    ])
}

// (func (export "nan") (result f32) f32.const nan  f32.nearest)
fn nan_wasm() -> Vec<u8> {
    module_bytes(&[
        &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7d],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x07, 0x01, 0x03, 0x6e, 0x61, 0x6e, 0x00, 0x00],
        &[
            0x0a, 0x0a, 0x01, 0x08, 0x00, 0x43, 0x00, 0x00, 0xc0, 0x7f, 0x90, 0x0b,
        ],
    ])
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("galette-spec-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn script_runs_end_to_end() {
    let dir = scratch_dir("script");
    fs::write(dir.join("add1.wasm"), add1_wasm()).unwrap();
    fs::write(dir.join("div.wasm"), div_wasm()).unwrap();
    fs::write(dir.join("rec.wasm"), rec_wasm()).unwrap();
    fs::write(dir.join("global.wasm"), global_wasm()).unwrap();
    fs::write(dir.join("importer.wasm"), importer_wasm()).unwrap();
    fs::write(dir.join("nan.wasm"), nan_wasm()).unwrap();
    fs::write(dir.join("bad-magic.wasm"), [1u8, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let script = r#"{
      "source_filename": "harness.wast",
      "commands": [
        {"type": "module", "line": 1, "filename": "add1.wasm"},
        {"type": "assert_return", "line": 2,
         "action": {"type": "invoke", "field": "add1",
                    "args": [{"type": "i32", "value": "41"}]},
         "expected": [{"type": "i32", "value": "42"}]},
        {"type": "assert_return", "line": 3,
         "action": {"type": "invoke", "field": "add1",
                    "args": [{"type": "i32", "value": "2147483647"}]},
         "expected": [{"type": "i32", "value": "2147483648"}]},

        {"type": "module", "line": 10, "filename": "div.wasm"},
        {"type": "assert_return", "line": 11,
         "action": {"type": "invoke", "field": "div_s",
                    "args": [{"type": "i32", "value": "7"},
                             {"type": "i32", "value": "4294967294"}]},
         "expected": [{"type": "i32", "value": "4294967293"}]},
        {"type": "assert_trap", "line": 12,
         "action": {"type": "invoke", "field": "div_s",
                    "args": [{"type": "i32", "value": "10"},
                             {"type": "i32", "value": "0"}]},
         "text": "integer divide by zero", "expected": []},
        {"type": "assert_trap", "line": 13,
         "action": {"type": "invoke", "field": "div_s",
                    "args": [{"type": "i32", "value": "2147483648"},
                             {"type": "i32", "value": "4294967295"}]},
         "text": "integer overflow", "expected": []},

        {"type": "module", "line": 20, "filename": "rec.wasm"},
        {"type": "assert_exhaustion", "line": 21,
         "action": {"type": "invoke", "field": "loop", "args": []},
         "text": "call stack exhausted", "expected": []},

        {"type": "module", "line": 30, "filename": "global.wasm", "name": "$g"},
        {"type": "assert_return", "line": 31,
         "action": {"type": "get", "field": "g", "module": "$g"},
         "expected": [{"type": "i32", "value": "7"}]},
        {"type": "register", "line": 32, "as": "globals", "name": "$g"},
        {"type": "module", "line": 33, "filename": "importer.wasm"},
        {"type": "assert_return", "line": 34,
         "action": {"type": "invoke", "field": "f", "args": []},
         "expected": [{"type": "i32", "value": "8"}]},

        {"type": "module", "line": 40, "filename": "nan.wasm"},
        {"type": "assert_return_arithmetic_nan", "line": 41,
         "action": {"type": "invoke", "field": "nan", "args": []},
         "expected": [{"type": "f32"}]},

        {"type": "assert_malformed", "line": 50, "filename": "bad-magic.wasm",
         "text": "magic header not detected", "module_type": "binary"}
      ]
    }"#;

    let file: TestFile = serde_json::from_str(script).unwrap();
    let mut runner = Runner::new(&dir);
    runner.run_file(&file).unwrap();
}

#[test]
fn failed_assertions_report_the_line() {
    let dir = scratch_dir("fail");
    fs::write(dir.join("add1.wasm"), add1_wasm()).unwrap();

    let script = r#"{
      "source_filename": "fail.wast",
      "commands": [
        {"type": "module", "line": 1, "filename": "add1.wasm"},
        {"type": "assert_return", "line": 2,
         "action": {"type": "invoke", "field": "add1",
                    "args": [{"type": "i32", "value": "1"}]},
         "expected": [{"type": "i32", "value": "3"}]}
      ]
    }"#;

    let file: TestFile = serde_json::from_str(script).unwrap();
    let mut runner = Runner::new(&dir);
    let failure = runner.run_file(&file).unwrap_err();
    assert_eq!(failure.line, 2);
    assert!(failure.to_string().contains("fail.wast:2"));
}

#[test]
fn modules_may_import_the_spectest_namespace() {
    // (import "spectest" "global_i32" (global i32))
    // (func (export "f") (result i32) global.get 0)
    let dir = scratch_dir("spectest");
    let bytes = module_bytes(&[
        &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f],
        &[
            0x02, 0x18, 0x01, 0x08, 0x73, 0x70, 0x65, 0x63, 0x74, 0x65, 0x73, 0x74, 0x0a, 0x67,
            0x6c, 0x6f, 0x62, 0x61, 0x6c, 0x5f, 0x69, 0x33, 0x32, 0x03, 0x7f, 0x00,
        ],
        &[0x03, 0x02, 0x01, 0x00],
        &[0x07, 0x05, 0x01, 0x01, 0x66, 0x00, 0x00],
        &[0x0a, 0x06, 0x01, 0x04, 0x00, 0x23, 0x00, 0x0b],
    ]);
    fs::write(dir.join("uses-spectest.wasm"), bytes).unwrap();

    let script = r#"{
      "source_filename": "spectest.wast",
      "commands": [
        {"type": "module", "line": 1, "filename": "uses-spectest.wasm"},
        {"type": "assert_return", "line": 2,
         "action": {"type": "invoke", "field": "f", "args": []},
         "expected": [{"type": "i32", "value": "666"}]}
      ]
    }"#;

    let file: TestFile = serde_json::from_str(script).unwrap();
    let mut runner = Runner::new(&dir);
    runner.run_file(&file).unwrap();
}
