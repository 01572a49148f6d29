use std::fs;
use std::path::{Path, PathBuf};

use flowguard_core::ir::{CmpPred, ModuleBuilder, Ty, ValueRef};
use predicates::prelude::*;
use tempfile::tempdir;

/// Writes a module where `bb.fill` zeroes `rsi` bytes at `rdi` inside a loop
/// and `bb.main` calls `bb.0x1000` (the `read` stub) then `bb.fill`.
fn write_module(dir: &Path) -> PathBuf {
    let mut mb = ModuleBuilder::new("cli-fixture").arch("x86_64");
    let rdi = mb.global("rdi");
    let rsi = mb.global("rsi");
    let rsp = mb.global("rsp");
    mb.declare("newpc", Ty::Void);
    {
        let mut stub = mb.function("bb.0x1000");
        stub.entry_metadata(vec![rdi, rsi]);
        stub.ret(None);
    }
    {
        let mut f = mb.function("bb.fill");
        f.entry_metadata(vec![rdi, rsi]);
        let entry = f.block("entry");
        let header = f.block("header");
        let body = f.block("body");
        let exit = f.block("exit");
        f.switch_to(entry);
        let n = f.load("n", rsi);
        let dst = f.load("dst", rdi);
        let sp = f.load("sp", rsp);
        let slot = f.add("slot", sp, ValueRef::Const(16));
        f.int_to_ptr("frame", slot);
        f.br(header);
        f.switch_to(header);
        let i = f.phi("i");
        let c = f.cmp("c", CmpPred::Ult, i, n);
        f.cond_br(c, body, exit);
        f.switch_to(body);
        let addr = f.add("addr", dst, i);
        let p = f.int_to_ptr("p", addr);
        f.store(ValueRef::Const(0), p);
        f.call_void("newpc", vec![ValueRef::Const(0x401000), ValueRef::Const(4)]);
        let next = f.add("next", i, ValueRef::Const(1));
        f.br(header);
        f.add_incoming(i, ValueRef::Const(0), entry).add_incoming(i, next, body);
        f.switch_to(exit);
        f.ret(None);
        f.add_loop("fill.loop", Some(header), vec![header, body]);
    }
    {
        let mut m = mb.function("bb.main");
        m.entry_metadata(vec![rdi, rsi]);
        m.call_void("bb.0x1000", Vec::new());
        m.call_void("bb.fill", Vec::new());
        m.ret(None);
    }
    let module = mb.build();
    let path = dir.join("module.json");
    fs::write(&path, module.to_json_string().expect("serialize module")).expect("write module");
    path
}

#[test]
fn analyze_prints_summary_and_writes_report() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());
    let inputs = dir.path().join("inputs.csv");
    let relocs = dir.path().join("relocs.csv");
    fs::write(&inputs, "read,2,rsi\n").expect("write inputs");
    fs::write(&relocs, "0x1000,read\n").expect("write relocs");
    let output = dir.path().join("out").join("report.json");

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .arg("analyze")
        .arg("--module")
        .arg(&module)
        .arg("--inputs")
        .arg(&inputs)
        .arg("--relocations")
        .arg(&relocs)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("bb.fill: VULNERABLE"))
        .stdout(predicate::str::contains("bb.main: safe, input-reachable"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("read report")).expect("json");
    assert_eq!(report["module"], "cli-fixture");
    assert_eq!(report["module_hash"].as_str().map(str::len), Some(64));
    let store = &report["functions"]["bb.fill"]["loop_dependencies"]["fill.loop"]["risky_stores"][0];
    assert_eq!(store["binary_address"], "0x401000");
    assert_eq!(report["functions"]["bb.main"]["is_marked"], true);
}

#[test]
fn analyze_honours_sections_flag() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());
    let output = dir.path().join("report.json");

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .args(["analyze", "--sections", "rfp", "--module"])
        .arg(&module)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("read report")).expect("json");
    let fill = &report["functions"]["bb.fill"];
    assert!(fill.get("loop_dependencies").is_none());
    assert_eq!(fill["function_infos"]["function_virt_stack_params"]["sp1"]["offset"], 16);
}

#[test]
fn analyze_rejects_unknown_section() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .args(["analyze", "--sections", "ldp,bogus", "--module"])
        .arg(&module)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --sections value"));
}

#[test]
fn analyze_fails_for_missing_module() {
    let dir = tempdir().expect("tempdir");
    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .arg("analyze")
        .arg("--module")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load module"));
}

#[test]
fn max_steps_prints_call_graph_bound() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .arg("max-steps")
        .arg("--module")
        .arg(&module)
        .assert()
        .success()
        .stdout(predicate::str::contains("Max steps: 3"));
}

#[test]
fn params_lists_register_and_stack_parameters() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .args(["params", "--function", "bb.fill", "--module"])
        .arg(&module)
        .assert()
        .success()
        .stdout(predicate::str::contains("@rdi"))
        .stdout(predicate::str::contains("sp1 (offset 16): %frame = inttoptr i64 %slot to ptr"));
}

#[test]
fn params_reports_unknown_function() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("flowguard")
        .args(["params", "--function", "bb.nope", "--module"])
        .arg(&module)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Function not found"));
}
