use colored::*;
use emu_core::{EmuError, RunStatus, run_sources};
use script::ScriptError;
use vfs::{LoadErrorKind, VPath, load_csv};

const MANIFESTO: &str = r#"
================================================================================
VFS-EMU // LIVING SPECIFICATION
================================================================================

[ CONTRACT ]
1. Load a VFS from CSV. Any bad row fails the load; nothing partial survives.
2. Parse the startup script. Unknown commands stop the run before step 0.
3. Apply steps in order. The first failing step ends the run, no rollback.
4. Exit 0 when ok, 1 when a step failed, 2 when loading or parsing failed.

================================================================================
SCENARIO SUITE
================================================================================
"#;

fn main() {
    println!("{}", MANIFESTO);
    let mut passed = 0;
    let mut failed = 0;

    run_test("READ_EXISTING_FILE", test_read_existing, &mut passed, &mut failed);
    run_test("DELETE_MISSING_FAILS_AT_0", test_delete_missing, &mut passed, &mut failed);
    run_test("DUPLICATE_PATH_REJECTED", test_duplicate_path, &mut passed, &mut failed);
    run_test("STOP_AT_FAILING_STEP", test_stop_at_failure, &mut passed, &mut failed);
    run_test("UNKNOWN_OP_IS_CONFIG_ERROR", test_unknown_op, &mut passed, &mut failed);
    run_test("CSV_PATH_SET_ROUND_TRIP", test_round_trip, &mut passed, &mut failed);

    println!("\n--------------------------------------------------------------------------------");
    println!("{} passed, {} failed", passed, failed);
    if failed == 0 {
        println!("{}", "ALL SCENARIOS HOLD.".green().bold());
    } else {
        std::process::exit(1);
    }
}

// --- TEST INFRASTRUCTURE ---

fn run_test<F>(name: &str, test_fn: F, passed: &mut i32, failed: &mut i32)
where F: Fn() -> Result<(), String> {
    print!("TEST: {:<30} ... ", name);
    match test_fn() {
        Ok(_) => { println!("{}", "PASS".green()); *passed += 1; }
        Err(e) => { println!("{}", "FAIL".red()); println!("  -> {}", e); *failed += 1; }
    }
}

fn check(cond: bool, msg: &str) -> Result<(), String> {
    if cond { Ok(()) } else { Err(msg.to_string()) }
}

fn test_read_existing() -> Result<(), String> {
    let out = run_sources("vfs.csv", b"path,type,content\n/a.txt,file,hello\n", "read /a.txt\n", "$ ")
        .map_err(|e| e.to_string())?;
    check(out.result.status == RunStatus::Ok, &out.result.message)
}

fn test_delete_missing() -> Result<(), String> {
    let out = run_sources("vfs.csv", b"path,type,content\n", "delete /missing\n", "$ ")
        .map_err(|e| e.to_string())?;
    check(out.result.status == RunStatus::Failed, "expected failure")?;
    check(out.result.failed_step == Some(0), "expected failing index 0")
}

fn test_duplicate_path() -> Result<(), String> {
    match load_csv("dup.csv", b"path,type,content\n/a,dir,\n/a,dir,\n") {
        Err(e) if matches!(e.kind, LoadErrorKind::DuplicatePath(_)) => Ok(()),
        Err(e) => Err(format!("wrong error: {}", e)),
        Ok(_) => Err("duplicate accepted".into()),
    }
}

fn test_stop_at_failure() -> Result<(), String> {
    let script = "create /1\ncreate /2\ncreate /2\ncreate /3\n";
    let out = run_sources("vfs.csv", b"path,type,content\n", script, "$ ").map_err(|e| e.to_string())?;
    check(out.result.failed_step == Some(2), "expected failing index 2")?;
    let root = VPath::root();
    let paths: Vec<&VPath> = out.fs.paths().collect();
    check(paths.contains(&&root.join("2")), "step 1 was rolled back")?;
    check(!paths.contains(&&root.join("3")), "step 3 ran after the failure")
}

fn test_unknown_op() -> Result<(), String> {
    match run_sources("vfs.csv", b"path,type,content\n", "create /x\nreboot\n", "$ ") {
        Err(EmuError::Script(ScriptError::UnknownOp { line: 2, .. })) => Ok(()),
        Err(e) => Err(format!("wrong error: {}", e)),
        Ok(_) => Err("script ran".into()),
    }
}

fn test_round_trip() -> Result<(), String> {
    let csv = "path,type,content,encoding\n/usr/share/doc,dir,,\n/usr/bin/ls,file,AAEC,base64\n/readme,file,hi,\n";
    let fs = load_csv("a.csv", csv.as_bytes()).map_err(|e| e.to_string())?;
    let dumped = fs.to_csv().map_err(|e| e.to_string())?;
    let again = load_csv("b.csv", dumped.as_bytes()).map_err(|e| e.to_string())?;
    let same = fs.paths().eq(again.paths());
    check(same, "path sets differ after round trip")
}
