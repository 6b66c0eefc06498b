//! Differential tests: the native codegen path and the tree-walking
//! interpreter must produce byte-identical stdout for every program the
//! parser accepts (the bisimulation property).
//!
//! Capturing codegen's stdout means temporarily redirecting file
//! descriptor 1 into a pipe — the emitted code talks to the kernel
//! directly via `write` syscalls, bypassing anything Rust's `io::stdout`
//! would let us intercept. Fd 1 is process-global, so every test that
//! captures it is serialized behind `STDOUT_CAPTURE`.

#![allow(unsafe_code)]

use std::io::Read;
use std::os::unix::io::FromRawFd;
use std::sync::{Mutex, OnceLock};

fn stdout_capture_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Runs `tinyc::run(source)` with fd 1 redirected into a pipe and returns
/// what the emitted code wrote to it.
fn capture_codegen_stdout(source: &str) -> String {
    let _guard = stdout_capture_lock().lock().unwrap_or_else(|e| e.into_inner());

    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid 2-element buffer for `pipe` to fill in.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() failed: {}", std::io::Error::last_os_error());
    let (read_fd, write_fd) = (fds[0], fds[1]);

    // SAFETY: fd 1 is a valid open descriptor (the test process's stdout).
    let saved_stdout = unsafe { libc::dup(1) };
    assert!(saved_stdout >= 0, "dup(1) failed");
    // SAFETY: `write_fd` is the valid write end of the pipe just created.
    let rc = unsafe { libc::dup2(write_fd, 1) };
    assert_eq!(rc, 1, "dup2 onto fd 1 failed");
    // SAFETY: `write_fd` has been duplicated onto fd 1; the original is
    // no longer needed.
    unsafe {
        libc::close(write_fd);
    }

    let result = tinyc::run(source);

    // SAFETY: `saved_stdout` was a valid duplicate of the original fd 1.
    unsafe {
        libc::dup2(saved_stdout, 1);
        libc::close(saved_stdout);
    }
    result.expect("codegen run");

    // SAFETY: `read_fd` is the valid read end of the pipe; it is not used
    // through any other path, so taking ownership here is sound.
    let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
    let mut out = String::new();
    file.read_to_string(&mut out).expect("read captured stdout");
    out
}

fn interpret(source: &str) -> String {
    let mut out = Vec::new();
    tinyc::interpret(source, &mut out).expect("interpret");
    String::from_utf8(out).expect("utf8 stdout")
}

/// Asserts codegen and the interpreter agree with each other, and with the
/// expected stdout, for one program.
fn assert_bisimilar(source: &str, expected: &str) {
    assert_eq!(interpret(source), expected, "interpreter mismatch for: {source}");
    assert_eq!(
        capture_codegen_stdout(source),
        expected,
        "codegen mismatch for: {source}"
    );
}

#[test]
fn scenario_1_constant_folded_arithmetic() {
    assert_bisimilar("void main(){ int x = 3+4*5; cout << x; }", "23 ");
}

#[test]
fn scenario_2_while_loop_counter() {
    assert_bisimilar(
        "void main(){ int i=0; while(i<3){ cout << i; i++; } }",
        "0 1 2 ",
    );
}

#[test]
fn scenario_3_negative_literal_and_endl() {
    assert_bisimilar("void main(){ int n = -7; cout << n << endl; }", "-7 \n");
}

#[test]
fn scenario_4_if_else_picks_else() {
    assert_bisimilar("void main(){ if (2<1) cout<<1; else cout<<2; }", "2 ");
}

#[test]
fn scenario_5_for_loop_accumulator() {
    assert_bisimilar(
        "void main(){ int s=0; for(int i=1; i<=4; i++) s += i; cout << s; }",
        "10 ",
    );
}

#[test]
fn scenario_6_repeat_then_endl() {
    assert_bisimilar("void main(){ repeat(3){ cout << 9; } cout << endl; }", "9 9 9 \n");
}

#[test]
fn if_zero_never_executes_then() {
    assert_bisimilar("void main(){ if (0) cout << 1; cout << 2; }", "2 ");
}

#[test]
fn if_one_else_never_executes() {
    assert_bisimilar("void main(){ if (1) cout << 1; else cout << 2; }", "1 ");
}

#[test]
fn while_zero_runs_no_iterations() {
    assert_bisimilar("void main(){ while (0) cout << 1; cout << 2; }", "2 ");
}

#[test]
fn do_while_zero_runs_exactly_once() {
    assert_bisimilar("void main(){ do { cout << 1; } while (0); }", "1 ");
}

#[test]
fn repeat_zero_runs_no_iterations() {
    assert_bisimilar("void main(){ repeat (0) { cout << 1; } cout << 2; }", "2 ");
}

#[test]
fn repeat_negative_count_runs_no_iterations() {
    assert_bisimilar("void main(){ repeat (-5) { cout << 1; } cout << 2; }", "2 ");
}

#[test]
fn nested_loops_and_compound_assignment() {
    assert_bisimilar(
        "void main(){ int total = 0; for (int i = 0; i < 3; i++) { for (int j = 0; j < 3; j++) { total += 1; } } cout << total; }",
        "9 ",
    );
}

#[test]
fn do_while_counts_down() {
    assert_bisimilar(
        "void main(){ int n = 3; do { cout << n; n--; } while (n > 0); }",
        "3 2 1 ",
    );
}

#[test]
fn logical_and_or_short_circuit_observable_values() {
    assert_bisimilar(
        "void main(){ int a = 1; int b = 0; cout << (a and b) << (a or b) << (b and b); }",
        "0 1 0 ",
    );
}

#[test]
fn division_and_modulo_truncate_toward_dividend_sign() {
    assert_bisimilar("void main(){ cout << (-7/2) << (-7%2) << (7/-2) << (7%-2); }", "-3 -1 -3 1 ");
}

#[test]
fn runtime_exponent_with_variable_operand() {
    assert_bisimilar(
        "void main(){ int base = 2; int exp = 5; cout << (base ** exp); }",
        "32 ",
    );
}

#[test]
fn constant_exponent_is_folded_and_right_associative() {
    assert_bisimilar("void main(){ cout << (2 ** 3 ** 2); }", "512 ");
}

#[test]
fn exponent_with_nonpositive_runtime_exponent_is_one() {
    assert_bisimilar(
        "void main(){ int n = -4; cout << (9 ** n); int z = 0; cout << (9 ** z); }",
        "1 1 ",
    );
}
