//! Property-based tests for the operator-semantics and boundary-behavior
//! properties in the crate's testable-properties section: comparisons
//! always yield exactly 0 or 1, division/modulo match Rust's (and
//! hardware's) truncating semantics, and the interpreter oracle agrees
//! with itself across randomly generated operands (codegen is exercised
//! separately in `tests/differential.rs`, where capturing its stdout
//! requires serializing on fd 1 — not worth doing per proptest case here).

use proptest::prelude::*;

use tinyc::ast::{const_eval, BinOp};

fn interpret(source: &str) -> String {
    let mut out = Vec::new();
    tinyc::interpret(source, &mut out).expect("interpret");
    String::from_utf8(out).expect("utf8 stdout")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every relational/equality comparison reduces to exactly `0` or `1`,
    /// both as a compile-time constant fold and through the interpreter.
    #[test]
    fn comparisons_yield_zero_or_one(a in any::<i32>(), b in any::<i32>()) {
        for op in [BinOp::Lt, BinOp::Le, BinOp::Gt, BinOp::Ge, BinOp::Eq, BinOp::Ne] {
            let v = const_eval(op, a, b);
            prop_assert!(v == 0 || v == 1);
        }

        let src = format!(
            "void main(){{ int a = {a}; int b = {b}; cout << (a<b) << (a<=b) << (a>b) << (a>=b) << (a==b) << (a!=b); }}"
        );
        let out = interpret(&src);
        for tok in out.split_whitespace() {
            let v: i32 = tok.parse().expect("decimal token");
            prop_assert!(v == 0 || v == 1);
        }
    }

    /// Logical `and`/`or` always yield exactly `0` or `1`, regardless of
    /// how large the (nonzero) truthy operand is.
    #[test]
    fn logical_ops_yield_zero_or_one(a in any::<i32>(), b in any::<i32>()) {
        let src = format!(
            "void main(){{ int a = {a}; int b = {b}; cout << (a and b) << (a or b); }}"
        );
        let out = interpret(&src);
        for tok in out.split_whitespace() {
            let v: i32 = tok.parse().expect("decimal token");
            prop_assert!(v == 0 || v == 1);
        }
    }

    /// Division truncates toward zero and modulo takes the sign of the
    /// dividend, matching `i32::wrapping_div`/`wrapping_rem` and x86-64
    /// `idiv`, for every nonzero divisor.
    #[test]
    fn division_and_modulo_match_wrapping_semantics(a in any::<i32>(), b in any::<i32>()) {
        prop_assume!(b != 0);
        prop_assume!(!(a == i32::MIN && b == -1)); // the one case `idiv` traps on

        let src = format!("void main(){{ int a = {a}; int b = {b}; cout << (a/b) << (a%b); }}");
        let out = interpret(&src);
        let mut toks = out.split_whitespace();
        let q: i32 = toks.next().unwrap().parse().unwrap();
        let r: i32 = toks.next().unwrap().parse().unwrap();

        prop_assert_eq!(q, a.wrapping_div(b));
        prop_assert_eq!(r, a.wrapping_rem(b));
        // truncated-toward-zero division satisfies this identity exactly
        // (no wrapping needed: `q*b` cannot itself overflow once `a` does
        // not, because `|q| <= |a|` and `|b| >= 1`).
        prop_assert_eq!(q.wrapping_mul(b).wrapping_add(r), a);
    }

    /// `repeat (n) { ... }` runs `max(n, 0)` times: zero for any
    /// non-positive `n`, exactly `n` for positive `n` (bounded here to
    /// keep the generated source's loop trip count small).
    #[test]
    fn repeat_runs_max_n_zero_times(n in -20i32..20) {
        let src = format!("void main(){{ int count = 0; repeat ({n}) {{ count += 1; }} cout << count; }}");
        let out = interpret(&src);
        let got: i32 = out.trim().parse().unwrap();
        prop_assert_eq!(got, n.max(0));
    }

    /// `a ** b` with a non-positive exponent is always `1`, whether `a`
    /// and `b` are both compile-time constants (folded by the parser) or
    /// `b` is read from a variable (lowered to the runtime loop).
    #[test]
    fn nonpositive_exponent_is_one(a in any::<i32>(), b in -10i32..=0) {
        let src = format!("void main(){{ int base = {a}; int exp = {b}; cout << (base ** exp); }}");
        let out = interpret(&src);
        let got: i32 = out.trim().parse().unwrap();
        prop_assert_eq!(got, 1);

        prop_assert_eq!(const_eval(BinOp::Pow, a, b), 1);
    }

    /// Positive, small exponents agree between the constant-fold path and
    /// a runtime loop reading the same values from variables.
    #[test]
    fn positive_exponent_matches_repeated_multiplication(a in -6i32..6, b in 0i32..6) {
        let mut expected = 1i32;
        for _ in 0..b {
            expected = expected.wrapping_mul(a);
        }

        let folded = const_eval(BinOp::Pow, a, b);
        prop_assert_eq!(folded, expected);

        let src = format!("void main(){{ int base = {a}; int exp = {b}; cout << (base ** exp); }}");
        let out = interpret(&src);
        let got: i32 = out.trim().parse().unwrap();
        prop_assert_eq!(got, expected);
    }
}
