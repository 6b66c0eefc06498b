//! Tree-walking interpreter: the reference oracle `codegen` is checked
//! against, and a `--interpret` fallback for environments where mapping
//! executable memory isn't available.
//!
//! Mirrors the emitted machine code's runtime semantics exactly: wrapping
//! 32-bit arithmetic, truncated-toward-zero division, an unguarded
//! division by zero (the interpreter panics the same way `idiv` raises
//! `#DE` in hardware — neither path diagnoses it), and the same trailing
//! space before `endl` that the print routine emits.

use std::io::{self, Write};

use crate::ast::{BinOp, CompoundOp, CoutItem, Expr, IncDecOp, Program, Stmt};

pub fn run(program: &Program, slot_count: u32, out: &mut impl Write) -> io::Result<()> {
    let mut env = vec![0i32; slot_count as usize];
    for stmt in &program.body {
        exec_stmt(stmt, &mut env, out)?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, env: &mut [i32], out: &mut impl Write) -> io::Result<()> {
    match stmt {
        Stmt::Decl { slot, init } => {
            if let Some(expr) = init {
                env[*slot as usize] = eval_expr(expr, env);
            }
        }
        Stmt::Assign { slot, expr } => {
            env[*slot as usize] = eval_expr(expr, env);
        }
        Stmt::CompoundAssign { slot, op, expr } => {
            let rhs = eval_expr(expr, env);
            let lhs = env[*slot as usize];
            env[*slot as usize] = match op {
                CompoundOp::Add => lhs.wrapping_add(rhs),
                CompoundOp::Sub => lhs.wrapping_sub(rhs),
            };
        }
        Stmt::IncDec { slot, op } => {
            let v = env[*slot as usize];
            env[*slot as usize] = match op {
                IncDecOp::Inc => v.wrapping_add(1),
                IncDecOp::Dec => v.wrapping_sub(1),
            };
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval_expr(cond, env) != 0 {
                exec_stmt(then_branch, env, out)?;
            } else if let Some(else_stmt) = else_branch {
                exec_stmt(else_stmt, env, out)?;
            }
        }
        Stmt::While { cond, body } => {
            while eval_expr(cond, env) != 0 {
                exec_stmt(body, env, out)?;
            }
        }
        Stmt::DoWhile { body, cond } => loop {
            exec_stmt(body, env, out)?;
            if eval_expr(cond, env) == 0 {
                break;
            }
        },
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                exec_stmt(init, env, out)?;
            }
            while cond.as_ref().is_none_or(|c| eval_expr(c, env) != 0) {
                exec_stmt(body, env, out)?;
                if let Some(step) = step {
                    exec_stmt(step, env, out)?;
                }
            }
        }
        Stmt::Repeat { count, body } => {
            let n = eval_expr(count, env);
            for _ in 0..n.max(0) {
                for s in body {
                    exec_stmt(s, env, out)?;
                }
            }
        }
        Stmt::Cout { items } => {
            for item in items {
                match item {
                    CoutItem::Value(expr) => {
                        write!(out, "{} ", eval_expr(expr, env))?;
                    }
                    CoutItem::Endl => {
                        writeln!(out)?;
                    }
                }
            }
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                exec_stmt(s, env, out)?;
            }
        }
        Stmt::Empty => {}
    }
    Ok(())
}

fn eval_expr(expr: &Expr, env: &[i32]) -> i32 {
    match expr {
        Expr::IntLit(v) => *v,
        Expr::Var(slot) => env[*slot as usize],
        Expr::Neg(inner) => eval_expr(inner, env).wrapping_neg(),
        Expr::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, env);
            let b = eval_expr(rhs, env);
            binop(*op, a, b)
        }
    }
}

fn binop(op: BinOp, a: i32, b: i32) -> i32 {
    match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Mod => a.wrapping_rem(b),
        BinOp::Lt => i32::from(a < b),
        BinOp::Le => i32::from(a <= b),
        BinOp::Gt => i32::from(a > b),
        BinOp::Ge => i32::from(a >= b),
        BinOp::Eq => i32::from(a == b),
        BinOp::Ne => i32::from(a != b),
        BinOp::And => i32::from(a != 0 && b != 0),
        BinOp::Or => i32::from(a != 0 || b != 0),
        BinOp::Pow => pow_runtime(a, b),
    }
}

/// Matches `codegen`'s runtime loop for a non-constant `**`: non-positive
/// exponents yield `1`, same as `repeat (n) { }` with `n <= 0`.
fn pow_runtime(base: i32, exp: i32) -> i32 {
    if exp <= 0 {
        return 1;
    }
    let mut acc = 1i32;
    for _ in 0..exp {
        acc = acc.wrapping_mul(base);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Parser;

    fn run_source(src: &str) -> String {
        let (program, symtab) = Parser::new(src).unwrap().parse_program().unwrap();
        let mut out = Vec::new();
        run(&program, symtab.len(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scenario_constant_folding() {
        assert_eq!(
            run_source("void main(){ int x = 3+4*5; cout << x; }"),
            "23 "
        );
    }

    #[test]
    fn scenario_while_loop() {
        assert_eq!(
            run_source("void main(){ int i=0; while(i<3){ cout << i; i++; } }"),
            "0 1 2 "
        );
    }

    #[test]
    fn scenario_negative_and_endl() {
        assert_eq!(
            run_source("void main(){ int n = -7; cout << n << endl; }"),
            "-7 \n"
        );
    }

    #[test]
    fn scenario_if_else() {
        assert_eq!(
            run_source("void main(){ if (2<1) cout<<1; else cout<<2; }"),
            "2 "
        );
    }

    #[test]
    fn scenario_for_loop_accumulator() {
        assert_eq!(
            run_source("void main(){ int s=0; for(int i=1; i<=4; i++) s += i; cout << s; }"),
            "10 "
        );
    }

    #[test]
    fn scenario_repeat() {
        assert_eq!(
            run_source("void main(){ repeat(3){ cout << 9; } cout << endl; }"),
            "9 9 9 \n"
        );
    }

    #[test]
    fn repeat_with_negative_count_runs_zero_times() {
        assert_eq!(
            run_source("void main(){ repeat(-2){ cout << 1; } cout << 9; }"),
            "9 "
        );
    }

    #[test]
    fn runtime_power_with_variable_exponent() {
        assert_eq!(
            run_source("void main(){ int n = 3; cout << (2 ** n); }"),
            "8 "
        );
    }

    #[test]
    fn power_with_nonpositive_exponent_is_one() {
        assert_eq!(
            run_source("void main(){ int n = 0; cout << (5 ** n); int m = -3; cout << (5 ** m); }"),
            "1 1 "
        );
    }

    #[test]
    fn division_and_modulo_truncate_toward_zero() {
        assert_eq!(
            run_source("void main(){ cout << (-7/2) << (-7%2); }"),
            "-3 -1 "
        );
    }
}
