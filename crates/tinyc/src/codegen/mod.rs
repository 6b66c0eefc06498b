//! Back-end code generator and in-process executor.
//!
//! [`compile`] lowers an already-parsed [`ast::Program`] into an [`Emitter`]
//! by folding over the tree once; the AST itself never references the
//! emitter, so lowering is a plain one-way walk (see `Stmt`/`Expr` in
//! [`crate::ast`]).

mod buffer;
mod emitter;
mod exec;
mod runtime;

pub use buffer::BufferKind;
pub use emitter::Emitter;
pub use exec::Executable;

use tracing::instrument;

use crate::ast::{BinOp, CompoundOp, CoutItem, Expr, IncDecOp, Program, Stmt};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{buffer} exceeded (cursor {cursor} of {capacity})")]
    CapacityExceeded {
        buffer: BufferKind,
        cursor: usize,
        capacity: usize,
    },

    #[error("finish() called with an unpatched jump placeholder at byte {patch_site}")]
    UnpatchedJump { patch_site: usize },

    #[error("an Executable can only be executed once")]
    AlreadyExecuted,

    #[error("cannot emit code after finish() has sealed the buffer")]
    EmitAfterFinish,

    #[error("i/o error mapping executable memory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lowers `program` into a freshly constructed `Emitter`, ready for
/// [`Emitter::finish`]. `user_slot_count` is the number of distinct
/// variables the symbol table declared, so compiler temporaries can be
/// allocated from the top of the data area without colliding with them.
#[instrument(skip(program))]
pub fn compile(program: &Program, user_slot_count: u32) -> Result<Emitter> {
    let mut emitter = Emitter::new(user_slot_count);
    runtime::install(&mut emitter)?;
    for stmt in &program.body {
        lower_stmt(stmt, &mut emitter)?;
    }
    Ok(emitter)
}

fn rel32(patch_site: usize, target: usize) -> i32 {
    (target as i64 - (patch_site as i64 + 4)) as i32
}

fn lower_stmt(stmt: &Stmt, emitter: &mut Emitter) -> Result<()> {
    match stmt {
        Stmt::Decl { slot, init } => {
            // An uninitialized `int x;` needs no emitted code: every data
            // area cell starts zeroed, and slots are never reused across
            // declarations (each name gets its own slot for the whole
            // program), so there's nothing to reset.
            if let Some(expr) = init {
                lower_expr(expr, emitter)?;
                emitter.pop_and_store(*slot)?;
            }
        }
        Stmt::Assign { slot, expr } => {
            lower_expr(expr, emitter)?;
            emitter.pop_and_store(*slot)?;
        }
        Stmt::CompoundAssign { slot, op, expr } => {
            emitter.push_variable(*slot)?;
            lower_expr(expr, emitter)?;
            emitter.binary_op(compound_as_binop(*op))?;
            emitter.pop_and_store(*slot)?;
        }
        Stmt::IncDec { slot, op } => {
            emitter.push_variable(*slot)?;
            emitter.push_value(1)?;
            emitter.binary_op(incdec_as_binop(*op))?;
            emitter.pop_and_store(*slot)?;
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => lower_if(cond, then_branch, else_branch.as_deref(), emitter)?,
        Stmt::While { cond, body } => lower_while(cond, body, emitter)?,
        Stmt::DoWhile { body, cond } => lower_do_while(body, cond, emitter)?,
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => lower_for(init.as_deref(), cond.as_ref(), step.as_deref(), body, emitter)?,
        Stmt::Repeat { count, body } => lower_repeat(count, body, emitter)?,
        Stmt::Cout { items } => {
            for item in items {
                match item {
                    CoutItem::Value(expr) => {
                        lower_expr(expr, emitter)?;
                        emitter.pop_and_write()?;
                    }
                    CoutItem::Endl => emitter.write_newline()?,
                }
            }
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                lower_stmt(s, emitter)?;
            }
        }
        Stmt::Empty => {}
    }
    Ok(())
}

fn lower_expr(expr: &Expr, emitter: &mut Emitter) -> Result<()> {
    match expr {
        Expr::IntLit(v) => emitter.push_value(*v)?,
        Expr::Var(slot) => emitter.push_variable(*slot)?,
        Expr::Neg(inner) => {
            emitter.push_value(0)?;
            lower_expr(inner, emitter)?;
            emitter.binary_op(BinOp::Sub)?;
        }
        Expr::Binary { op, lhs, rhs } => {
            if *op == BinOp::Pow {
                lower_pow(lhs, rhs, emitter)?;
            } else {
                lower_expr(lhs, emitter)?;
                lower_expr(rhs, emitter)?;
                emitter.binary_op(*op)?;
            }
        }
    }
    Ok(())
}

fn compound_as_binop(op: CompoundOp) -> BinOp {
    match op {
        CompoundOp::Add => BinOp::Add,
        CompoundOp::Sub => BinOp::Sub,
    }
}

fn incdec_as_binop(op: IncDecOp) -> BinOp {
    match op {
        IncDecOp::Inc => BinOp::Add,
        IncDecOp::Dec => BinOp::Sub,
    }
}

fn lower_if(
    cond: &Expr,
    then_branch: &Stmt,
    else_branch: Option<&Stmt>,
    emitter: &mut Emitter,
) -> Result<()> {
    lower_expr(cond, emitter)?;
    let skip = emitter.skip_if_zero_stack()?;
    lower_stmt(then_branch, emitter)?;
    match else_branch {
        None => {
            let after_then = emitter.address_here();
            emitter.set_offset(skip, rel32(skip, after_then));
        }
        Some(else_stmt) => {
            let jump_over_else = emitter.jump()?;
            let else_start = emitter.address_here();
            emitter.set_offset(skip, rel32(skip, else_start));
            lower_stmt(else_stmt, emitter)?;
            let after_else = emitter.address_here();
            emitter.set_offset(jump_over_else, rel32(jump_over_else, after_else));
        }
    }
    Ok(())
}

fn lower_while(cond: &Expr, body: &Stmt, emitter: &mut Emitter) -> Result<()> {
    let top = emitter.address_here();
    lower_expr(cond, emitter)?;
    let skip = emitter.skip_if_zero_stack()?;
    lower_stmt(body, emitter)?;
    let back = emitter.jump()?;
    let after_loop = emitter.address_here();
    emitter.set_offset(skip, rel32(skip, after_loop));
    emitter.set_offset(back, rel32(back, top));
    Ok(())
}

fn lower_do_while(body: &Stmt, cond: &Expr, emitter: &mut Emitter) -> Result<()> {
    let top = emitter.address_here();
    lower_stmt(body, emitter)?;
    lower_expr(cond, emitter)?;
    let skip = emitter.skip_if_zero_stack()?;
    let back = emitter.jump()?;
    let after_loop = emitter.address_here();
    emitter.set_offset(skip, rel32(skip, after_loop));
    emitter.set_offset(back, rel32(back, top));
    Ok(())
}

fn lower_for(
    init: Option<&Stmt>,
    cond: Option<&Expr>,
    step: Option<&Stmt>,
    body: &Stmt,
    emitter: &mut Emitter,
) -> Result<()> {
    if let Some(init) = init {
        lower_stmt(init, emitter)?;
    }
    let top = emitter.address_here();
    let skip = match cond {
        Some(cond) => {
            lower_expr(cond, emitter)?;
            Some(emitter.skip_if_zero_stack()?)
        }
        None => None,
    };
    lower_stmt(body, emitter)?;
    if let Some(step) = step {
        lower_stmt(step, emitter)?;
    }
    let back = emitter.jump()?;
    let after_loop = emitter.address_here();
    emitter.set_offset(back, rel32(back, top));
    if let Some(skip) = skip {
        emitter.set_offset(skip, rel32(skip, after_loop));
    }
    Ok(())
}

/// `repeat (n) { body }`: runs `body` exactly `max(n, 0)` times. The
/// upfront `n > 0` guard is what makes negative counts run zero times —
/// without it the per-iteration `== 0` test alone would never fire for a
/// counter that starts negative and only decreases.
fn lower_repeat(count: &Expr, body: &[Stmt], emitter: &mut Emitter) -> Result<()> {
    let counter_slot = emitter.alloc_temp_slot()?;
    lower_expr(count, emitter)?;
    emitter.pop_and_store(counter_slot)?;

    emitter.push_variable(counter_slot)?;
    emitter.push_value(0)?;
    emitter.binary_op(BinOp::Gt)?;
    let guard_skip = emitter.skip_if_zero_stack()?;

    let top = emitter.address_here();
    emitter.push_variable(counter_slot)?;
    let skip = emitter.skip_if_zero_stack()?;
    for stmt in body {
        lower_stmt(stmt, emitter)?;
    }
    emitter.push_variable(counter_slot)?;
    emitter.push_value(1)?;
    emitter.binary_op(BinOp::Sub)?;
    emitter.pop_and_store(counter_slot)?;
    let back = emitter.jump()?;
    let after_loop = emitter.address_here();
    emitter.set_offset(skip, rel32(skip, after_loop));
    emitter.set_offset(back, rel32(back, top));
    emitter.set_offset(guard_skip, rel32(guard_skip, after_loop));
    Ok(())
}

/// `a ** b` where at least one of `a`/`b` isn't a compile-time constant
/// (constant folding already handled the all-constant case in the
/// parser). Lowered the same way `repeat` is: a decrementing runtime
/// counter guarded against non-positive exponents, accumulating a
/// product instead of re-running a statement body.
fn lower_pow(base: &Expr, exponent: &Expr, emitter: &mut Emitter) -> Result<()> {
    let acc_slot = emitter.alloc_temp_slot()?;
    let counter_slot = emitter.alloc_temp_slot()?;
    let base_slot = emitter.alloc_temp_slot()?;

    lower_expr(base, emitter)?;
    emitter.pop_and_store(base_slot)?;
    lower_expr(exponent, emitter)?;
    emitter.pop_and_store(counter_slot)?;

    emitter.push_value(1)?;
    emitter.pop_and_store(acc_slot)?;

    emitter.push_variable(counter_slot)?;
    emitter.push_value(0)?;
    emitter.binary_op(BinOp::Gt)?;
    let guard_skip = emitter.skip_if_zero_stack()?;

    let top = emitter.address_here();
    emitter.push_variable(counter_slot)?;
    let skip = emitter.skip_if_zero_stack()?;

    emitter.push_variable(acc_slot)?;
    emitter.push_variable(base_slot)?;
    emitter.binary_op(BinOp::Mul)?;
    emitter.pop_and_store(acc_slot)?;

    emitter.push_variable(counter_slot)?;
    emitter.push_value(1)?;
    emitter.binary_op(BinOp::Sub)?;
    emitter.pop_and_store(counter_slot)?;

    let back = emitter.jump()?;
    let after_loop = emitter.address_here();
    emitter.set_offset(skip, rel32(skip, after_loop));
    emitter.set_offset(back, rel32(back, top));
    emitter.set_offset(guard_skip, rel32(guard_skip, after_loop));

    emitter.push_variable(acc_slot)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_rejects_data_area_exhaustion_gracefully() {
        // Allocating more temp slots than the data area has room for
        // (after reserving `user_slot_count`) must return an error, not
        // panic or silently alias a user variable's slot.
        let mut emitter = Emitter::new(buffer::DATA_CAPACITY as u32 - 2);
        assert!(emitter.alloc_temp_slot().is_ok());
        assert!(matches!(
            emitter.alloc_temp_slot(),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn finish_reports_empty_program_landmarks_in_order() {
        let program = Program { body: vec![Stmt::Empty] };
        let emitter = compile(&program, 0).expect("compile");
        let executable = emitter.finish().expect("finish");
        drop(executable);
    }
}
