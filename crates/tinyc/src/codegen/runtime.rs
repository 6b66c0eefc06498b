//! Runtime support: the code every program needs regardless of what it
//! does, installed once when the emitter is constructed.
//!
//! Produces two fixed regions at the start of the code buffer, in order:
//! an unconditional jump over the print routine, then the print routine
//! itself. `main_entry` is recorded once both are in place, so program
//! lowering starts writing bytes right after them.

use super::buffer::ConstByte;
use super::emitter::{Cc, Emitter, Reg};
use super::Error;

pub(super) fn install(emitter: &mut Emitter) -> Result<(), Error> {
    let prologue_jump = emitter.jump()?;

    let print_int_entry = emitter.address_here();
    emitter.set_print_int_entry(print_int_entry);
    build_print_routine(emitter)?;

    let main_entry = emitter.address_here();
    emitter.set_offset(prologue_jump, rel32(prologue_jump, main_entry));
    emitter.set_main_entry(main_entry);

    Ok(())
}

fn rel32(patch_site: usize, target: usize) -> i32 {
    (target as i64 - (patch_site as i64 + 4)) as i32
}

const SENTINEL: i64 = -1;
const ASCII_ZERO: i32 = 0x30;

/// Prints the signed 32-bit integer staged in `scratch`, followed by a
/// space. Clobbers only caller-saved registers (`rax`, `rbx`, `rcx`,
/// `rdx`, `rsi`, `rdi`) and leaves the stack exactly as it found it.
///
/// Algorithm: negative values print a leading `-` and continue with the
/// absolute value; the magnitude is converted to decimal by repeated
/// division by 10, pushing ASCII digit bytes onto the CPU stack
/// (least-significant digit first) above a sentinel; the digits are then
/// popped — most-significant first, since they were pushed last — into
/// `print_buf` and written out in one `write` syscall.
fn build_print_routine(emitter: &mut Emitter) -> Result<(), Error> {
    let scratch_ptr = emitter.scratch_ptr();
    emitter.mov_reg_ptr(Reg::Rax, scratch_ptr)?;
    emitter.load_i32_deref_rax_sign_extended()?;

    emitter.test_reg_reg(Reg::Rax, Reg::Rax)?;
    let jns_site = emitter.jcc(Cc::NotSign)?;
    let minus_ptr = emitter.const_ptr(ConstByte::Minus);
    // `emit_write_syscall` clobbers rax (sys_write number, then the
    // syscall's return value), so the value being printed has to survive
    // the write on the CPU stack, not in a register.
    emitter.push(Reg::Rax)?;
    emitter.emit_write_syscall(minus_ptr, 1)?;
    emitter.pop(Reg::Rax)?;
    emitter.neg_reg(Reg::Rax)?;
    let non_negative = emitter.address_here();
    emitter.set_offset(jns_site, rel32(jns_site, non_negative));

    emitter.test_reg_reg(Reg::Rax, Reg::Rax)?;
    let jnz_site = emitter.jcc(Cc::NotZero)?;
    // value is exactly zero: print a single '0' digit.
    emitter.mov_reg_imm64(Reg::Rdx, SENTINEL)?;
    emitter.push(Reg::Rdx)?;
    emitter.mov_reg_imm64(Reg::Rdx, i64::from(ASCII_ZERO))?;
    emitter.push(Reg::Rdx)?;
    let skip_divloop = emitter.jump()?;

    let nonzero = emitter.address_here();
    emitter.set_offset(jnz_site, rel32(jnz_site, nonzero));
    emitter.mov_reg_imm64(Reg::Rdx, SENTINEL)?;
    emitter.push(Reg::Rdx)?;
    emitter.mov_reg_imm64(Reg::Rbx, 10)?;

    let divloop_start = emitter.address_here();
    emitter.test_reg_reg(Reg::Rax, Reg::Rax)?;
    let divloop_done_site = emitter.jcc(Cc::Zero)?;
    emitter.cqo()?;
    emitter.idiv_reg(Reg::Rbx)?;
    emitter.add_reg_imm32(Reg::Rdx, ASCII_ZERO)?;
    emitter.push(Reg::Rdx)?;
    let divloop_back = emitter.jump()?;
    emitter.set_offset(divloop_back, rel32(divloop_back, divloop_start));

    let pop_digits = emitter.address_here();
    emitter.set_offset(divloop_done_site, rel32(divloop_done_site, pop_digits));
    emitter.set_offset(skip_divloop, rel32(skip_divloop, pop_digits));

    let buf_ptr = emitter.print_buf_ptr();
    emitter.mov_reg_ptr(Reg::Rsi, buf_ptr)?;
    emitter.mov_reg_reg(Reg::Rbx, Reg::Rsi)?;

    let poploop_start = emitter.address_here();
    emitter.pop(Reg::Rdx)?;
    emitter.cmp_reg_imm32(Reg::Rdx, SENTINEL as i32)?;
    let poploop_done_site = emitter.jcc(Cc::Equal)?;
    emitter.store_byte(Reg::Rsi, Reg::Rdx)?;
    emitter.inc_reg(Reg::Rsi)?;
    let poploop_back = emitter.jump()?;
    emitter.set_offset(poploop_back, rel32(poploop_back, poploop_start));

    let poploop_done = emitter.address_here();
    emitter.set_offset(poploop_done_site, rel32(poploop_done_site, poploop_done));

    emitter.mov_reg_reg(Reg::Rdx, Reg::Rsi)?;
    emitter.sub_reg_reg(Reg::Rdx, Reg::Rbx)?;
    let buf_ptr = emitter.print_buf_ptr();
    emitter.emit_write_syscall_reg_len(buf_ptr, Reg::Rdx)?;

    let space_ptr = emitter.const_ptr(ConstByte::Space);
    emitter.emit_write_syscall(space_ptr, 1)?;

    emitter.ret()
}
