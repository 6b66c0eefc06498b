//! The stack-machine instruction emitter.
//!
//! Every public method here corresponds to exactly one logical
//! operand-stack operation and expands to a fixed sequence of x86-64
//! bytes. The native CPU stack doubles as the operand stack for the
//! source language's expressions: between statements its depth always
//! equals the depth the AST left it at, i.e. zero.

use std::collections::BTreeSet;

use tracing::trace;

use crate::ast::BinOp;

use super::buffer::{BufferKind, ConstByte, Storage};
use super::exec::Executable;
use super::Error;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsi = 6,
    Rdi = 7,
}

impl Reg {
    const fn code(self) -> u8 {
        self as u8
    }
}

/// Second opcode byte of a `0F 8x` conditional jump, or the opcode for the
/// corresponding `SETcc` (`0F 9x`).
#[derive(Clone, Copy)]
pub(super) enum Cc {
    Zero,
    NotZero,
    NotSign,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl Cc {
    const fn jcc_opcode(self) -> u8 {
        match self {
            Self::Zero | Self::Equal => 0x84,
            Self::NotZero | Self::NotEqual => 0x85,
            Self::NotSign => 0x89,
            Self::Less => 0x8C,
            Self::LessEqual => 0x8E,
            Self::Greater => 0x8F,
            Self::GreaterEqual => 0x8D,
        }
    }

    const fn setcc_opcode(self) -> u8 {
        match self {
            Self::Zero | Self::Equal => 0x94,
            Self::NotZero | Self::NotEqual => 0x95,
            Self::Less => 0x9C,
            Self::LessEqual => 0x9E,
            Self::Greater => 0x9F,
            Self::GreaterEqual => 0x9D,
            Self::NotSign => unreachable!("NotSign is only used for jumps"),
        }
    }
}

/// Owns the code buffer, the data area, and the emission-time bookkeeping
/// (compiler-temp slot allocation, the set of not-yet-patched forward
/// jumps). Not `Clone`: the absolute addresses baked into already-emitted
/// instructions are only valid for this one `Storage`.
pub struct Emitter {
    storage: Storage,
    user_slot_count: u32,
    next_free_slot: u32,
    print_int_entry: usize,
    main_entry: usize,
    pending_jumps: BTreeSet<usize>,
    finished: bool,
}

impl Emitter {
    pub(super) fn new(user_slot_count: u32) -> Self {
        Self {
            storage: Storage::new(),
            user_slot_count,
            next_free_slot: super::buffer::DATA_CAPACITY as u32,
            print_int_entry: 0,
            main_entry: 0,
            pending_jumps: BTreeSet::new(),
            finished: false,
        }
    }

    pub(super) fn set_print_int_entry(&mut self, addr: usize) {
        self.print_int_entry = addr;
    }

    pub(super) fn set_main_entry(&mut self, addr: usize) {
        self.main_entry = addr;
    }

    #[must_use]
    pub fn address_here(&self) -> usize {
        self.storage.code.address_here()
    }

    fn check_not_finished(&self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::EmitAfterFinish);
        }
        Ok(())
    }

    /// Hands out a fresh compiler-temporary slot, counting down from the
    /// top of the data area so it can never collide with a user variable's
    /// slot (those count up from 0).
    pub fn alloc_temp_slot(&mut self) -> Result<u32, Error> {
        if self.next_free_slot == 0 || self.next_free_slot - 1 <= self.user_slot_count {
            return Err(Error::CapacityExceeded {
                buffer: BufferKind::Data,
                cursor: self.next_free_slot as usize,
                capacity: super::buffer::DATA_CAPACITY,
            });
        }
        self.next_free_slot -= 1;
        Ok(self.next_free_slot)
    }

    // ---- stack-machine opcodes ----

    pub fn push_value(&mut self, v: i32) -> Result<(), Error> {
        self.check_not_finished()?;
        self.mov_reg_imm64(Reg::Rax, i64::from(v))?;
        self.push(Reg::Rax)
    }

    pub fn push_variable(&mut self, slot: u32) -> Result<(), Error> {
        self.check_not_finished()?;
        let addr = self.storage.data.address_of_slot(slot);
        self.mov_reg_ptr(Reg::Rax, addr)?;
        // mov eax, [rax]
        self.storage.code.emit_bytes(&[0x8B, 0x00])?;
        // movsx rax, eax
        self.storage.code.emit_bytes(&[0x48, 0x63, 0xC0])?;
        self.push(Reg::Rax)
    }

    pub fn pop_and_store(&mut self, slot: u32) -> Result<(), Error> {
        self.check_not_finished()?;
        self.pop(Reg::Rax)?;
        let addr = self.storage.data.address_of_slot(slot);
        self.mov_reg_ptr(Reg::Rcx, addr)?;
        // mov [rcx], eax
        self.storage.code.emit_bytes(&[0x89, 0x01])
    }

    pub fn pop_and_store_temp(&mut self) -> Result<(), Error> {
        self.check_not_finished()?;
        self.pop(Reg::Rax)?;
        let addr = self.storage.data.address_of_scratch();
        self.mov_reg_ptr(Reg::Rcx, addr)?;
        self.storage.code.emit_bytes(&[0x89, 0x01])
    }

    pub fn push_temp(&mut self) -> Result<(), Error> {
        self.check_not_finished()?;
        let addr = self.storage.data.address_of_scratch();
        self.mov_reg_ptr(Reg::Rax, addr)?;
        self.storage.code.emit_bytes(&[0x8B, 0x00])?;
        self.storage.code.emit_bytes(&[0x48, 0x63, 0xC0])?;
        self.push(Reg::Rax)
    }

    /// `…, a, b → …, a ⊕ b` for every non-`Pow` binary operator. `Pow` is
    /// lowered at a higher level (see `codegen::lower_expr`) because a
    /// non-constant exponent needs a runtime loop, not a single opcode.
    pub fn binary_op(&mut self, op: BinOp) -> Result<(), Error> {
        self.check_not_finished()?;
        self.pop(Reg::Rbx)?;
        self.pop(Reg::Rax)?;
        match op {
            BinOp::Add => self.alu_rax_rbx(0x01)?,
            BinOp::Sub => self.alu_rax_rbx(0x29)?,
            BinOp::Mul => self.storage.code.emit_bytes(&[0x48, 0x0F, 0xAF, 0xC3])?,
            BinOp::Div | BinOp::Mod => {
                self.storage.code.emit_bytes(&[0x48, 0x99])?; // cqo
                self.storage.code.emit_bytes(&[0x48, 0xF7, 0xFB])?; // idiv rbx
                if op == BinOp::Mod {
                    // remainder is in rdx; move it into rax so the shared
                    // `push rax` below pushes the right value.
                    self.storage.code.emit_bytes(&[0x48, 0x89, 0xD0])?; // mov rax, rdx
                }
            }
            BinOp::Lt => return self.compare(Cc::Less),
            BinOp::Le => return self.compare(Cc::LessEqual),
            BinOp::Gt => return self.compare(Cc::Greater),
            BinOp::Ge => return self.compare(Cc::GreaterEqual),
            BinOp::Eq => return self.compare(Cc::Equal),
            BinOp::Ne => return self.compare(Cc::NotEqual),
            BinOp::And | BinOp::Or => return self.logical(op),
            BinOp::Pow => unreachable!("Pow is lowered by the caller, not binary_op"),
        }
        self.push(Reg::Rax)
    }

    /// `cmp rax, rbx; setcc cl; push rcx` — `rax`/`rbx` already hold the two
    /// popped operands in the right order (`a` in `rax`, `b` in `rbx`).
    fn compare(&mut self, cc: Cc) -> Result<(), Error> {
        self.alu_rax_rbx(0x39)?; // cmp rax, rbx
        self.storage.code.emit_bytes(&[0x48, 0x31, 0xC9])?; // xor rcx, rcx
        self.storage.code.emit_bytes(&[0x0F, cc.setcc_opcode(), 0xC1])?;
        self.push(Reg::Rcx)
    }

    /// Logical and/or: both operands are already non-negated 32-bit values
    /// on `rax`/`rbx`; coerce each to 0/1 with `test`+`setne`, then combine.
    fn logical(&mut self, op: BinOp) -> Result<(), Error> {
        // rcx = (rax != 0)
        self.storage.code.emit_bytes(&[0x48, 0x85, 0xC0])?; // test rax, rax
        self.storage.code.emit_bytes(&[0x48, 0x31, 0xC9])?; // xor rcx, rcx
        self.storage
            .code
            .emit_bytes(&[0x0F, Cc::NotZero.setcc_opcode(), 0xC1])?; // setne cl
        // rdx = (rbx != 0)
        self.storage.code.emit_bytes(&[0x48, 0x85, 0xDB])?; // test rbx, rbx
        self.storage.code.emit_bytes(&[0x48, 0x31, 0xD2])?; // xor rdx, rdx
        self.storage
            .code
            .emit_bytes(&[0x0F, Cc::NotZero.setcc_opcode(), 0xC2])?; // setne dl
        match op {
            BinOp::And => self.storage.code.emit_bytes(&[0x48, 0x21, 0xD1])?, // and rcx, rdx
            BinOp::Or => self.storage.code.emit_bytes(&[0x48, 0x09, 0xD1])?,  // or rcx, rdx
            _ => unreachable!(),
        }
        self.push(Reg::Rcx)
    }

    /// `…, v → …`; `pop rax; test rax, rax; jz rel32 <placeholder>`. Returns
    /// the address of the 4-byte placeholder for the caller to patch.
    pub fn skip_if_zero_stack(&mut self) -> Result<usize, Error> {
        self.check_not_finished()?;
        self.pop(Reg::Rax)?;
        self.storage.code.emit_bytes(&[0x48, 0x85, 0xC0])?; // test rax, rax
        self.jcc(Cc::Zero)
    }

    /// `jmp rel32 <placeholder>`. Returns the placeholder address.
    pub fn jump(&mut self) -> Result<usize, Error> {
        self.check_not_finished()?;
        self.storage.code.emit_u8(0xE9)?;
        let patch_site = self.storage.code.address_here();
        self.storage.code.emit_i32_le(0)?;
        self.pending_jumps.insert(patch_site);
        Ok(patch_site)
    }

    /// Patches a placeholder returned by `skip_if_zero_stack` or `jump`.
    /// `delta` must be `target_addr - (patch_site + 4)`.
    pub fn set_offset(&mut self, patch_site: usize, delta: i32) {
        self.storage.code.set_offset(patch_site, delta);
        self.pending_jumps.remove(&patch_site);
    }

    /// `…, v → …`; stages `v` in `scratch` and calls the print routine.
    pub fn pop_and_write(&mut self) -> Result<(), Error> {
        self.check_not_finished()?;
        self.pop(Reg::Rax)?;
        let addr = self.storage.data.address_of_scratch();
        self.mov_reg_ptr(Reg::Rcx, addr)?;
        self.storage.code.emit_bytes(&[0x89, 0x01])?; // mov [rcx], eax
        self.call(self.print_int_entry)
    }

    /// Emits a direct `write(1, &'\n', 1)` syscall sequence inline.
    pub fn write_newline(&mut self) -> Result<(), Error> {
        self.check_not_finished()?;
        let addr = self.storage.data.address_of_const(ConstByte::Newline);
        self.emit_write_syscall(addr, 1)
    }

    /// Finalizes the buffer: emits `ret`, verifies every returned jump
    /// placeholder was patched, and hands the sealed storage to the
    /// executor.
    pub fn finish(mut self) -> Result<Executable, Error> {
        self.check_not_finished()?;
        self.storage.code.emit_u8(0xC3)?; // ret
        self.finished = true;
        if let Some(&patch_site) = self.pending_jumps.iter().next() {
            return Err(Error::UnpatchedJump { patch_site });
        }
        let end_of_program = self.storage.code.address_here();
        trace!(
            main_entry = self.main_entry,
            print_int_entry = self.print_int_entry,
            end_of_program,
            "codegen finished"
        );
        super::exec::seal(self.storage, self.main_entry, end_of_program)
    }

    // ---- private x86-64 encoding helpers, shared with `runtime` ----

    pub(super) fn mov_reg_imm64(&mut self, reg: Reg, imm: i64) -> Result<(), Error> {
        self.storage.code.emit_bytes(&[0x48, 0xB8 + reg.code()])?;
        self.storage.code.emit_i64_le(imm)
    }

    pub(super) fn mov_reg_ptr<T>(&mut self, reg: Reg, ptr: *const T) -> Result<(), Error> {
        self.storage.code.emit_bytes(&[0x48, 0xB8 + reg.code()])?;
        self.storage.code.emit_ptr(ptr)
    }

    pub(super) fn push(&mut self, reg: Reg) -> Result<(), Error> {
        self.storage.code.emit_u8(0x50 + reg.code())
    }

    pub(super) fn pop(&mut self, reg: Reg) -> Result<(), Error> {
        self.storage.code.emit_u8(0x58 + reg.code())
    }

    /// `op dst, src` for the `REX.W <opcode> /r` ALU forms (ADD/SUB/CMP
    /// operate on `rax`/`rbx` throughout this module).
    fn alu_rax_rbx(&mut self, opcode: u8) -> Result<(), Error> {
        let modrm = 0xC0 | (Reg::Rbx.code() << 3) | Reg::Rax.code();
        self.storage.code.emit_bytes(&[0x48, opcode, modrm])
    }

    pub(super) fn jcc(&mut self, cc: Cc) -> Result<usize, Error> {
        self.storage.code.emit_bytes(&[0x0F, cc.jcc_opcode()])?;
        let patch_site = self.storage.code.address_here();
        self.storage.code.emit_i32_le(0)?;
        self.pending_jumps.insert(patch_site);
        Ok(patch_site)
    }

    pub(super) fn call(&mut self, target: usize) -> Result<(), Error> {
        self.storage.code.emit_u8(0xE8)?;
        let patch_site = self.storage.code.address_here();
        // call target is known immediately: both ends live in the same
        // code buffer and the callee (the print routine) is always
        // emitted before any call site.
        let delta = (target as i64) - (patch_site as i64 + 4);
        self.storage.code.emit_i32_le(delta as i32)
    }

    pub(super) fn emit_write_syscall<T>(&mut self, buf: *const T, len: i64) -> Result<(), Error> {
        self.mov_reg_imm64(Reg::Rax, 1)?; // sys_write
        self.mov_reg_imm64(Reg::Rdi, 1)?; // fd 1 (stdout)
        self.mov_reg_ptr(Reg::Rsi, buf)?;
        self.mov_reg_imm64(Reg::Rdx, len)?;
        self.storage.code.emit_bytes(&[0x0F, 0x05]) // syscall
    }

    /// Emits a `write(1, buf, len)` syscall where `len` is itself held in a
    /// register rather than known at emit time (the print routine doesn't
    /// know a printed integer's digit count until it has extracted them).
    pub(super) fn emit_write_syscall_reg_len<T>(
        &mut self,
        buf: *const T,
        len_reg: Reg,
    ) -> Result<(), Error> {
        if len_reg != Reg::Rdx {
            self.mov_reg_reg(Reg::Rdx, len_reg)?;
        }
        self.mov_reg_imm64(Reg::Rax, 1)?;
        self.mov_reg_imm64(Reg::Rdi, 1)?;
        self.mov_reg_ptr(Reg::Rsi, buf)?;
        self.storage.code.emit_bytes(&[0x0F, 0x05])
    }

    // ---- extra raw encodings used only by the runtime print routine ----

    pub(super) fn test_reg_reg(&mut self, a: Reg, b: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | (b.code() << 3) | a.code();
        self.storage.code.emit_bytes(&[0x48, 0x85, modrm])
    }

    pub(super) fn mov_reg_reg(&mut self, dst: Reg, src: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | (src.code() << 3) | dst.code();
        self.storage.code.emit_bytes(&[0x48, 0x89, modrm])
    }

    pub(super) fn cmp_reg_imm32(&mut self, reg: Reg, imm: i32) -> Result<(), Error> {
        let modrm = 0xC0 | (7 << 3) | reg.code();
        self.storage.code.emit_bytes(&[0x48, 0x81, modrm])?;
        self.storage.code.emit_i32_le(imm)
    }

    pub(super) fn add_reg_imm32(&mut self, reg: Reg, imm: i32) -> Result<(), Error> {
        let modrm = 0xC0 | reg.code();
        self.storage.code.emit_bytes(&[0x48, 0x81, modrm])?;
        self.storage.code.emit_i32_le(imm)
    }

    pub(super) fn sub_reg_reg(&mut self, dst: Reg, src: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | (src.code() << 3) | dst.code();
        self.storage.code.emit_bytes(&[0x48, 0x29, modrm])
    }

    pub(super) fn inc_reg(&mut self, reg: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | reg.code();
        self.storage.code.emit_bytes(&[0x48, 0xFF, modrm])
    }

    /// `mov [base], src_byte` — `src_byte` must be `Rax`/`Rcx`/`Rdx`/`Rbx`
    /// so its low-byte form (`al`/`cl`/`dl`/`bl`) needs no `REX` prefix.
    pub(super) fn store_byte(&mut self, base: Reg, src_byte: Reg) -> Result<(), Error> {
        let modrm = (src_byte.code() << 3) | base.code();
        self.storage.code.emit_bytes(&[0x88, modrm])
    }

    pub(super) fn cqo(&mut self) -> Result<(), Error> {
        self.storage.code.emit_bytes(&[0x48, 0x99])
    }

    pub(super) fn idiv_reg(&mut self, reg: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | (7 << 3) | reg.code();
        self.storage.code.emit_bytes(&[0x48, 0xF7, modrm])
    }

    pub(super) fn ret(&mut self) -> Result<(), Error> {
        self.storage.code.emit_u8(0xC3)
    }

    pub(super) fn neg_reg(&mut self, reg: Reg) -> Result<(), Error> {
        let modrm = 0xC0 | (3 << 3) | reg.code();
        self.storage.code.emit_bytes(&[0x48, 0xF7, modrm])
    }

    // ---- data-area address accessors, for the runtime print routine ----

    pub(super) fn scratch_ptr(&self) -> *const i32 {
        self.storage.data.address_of_scratch()
    }

    pub(super) fn print_buf_ptr(&self) -> *const u8 {
        self.storage.data.address_of_print_buf()
    }

    pub(super) fn const_ptr(&self, which: ConstByte) -> *const u8 {
        self.storage.data.address_of_const(which)
    }

    /// `mov eax, [rax]` followed by `movsx rax, eax` — loads the 32-bit
    /// cell `rax` currently points at, sign-extended to 64 bits.
    pub(super) fn load_i32_deref_rax_sign_extended(&mut self) -> Result<(), Error> {
        self.storage.code.emit_bytes(&[0x8B, 0x00])?;
        self.storage.code.emit_bytes(&[0x48, 0x63, 0xC0])
    }
}
