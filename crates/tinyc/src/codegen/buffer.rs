//! The code buffer and data area: flat byte storage with a monotonically
//! increasing cursor, plus the fixed-address cells the emitted program
//! reads and writes across the native/generated-code boundary.
//!
//! Both live behind a `Box` so that addresses taken during emission
//! (`address_of`, `address_of_scratch`, ...) stay valid even though the
//! `Emitter` that owns them is freely moved by value — moving a `Box`
//! moves the pointer, not the heap allocation it points to.

use super::Error;

/// Large enough for any program the parser accepts; see the module budget
/// note in the crate's design documentation.
pub const CODE_CAPACITY: usize = 1 << 16;

/// Number of 4-byte integer cells in the data area. User variables and
/// compiler temporaries share this space: user slots count up from 0,
/// temporaries count down from `DATA_CAPACITY - 1`.
pub const DATA_CAPACITY: usize = 8192;

/// Which buffer a capacity-exceeded error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Code,
    Data,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code buffer"),
            Self::Data => write!(f, "data area"),
        }
    }
}

/// Which fixed ASCII constant to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstByte {
    Minus,
    Space,
    Newline,
}

/// The data area: per-program variable slots plus the small fixed cells the
/// runtime support routines need stable addresses for.
#[repr(C)]
pub struct DataArea {
    slots: [i32; DATA_CAPACITY],
    scratch: i32,
    minus: u8,
    space: u8,
    newline: u8,
    /// Scratch ASCII buffer the print routine assembles digits into before
    /// the final `write`. Sized for the longest possible `i32` decimal
    /// rendering (`-2147483648` is 11 bytes) with headroom.
    print_buf: [u8; 16],
}

impl DataArea {
    fn boxed() -> Box<Self> {
        Box::new(Self {
            slots: [0; DATA_CAPACITY],
            scratch: 0,
            minus: b'-',
            space: b' ',
            newline: b'\n',
            print_buf: [0; 16],
        })
    }

    pub(super) fn address_of_slot(&self, slot: u32) -> *const i32 {
        std::ptr::addr_of!(self.slots[slot as usize])
    }

    pub(super) fn address_of_scratch(&self) -> *const i32 {
        std::ptr::addr_of!(self.scratch)
    }

    pub(super) fn address_of_const(&self, which: ConstByte) -> *const u8 {
        match which {
            ConstByte::Minus => std::ptr::addr_of!(self.minus),
            ConstByte::Space => std::ptr::addr_of!(self.space),
            ConstByte::Newline => std::ptr::addr_of!(self.newline),
        }
    }

    pub(super) fn address_of_print_buf(&self) -> *const u8 {
        std::ptr::addr_of!(self.print_buf).cast()
    }
}

/// A fixed-capacity byte array with a write cursor. Write-once per
/// position: bytes already emitted are never moved, only patched in place
/// through [`CodeBuffer::set_offset`], so absolute addresses taken while
/// emitting (e.g. a `call` target) stay correct for the buffer's lifetime.
pub struct CodeBuffer {
    bytes: Box<[u8; CODE_CAPACITY]>,
    cursor: usize,
}

impl CodeBuffer {
    fn new() -> Self {
        Self {
            bytes: Box::new([0; CODE_CAPACITY]),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn address_here(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn emitted(&self) -> &[u8] {
        &self.bytes[..self.cursor]
    }

    fn check_capacity(&self, additional: usize) -> Result<(), Error> {
        if self.cursor + additional > CODE_CAPACITY {
            return Err(Error::CapacityExceeded {
                buffer: BufferKind::Code,
                cursor: self.cursor,
                capacity: CODE_CAPACITY,
            });
        }
        Ok(())
    }

    pub fn emit_u8(&mut self, b: u8) -> Result<(), Error> {
        self.check_capacity(1)?;
        self.bytes[self.cursor] = b;
        self.cursor += 1;
        Ok(())
    }

    pub fn emit_bytes(&mut self, bs: &[u8]) -> Result<(), Error> {
        self.check_capacity(bs.len())?;
        self.bytes[self.cursor..self.cursor + bs.len()].copy_from_slice(bs);
        self.cursor += bs.len();
        Ok(())
    }

    pub fn emit_i32_le(&mut self, x: i32) -> Result<(), Error> {
        self.emit_bytes(&x.to_le_bytes())
    }

    pub fn emit_i64_le(&mut self, x: i64) -> Result<(), Error> {
        self.emit_bytes(&x.to_le_bytes())
    }

    /// Emits a raw pointer as a little-endian 64-bit immediate, for
    /// absolute addresses embedded in `mov reg, imm64` instructions.
    pub fn emit_ptr<T>(&mut self, p: *const T) -> Result<(), Error> {
        self.emit_bytes(&(p as u64).to_le_bytes())
    }

    /// Writes `delta` into the 4-byte placeholder at `patch_site`, which
    /// must have been reserved by a previous forward-jump emission.
    pub fn set_offset(&mut self, patch_site: usize, delta: i32) {
        self.bytes[patch_site..patch_site + 4].copy_from_slice(&delta.to_le_bytes());
    }
}

/// The combined, independently-boxed code and data storage an `Emitter`
/// owns. Kept as one struct so construction order (data area first, since
/// the runtime support block addresses it immediately) is explicit.
pub struct Storage {
    pub code: CodeBuffer,
    pub data: Box<DataArea>,
}

impl Storage {
    pub fn new() -> Self {
        Self {
            code: CodeBuffer::new(),
            data: DataArea::boxed(),
        }
    }
}
