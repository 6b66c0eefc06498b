//! Makes the sealed code buffer executable and transfers control to it.
//!
//! `mmap`s a fresh, page-aligned region, copies the generated bytes in,
//! then flips it from `PROT_READ|PROT_WRITE` to `PROT_READ|PROT_EXEC`
//! before the indirect call. The mapping outlives the `Storage` that
//! produced it (the data area must stay reachable from the running code),
//! so `Executable` keeps both alive and tears both down together.

#![allow(unsafe_code)]

use tracing::debug;

use super::buffer::Storage;
use super::Error;

/// An `mmap`'d, page-aligned, executable copy of a sealed code buffer.
///
/// Not re-entrant: `execute` may run at most once per instance.
pub struct Executable {
    mapping: *mut libc::c_void,
    mapping_len: usize,
    entry_offset: usize,
    /// Keeps the data area (and, for diagnostics, the original code
    /// buffer) alive for the mapping's lifetime; the emitted code holds
    /// raw absolute pointers into `data`.
    _storage: Storage,
    executed: bool,
}

pub(super) fn seal(storage: Storage, main_entry: usize, end_of_program: usize) -> Result<Executable, Error> {
    let len = end_of_program.max(1);
    let page_len = page_align(len);

    // SAFETY: `PROT_READ|PROT_WRITE`, private+anonymous mapping; `mmap`
    // failure is reported as `std::io::Error::last_os_error()`, not
    // paved over.
    let mapping = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            page_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if mapping == libc::MAP_FAILED {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    // SAFETY: `mapping` was just allocated with `page_len` writable bytes
    // and `storage.code.emitted()` is at most `CODE_CAPACITY <= page_len`.
    unsafe {
        std::ptr::copy_nonoverlapping(
            storage.code.emitted().as_ptr(),
            mapping.cast::<u8>(),
            storage.code.emitted().len(),
        );
    }

    // SAFETY: `mapping`/`page_len` match the preceding `mmap` call exactly.
    let rc = unsafe { libc::mprotect(mapping, page_len, libc::PROT_READ | libc::PROT_EXEC) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // SAFETY: tearing down the mapping we just created on the
        // failure path; no other reference to it exists yet.
        unsafe {
            libc::munmap(mapping, page_len);
        }
        return Err(Error::Io(err));
    }

    debug!(main_entry, end_of_program, page_len, "mapped executable code");

    Ok(Executable {
        mapping,
        mapping_len: page_len,
        entry_offset: main_entry,
        _storage: storage,
        executed: false,
    })
}

impl Executable {
    /// Transfers control to `main_entry` via an indirect call following
    /// the System V AMD64 ABI, and returns once the emitted code returns.
    pub fn execute(&mut self) -> Result<(), Error> {
        if self.executed {
            return Err(Error::AlreadyExecuted);
        }
        self.executed = true;

        // SAFETY: `mapping` is `PROT_READ|PROT_EXEC` and `entry_offset`
        // points at a `ret`-terminated instruction sequence produced by
        // this crate's own emitter; the callee takes no arguments and
        // returns nothing, matching the transmuted signature.
        unsafe {
            let entry = self.mapping.cast::<u8>().add(self.entry_offset);
            let main_fn: extern "C" fn() = std::mem::transmute(entry);
            main_fn();
        }
        Ok(())
    }
}

impl Drop for Executable {
    fn drop(&mut self) {
        // SAFETY: `mapping`/`mapping_len` match the `mmap` call in `seal`;
        // this is the only place that unmaps it, and it runs exactly once.
        unsafe {
            libc::munmap(self.mapping, self.mapping_len);
        }
    }
}

fn page_align(len: usize) -> usize {
    let page_size = 4096;
    len.div_ceil(page_size) * page_size
}
