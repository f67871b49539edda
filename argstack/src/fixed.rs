use std::io::Error;
use std::ops::Range;
use std::ptr;
use std::slice;

#[cfg(target_family = "unix")]
use libc::{mmap, MAP_ANON, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE};

#[cfg(target_family = "windows")]
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
#[cfg(target_family = "windows")]
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

use crate::StackMemory;

/// A 64 Kb argument stack backed by anonymous mapped pages.
///
/// Addresses handed out by this stack are real pointers into the mapping.
/// Unlike a native call stack there is no guard page choreography here; the
/// whole region is committed read/write up front, because every access goes
/// through the byte-copy interface rather than through the CPU's stack
/// machinery.
pub struct SixtyFourKbStack {
    base: *mut u8,
    sp: usize,
}

unsafe impl Send for SixtyFourKbStack {}

const SIXTY_FOUR_KB: usize = 64 * 1024;

impl SixtyFourKbStack {
    #[cfg(target_family = "unix")]
    pub fn new() -> Result<SixtyFourKbStack, Error> {
        let ptr = unsafe {
            mmap(
                ptr::null_mut(),
                SIXTY_FOUR_KB,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON | MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == MAP_FAILED {
            Err(Error::last_os_error())
        } else {
            Ok(SixtyFourKbStack {
                base: ptr as *mut u8,
                sp: ptr as usize + SIXTY_FOUR_KB,
            })
        }
    }

    #[cfg(target_family = "windows")]
    pub fn new() -> Result<SixtyFourKbStack, Error> {
        let ptr = unsafe {
            VirtualAlloc(
                ptr::null_mut(),
                SIXTY_FOUR_KB,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if ptr.is_null() {
            Err(Error::last_os_error())
        } else {
            Ok(SixtyFourKbStack {
                base: ptr as *mut u8,
                sp: ptr as usize + SIXTY_FOUR_KB,
            })
        }
    }

    fn check_range(&self, range: &Range<usize>) {
        debug_assert!(range.start >= self.top() && range.end <= self.bottom());
        debug_assert!(range.start <= range.end);
    }
}

impl StackMemory for SixtyFourKbStack {
    fn top(&self) -> usize {
        self.base as usize
    }

    fn bottom(&self) -> usize {
        self.base as usize + SIXTY_FOUR_KB
    }

    fn stack_pointer(&self) -> usize {
        self.sp
    }

    fn set_stack_pointer(&mut self, addr: usize) {
        debug_assert!(addr >= self.top() && addr <= self.bottom());
        self.sp = addr;
    }

    fn copy_bytes(&self, range: Range<usize>) -> Vec<u8> {
        self.check_range(&range);
        let len = range.end - range.start;
        unsafe { slice::from_raw_parts(range.start as *const u8, len) }.to_vec()
    }

    fn write_bytes(&mut self, addr: usize, bytes: &[u8]) {
        self.check_range(&(addr..addr + bytes.len()));
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len()) };
    }
}

#[cfg(target_family = "unix")]
impl Drop for SixtyFourKbStack {
    fn drop(&mut self) {
        let result = unsafe { libc::munmap(self.base as *mut libc::c_void, SIXTY_FOUR_KB) };
        debug_assert_eq!(result, 0);
    }
}

#[cfg(target_family = "windows")]
impl Drop for SixtyFourKbStack {
    fn drop(&mut self) {
        let result =
            unsafe { VirtualFree(self.base as *mut winapi::ctypes::c_void, 0, MEM_RELEASE) };
        debug_assert_ne!(result, 0);
    }
}
