//! Scratch pad allocation with large and locked pages.
//!
//! Every hash walks 2 MiB of memory in a data-dependent pattern, so TLB
//! misses dominate unless the pad sits on a single huge page. The policy
//! mirrors the classic miner settings: force huge pages, forbid them, use
//! them without locking, or try and fall back with a warning.
use std::alloc::{alloc, dealloc, Layout};
use std::slice;

use log::warn;

use crate::MinerError;

/// Scratch pad size. Compile-time constant for variants 0, 1 and 2.
pub const SCRATCHPAD_SIZE: usize = 1 << 21;

/// Alignment requirement for the scratch pad.
pub const SCRATCHPAD_ALIGNMENT: usize = 16;

/// How worker scratch pads should be backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// Huge pages plus mlock; failure to get them is fatal.
    AlwaysUse,
    /// Plain heap allocation, no locking.
    NeverUse,
    /// Huge pages without mlock; failure is fatal.
    NoMlock,
    /// Huge pages first, fall back to plain pages with a logged warning.
    PrintWarning,
}

/// An exclusively owned 2 MiB hash working area.
///
/// The backing memory is 16 byte aligned and, depending on the policy, huge
/// page backed and locked. Scratch pads are never shared between workers.
#[derive(Debug)]
pub struct Scratchpad {
    ptr: *mut u8,
    mapped: bool,
    huge_pages: bool,
}

// The pad is exclusively owned by one worker for its lifetime.
unsafe impl Send for Scratchpad {}

impl Scratchpad {
    pub fn allocate(policy: MemoryPolicy) -> Result<Scratchpad, MinerError> {
        match policy {
            MemoryPolicy::NeverUse => Scratchpad::plain(),
            MemoryPolicy::AlwaysUse => Scratchpad::huge(true),
            MemoryPolicy::NoMlock => Scratchpad::huge(false),
            MemoryPolicy::PrintWarning => Scratchpad::huge(true).or_else(|e| {
                warn!("huge page allocation failed ({}), falling back to plain pages", e);
                Scratchpad::plain()
            }),
        }
    }

    fn plain() -> Result<Scratchpad, MinerError> {
        let layout = Layout::from_size_align(SCRATCHPAD_SIZE, SCRATCHPAD_ALIGNMENT)
            .expect("scratchpad layout is valid");
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(MinerError::Scratchpad("out of memory".to_string()));
        }

        Ok(Scratchpad {
            ptr,
            mapped: false,
            huge_pages: false,
        })
    }

    #[cfg(target_os = "linux")]
    fn huge(lock: bool) -> Result<Scratchpad, MinerError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                SCRATCHPAD_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB | libc::MAP_POPULATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(MinerError::Scratchpad(
                "mmap with MAP_HUGETLB failed; check vm.nr_hugepages".to_string(),
            ));
        }

        if lock && unsafe { libc::mlock(ptr, SCRATCHPAD_SIZE) } != 0 {
            unsafe { libc::munmap(ptr, SCRATCHPAD_SIZE) };
            return Err(MinerError::Scratchpad(
                "mlock failed; check the memlock resource limit".to_string(),
            ));
        }

        Ok(Scratchpad {
            ptr: ptr as *mut u8,
            mapped: true,
            huge_pages: true,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn huge(_lock: bool) -> Result<Scratchpad, MinerError> {
        Err(MinerError::Scratchpad(
            "huge pages are not supported on this platform".to_string(),
        ))
    }

    /// Whether the pad ended up on huge pages.
    pub fn uses_huge_pages(&self) -> bool {
        self.huge_pages
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, SCRATCHPAD_SIZE) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr, SCRATCHPAD_SIZE) }
    }
}

impl AsMut<[u8]> for Scratchpad {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Drop for Scratchpad {
    fn drop(&mut self) {
        if self.mapped {
            #[cfg(target_os = "linux")]
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, SCRATCHPAD_SIZE);
            }
        } else {
            let layout = Layout::from_size_align(SCRATCHPAD_SIZE, SCRATCHPAD_ALIGNMENT)
                .expect("scratchpad layout is valid");
            unsafe { dealloc(self.ptr, layout) };
        }
    }
}
