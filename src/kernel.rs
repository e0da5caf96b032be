use std::{ptr::NonNull, sync::OnceLock};

/// Virtual memory page size of the computer. This is usually 4096.
/// We can't know it at compile time, so it is queried once and cached.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Unit type the platform specific syscalls are implemented on.
pub(crate) struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
///
/// Memory is handled in two steps: an address range is first reserved
/// (no access, nothing backing it) and then committed piece by piece as
/// the arena break moves forward.
trait PlatformMemory {
    /// Reserves an address range of `len` bytes. It returns a pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>>;

    /// Makes `len` bytes starting at `addr` readable and writable. `addr` must
    /// be page aligned and inside a range returned by `reserve_memory`.
    unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool;

    /// Returns the whole reservation of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { Kernel::page_size() })
}

/// Wrapper to use [`Kernel::reserve_memory`]
#[inline]
pub(crate) unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::reserve_memory(len) }
}

/// Wrapper to use [`Kernel::commit_memory`]
#[inline]
pub(crate) unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool {
    unsafe { Kernel::commit_memory(addr, len) }
}

/// Wrapper to use [`Kernel::return_memory`]
#[inline]
pub(crate) unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
    unsafe { Kernel::return_memory(addr, len) }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{c_int, c_void, mmap, mprotect, munmap, off_t, size_t};

    use std::ptr::NonNull;

    impl PlatformMemory for Kernel {
        unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Nothing is accessible until it gets committed.
            const PROT: c_int = libc::PROT_NONE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool {
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;

            unsafe { mprotect(addr.as_ptr().cast::<c_void>(), len as size_t, PROT) == 0 }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }

    /// Current location of the program break, `sbrk(0)`.
    pub(crate) unsafe fn program_break() -> *mut u8 {
        unsafe { libc::sbrk(0).cast::<u8>() }
    }

    /// Moves the program break forward by `increment` bytes and returns the
    /// previous break, or None when the kernel refuses.
    pub(crate) unsafe fn move_break(increment: usize) -> Option<NonNull<u8>> {
        let increment = libc::intptr_t::try_from(increment).ok()?;

        unsafe {
            let prev = libc::sbrk(increment);

            if prev == usize::MAX as *mut c_void {
                return None;
            }

            NonNull::new(prev.cast::<u8>())
        }
    }
}

#[cfg(unix)]
pub(crate) use unix::{move_break, program_break};

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use crate::kernel::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>> {
            // Reserved only, nothing is accessible yet.
            let protection = Memory::PAGE_NOACCESS;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool {
            unsafe {
                let committed = Memory::VirtualAlloc(
                    Some(addr.as_ptr() as *const c_void),
                    len,
                    Memory::MEM_COMMIT,
                    Memory::PAGE_READWRITE,
                );

                !committed.is_null()
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
