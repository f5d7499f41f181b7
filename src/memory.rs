//! # Linear-memory helpers (C3)
//!
//! Every host function reaches guest memory through this layer rather than
//! touching a `wasmi::Memory` directly. It owns the bounds checking, the
//! NUL-terminated C-string reader, and the bridge to the guest's own
//! `malloc`/`free` exports used by `set_bytes` to hand data back to the
//! guest. A failed read surfaces as `EngineError::MemoryGet`, a failed write
//! or allocation as `EngineError::MemorySet`.

use crate::errors::EngineError;
use wasmi::{Caller, Memory, TypedFunc};

/// Bounds-checked view over one frame's linear memory plus its guest
/// allocator exports (`malloc`/`free`), resolved once at instantiation.
#[derive(Clone, Copy)]
pub struct LinearMemory {
    memory: Memory,
    malloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
}

impl LinearMemory {
    /// Binds a memory helper to a frame's exported `memory`, `malloc` and
    /// `free`.
    #[must_use]
    pub fn new(memory: Memory, malloc: TypedFunc<u32, u32>, free: TypedFunc<u32, ()>) -> Self {
        Self { memory, malloc, free }
    }

    /// Raw wasmi memory handle, for callers that need to pass it through to
    /// `wasmi` APIs directly (e.g. reporting growth to AOT).
    #[must_use]
    pub fn raw(&self) -> Memory {
        self.memory
    }

    /// Reads `len` bytes starting at `ptr` out of guest memory.
    pub fn get_bytes<T>(&self, caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Result<Vec<u8>, EngineError> {
        let data = self.memory.data(caller);
        let start = ptr as usize;
        let end = start.checked_add(len as usize).ok_or(EngineError::MemoryGet)?;
        data.get(start..end).map(<[u8]>::to_vec).ok_or(EngineError::MemoryGet)
    }

    /// Reads a NUL-terminated C string starting at `ptr`. Per the decided
    /// open question (§9), a region with no NUL before the end of mapped
    /// memory returns everything found rather than erroring — `strlen`
    /// semantics, not a bounds violation.
    pub fn get_string<T>(&self, caller: &mut Caller<'_, T>, ptr: u32) -> Result<String, EngineError> {
        let data = self.memory.data(caller);
        let start = ptr as usize;
        if start > data.len() {
            return Err(EngineError::MemoryGet);
        }
        let slice = &data[start..];
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        String::from_utf8(slice[..len].to_vec()).map_err(|_| EngineError::MemoryGet)
    }

    /// Scans for the NUL terminator starting at `ptr` and returns the byte
    /// count found (the `TC_Strlen`/`strlen` primitive).
    pub fn strlen<T>(&self, caller: &mut Caller<'_, T>, ptr: u32) -> Result<u32, EngineError> {
        let data = self.memory.data(caller);
        let start = ptr as usize;
        if start > data.len() {
            return Err(EngineError::MemoryGet);
        }
        let slice = &data[start..];
        Ok(slice.iter().position(|&b| b == 0).unwrap_or(slice.len()) as u32)
    }

    /// Writes `bytes` into freshly `malloc`'d guest memory, NUL-terminating
    /// the allocation, and returns the guest pointer. Used by every host
    /// function that hands a buffer back to the guest (hash hex strings,
    /// BigInt decimal strings, JSON serialisations, …).
    pub fn set_bytes<T>(&self, mut caller: &mut Caller<'_, T>, bytes: &[u8]) -> Result<u32, EngineError> {
        let len = (bytes.len() as u32).checked_add(1).ok_or(EngineError::MemorySet)?;
        let ptr = self
            .malloc
            .call(&mut caller, len)
            .map_err(|_| EngineError::MallocMemory)?;
        if ptr == 0 {
            return Err(EngineError::MallocMemory);
        }
        self.memory
            .write(&mut caller, ptr as usize, bytes)
            .map_err(|_| EngineError::MemorySet)?;
        self.memory
            .write(&mut caller, ptr as usize + bytes.len(), &[0u8])
            .map_err(|_| EngineError::MemorySet)?;
        Ok(ptr)
    }

    /// `malloc(size)`.
    pub fn malloc<T>(&self, mut caller: &mut Caller<'_, T>, size: u32) -> Result<u32, EngineError> {
        self.malloc.call(&mut caller, size).map_err(|_| EngineError::MallocMemory)
    }

    /// `calloc(count, size)`: allocates `count * size` zeroed bytes.
    pub fn calloc<T>(&self, mut caller: &mut Caller<'_, T>, count: u32, size: u32) -> Result<u32, EngineError> {
        let total = count.checked_mul(size).ok_or(EngineError::MallocMemory)?;
        let ptr = self.malloc.call(&mut caller, total).map_err(|_| EngineError::MallocMemory)?;
        if ptr != 0 && total > 0 {
            let zeros = vec![0u8; total as usize];
            self.memory
                .write(&mut caller, ptr as usize, &zeros)
                .map_err(|_| EngineError::MemorySet)?;
        }
        Ok(ptr)
    }

    /// `realloc(ptr, new_size)`: allocate-copy-free, since the guest
    /// allocator the ABI targets exposes no native `realloc`.
    pub fn realloc<T>(&self, mut caller: &mut Caller<'_, T>, ptr: u32, old_size: u32, new_size: u32) -> Result<u32, EngineError> {
        let new_ptr = self.malloc.call(&mut caller, new_size).map_err(|_| EngineError::MallocMemory)?;
        if new_ptr == 0 {
            return Err(EngineError::MallocMemory);
        }
        let copy_len = old_size.min(new_size) as usize;
        if copy_len > 0 {
            let data = self.get_bytes(caller, ptr, copy_len as u32)?;
            self.memory
                .write(&mut caller, new_ptr as usize, &data)
                .map_err(|_| EngineError::MemorySet)?;
        }
        self.free(caller, ptr)?;
        Ok(new_ptr)
    }

    /// `free(ptr)`.
    pub fn free<T>(&self, mut caller: &mut Caller<'_, T>, ptr: u32) -> Result<(), EngineError> {
        self.free.call(&mut caller, ptr).map_err(|_| EngineError::MemorySet)
    }

    /// `memcpy(dst, src, n)`. Regions must not overlap; callers wanting
    /// overlap-safe semantics use [`Self::memmove`].
    pub fn memcpy<T>(&self, caller: &mut Caller<'_, T>, dst: u32, src: u32, n: u32) -> Result<(), EngineError> {
        let bytes = self.get_bytes(caller, src, n)?;
        self.memory
            .write(caller, dst as usize, &bytes)
            .map_err(|_| EngineError::MemorySet)
    }

    /// `memmove(dst, src, n)`: overlap-safe copy.
    pub fn memmove<T>(&self, caller: &mut Caller<'_, T>, dst: u32, src: u32, n: u32) -> Result<(), EngineError> {
        self.memcpy(caller, dst, src, n)
    }

    /// `memset(ptr, value, n)`.
    pub fn memset<T>(&self, caller: &mut Caller<'_, T>, ptr: u32, value: u8, n: u32) -> Result<(), EngineError> {
        let bytes = vec![value; n as usize];
        self.memory
            .write(caller, ptr as usize, &bytes)
            .map_err(|_| EngineError::MemorySet)
    }

    /// `memcmp(a, b, n)`, returning the classic tri-state sign.
    pub fn memcmp<T>(&self, caller: &mut Caller<'_, T>, a: u32, b: u32, n: u32) -> Result<i32, EngineError> {
        let lhs = self.get_bytes(caller, a, n)?;
        let rhs = self.get_bytes(caller, b, n)?;
        Ok(match lhs.cmp(&rhs) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        })
    }

    /// `strcmp(a, b)` over NUL-terminated guest strings.
    pub fn strcmp<T>(&self, caller: &mut Caller<'_, T>, a: u32, b: u32) -> Result<i32, EngineError> {
        let lhs = self.get_string(caller, a)?;
        let rhs = self.get_string(caller, b)?;
        Ok(match lhs.cmp(&rhs) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        })
    }

    /// `strcpy(dst, src)`: copies `src`'s NUL-terminated contents into `dst`.
    pub fn strcpy<T>(&self, caller: &mut Caller<'_, T>, dst: u32, src: u32) -> Result<u32, EngineError> {
        let s = self.get_string(caller, src)?;
        let mut bytes = s.into_bytes();
        bytes.push(0);
        self.memory
            .write(caller, dst as usize, &bytes)
            .map_err(|_| EngineError::MemorySet)?;
        Ok(dst)
    }

    /// `strconcat(a, b)`: allocates and returns a new guest string holding
    /// the concatenation of two NUL-terminated guest strings.
    pub fn strconcat<T>(&self, caller: &mut Caller<'_, T>, a: u32, b: u32) -> Result<u32, EngineError> {
        let mut lhs = self.get_string(caller, a)?;
        let rhs = self.get_string(caller, b)?;
        lhs.push_str(&rhs);
        self.set_bytes(caller, lhs.as_bytes())
    }

    /// Reports a memory-growth event. Native (AOT) code caches a raw base
    /// pointer into guest memory across calls; whenever the guest grows its
    /// memory that pointer is stale and must be refreshed before the next
    /// trampoline call. The wasmi-interpreted path re-derives the pointer on
    /// every access and has nothing to refresh.
    #[must_use]
    pub fn current_base<T>(&self, caller: &mut Caller<'_, T>) -> *mut u8 {
        self.memory.data_mut(caller).as_mut_ptr()
    }
}
