// Copyright 2016 Pierre-Étienne Meunier
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A `Vec<u8>`-alike for holding secret material: session keys, the shared
//! secret `K`, password scratch buffers. Its backing memory is zeroed
//! (through a volatile write, so the compiler cannot elide it) whenever the
//! vector shrinks, clears, or drops, and the allocation is `mlock`ed
//! (`VirtualLock` on Windows) on a best-effort basis so the bytes are less
//! likely to end up in a core dump or get paged to disk.

use std::ops::{Deref, DerefMut};
use std::ptr;

/// A zeroizing byte buffer.
pub struct CryptoVec {
    buf: Vec<u8>,
    locked: bool,
}

impl std::fmt::Debug for CryptoVec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "CryptoVec {{ len: {} }}", self.buf.len())
    }
}

impl Default for CryptoVec {
    fn default() -> Self { Self::new() }
}

impl CryptoVec {
    pub fn new() -> Self {
        CryptoVec { buf: Vec::new(), locked: false }
    }

    pub fn with_capacity(cap: usize) -> Self {
        let mut v = CryptoVec { buf: Vec::with_capacity(cap), locked: false };
        v.lock();
        v
    }

    pub fn from_slice(data: &[u8]) -> Self {
        let mut v = Self::with_capacity(data.len());
        v.extend(data);
        v
    }

    pub fn len(&self) -> usize { self.buf.len() }

    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.lock();
    }

    pub fn push(&mut self, byte: u8) {
        self.buf.push(byte);
        self.lock();
    }

    /// Grows or shrinks the vector to exactly `new_len`. Bytes discarded by
    /// a shrink are zeroed before being dropped.
    pub fn resize(&mut self, new_len: usize) {
        if new_len < self.buf.len() {
            zero(&mut self.buf[new_len..]);
        }
        self.buf.resize(new_len, 0);
        self.lock();
    }

    /// Truncates to zero length without releasing the allocation, zeroing
    /// everything first.
    pub fn clear(&mut self) {
        zero(&mut self.buf);
        self.buf.clear();
    }

    fn lock(&mut self) {
        if !self.locked && self.buf.capacity() > 0 {
            self.locked = mlock(self.buf.as_ptr(), self.buf.capacity());
        }
    }

    fn unlock(&mut self) {
        if self.locked {
            munlock(self.buf.as_ptr(), self.buf.capacity());
            self.locked = false;
        }
    }
}

impl Drop for CryptoVec {
    fn drop(&mut self) {
        zero(&mut self.buf);
        self.unlock();
    }
}

impl Deref for CryptoVec {
    type Target = [u8];
    fn deref(&self) -> &[u8] { &self.buf }
}

impl DerefMut for CryptoVec {
    fn deref_mut(&mut self) -> &mut [u8] { &mut self.buf }
}

impl From<Vec<u8>> for CryptoVec {
    fn from(buf: Vec<u8>) -> Self {
        let mut v = CryptoVec { buf, locked: false };
        v.lock();
        v
    }
}

impl Clone for CryptoVec {
    fn clone(&self) -> Self { Self::from_slice(&self.buf) }
}

impl PartialEq for CryptoVec {
    fn eq(&self, other: &Self) -> bool { self.buf == other.buf }
}
impl Eq for CryptoVec {}

/// Overwrites `buf` with zeroes through a volatile write, so the compiler
/// cannot prove the write is dead and drop it.
pub fn zero(buf: &mut [u8]) {
    for byte in buf.iter_mut() {
        unsafe { ptr::write_volatile(byte, 0) };
    }
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
}

#[cfg(unix)]
fn mlock(ptr: *const u8, len: usize) -> bool {
    if len == 0 {
        return false;
    }
    unsafe { libc::mlock(ptr as *const libc::c_void, len) == 0 }
}

#[cfg(unix)]
fn munlock(ptr: *const u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        libc::munlock(ptr as *const libc::c_void, len);
    }
}

#[cfg(windows)]
fn mlock(ptr: *const u8, len: usize) -> bool {
    if len == 0 {
        return false;
    }
    unsafe { winapi::um::memoryapi::VirtualLock(ptr as *mut winapi::ctypes::c_void, len) != 0 }
}

#[cfg(windows)]
fn munlock(ptr: *const u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        winapi::um::memoryapi::VirtualUnlock(ptr as *mut winapi::ctypes::c_void, len);
    }
}

#[cfg(not(any(unix, windows)))]
fn mlock(_ptr: *const u8, _len: usize) -> bool { false }

#[cfg(not(any(unix, windows)))]
fn munlock(_ptr: *const u8, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_and_deref() {
        let mut v = CryptoVec::new();
        v.extend(&[1, 2, 3]);
        assert_eq!(&v[..], &[1, 2, 3]);
    }

    #[test]
    fn resize_zeroes_truncated_tail() {
        let mut v = CryptoVec::from_slice(&[1, 2, 3, 4]);
        v.resize(2);
        assert_eq!(&v[..], &[1, 2]);
    }

    #[test]
    fn clear_empties() {
        let mut v = CryptoVec::from_slice(&[9, 9, 9]);
        v.clear();
        assert!(v.is_empty());
    }
}
