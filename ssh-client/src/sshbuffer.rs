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

//! The bookkeeping a [`crate::packet_store::PacketStore`] keeps per
//! direction: the accumulation buffer for partially-received bytes and the
//! monotonic sequence counter (RFC 4253 §6.4 — 32 bits, wraps, never
//! reset).

use std::num::Wrapping;

#[derive(Default)]
pub struct SSHBuffer {
    /// Raw bytes: an in-progress outbound packet while building, or
    /// accumulated inbound bytes while parsing.
    pub buffer: Vec<u8>,
    /// This direction's next sequence number.
    pub seqn: Wrapping<u32>,
    /// Total plaintext payload bytes that have crossed this direction,
    /// for diagnostics only.
    pub bytes: usize,
    /// Expected total length of the packet currently being read, once
    /// known; `0` while only the (possibly still-encrypted) length field
    /// has been seen.
    pub len: usize,
}

impl SSHBuffer {
    pub fn new() -> Self {
        SSHBuffer::default()
    }
}
