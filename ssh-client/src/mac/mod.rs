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

//! Per-direction message authentication (RFC 4253 §6.4, spec.md §4.7).
//! `hmac-sha2-256` is the only MAC this core negotiates once key exchange
//! completes; `Identity` (no MAC at all) is used beforehand, matching the
//! teacher's split between an unauthenticated initial state and a keyed
//! `MacAlgorithm` (`russh/Source/mac/mod.rs`).

pub(crate) mod hmac_sha256;
pub(crate) mod identity;

use crate::error::{Error, Result};
use crate::msg::MAC_HMAC_SHA2_256;

/// A keyed MAC engine bound to one direction. `sign` computes the tag over
/// `sequence_number || packet`; `verify` recomputes it and compares in
/// constant time.
pub trait MacEngine: Send {
    fn tag_len(&self) -> usize;
    fn sign(&self, sequence_number: u32, packet: &[u8]) -> Vec<u8>;
    fn verify(&self, sequence_number: u32, packet: &[u8], tag: &[u8]) -> bool;
}

pub fn build(name: &str, key: &[u8]) -> Result<Box<dyn MacEngine>> {
    match name {
        MAC_HMAC_SHA2_256 => Ok(Box::new(hmac_sha256::HmacSha256Engine::new(key)?)),
        "none" => Ok(Box::new(identity::IdentityEngine)),
        _ => Err(Error::NegotiationFailed("mac")),
    }
}

pub fn key_len(name: &str) -> usize {
    match name {
        MAC_HMAC_SHA2_256 => hmac_sha256::HmacSha256Engine::KEY_LEN,
        _ => 0,
    }
}
