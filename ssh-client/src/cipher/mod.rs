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

//! Keyed symmetric bulk cipher (spec.md §4.6). Two variants are
//! implemented: `Identity` (transparent, used before the first key
//! exchange completes) and `aes128-ctr`, the only bulk cipher this core
//! negotiates. Trimmed from the teacher's `Cipher`/`OpeningKey`/
//! `SealingKey` trait split (`russh/Source/cipher/mod.rs`, which registers
//! `aes192/256-ctr`, `aes256-gcm@openssh.com` and
//! `chacha20-poly1305@openssh.com` and bundles MAC into the AEAD variants)
//! down to the two algorithms spec.md names. Unlike the teacher, MAC is
//! never bundled into the cipher here: spec.md §4.6/§4.7 keep cipher and
//! MAC as separate engines owned by [`crate::packet_store::PacketStore`].

pub(crate) mod aes_ctr;
pub(crate) mod clear;

use crate::error::{Error, Result};
use crate::msg::CIPHER_AES128_CTR;

/// A keyed cipher engine bound to one direction (client→server or
/// server→client). `encrypt`/`decrypt` both run in place; for `aes128-ctr`
/// this is the same keystream XOR whichever way it is called, but the two
/// names are kept distinct to match spec.md §4.6 and to leave room for a
/// future non-involutory algorithm.
pub trait CipherEngine: Send {
    /// Block size used for padding math (spec.md §4.4). The identity
    /// cipher has no real block structure but reports the RFC 4253 §6
    /// minimum of 8, per spec.md §4.6.
    fn block_len(&self) -> usize;

    fn encrypt(&mut self, buffer: &mut [u8]);
    fn decrypt(&mut self, buffer: &mut [u8]);
}

/// Builds the named cipher's directional engine, keyed and ready.
pub fn build(name: &str, key: &[u8], iv: &[u8]) -> Result<Box<dyn CipherEngine>> {
    match name {
        CIPHER_AES128_CTR => Ok(Box::new(aes_ctr::Aes128CtrEngine::new(key, iv)?)),
        "none" => Ok(Box::new(clear::IdentityEngine)),
        _ => Err(Error::NegotiationFailed("cipher")),
    }
}

/// The key length, in bytes, the named cipher requires. Used to size the
/// key-derivation requests before any engine exists.
pub fn key_len(name: &str) -> usize {
    match name {
        CIPHER_AES128_CTR => aes_ctr::Aes128CtrEngine::KEY_LEN,
        _ => 0,
    }
}

/// The IV length, in bytes, the named cipher requires.
pub fn iv_len(name: &str) -> usize {
    match name {
        CIPHER_AES128_CTR => aes_ctr::Aes128CtrEngine::IV_LEN,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_transparent() {
        let mut engine = build("none", &[], &[]).unwrap();
        let mut buf = *b"hello";
        engine.encrypt(&mut buf);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn unknown_cipher_is_rejected() {
        assert!(build("twofish-cbc", &[0; 16], &[0; 16]).is_err());
    }
}
