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

//! `hmac-sha2-256` (RFC 6668). The tag covers the sequence number followed
//! by the whole unencrypted packet (length prefix, padding length,
//! payload and padding), per RFC 4253 §6.4.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::MacEngine;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub(crate) struct HmacSha256Engine {
    key: Vec<u8>,
}

impl HmacSha256Engine {
    pub(crate) const KEY_LEN: usize = 32;

    pub(crate) fn new(key: &[u8]) -> Result<Self> {
        if key.len() != Self::KEY_LEN {
            return Err(Error::Other("hmac-sha2-256 requires a 32-byte key"));
        }
        Ok(HmacSha256Engine { key: key.to_vec() })
    }

    fn compute(&self, sequence_number: u32, packet: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(&sequence_number.to_be_bytes());
        mac.update(packet);
        mac.finalize().into_bytes().to_vec()
    }
}

impl MacEngine for HmacSha256Engine {
    fn tag_len(&self) -> usize {
        32
    }

    fn sign(&self, sequence_number: u32, packet: &[u8]) -> Vec<u8> {
        self.compute(sequence_number, packet)
    }

    fn verify(&self, sequence_number: u32, packet: &[u8], tag: &[u8]) -> bool {
        let expected = self.compute(sequence_number, packet);
        expected.ct_eq(tag).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let engine = HmacSha256Engine::new(&[0x11; 32]).unwrap();
        let packet = b"a framed ssh packet";
        let tag = engine.sign(7, packet);
        assert_eq!(tag.len(), 32);
        assert!(engine.verify(7, packet, &tag));
    }

    #[test]
    fn verify_rejects_wrong_sequence_number() {
        let engine = HmacSha256Engine::new(&[0x11; 32]).unwrap();
        let packet = b"a framed ssh packet";
        let tag = engine.sign(7, packet);
        assert!(!engine.verify(8, packet, &tag));
    }

    #[test]
    fn verify_rejects_tampered_packet() {
        let engine = HmacSha256Engine::new(&[0x11; 32]).unwrap();
        let tag = engine.sign(0, b"original");
        assert!(!engine.verify(0, b"tampered", &tag));
    }
}
