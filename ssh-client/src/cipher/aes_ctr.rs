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

//! AES-128 in counter mode (RFC 4344 §4). The counter is the 16-byte
//! initial IV derived at key-exchange time; it runs for the lifetime of
//! the direction's [`super::CipherEngine`] and is never reset between
//! packets, matching the continuous keystream RFC 4344 requires.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use generic_array::GenericArray;

use super::CipherEngine;
use crate::error::{Error, Result};

type Stream = Ctr128BE<Aes128>;

pub(crate) struct Aes128CtrEngine {
    stream: Stream,
}

impl Aes128CtrEngine {
    pub(crate) const KEY_LEN: usize = 16;
    pub(crate) const IV_LEN: usize = 16;

    pub(crate) fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if key.len() != Self::KEY_LEN || iv.len() != Self::IV_LEN {
            return Err(Error::Other("aes128-ctr requires a 16-byte key and IV"));
        }
        let stream =
            Stream::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
        Ok(Aes128CtrEngine { stream })
    }
}

impl CipherEngine for Aes128CtrEngine {
    fn block_len(&self) -> usize {
        16
    }

    fn encrypt(&mut self, buffer: &mut [u8]) {
        self.stream.apply_keystream(buffer);
    }

    fn decrypt(&mut self, buffer: &mut [u8]) {
        self.stream.apply_keystream(buffer);
    }
}
