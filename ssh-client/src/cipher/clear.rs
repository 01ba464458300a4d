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

//! The transparent cipher used before the first `SSH_MSG_NEWKEYS`.

use super::CipherEngine;

pub(crate) struct IdentityEngine;

impl CipherEngine for IdentityEngine {
    fn block_len(&self) -> usize {
        8
    }

    fn encrypt(&mut self, _buffer: &mut [u8]) {}

    fn decrypt(&mut self, _buffer: &mut [u8]) {}
}
