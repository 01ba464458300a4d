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

//! The binary packet protocol (RFC 4253 §6): build an outbound packet from
//! a payload (pad, MAC, encrypt), and parse an inbound one (decrypt,
//! verify MAC, expose the payload). Grounded on the teacher's
//! `SealingKey::write`/`OpeningKey::read` (`russh/Source/cipher/mod.rs`),
//! adapted from async stream reads to the synchronous accumulation buffer
//! [`crate::sshbuffer::SSHBuffer`] spec.md §4.5 calls for.

use rand::RngCore;

use crate::cipher::CipherEngine;
use crate::error::{Error, Result};
use crate::mac::MacEngine;

/// `packet_length` above this is rejected outright (RFC 4253 §6.1).
pub const MAX_PACKET_LENGTH: u32 = 35_000;

/// Smallest legal `packet_length` value.
const MIN_PACKET_LENGTH: u32 = 16;

fn framing_block(cipher_block_len: usize) -> usize {
    cipher_block_len.max(8)
}

/// Builds one complete outbound packet: `packet_length || padding_length
/// || payload || padding`, encrypted in place, with its MAC appended.
pub fn build(
    payload: &[u8],
    sequence_number: u32,
    cipher: &mut dyn CipherEngine,
    mac: &dyn MacEngine,
) -> Vec<u8> {
    let block = framing_block(cipher.block_len());
    let mac_len = mac.tag_len();

    let length_before_padding = 4 + 1 + payload.len() + mac_len;
    let mut padding = block - (length_before_padding % block);
    if padding < 4 {
        padding += block;
    }

    let packet_length = 1 + payload.len() + padding;

    let mut plaintext = Vec::with_capacity(4 + packet_length);
    plaintext.extend_from_slice(&(packet_length as u32).to_be_bytes());
    plaintext.push(padding as u8);
    plaintext.extend_from_slice(payload);
    let pad_start = plaintext.len();
    plaintext.resize(pad_start + padding, 0);
    rand::thread_rng().fill_bytes(&mut plaintext[pad_start..]);

    let tag = mac.sign(sequence_number, &plaintext);

    cipher.encrypt(&mut plaintext);
    plaintext.extend_from_slice(&tag);
    plaintext
}

/// How many ciphertext bytes a caller must decrypt before `packet_length`
/// is known. Both ciphers this core negotiates (`Identity`, `aes128-ctr`)
/// apply a keystream that can be consumed at any granularity, so only the
/// 4-byte length field itself is needed up front — unlike a chaining block
/// cipher, there is no reason to wait for a whole `framing_block`.
pub fn first_block_len(_cipher_block_len: usize) -> usize {
    4
}

/// Once `first_block_len` bytes have been decrypted in place, reads
/// `packet_length` and validates it against RFC 4253 §6.1's bounds.
pub fn read_packet_length(decrypted_first_block: &[u8]) -> Result<u32> {
    if decrypted_first_block.len() < 4 {
        return Err(Error::ShortBuffer);
    }
    let packet_length = u32::from_be_bytes([
        decrypted_first_block[0],
        decrypted_first_block[1],
        decrypted_first_block[2],
        decrypted_first_block[3],
    ]);
    if packet_length < MIN_PACKET_LENGTH || packet_length > MAX_PACKET_LENGTH {
        return Err(Error::MalformedPacket("packet_length out of range"));
    }
    Ok(packet_length)
}

/// Given the full ciphertext for one packet (`packet_length` bytes,
/// starting right after the initial length field, plus the trailing MAC
/// tag), decrypts it, verifies the MAC, and returns the payload.
///
/// `length_field` is the 4 still-undecrypted (for non-identity ciphers,
/// already-decrypted) bytes that preceded `rest_ciphertext`; both are
/// needed because the MAC covers the length field too.
pub fn parse(
    length_field: [u8; 4],
    rest_ciphertext: &[u8],
    sequence_number: u32,
    cipher: &mut dyn CipherEngine,
    mac: &dyn MacEngine,
) -> Result<Vec<u8>> {
    let mac_len = mac.tag_len();
    if rest_ciphertext.len() < mac_len {
        return Err(Error::ShortBuffer);
    }
    let (body_ciphertext, tag) = rest_ciphertext.split_at(rest_ciphertext.len() - mac_len);

    let mut plaintext = body_ciphertext.to_vec();
    cipher.decrypt(&mut plaintext);

    let mut whole = Vec::with_capacity(4 + plaintext.len());
    whole.extend_from_slice(&length_field);
    whole.extend_from_slice(&plaintext);

    if !mac.verify(sequence_number, &whole, tag) {
        return Err(Error::MacMismatch);
    }

    let padding_length = *plaintext.first().ok_or(Error::ShortBuffer)? as usize;
    let payload_len = plaintext
        .len()
        .checked_sub(1 + padding_length)
        .ok_or(Error::MalformedPacket("padding_length exceeds packet"))?;
    Ok(plaintext[1..1 + payload_len].to_vec())
}
