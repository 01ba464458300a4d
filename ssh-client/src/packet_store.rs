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

//! Owns the active cipher and MAC engine for each direction (spec.md
//! §4.5) and mints or consumes packets against them. `NEWKEYS` replaces a
//! direction's engines atomically; nothing else mutates them.

use std::convert::TryInto;

use log::debug;

use crate::cipher::{self, CipherEngine};
use crate::error::{Error, Result};
use crate::mac::{self, MacEngine};
use crate::packet;
use crate::sshbuffer::SSHBuffer;

/// The state needed to resume parsing an inbound packet across however
/// many `poll_once()` calls it takes for the bytes to arrive.
enum ReadState {
    /// Waiting for the 4-byte length field.
    AwaitingLength,
    /// Length field decrypted; waiting for `packet_length + mac_len` more
    /// bytes before the rest can be decrypted and verified.
    AwaitingBody { length_field: [u8; 4], packet_length: u32 },
}

struct Direction {
    cipher: Box<dyn CipherEngine>,
    mac: Box<dyn MacEngine>,
    buffer: SSHBuffer,
    read_state: ReadState,
}

impl Direction {
    fn identity() -> Self {
        Direction {
            cipher: cipher::build("none", &[], &[]).expect("identity cipher always builds"),
            mac: mac::build("none", &[]).expect("identity mac always builds"),
            buffer: SSHBuffer::new(),
            read_state: ReadState::AwaitingLength,
        }
    }
}

/// Owns both directions' cipher/MAC engines and sequence numbers, and
/// turns payloads into wire bytes (and back) against whichever engines
/// are currently active.
pub struct PacketStore {
    outgoing: Direction,
    incoming: Direction,
}

impl PacketStore {
    pub fn new() -> Self {
        PacketStore { outgoing: Direction::identity(), incoming: Direction::identity() }
    }

    /// Installs new cipher and MAC engines for the outbound direction,
    /// per `SSH_MSG_NEWKEYS` (spec.md §4.10.2).
    pub fn rekey_outgoing(&mut self, cipher: Box<dyn CipherEngine>, mac: Box<dyn MacEngine>) {
        self.outgoing.cipher = cipher;
        self.outgoing.mac = mac;
    }

    pub fn rekey_incoming(&mut self, cipher: Box<dyn CipherEngine>, mac: Box<dyn MacEngine>) {
        self.incoming.cipher = cipher;
        self.incoming.mac = mac;
    }

    /// Builds the wire bytes for one outbound payload and advances the
    /// outbound sequence number.
    pub fn seal(&mut self, payload: &[u8]) -> Vec<u8> {
        let seqn = self.outgoing.buffer.seqn.0;
        debug!("writing, seqn = {:?}", seqn);
        let wire = packet::build(
            payload,
            seqn,
            self.outgoing.cipher.as_mut(),
            self.outgoing.mac.as_ref(),
        );
        self.outgoing.buffer.seqn += std::num::Wrapping(1);
        self.outgoing.buffer.bytes += payload.len();
        wire
    }

    /// Appends freshly-received bytes to the inbound accumulation buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.incoming.buffer.buffer.extend_from_slice(bytes);
    }

    /// Attempts to complete one inbound packet from whatever has been fed
    /// so far. Returns `Ok(None)` if more bytes are still needed.
    pub fn try_take_packet(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.incoming.read_state {
                ReadState::AwaitingLength => {
                    if self.incoming.buffer.buffer.len() < 4 {
                        return Ok(None);
                    }
                    let mut length_field: [u8; 4] =
                        self.incoming.buffer.buffer[..4].try_into().unwrap();
                    self.incoming.cipher.decrypt(&mut length_field);
                    let packet_length = packet::read_packet_length(&length_field)?;
                    self.incoming.buffer.buffer.drain(..4);
                    self.incoming.read_state =
                        ReadState::AwaitingBody { length_field, packet_length };
                }
                ReadState::AwaitingBody { length_field, packet_length } => {
                    let mac_len = self.incoming.mac.tag_len();
                    let needed = packet_length as usize + mac_len;
                    if self.incoming.buffer.buffer.len() < needed {
                        return Ok(None);
                    }
                    let rest: Vec<u8> = self.incoming.buffer.buffer.drain(..needed).collect();
                    let seqn = self.incoming.buffer.seqn.0;
                    let payload = packet::parse(
                        length_field,
                        &rest,
                        seqn,
                        self.incoming.cipher.as_mut(),
                        self.incoming.mac.as_ref(),
                    )?;
                    self.incoming.buffer.seqn += std::num::Wrapping(1);
                    self.incoming.buffer.bytes += payload.len();
                    self.incoming.read_state = ReadState::AwaitingLength;
                    debug!("read packet, seqn = {:?}, len = {:?}", seqn, payload.len());
                    return Ok(Some(payload));
                }
            }
        }
    }

    pub fn outgoing_sequence_number(&self) -> u32 {
        self.outgoing.buffer.seqn.0
    }

    pub fn incoming_sequence_number(&self) -> u32 {
        self.incoming.buffer.seqn.0
    }
}

impl Default for PacketStore {
    fn default() -> Self {
        PacketStore::new()
    }
}
