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

//! `session` channels (RFC 4254 §5). One [`Channel`] per local id, owned
//! exclusively by [`ChannelManager`]'s table — callers only ever see a
//! `u32` token, never a shared handle, per spec.md §9's note against
//! reference-counted channel handles. Message shapes are grounded on
//! `Nurrl-ssh-packet`'s channel open/data/window-adjust structs.

use std::collections::HashMap;

use crate::encoding::{Reader, Writer};
use crate::error::{Error, Result};
use crate::msg;

/// The initial local receive window handed out on `open()`. Arbitrary but
/// positive, per spec.md §4.9; 1 MiB keeps a channel from stalling on
/// small round-trip-bound transfers.
const INITIAL_LOCAL_WINDOW: u32 = 1024 * 1024;

/// RFC 4254 §5.2 recommends staying under the SSH packet size ceiling;
/// 32 KiB − 1 is the customary choice.
const LOCAL_MAX_PACKET: u32 = 32 * 1024 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Opening,
    Open,
    Closing,
}

/// `SSH_MSG_CHANNEL_EXTENDED_DATA`'s `data_type_code` (RFC 4254 §5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedDataType {
    Stderr,
    Other(u32),
}

impl ExtendedDataType {
    fn from_code(code: u32) -> Self {
        if code == msg::EXTENDED_DATA_STDERR {
            ExtendedDataType::Stderr
        } else {
            ExtendedDataType::Other(code)
        }
    }
}

/// What a caller's `on_event` callback is told about a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Data { bytes: Vec<u8>, extended: Option<ExtendedDataType> },
    Closed,
}

struct Channel {
    state: ChannelState,
    remote_id: Option<u32>,
    remote_window: u32,
    remote_max_packet: u32,
    local_window: u32,
    eof_received: bool,
    close_sent: bool,
}

/// Packets a dispatch or send produced, and the user-facing events they
/// correspond to.
#[derive(Default)]
pub struct DispatchOutcome {
    pub events: Vec<(u32, ChannelEvent)>,
    pub outbound: Vec<Vec<u8>>,
}

/// The table of live channels, keyed by local id. Local ids are minted
/// monotonically from 1 and never reused, even after close.
pub struct ChannelManager {
    channels: HashMap<u32, Channel>,
    next_id: u32,
}

impl ChannelManager {
    pub fn new() -> Self {
        ChannelManager { channels: HashMap::new(), next_id: 1 }
    }

    /// Allocates a new local id, records it as `Opening`, and returns the
    /// `SSH_MSG_CHANNEL_OPEN` payload to send.
    pub fn open(&mut self, channel_type: &str) -> (u32, Vec<u8>) {
        let local_id = self.next_id;
        self.next_id += 1;

        self.channels.insert(
            local_id,
            Channel {
                state: ChannelState::Opening,
                remote_id: None,
                remote_window: 0,
                remote_max_packet: 0,
                local_window: INITIAL_LOCAL_WINDOW,
                eof_received: false,
                close_sent: false,
            },
        );

        let mut w = Writer::new();
        w.byte(msg::CHANNEL_OPEN);
        w.string(channel_type.as_bytes());
        w.u32(local_id);
        w.u32(INITIAL_LOCAL_WINDOW);
        w.u32(LOCAL_MAX_PACKET);
        (local_id, w.finish())
    }

    /// Queues `SSH_MSG_CHANNEL_CLOSE` if the channel is currently `Open`.
    pub fn close(&mut self, local_id: u32) -> Result<Option<Vec<u8>>> {
        let channel =
            self.channels.get_mut(&local_id).ok_or(Error::ChannelNotFound(local_id))?;
        if channel.state != ChannelState::Open || channel.close_sent {
            return Ok(None);
        }
        channel.close_sent = true;
        let remote_id = channel.remote_id.expect("Open channel always has a remote id");
        Ok(Some(close_payload(remote_id)))
    }

    /// Splits as much of `data` as the remote's currently advertised
    /// window allows into `CHANNEL_DATA` chunks no larger than its max
    /// packet size, decrementing the tracked remote window accordingly.
    /// Returns the packets to send and how many leading bytes of `data`
    /// they cover; a caller with bytes left over queues them for a later
    /// call once `CHANNEL_WINDOW_ADJUST` has grown the window again.
    /// Fails with [`Error::WouldBlock`] if the window is currently zero
    /// and `data` is non-empty, per spec.md §4.9/§9: this core never
    /// blocks the worker waiting for window space, and never silently
    /// drops bytes it couldn't fit.
    pub fn send(&mut self, local_id: u32, data: &[u8]) -> Result<(Vec<Vec<u8>>, usize)> {
        let channel =
            self.channels.get_mut(&local_id).ok_or(Error::ChannelNotFound(local_id))?;
        if channel.state != ChannelState::Open {
            return Err(Error::ChannelNotFound(local_id));
        }
        if channel.remote_window == 0 && !data.is_empty() {
            return Err(Error::WouldBlock);
        }

        let remote_id = channel.remote_id.expect("Open channel always has a remote id");
        let max_packet = channel.remote_max_packet.max(1) as usize;

        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < data.len() && channel.remote_window > 0 {
            let chunk_len = max_packet.min(channel.remote_window as usize).min(data.len() - offset);
            let chunk = &data[offset..offset + chunk_len];
            let mut w = Writer::new();
            w.byte(msg::CHANNEL_DATA);
            w.u32(remote_id);
            w.string(chunk);
            packets.push(w.finish());
            channel.remote_window -= chunk_len as u32;
            offset += chunk_len;
        }
        Ok((packets, offset))
    }

    /// Routes one inbound channel-related message. `msg_id` is the
    /// payload's first byte; `body` is everything after it.
    pub fn dispatch(&mut self, msg_id: u8, body: &[u8]) -> Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();
        let mut r = Reader::new(body);

        match msg_id {
            msg::CHANNEL_OPEN_CONFIRMATION => {
                let local_id = r.u32()?;
                let remote_id = r.u32()?;
                let remote_window = r.u32()?;
                let remote_max_packet = r.u32()?;
                let channel = self
                    .channels
                    .get_mut(&local_id)
                    .ok_or(Error::ChannelNotFound(local_id))?;
                channel.remote_id = Some(remote_id);
                channel.remote_window = remote_window;
                channel.remote_max_packet = remote_max_packet;
                channel.state = ChannelState::Open;
                outcome.events.push((local_id, ChannelEvent::Opened));
            }

            msg::CHANNEL_OPEN_FAILURE => {
                let local_id = r.u32()?;
                self.channels.remove(&local_id);
                outcome.events.push((local_id, ChannelEvent::Closed));
            }

            msg::CHANNEL_DATA => {
                let local_id = r.u32()?;
                let bytes = r.string()?.to_vec();
                self.receive_data(local_id, bytes, None, &mut outcome)?;
            }

            msg::CHANNEL_EXTENDED_DATA => {
                let local_id = r.u32()?;
                let data_type = ExtendedDataType::from_code(r.u32()?);
                let bytes = r.string()?.to_vec();
                self.receive_data(local_id, bytes, Some(data_type), &mut outcome)?;
            }

            msg::CHANNEL_WINDOW_ADJUST => {
                let local_id = r.u32()?;
                let increment = r.u32()?;
                let channel = self
                    .channels
                    .get_mut(&local_id)
                    .ok_or(Error::ChannelNotFound(local_id))?;
                channel.remote_window = channel.remote_window.saturating_add(increment);
            }

            msg::CHANNEL_EOF => {
                let local_id = r.u32()?;
                let channel = self
                    .channels
                    .get_mut(&local_id)
                    .ok_or(Error::ChannelNotFound(local_id))?;
                channel.eof_received = true;
            }

            msg::CHANNEL_CLOSE => {
                let local_id = r.u32()?;
                let channel = self
                    .channels
                    .get_mut(&local_id)
                    .ok_or(Error::ChannelNotFound(local_id))?;
                if channel.state == ChannelState::Open && !channel.close_sent {
                    let remote_id = channel.remote_id.expect("Open channel has a remote id");
                    outcome.outbound.push(close_payload(remote_id));
                }
                self.channels.remove(&local_id);
                outcome.events.push((local_id, ChannelEvent::Closed));
            }

            _ => return Err(Error::MalformedPacket("unrecognized channel message id")),
        }

        Ok(outcome)
    }

    fn receive_data(
        &mut self,
        local_id: u32,
        bytes: Vec<u8>,
        extended: Option<ExtendedDataType>,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        let channel =
            self.channels.get_mut(&local_id).ok_or(Error::ChannelNotFound(local_id))?;
        let consumed = bytes.len() as u32;
        channel.local_window = channel.local_window.saturating_sub(consumed);

        if channel.local_window < INITIAL_LOCAL_WINDOW / 2 {
            let remote_id = channel.remote_id.expect("Open channel has a remote id");
            let top_up = INITIAL_LOCAL_WINDOW - channel.local_window;
            let mut w = Writer::new();
            w.byte(msg::CHANNEL_WINDOW_ADJUST);
            w.u32(remote_id);
            w.u32(top_up);
            outcome.outbound.push(w.finish());
            channel.local_window += top_up;
        }

        outcome.events.push((local_id, ChannelEvent::Data { bytes, extended }));
        Ok(())
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        ChannelManager::new()
    }
}

fn close_payload(remote_id: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.byte(msg::CHANNEL_CLOSE);
    w.u32(remote_id);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirm(mgr: &mut ChannelManager, local_id: u32, remote_id: u32, window: u32, max_packet: u32) {
        let mut w = Writer::new();
        w.u32(local_id);
        w.u32(remote_id);
        w.u32(window);
        w.u32(max_packet);
        mgr.dispatch(msg::CHANNEL_OPEN_CONFIRMATION, &w.finish()).unwrap();
    }

    #[test]
    fn open_then_confirm_transitions_to_open() {
        let mut mgr = ChannelManager::new();
        let (local_id, payload) = mgr.open("session");
        assert_eq!(local_id, 1);
        assert_eq!(payload[0], msg::CHANNEL_OPEN);

        let mut w = Writer::new();
        w.u32(local_id);
        w.u32(42);
        w.u32(1000);
        w.u32(1000);
        let outcome = mgr.dispatch(msg::CHANNEL_OPEN_CONFIRMATION, &w.finish()).unwrap();
        assert_eq!(outcome.events, vec![(local_id, ChannelEvent::Opened)]);
    }

    #[test]
    fn send_chunks_respect_remote_window() {
        let mut mgr = ChannelManager::new();
        let (local_id, _) = mgr.open("session");
        confirm(&mut mgr, local_id, 7, 10, 4);

        let (chunks, consumed) = mgr.send(local_id, b"0123456789").unwrap();
        assert_eq!(consumed, 10);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() - 9 <= 4);
        }
    }

    #[test]
    fn send_fails_with_would_block_on_zero_window() {
        let mut mgr = ChannelManager::new();
        let (local_id, _) = mgr.open("session");
        confirm(&mut mgr, local_id, 7, 0, 100);
        assert!(matches!(mgr.send(local_id, b"x"), Err(Error::WouldBlock)));
    }

    #[test]
    fn close_ack_is_one_shot() {
        let mut mgr = ChannelManager::new();
        let (local_id, _) = mgr.open("session");
        confirm(&mut mgr, local_id, 7, 100, 100);
        let payload = mgr.close(local_id).unwrap();
        assert!(payload.is_some());
    }
}
