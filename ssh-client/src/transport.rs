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

//! The byte-transport glue: the identification-line exchange (RFC 4253
//! §4.2) that precedes the binary packet protocol, and a small outbound
//! byte queue drained against the caller-supplied `send`/`recv`
//! functions (spec.md §6). Neither function is ever called with blocking
//! intent; `0` means "try again on the next `poll_once()`".

use std::collections::VecDeque;

use crate::config::{RecvFn, SendFn};
use crate::error::{Error, Result};

/// Longest identification line this core will accept or send, CR LF
/// included (RFC 4253 §4.2).
const MAX_IDENTIFICATION_LEN: usize = 255;

pub fn client_identification_line() -> Vec<u8> {
    let mut line = concat!("SSH-2.0-sshc_", env!("CARGO_PKG_VERSION")).as_bytes().to_vec();
    line.extend_from_slice(b"\r\n");
    line
}

/// Scans `buf` for the server's identification line. Returns the line
/// (without trailing CR/LF) and the byte offset where binary-packet input
/// begins, or `None` if the LF hasn't arrived yet. A missing CR before
/// the LF is accepted, per spec.md §4.10.1.
pub fn scan_identification(buf: &[u8]) -> Result<Option<(String, usize)>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(lf) => {
            if lf + 1 > MAX_IDENTIFICATION_LEN {
                return Err(Error::MalformedIdentification(
                    "identification line exceeds 255 bytes".into(),
                ));
            }
            let mut end = lf;
            if end > 0 && buf[end - 1] == b'\r' {
                end -= 1;
            }
            let line = std::str::from_utf8(&buf[..end])
                .map_err(|_| Error::MalformedIdentification("not valid UTF-8".into()))?
                .to_owned();
            Ok(Some((line, lf + 1)))
        }
        None if buf.len() > MAX_IDENTIFICATION_LEN => Err(Error::MalformedIdentification(
            "no LF within 255 bytes".into(),
        )),
        None => Ok(None),
    }
}

/// An outbound byte queue, drained against the caller's `send` a chunk at
/// a time.
#[derive(Default)]
pub struct OutboundQueue {
    pending: VecDeque<u8>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        OutboundQueue::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drains as much of the queue as `send` accepts in one call.
    /// `Some(0)` from `send` stops the drain for this poll iteration
    /// without error; `None` is a transport failure.
    pub fn drain_once(&mut self, send: &mut SendFn) -> Result<()> {
        while !self.pending.is_empty() {
            let chunk: Vec<u8> = self.pending.iter().copied().collect();
            match send(&chunk) {
                Some(0) => break,
                Some(written) => {
                    self.pending.drain(..written.min(self.pending.len()));
                }
                None => return Err(Error::TransportError),
            }
        }
        Ok(())
    }
}

/// Reads whatever is available from `recv` into `into`, once.
/// Returns the number of bytes read (`0` means "nothing available").
pub fn pump_recv(recv: &mut RecvFn, into: &mut Vec<u8>) -> Result<usize> {
    let mut scratch = [0u8; 4096];
    match recv(&mut scratch) {
        Some(0) => Ok(0),
        Some(n) => {
            into.extend_from_slice(&scratch[..n]);
            Ok(n)
        }
        None => Err(Error::TransportError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_identification_waits_for_lf() {
        assert!(scan_identification(b"SSH-2.0-partial").unwrap().is_none());
    }

    #[test]
    fn scan_identification_strips_cr_lf() {
        let (line, next) = scan_identification(b"SSH-2.0-OpenSSH_9.0\r\nrest").unwrap().unwrap();
        assert_eq!(line, "SSH-2.0-OpenSSH_9.0");
        assert_eq!(&b"SSH-2.0-OpenSSH_9.0\r\nrest"[next..], b"rest");
    }

    #[test]
    fn scan_identification_accepts_missing_cr() {
        let (line, _) = scan_identification(b"SSH-2.0-OpenSSH_9.0\nrest").unwrap().unwrap();
        assert_eq!(line, "SSH-2.0-OpenSSH_9.0");
    }

    #[test]
    fn scan_identification_rejects_overlong_line() {
        let long = vec![b'a'; 300];
        assert!(scan_identification(&long).is_err());
    }

    #[test]
    fn outbound_queue_drains_against_send_callback() {
        let mut queue = OutboundQueue::new();
        queue.push(b"hello world");
        let mut written = Vec::new();
        let mut send = |bytes: &[u8]| -> Option<usize> {
            written.extend_from_slice(bytes);
            Some(bytes.len())
        };
        queue.drain_once(&mut send).unwrap();
        assert!(queue.is_empty());
        assert_eq!(written, b"hello world");
    }
}
