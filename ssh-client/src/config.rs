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

//! The options a caller hands to [`crate::connection::ConnectionCore`]
//! (spec.md §6). A plain struct of callbacks, grounded on the original
//! `SSH::ClientOptions` (`ssh_impl.h`/`win32_harness.cpp`) rather than a
//! builder: the original sets every field on one value before
//! constructing its client, and this core does the same.

use crate::channel::ChannelEvent;
use crate::userauth::AuthMethod;

/// How noisy [`Config::on_log`] should be. Ordered so `level <=
/// configured` gates a message, matching the original's `mLogLevel`
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes hex dumps of raw packet bytes (`debug.h` in the original).
    Trace,
}

/// `send(bytes) -> Some(written) | None` (transport error).
pub type SendFn<'a> = dyn FnMut(&[u8]) -> Option<usize> + 'a;

/// `recv(buf) -> Some(read) | None` (transport error); `Some(0)` means no
/// data is available right now.
pub type RecvFn<'a> = dyn FnMut(&mut [u8]) -> Option<usize> + 'a;

/// Fills `scratch` with the secret material `method` needs (currently
/// only `password`'s plaintext) and returns how many bytes were written.
pub type OnAuthFn<'a> = dyn FnMut(AuthMethod, &mut Vec<u8>) -> Option<usize> + 'a;

pub type OnConnectFn<'a> = dyn FnMut() + 'a;

pub type OnEventFn<'a> = dyn FnMut(u32, ChannelEvent) + 'a;

pub type OnLogFn<'a> = dyn FnMut(LogLevel, &str) + 'a;

/// Returns `true` to accept `host_key_blob` for `hostname`; see spec.md
/// §10's open-question resolution for why there is no default
/// trust-on-first-use store. A `None` verifier accepts any host key
/// (logged at [`LogLevel::Warn`] as insecure).
pub type HostKeyVerifierFn<'a> = dyn Fn(&[u8], &str) -> bool + 'a;

pub struct Config<'a> {
    pub send: Box<SendFn<'a>>,
    pub recv: Box<RecvFn<'a>>,
    pub on_auth: Box<OnAuthFn<'a>>,
    pub on_connect: Box<OnConnectFn<'a>>,
    pub on_event: Box<OnEventFn<'a>>,
    pub on_log: Box<OnLogFn<'a>>,
    pub host_key_verifier: Option<Box<HostKeyVerifierFn<'a>>>,
    pub auth_methods: Vec<AuthMethod>,
    pub username: String,
    pub log_level: LogLevel,
}

impl<'a> Config<'a> {
    pub fn log(&mut self, level: LogLevel, message: &str) {
        if level <= self.log_level {
            (self.on_log)(level, message);
        }
    }

    /// Hex-dumps `bytes` through `on_log` at [`LogLevel::Trace`] only,
    /// mirroring the original's level-gated `LogBuffer` (`debug.h`).
    pub fn log_buffer(&mut self, label: &str, bytes: &[u8]) {
        if self.log_level < LogLevel::Trace {
            return;
        }
        use std::fmt::Write as _;
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            let _ = write!(hex, "{:02x}", byte);
        }
        (self.on_log)(LogLevel::Trace, &format!("{}: {}", label, hex));
    }
}
