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

//! A minimal client-side implementation of the SSH transport (RFC 4253),
//! user authentication (RFC 4252) and connection (RFC 4254) protocols.
//!
//! This crate does not open sockets. The caller supplies a `send`/`recv`
//! pair of non-blocking byte-transport callbacks through [`Config`] and
//! drives the handshake and any channel traffic by calling
//! [`ConnectionCore::poll_once`] in a loop; everything else — host key
//! trust, credential prompting, the executable that owns the socket — is
//! the caller's responsibility.
//!
//! ```ignore
//! let mut core = ConnectionCore::new(config);
//! core.connect()?;
//! loop {
//!     core.poll_once()?;
//!     if core.state() == State::Connected {
//!         break;
//!     }
//! }
//! ```

mod cipher;
mod mac;

mod channel;
mod config;
mod connection;
mod encoding;
mod error;
mod hostkey;
mod kex;
mod mpint;
mod msg;
mod namelist;
mod packet;
mod packet_store;
mod sshbuffer;
mod transport;
mod userauth;

pub use channel::{ChannelEvent, ExtendedDataType};
pub use config::{Config, LogLevel, OnAuthFn, OnConnectFn, OnEventFn, OnLogFn, HostKeyVerifierFn, RecvFn, SendFn};
pub use connection::{ConnectionCore, Stage, State};
pub use error::{Error, Result};
pub use userauth::AuthMethod;
