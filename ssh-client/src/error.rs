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

use thiserror::Error;

/// Every fatal or caller-visible condition the core can raise. Per spec.md
/// §7, everything touching cryptographic state, framing integrity, or
/// negotiated parameters is fatal (the core tears the connection down);
/// `ChannelNotFound` and `WouldBlock` are not.
#[derive(Debug, Error)]
pub enum Error {
    #[error("the byte transport signalled an error")]
    TransportError,

    #[error("malformed identification line: {0}")]
    MalformedIdentification(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("a read or write ran past the end of its buffer")]
    ShortBuffer,

    #[error("MAC verification failed")]
    MacMismatch,

    #[error("no common algorithm for {0}")]
    NegotiationFailed(&'static str),

    #[error("host key signature verification failed")]
    HostKeyRejected,

    #[error("all configured authentication methods were exhausted")]
    AuthExhausted,

    #[error("message id {0} is illegal in stage {1:?}")]
    UnexpectedMessage(u8, crate::connection::Stage),

    #[error("no channel with local id {0}")]
    ChannelNotFound(u32),

    #[error("remote window exhausted, retry later")]
    WouldBlock,

    #[error("index out of bounds while parsing a packet")]
    IndexOutOfBounds,

    #[error("{0}")]
    Other(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
