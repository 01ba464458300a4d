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

//! Bounds-checked read/write of the SSH wire types defined in RFC 4251 §5:
//! `byte`, `uint32`, `string`, `name-list`, `mpint`. No read or write ever
//! silently truncates or extends; every out-of-range access fails with
//! [`Error::ShortBuffer`].

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::mpint::MPInt;
use crate::namelist::NameList;

/// A read-only cursor over a packet payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::ShortBuffer);
        }
        let (slice, _) = self.buf[self.pos..].split_at(len);
        self.pos += len;
        Ok(slice)
    }

    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.byte()? != 0)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads an RFC 4251 `string`: a 4-byte length followed by that many
    /// raw bytes. Returns the body, not including the length prefix.
    pub fn string(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Reads an RFC 4251 `name-list`: a `string` whose body is a
    /// comma-separated list of US-ASCII tokens.
    pub fn name_list(&mut self) -> Result<NameList> {
        let body = self.string()?;
        let text = std::str::from_utf8(body)
            .map_err(|_| Error::MalformedPacket("name-list is not valid UTF-8"))?;
        Ok(NameList::parse(text))
    }

    /// Reads an RFC 4251 `mpint` and returns its big-endian magnitude bytes
    /// with any RFC 4251 §5 padding byte stripped. Negative mpints are
    /// rejected: this core never needs to represent one.
    pub fn mpint(&mut self) -> Result<&'a [u8]> {
        let body = self.string()?;
        if let Some(&first) = body.first() {
            if first & 0x80 != 0 {
                return Err(Error::MalformedPacket("negative mpint is not supported"));
            }
            if first == 0 && body.len() > 1 && body[1] & 0x80 == 0 {
                return Err(Error::MalformedPacket("mpint has non-canonical padding"));
            }
        }
        Ok(body)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

/// A growable byte sequence used to build an outbound payload.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    pub fn byte(&mut self, b: u8) -> &mut Self {
        self.buf.push(b);
        self
    }

    pub fn bool(&mut self, b: bool) -> &mut Self {
        self.byte(b as u8)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    pub fn raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn string(&mut self, data: &[u8]) -> &mut Self {
        self.u32(data.len() as u32);
        self.raw(data)
    }

    pub fn name_list(&mut self, list: &NameList) -> &mut Self {
        self.string(list.joined().as_bytes())
    }

    /// Writes `magnitude` as a canonical unsigned `mpint` (RFC 4251 §5),
    /// via [`MPInt::pad`].
    pub fn mpint(&mut self, magnitude: &[u8]) -> &mut Self {
        self.string(&MPInt::from_bytes(magnitude).pad())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Wipes the backing buffer in place without consuming `self`, for
    /// writers that carried secret material (e.g. a key-exchange hash's
    /// `K` component) through to a digest rather than onto the wire.
    pub fn zero(&mut self) {
        sshc_cryptovec::zero(&mut self.buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u32_and_string() {
        let mut w = Writer::new();
        w.u32(42).string(b"ssh-rsa");
        let bytes = w.finish();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.u32().unwrap(), 42);
        assert_eq!(r.string().unwrap(), b"ssh-rsa");
    }

    #[test]
    fn short_buffer_fails_cleanly() {
        let bytes = [0u8, 0, 0, 5, 1, 2];
        let mut r = Reader::new(&bytes);
        assert!(matches!(r.string(), Err(Error::ShortBuffer)));
    }

    #[test]
    fn mpint_boundary_vectors() {
        // RFC 4251 §5 examples.
        let mut w = Writer::new();
        w.mpint(&[0x80]);
        assert_eq!(w.finish(), [0x00, 0x00, 0x00, 0x02, 0x00, 0x80]);

        let mut w = Writer::new();
        w.mpint(&[0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7]);
        assert_eq!(
            w.finish(),
            [0x00, 0x00, 0x00, 0x08, 0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7]
        );

        let mut w = Writer::new();
        w.mpint(&[0xed, 0xcc]);
        assert_eq!(w.finish(), [0x00, 0x00, 0x00, 0x02, 0xed, 0xcc]);

        let mut w = Writer::new();
        w.mpint(&[]);
        assert_eq!(w.finish(), [0x00, 0x00, 0x00, 0x00]);
    }
}
