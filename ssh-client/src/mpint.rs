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

//! `mpint`: RFC 4251 §5's signed multi-precision-integer wire format. This
//! core only ever handles non-negative values (DH public values, the shared
//! secret, RSA host-key parameters), so [`MPInt`] only implements the
//! unsigned subset of the format.
//!
//! The original C++ implementation (`mpint.cpp`) pads in place with a
//! `std::move` over the backing array; per spec.md §9 we instead keep the
//! magnitude untouched and compute the canonical encoding on demand, which
//! sidesteps the aliasing hazard the original comment calls out.

use num_bigint::BigUint;

/// An owned, non-negative multi-precision integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MPInt {
    /// Big-endian magnitude, without any leading zero padding byte.
    magnitude: Vec<u8>,
}

impl MPInt {
    /// Builds an `MPInt` from a big-endian magnitude, stripping any leading
    /// zero bytes so the internal representation is always minimal.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut i = 0;
        while i < bytes.len() && bytes[i] == 0 {
            i += 1;
        }
        MPInt { magnitude: bytes[i..].to_vec() }
    }

    pub fn from_biguint(n: &BigUint) -> Self {
        MPInt::from_bytes(&n.to_bytes_be())
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.magnitude)
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// The minimal big-endian magnitude, with no padding byte.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    /// The canonical RFC 4251 §5 wire encoding of the `mpint`'s *body*
    /// (i.e. the bytes a `string` would carry, not including its own
    /// 4-byte length prefix): a leading `0x00` is inserted iff the high bit
    /// of the first magnitude byte is set. Mirrors the original's
    /// `Prepare()`, renamed `pad()` per spec.md §4.2.
    pub fn pad(&self) -> Vec<u8> {
        if self.magnitude.is_empty() {
            return Vec::new();
        }
        if self.magnitude[0] & 0x80 != 0 {
            let mut out = Vec::with_capacity(self.magnitude.len() + 1);
            out.push(0);
            out.extend_from_slice(&self.magnitude);
            out
        } else {
            self.magnitude.clone()
        }
    }

    /// Inverse of [`MPInt::pad`]: strips the padding byte if present.
    pub fn unpad(padded: &[u8]) -> Self {
        MPInt::from_bytes(padded)
    }
}

impl From<&BigUint> for MPInt {
    fn from(n: &BigUint) -> Self {
        MPInt::from_biguint(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc4251_vectors() {
        assert_eq!(MPInt::from_bytes(&[0x80]).pad(), vec![0x00, 0x80]);
        assert_eq!(
            MPInt::from_bytes(&[0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7]).pad(),
            vec![0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7]
        );
        assert_eq!(MPInt::from_bytes(&[0xed, 0xcc]).pad(), vec![0xed, 0xcc]);
        assert!(MPInt::from_bytes(&[]).pad().is_empty());
    }

    #[test]
    fn round_trip_law() {
        for sample in [&[0x80u8][..], &[0x01, 0x02, 0x03], &[], &[0x7f, 0xff]] {
            let m = MPInt::from_bytes(sample);
            let padded = m.pad();
            assert_eq!(MPInt::unpad(&padded), m);
        }
    }

    #[test]
    fn zero_is_empty() {
        assert!(MPInt::from_biguint(&BigUint::from(0u32)).is_zero());
    }
}
