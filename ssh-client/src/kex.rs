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

//! `diffie-hellman-group14-sha1` (RFC 4253 §8.2, RFC 3526 §3): MODP group
//! 14 (2048-bit) key exchange, then the six directional keys RFC 4253 §7.2
//! derives from the shared secret and exchange hash.
//!
//! The private exponent is generated through [`rand::rngs::OsRng`] in
//! normal operation; [`KexHandler::with_private_exponent`] exists only so
//! tests can pin it and reproduce a fixed exchange hash, per spec.md §10's
//! resolution that the KEXINIT cookie itself is never faked.

use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use sha1::{Digest, Sha1};

use crate::encoding::Writer;
use crate::mpint::MPInt;

/// RFC 3526 §3's 2048-bit MODP group 14 prime, big-endian.
#[rustfmt::skip]
const GROUP14_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519",
    "B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7",
    "EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F",
    "24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C5",
    "5D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9E",
    "D529077096966D670C354E4ABC9804F1746C08CA18217C32905E462",
    "E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5",
    "A8AACAA68FFFFFFFFFFFFFFFF",
);

fn group14_prime() -> BigUint {
    BigUint::parse_bytes(GROUP14_PRIME_HEX.as_bytes(), 16)
        .expect("GROUP14_PRIME_HEX is a fixed valid hex literal")
}

/// One side's half of a `diffie-hellman-group14-sha1` exchange. The
/// private exponent is kept as its big-endian magnitude in a
/// [`sshc_cryptovec::CryptoVec`] rather than as a standing `BigUint`, so it
/// is wiped when the handler drops instead of waiting on `Vec`'s ordinary
/// deallocation; `num-bigint` itself has no zeroizing story, so it is only
/// ever reconstituted into a `BigUint` for the lifetime of a single
/// `modpow` call.
pub struct KexHandler {
    prime: BigUint,
    generator: BigUint,
    x: sshc_cryptovec::CryptoVec,
    e: BigUint,
}

impl KexHandler {
    /// Generates a fresh private exponent and the corresponding public
    /// value, per RFC 4253 §8: `x` is in `[1, q-1]` for `q = (p-1)/2`; in
    /// practice a full-width random exponent is used, as OpenSSH does.
    pub fn new() -> Self {
        let prime = group14_prime();
        let generator = BigUint::from(2u32);
        let upper = &prime - BigUint::from(2u32);
        let x_value = OsRng.gen_biguint_below(&upper) + BigUint::from(1u32);
        let e = generator.modpow(&x_value, &prime);
        let x = sshc_cryptovec::CryptoVec::from_slice(&x_value.to_bytes_be());
        KexHandler { prime, generator, x, e }
    }

    #[cfg(test)]
    pub(crate) fn with_private_exponent(x_value: BigUint) -> Self {
        let prime = group14_prime();
        let generator = BigUint::from(2u32);
        let e = generator.modpow(&x_value, &prime);
        let x = sshc_cryptovec::CryptoVec::from_slice(&x_value.to_bytes_be());
        KexHandler { prime, generator, x, e }
    }

    /// The client's public DH value `e`, as raw magnitude bytes.
    pub fn public_value(&self) -> Vec<u8> {
        self.e.to_bytes_be()
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }

    /// The group's modulus, so callers can check a received public value
    /// is actually in `[1, p-1]` before using it.
    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    /// `SSH_MSG_KEXDH_INIT`'s payload: the message id followed by `mpint e`.
    pub fn init_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.byte(crate::msg::KEXDH_INIT);
        w.mpint(&self.e.to_bytes_be());
        w.finish()
    }

    /// Computes the shared secret `K = f^x mod p` from the server's public
    /// value. Returned as a zeroizing byte buffer per spec.md §5/§9; the
    /// `BigUint` `modpow` produces is copied out and wiped immediately.
    pub fn shared_secret(&self, f: &BigUint) -> sshc_cryptovec::CryptoVec {
        let x = BigUint::from_bytes_be(&self.x);
        let k = f.modpow(&x, &self.prime);
        let mut bytes = k.to_bytes_be();
        let result = sshc_cryptovec::CryptoVec::from_slice(&bytes);
        sshc_cryptovec::zero(&mut bytes);
        result
    }

    /// RFC 4253 §8.2's exchange hash:
    /// `H = hash(V_C || V_S || I_C || I_S || K_S || e || f || K)`.
    /// `shared_secret` is the raw `K` magnitude (as produced by
    /// [`KexHandler::shared_secret`]).
    #[allow(clippy::too_many_arguments)]
    pub fn exchange_hash(
        client_id: &[u8],
        server_id: &[u8],
        client_kexinit: &[u8],
        server_kexinit: &[u8],
        host_key_blob: &[u8],
        e: &BigUint,
        f: &BigUint,
        shared_secret: &[u8],
    ) -> sshc_cryptovec::CryptoVec {
        let mut w = Writer::new();
        w.string(client_id);
        w.string(server_id);
        w.string(client_kexinit);
        w.string(server_kexinit);
        w.string(host_key_blob);
        w.mpint(&e.to_bytes_be());
        w.mpint(&f.to_bytes_be());
        w.mpint(shared_secret);
        let digest = Sha1::digest(w.as_slice());
        let result = sshc_cryptovec::CryptoVec::from_slice(&digest);
        w.zero();
        result
    }

    /// RFC 4253 §7.2's key derivation:
    /// `K1 = HASH(K || H || letter || session_id)`, extended with
    /// `HASH(K || H || K1 || K2 || ...)` until `output_len` bytes are
    /// available, then truncated to exactly that length.
    pub fn derive_key(
        shared_secret: &[u8],
        exchange_hash: &[u8],
        letter: u8,
        session_id: &[u8],
        output_len: usize,
    ) -> sshc_cryptovec::CryptoVec {
        let mut k_mpint = MPInt::from_bytes(shared_secret).pad();

        let mut w = Writer::new();
        w.raw(&k_mpint);
        w.raw(exchange_hash);
        w.byte(letter);
        w.raw(session_id);
        let mut result = Sha1::digest(w.as_slice()).to_vec();
        w.zero();

        while result.len() < output_len {
            let mut w = Writer::new();
            w.raw(&k_mpint);
            w.raw(exchange_hash);
            w.raw(&result);
            result.extend(Sha1::digest(w.as_slice()));
            w.zero();
        }

        result.truncate(output_len);
        let key = sshc_cryptovec::CryptoVec::from_slice(&result);
        sshc_cryptovec::zero(&mut result);
        sshc_cryptovec::zero(&mut k_mpint);
        key
    }
}

impl Default for KexHandler {
    fn default() -> Self {
        KexHandler::new()
    }
}
