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

//! `ssh-rsa` host keys (RFC 4253 §6.6, RFC 8017 PKCS#1 v1.5): parsing the
//! key blob carried in `SSH_MSG_KEXDH_REPLY` and verifying the signature
//! over the exchange hash. Grounded on the `rsa` crate usage in
//! `rsa_sha2_512_verify`, the SHA-1 variant this core needs instead of
//! that function's SHA-512.

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::{BigUint as RsaBigUint, RsaPublicKey};
use sha1::Sha1;

use crate::encoding::Reader;
use crate::error::{Error, Result};
use crate::msg::HOST_KEY_SSH_RSA;

/// A parsed `ssh-rsa` public key blob:
/// `string "ssh-rsa" || mpint e || mpint n`.
pub struct HostKey {
    key: RsaPublicKey,
}

impl HostKey {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let mut r = Reader::new(blob);
        let key_type = r.string()?;
        if key_type != HOST_KEY_SSH_RSA.as_bytes() {
            return Err(Error::NegotiationFailed("host key"));
        }
        let e = r.mpint()?;
        let n = r.mpint()?;
        let key = RsaPublicKey::new(RsaBigUint::from_bytes_be(n), RsaBigUint::from_bytes_be(e))
            .map_err(|_| Error::MalformedPacket("invalid ssh-rsa host key"))?;
        Ok(HostKey { key })
    }

    /// Verifies `signature_blob` (`string "ssh-rsa" || string sig`) over
    /// `message` (the exchange hash), per RFC 4253 §6.6.
    pub fn verify(&self, message: &[u8], signature_blob: &[u8]) -> Result<()> {
        let mut r = Reader::new(signature_blob);
        let sig_type = r.string()?;
        if sig_type != HOST_KEY_SSH_RSA.as_bytes() {
            return Err(Error::HostKeyRejected);
        }
        let raw_sig = r.string()?;
        let signature =
            Signature::try_from(raw_sig).map_err(|_| Error::HostKeyRejected)?;

        let verifying_key = VerifyingKey::<Sha1>::new(self.key.clone());
        verifying_key.verify(message, &signature).map_err(|_| Error::HostKeyRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::RsaPrivateKey;

    fn blob_for(key: &RsaPublicKey) -> Vec<u8> {
        let mut w = crate::encoding::Writer::new();
        w.string(HOST_KEY_SSH_RSA.as_bytes());
        w.mpint(&key.e().to_bytes_be());
        w.mpint(&key.n().to_bytes_be());
        w.finish()
    }

    #[test]
    fn verifies_a_genuine_signature() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = private.to_public_key();
        let blob = blob_for(&public);
        let host_key = HostKey::parse(&blob).unwrap();

        let message = b"exchange hash bytes";
        let signing_key = SigningKey::<Sha1>::new(private);
        let signature = signing_key.sign_with_rng(&mut rng, message);

        let mut w = crate::encoding::Writer::new();
        w.string(HOST_KEY_SSH_RSA.as_bytes());
        w.string(&signature.to_bytes());
        let signature_blob = w.finish();

        assert!(host_key.verify(message, &signature_blob).is_ok());
    }

    #[test]
    fn rejects_a_tampered_message() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = private.to_public_key();
        let blob = blob_for(&public);
        let host_key = HostKey::parse(&blob).unwrap();

        let signing_key = SigningKey::<Sha1>::new(private);
        let signature = signing_key.sign_with_rng(&mut rng, b"original message");

        let mut w = crate::encoding::Writer::new();
        w.string(HOST_KEY_SSH_RSA.as_bytes());
        w.string(&signature.to_bytes());
        let signature_blob = w.finish();

        assert!(host_key.verify(b"tampered message", &signature_blob).is_err());
    }
}
