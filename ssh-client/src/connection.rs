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

//! The state machine driving one SSH session (spec.md §4.10): identification
//! exchange, KEXINIT negotiation, `diffie-hellman-group14-sha1` key
//! exchange, `ssh-userauth`, and steady-state channel traffic. Follows the
//! single-threaded cooperative model spec.md §4.10.7/§9 calls for:
//! `poll_once()` does one iteration of drain-outbound / pump-inbound /
//! dispatch, and is the only place connection state changes.

use log::debug;
use rand::RngCore;

use crate::channel::ChannelManager;
use crate::cipher::{self, CipherEngine};
use crate::config::Config;
use crate::encoding::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hostkey::HostKey;
use crate::kex::KexHandler;
use crate::mac::{self, MacEngine};
use crate::msg;
use crate::namelist::NameList;
use crate::packet_store::PacketStore;
use crate::transport::{self, OutboundQueue};
use crate::userauth::{self, AuthMethod, AuthMethodQueue};

/// The coarse connection-level state (spec.md §4.10), orthogonal to
/// [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Authenticating,
    Connected,
    Disconnected,
}

/// The protocol-step state within a connection attempt. Errors name the
/// stage a message id was illegal in, so this derives `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Null,
    SentClientId,
    ReceivedServerId,
    SentClientKexInit,
    ReceivedServerKexInit,
    SentClientDhInit,
    ReceivedServerDhReply,
    ReceivedNewKeys,
    SentNewKeys,
    SentServiceRequest,
    ReceivedServiceAccept,
    AttemptingUserAuth,
    UserLoggedIn,
}

/// This core's one supported choice per algorithm slot (spec.md §6): a
/// single-entry name-list still goes through RFC 4253 §7.1 negotiation,
/// it just can only ever agree with a server that also offers it.
fn supported(name: &'static str) -> NameList {
    NameList::from_tokens([name])
}

fn build_kexinit_payload() -> Vec<u8> {
    let mut cookie = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut cookie);

    let mut w = Writer::new();
    w.byte(msg::KEXINIT);
    w.raw(&cookie);
    w.name_list(&supported(msg::KEX_DH_GROUP14_SHA1));
    w.name_list(&supported(msg::HOST_KEY_SSH_RSA));
    w.name_list(&supported(msg::CIPHER_AES128_CTR));
    w.name_list(&supported(msg::CIPHER_AES128_CTR));
    w.name_list(&supported(msg::MAC_HMAC_SHA2_256));
    w.name_list(&supported(msg::MAC_HMAC_SHA2_256));
    w.name_list(&supported(msg::COMPRESSION_NONE));
    w.name_list(&supported(msg::COMPRESSION_NONE));
    w.name_list(&NameList::new());
    w.name_list(&NameList::new());
    w.bool(false); // first_kex_packet_follows
    w.u32(0); // reserved
    w.finish()
}

struct PeerKexInit {
    kex: NameList,
    host_key: NameList,
    cipher_c2s: NameList,
    cipher_s2c: NameList,
    mac_c2s: NameList,
    mac_s2c: NameList,
}

fn parse_kexinit_payload(payload: &[u8]) -> Result<PeerKexInit> {
    let mut r = Reader::new(payload);
    let msg_id = r.byte()?;
    if msg_id != msg::KEXINIT {
        return Err(Error::UnexpectedMessage(msg_id, Stage::ReceivedServerKexInit));
    }
    r.array::<16>()?; // cookie, unused
    let kex = r.name_list()?;
    let host_key = r.name_list()?;
    let cipher_c2s = r.name_list()?;
    let cipher_s2c = r.name_list()?;
    let mac_c2s = r.name_list()?;
    let mac_s2c = r.name_list()?;
    let _compression_c2s = r.name_list()?;
    let _compression_s2c = r.name_list()?;
    let _languages_c2s = r.name_list()?;
    let _languages_s2c = r.name_list()?;
    let _first_kex_packet_follows = r.bool()?;
    let _reserved = r.u32()?;
    Ok(PeerKexInit { kex, host_key, cipher_c2s, cipher_s2c, mac_c2s, mac_s2c })
}

fn negotiate<'a>(client: &'a NameList, server: &NameList, slot: &'static str) -> Result<&'a str> {
    NameList::select(client, server).ok_or(Error::NegotiationFailed(slot))
}

/// The live SSH session. Owns every piece of per-connection state; the
/// caller only ever sees this through [`ConnectionCore::poll_once`] and
/// the handful of request methods that enqueue work for it.
pub struct ConnectionCore<'a> {
    config: Config<'a>,
    packets: PacketStore,
    outbound_bytes: OutboundQueue,
    inbound_raw: Vec<u8>,

    state: State,
    stage: Stage,

    client_id: Vec<u8>,
    server_id: Option<Vec<u8>>,
    client_kexinit: Option<Vec<u8>>,
    server_kexinit: Option<Vec<u8>>,

    kex: Option<KexHandler>,
    session_id: Option<sshc_cryptovec::CryptoVec>,
    negotiated_cipher: &'static str,
    negotiated_mac: &'static str,
    pending_host_key: Option<Vec<u8>>,
    incoming_keys_pending: Option<(Box<dyn CipherEngine>, Box<dyn MacEngine>)>,

    auth_queue: AuthMethodQueue,
    current_auth_method: Option<AuthMethod>,

    channels: ChannelManager,
}

impl<'a> ConnectionCore<'a> {
    pub fn new(config: Config<'a>) -> Self {
        let auth_methods = config.auth_methods.clone();
        ConnectionCore {
            config,
            packets: PacketStore::new(),
            outbound_bytes: OutboundQueue::new(),
            inbound_raw: Vec::new(),
            state: State::Idle,
            stage: Stage::Null,
            client_id: Vec::new(),
            server_id: None,
            client_kexinit: None,
            server_kexinit: None,
            kex: None,
            session_id: None,
            negotiated_cipher: msg::CIPHER_AES128_CTR,
            negotiated_mac: msg::MAC_HMAC_SHA2_256,
            pending_host_key: None,
            incoming_keys_pending: None,
            auth_queue: AuthMethodQueue::new(auth_methods),
            current_auth_method: None,
            channels: ChannelManager::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Sends the client identification line and begins the handshake.
    pub fn connect(&mut self) -> Result<()> {
        let line = transport::client_identification_line();
        self.client_id = line[..line.len() - 2].to_vec(); // without CR LF
        self.outbound_bytes.push(&line);
        self.stage = Stage::SentClientId;
        self.state = State::Connecting;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.state = State::Disconnected;
    }

    pub fn open_channel(&mut self, channel_type: &str) -> u32 {
        let (local_id, payload) = self.channels.open(channel_type);
        self.send_payload(&payload);
        local_id
    }

    pub fn close_channel(&mut self, local_id: u32) -> Result<()> {
        if let Some(payload) = self.channels.close(local_id)? {
            self.send_payload(&payload);
        }
        Ok(())
    }

    pub fn send_channel_data(&mut self, local_id: u32, data: &[u8]) -> Result<usize> {
        let (packets, consumed) = self.channels.send(local_id, data)?;
        for packet in packets {
            self.send_payload(&packet);
        }
        Ok(consumed)
    }

    /// One iteration of the cooperative worker (spec.md §4.10.7): drain
    /// finalized outbound bytes, pull in whatever inbound bytes are
    /// available, and process as many complete packets as have arrived.
    pub fn poll_once(&mut self) -> Result<()> {
        if self.state == State::Disconnected {
            return Ok(());
        }

        self.outbound_bytes.drain_once(self.config.send.as_mut())?;

        let read = transport::pump_recv(self.config.recv.as_mut(), &mut self.inbound_raw)?;
        if read == 0 && self.inbound_raw.is_empty() {
            return Ok(());
        }

        if self.stage == Stage::SentClientId {
            self.try_complete_identification()?;
        }

        if self.stage >= Stage::ReceivedServerId {
            self.drain_packets()?;
        }

        Ok(())
    }

    fn try_complete_identification(&mut self) -> Result<()> {
        if let Some((line, consumed)) = transport::scan_identification(&self.inbound_raw)? {
            self.server_id = Some(line.into_bytes());
            self.inbound_raw.drain(..consumed);
            self.stage = Stage::ReceivedServerId;
            self.begin_kex();
        }
        Ok(())
    }

    fn begin_kex(&mut self) {
        let payload = build_kexinit_payload();
        self.client_kexinit = Some(payload.clone());
        self.send_payload(&payload);
        self.stage = Stage::SentClientKexInit;
    }

    fn drain_packets(&mut self) -> Result<()> {
        self.packets.feed(&std::mem::take(&mut self.inbound_raw));
        while let Some(payload) = self.packets.try_take_packet()? {
            self.handle_payload(&payload)?;
            if self.state == State::Disconnected {
                break;
            }
        }
        Ok(())
    }

    fn send_payload(&mut self, payload: &[u8]) {
        self.config.log_buffer("outbound payload", payload);
        let wire = self.packets.seal(payload);
        self.outbound_bytes.push(&wire);
    }

    fn handle_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.config.log_buffer("inbound payload", payload);
        let msg_id = *payload.first().ok_or(Error::ShortBuffer)?;
        let body = &payload[1..];

        match msg_id {
            msg::DISCONNECT => {
                self.state = State::Disconnected;
                Ok(())
            }
            msg::IGNORE | msg::DEBUG | msg::UNIMPLEMENTED => Ok(()),
            msg::KEXINIT => self.handle_kexinit(payload),
            msg::KEXDH_REPLY => self.handle_kexdh_reply(body),
            msg::NEWKEYS => self.handle_newkeys(),
            msg::SERVICE_ACCEPT => self.handle_service_accept(),
            msg::USERAUTH_BANNER => {
                let text = userauth::parse_banner(body)?;
                self.config.log(crate::config::LogLevel::Info, &text);
                Ok(())
            }
            msg::USERAUTH_SUCCESS => self.handle_userauth_success(),
            msg::USERAUTH_FAILURE => self.handle_userauth_failure(body),
            msg::USERAUTH_PASSWD_CHANGEREQ => self.handle_password_changereq(),
            msg::GLOBAL_REQUEST => self.handle_global_request(body),
            msg::CHANNEL_OPEN_CONFIRMATION
            | msg::CHANNEL_OPEN_FAILURE
            | msg::CHANNEL_DATA
            | msg::CHANNEL_EXTENDED_DATA
            | msg::CHANNEL_WINDOW_ADJUST
            | msg::CHANNEL_EOF
            | msg::CHANNEL_CLOSE => self.handle_channel_message(msg_id, body),
            other => self.handle_unrecognized(other),
        }
    }

    /// `SSH_MSG_UNIMPLEMENTED` (RFC 4253 §11.4): a message id this core has
    /// no handler for is acknowledged rather than treated as fatal, naming
    /// the sequence number of the packet that could not be handled.
    /// `incoming_sequence_number()` already reflects the *next* expected
    /// sequence number by the time a payload reaches here, since
    /// `PacketStore::try_take_packet` increments it before returning the
    /// payload — hence the `wrapping_sub(1)`.
    fn handle_unrecognized(&mut self, msg_id: u8) -> Result<()> {
        debug!("no handler for message id {}, replying UNIMPLEMENTED", msg_id);
        let seqn = self.packets.incoming_sequence_number().wrapping_sub(1);
        let mut w = Writer::new();
        w.byte(msg::UNIMPLEMENTED);
        w.u32(seqn);
        self.send_payload(&w.finish());
        Ok(())
    }

    fn handle_kexinit(&mut self, payload: &[u8]) -> Result<()> {
        if self.stage != Stage::SentClientKexInit {
            return Err(Error::UnexpectedMessage(msg::KEXINIT, self.stage));
        }
        let peer = parse_kexinit_payload(payload)?;
        self.server_kexinit = Some(payload.to_vec());

        negotiate(&supported(msg::KEX_DH_GROUP14_SHA1), &peer.kex, "kex")?;
        negotiate(&supported(msg::HOST_KEY_SSH_RSA), &peer.host_key, "server host key")?;
        negotiate(&supported(msg::CIPHER_AES128_CTR), &peer.cipher_c2s, "cipher c2s")?;
        negotiate(&supported(msg::CIPHER_AES128_CTR), &peer.cipher_s2c, "cipher s2c")?;
        negotiate(&supported(msg::MAC_HMAC_SHA2_256), &peer.mac_c2s, "mac c2s")?;
        negotiate(&supported(msg::MAC_HMAC_SHA2_256), &peer.mac_s2c, "mac s2c")?;

        self.stage = Stage::ReceivedServerKexInit;
        debug!("kexinit negotiated: cipher {:?}, mac {:?}", self.negotiated_cipher, self.negotiated_mac);

        let kex = KexHandler::new();
        let init_payload = kex.init_payload();
        self.kex = Some(kex);
        self.send_payload(&init_payload);
        self.stage = Stage::SentClientDhInit;
        Ok(())
    }

    fn handle_kexdh_reply(&mut self, body: &[u8]) -> Result<()> {
        if self.stage != Stage::SentClientDhInit {
            return Err(Error::UnexpectedMessage(msg::KEXDH_REPLY, self.stage));
        }
        let mut r = Reader::new(body);
        let host_key_blob = r.string()?.to_vec();
        let f_bytes = r.mpint()?.to_vec();
        let signature_blob = r.string()?.to_vec();

        let f = num_bigint::BigUint::from_bytes_be(&f_bytes);
        let kex = self.kex.as_ref().expect("kex handler exists once DH init has been sent");
        if f < num_bigint::BigUint::from(1u32) || f >= *kex.prime() {
            return Err(Error::MalformedPacket("f out of range"));
        }

        let shared_secret = kex.shared_secret(&f);
        if shared_secret.len() == 1 && (shared_secret[0] == 0 || shared_secret[0] == 1) {
            return Err(Error::MalformedPacket("shared secret is zero or one"));
        }

        let exchange_hash = KexHandler::exchange_hash(
            &self.client_id,
            self.server_id.as_ref().expect("identification exchange has completed"),
            self.client_kexinit.as_ref().expect("KEXINIT was sent before DH init"),
            self.server_kexinit.as_ref().expect("server KEXINIT was received before DH reply"),
            &host_key_blob,
            kex.e(),
            &f,
            &shared_secret,
        );

        let host_key = HostKey::parse(&host_key_blob)?;
        host_key.verify(&exchange_hash, &signature_blob)?;

        if let Some(verifier) = &self.config.host_key_verifier {
            let hostname = self
                .server_id
                .as_ref()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default();
            if !verifier(&host_key_blob, &hostname) {
                return Err(Error::HostKeyRejected);
            }
        } else {
            self.config.log(
                crate::config::LogLevel::Warn,
                "accepting host key without verification: no host_key_verifier configured",
            );
        }

        if self.session_id.is_none() {
            self.session_id = Some(exchange_hash.clone());
        }
        let session_id = self.session_id.clone().expect("just set above");

        let iv_c2s = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'A',
            &session_id,
            cipher::iv_len(self.negotiated_cipher),
        );
        let iv_s2c = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'B',
            &session_id,
            cipher::iv_len(self.negotiated_cipher),
        );
        let enc_c2s = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'C',
            &session_id,
            cipher::key_len(self.negotiated_cipher),
        );
        let enc_s2c = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'D',
            &session_id,
            cipher::key_len(self.negotiated_cipher),
        );
        let mac_c2s = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'E',
            &session_id,
            mac::key_len(self.negotiated_mac),
        );
        let mac_s2c = KexHandler::derive_key(
            &shared_secret,
            &exchange_hash,
            b'F',
            &session_id,
            mac::key_len(self.negotiated_mac),
        );

        let outgoing_cipher = cipher::build(self.negotiated_cipher, &enc_c2s, &iv_c2s)?;
        let outgoing_mac = mac::build(self.negotiated_mac, &mac_c2s)?;
        let incoming_cipher = cipher::build(self.negotiated_cipher, &enc_s2c, &iv_s2c)?;
        let incoming_mac = mac::build(self.negotiated_mac, &mac_s2c)?;

        self.pending_host_key = Some(host_key_blob);
        self.stage = Stage::ReceivedServerDhReply;

        let mut w = Writer::new();
        w.byte(msg::NEWKEYS);
        self.send_payload(&w.finish());
        self.packets.rekey_outgoing(outgoing_cipher, outgoing_mac);
        self.stage = Stage::SentNewKeys;

        self.incoming_keys_pending = Some((incoming_cipher, incoming_mac));
        debug!("kex complete, switching to negotiated keys");
        Ok(())
    }

    fn handle_newkeys(&mut self) -> Result<()> {
        if self.stage != Stage::SentNewKeys && self.stage != Stage::ReceivedServerDhReply {
            return Err(Error::UnexpectedMessage(msg::NEWKEYS, self.stage));
        }
        if let Some((cipher, mac)) = self.incoming_keys_pending.take() {
            self.packets.rekey_incoming(cipher, mac);
        }
        self.stage = Stage::ReceivedNewKeys;

        let mut w = Writer::new();
        w.byte(msg::SERVICE_REQUEST);
        w.string(b"ssh-userauth");
        self.send_payload(&w.finish());
        self.stage = Stage::SentServiceRequest;
        Ok(())
    }

    fn handle_service_accept(&mut self) -> Result<()> {
        if self.stage != Stage::SentServiceRequest {
            return Err(Error::UnexpectedMessage(msg::SERVICE_ACCEPT, self.stage));
        }
        self.stage = Stage::ReceivedServiceAccept;
        self.state = State::Authenticating;

        self.current_auth_method = Some(AuthMethod::None);
        let probe = userauth::none_request(&self.config.username);
        self.send_payload(&probe);
        self.stage = Stage::AttemptingUserAuth;
        Ok(())
    }

    fn handle_userauth_success(&mut self) -> Result<()> {
        self.stage = Stage::UserLoggedIn;
        self.state = State::Connected;
        (self.config.on_connect)();
        Ok(())
    }

    fn handle_userauth_failure(&mut self, body: &[u8]) -> Result<()> {
        if self.stage != Stage::AttemptingUserAuth {
            return Err(Error::UnexpectedMessage(msg::USERAUTH_FAILURE, self.stage));
        }
        let failure = userauth::parse_failure(body)?;
        self.auth_queue.retain_permitted(&failure.methods);
        self.advance_auth()
    }

    /// `SSH_MSG_USERAUTH_PASSWD_CHANGEREQ` (spec.md §4.10.5): password
    /// change isn't implemented, so this is treated as a failure of the
    /// current method without consulting the server's permitted list —
    /// that list describes methods, not a change-request response.
    fn handle_password_changereq(&mut self) -> Result<()> {
        if self.stage != Stage::AttemptingUserAuth {
            return Err(Error::UnexpectedMessage(msg::USERAUTH_PASSWD_CHANGEREQ, self.stage));
        }
        self.advance_auth()
    }

    /// Tries the next queued auth method, or fails the connection if none
    /// remain.
    fn advance_auth(&mut self) -> Result<()> {
        match self.auth_queue.next() {
            Some(AuthMethod::None) => {
                self.current_auth_method = Some(AuthMethod::None);
                let payload = userauth::none_request(&self.config.username);
                self.send_payload(&payload);
                Ok(())
            }
            Some(AuthMethod::Password) => {
                self.current_auth_method = Some(AuthMethod::Password);
                let mut scratch = Vec::new();
                let len = (self.config.on_auth)(AuthMethod::Password, &mut scratch)
                    .ok_or(Error::AuthExhausted)?;
                scratch.truncate(len);
                let mut payload = userauth::password_request(&self.config.username, &scratch);
                sshc_cryptovec::zero(&mut scratch);
                self.send_payload(&payload);
                sshc_cryptovec::zero(&mut payload);
                Ok(())
            }
            None => Err(Error::AuthExhausted),
        }
    }

    fn handle_global_request(&mut self, body: &[u8]) -> Result<()> {
        let mut r = Reader::new(body);
        let _name = r.string()?;
        let want_reply = r.bool()?;
        if want_reply {
            let mut w = Writer::new();
            w.byte(msg::REQUEST_FAILURE);
            self.send_payload(&w.finish());
        }
        Ok(())
    }

    fn handle_channel_message(&mut self, msg_id: u8, body: &[u8]) -> Result<()> {
        let outcome = self.channels.dispatch(msg_id, body)?;
        for packet in outcome.outbound {
            self.send_payload(&packet);
        }
        for (channel_id, event) in outcome.events {
            (self.config.on_event)(channel_id, event);
        }
        Ok(())
    }
}

/// Drives a [`ConnectionCore`] against a hand-rolled server half
/// implementing just enough of RFC 4253/4252/4254 to exercise a full
/// handshake, password auth and one round of channel traffic over an
/// in-memory loopback. No assertions about the server's own code quality
/// are intended here — it exists only to give the client something real
/// to talk to.
#[cfg(test)]
mod handshake_integration {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use num_bigint::BigUint;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::RsaPrivateKey;
    use sha1::Sha1;

    use super::*;
    use crate::cipher::{self, CipherEngine};
    use crate::kex::KexHandler;
    use crate::mac::{self, MacEngine};
    use crate::packet;

    type Pipe = Rc<RefCell<VecDeque<u8>>>;

    fn server_rsa_host_key_blob(public: &rsa::RsaPublicKey) -> Vec<u8> {
        let mut w = Writer::new();
        w.string(msg::HOST_KEY_SSH_RSA.as_bytes());
        w.mpint(&public.e().to_bytes_be());
        w.mpint(&public.n().to_bytes_be());
        w.finish()
    }

    /// The server half: enough state to answer one client's handshake,
    /// auth attempt and channel open, writing its own identity/aes128-ctr
    /// packets straight onto the loopback.
    struct FakeServer {
        to_client: Pipe,
        incoming: Vec<u8>,
        identification_sent: bool,
        client_id: Option<Vec<u8>>,
        client_kexinit: Option<Vec<u8>>,
        server_kexinit: Vec<u8>,
        kex: KexHandler,
        private_key: RsaPrivateKey,
        cipher_out: Box<dyn CipherEngine>,
        mac_out: Box<dyn MacEngine>,
        cipher_in: Box<dyn CipherEngine>,
        mac_in: Box<dyn MacEngine>,
        seqn_out: u32,
        seqn_in: u32,
        pending_incoming: Option<(Box<dyn CipherEngine>, Box<dyn MacEngine>)>,
        remote_channel_id: Option<u32>,
        session_id: Option<Vec<u8>>,
    }

    impl FakeServer {
        fn new(to_client: Pipe) -> Self {
            let mut rng = rand::thread_rng();
            FakeServer {
                to_client,
                incoming: Vec::new(),
                identification_sent: false,
                client_id: None,
                client_kexinit: None,
                server_kexinit: build_kexinit_payload(),
                kex: KexHandler::new(),
                private_key: RsaPrivateKey::new(&mut rng, 1024).unwrap(),
                cipher_out: cipher::build("none", &[], &[]).unwrap(),
                mac_out: mac::build("none", &[]).unwrap(),
                cipher_in: cipher::build("none", &[], &[]).unwrap(),
                mac_in: mac::build("none", &[]).unwrap(),
                seqn_out: 0,
                seqn_in: 0,
                pending_incoming: None,
                remote_channel_id: None,
                session_id: None,
            }
        }

        fn send_raw(&mut self, bytes: &[u8]) {
            self.to_client.borrow_mut().extend(bytes);
        }

        fn send_payload(&mut self, payload: &[u8]) {
            let wire = packet::build(payload, self.seqn_out, self.cipher_out.as_mut(), self.mac_out.as_ref());
            self.seqn_out += 1;
            self.send_raw(&wire);
        }

        /// Consumes whatever the client has written so far, answering each
        /// message in turn.
        fn pump(&mut self, from_client: &Pipe) {
            self.incoming.extend(from_client.borrow_mut().drain(..));

            if !self.identification_sent {
                self.send_raw(b"SSH-2.0-fakeserver_1.0\r\n");
                self.identification_sent = true;
            }

            if self.client_id.is_none() {
                if let Some(lf) = self.incoming.iter().position(|&b| b == b'\n') {
                    let mut end = lf;
                    if end > 0 && self.incoming[end - 1] == b'\r' {
                        end -= 1;
                    }
                    self.client_id = Some(self.incoming[..end].to_vec());
                    self.incoming.drain(..lf + 1);
                } else {
                    return;
                }
            }

            while let Some(payload) = self.try_take_packet() {
                self.handle(&payload);
            }
        }

        fn try_take_packet(&mut self) -> Option<Vec<u8>> {
            if self.incoming.len() < 4 {
                return None;
            }
            let mut length_field: [u8; 4] = self.incoming[..4].try_into().unwrap();
            self.cipher_in.decrypt(&mut length_field);
            let packet_length = packet::read_packet_length(&length_field).unwrap();
            let mac_len = self.mac_in.tag_len();
            let needed = 4 + packet_length as usize + mac_len;
            if self.incoming.len() < needed {
                return None;
            }
            self.incoming.drain(..4);
            let rest: Vec<u8> = self.incoming.drain(..packet_length as usize + mac_len).collect();
            let payload = packet::parse(
                length_field,
                &rest,
                self.seqn_in,
                self.cipher_in.as_mut(),
                self.mac_in.as_ref(),
            )
            .unwrap();
            self.seqn_in += 1;
            Some(payload)
        }

        fn handle(&mut self, payload: &[u8]) {
            let msg_id = payload[0];
            let body = &payload[1..];
            match msg_id {
                msg::KEXINIT => {
                    self.client_kexinit = Some(payload.to_vec());
                    self.send_payload(&self.server_kexinit.clone());
                }
                msg::KEXDH_INIT => {
                    let mut r = Reader::new(body);
                    let e = BigUint::from_bytes_be(r.mpint().unwrap());
                    let shared_secret = self.kex.shared_secret(&e);
                    let public = self.private_key.to_public_key();
                    let host_key_blob = server_rsa_host_key_blob(&public);

                    let exchange_hash = KexHandler::exchange_hash(
                        self.client_id.as_ref().unwrap(),
                        b"SSH-2.0-fakeserver_1.0",
                        self.client_kexinit.as_ref().unwrap(),
                        &self.server_kexinit.clone(),
                        &host_key_blob,
                        &e,
                        self.kex.e(),
                        &shared_secret,
                    );
                    self.session_id = Some(exchange_hash.to_vec());

                    let mut rng = rand::thread_rng();
                    let signing_key = SigningKey::<Sha1>::new(self.private_key.clone());
                    let signature = signing_key.sign_with_rng(&mut rng, &exchange_hash);
                    let mut sig_w = Writer::new();
                    sig_w.string(msg::HOST_KEY_SSH_RSA.as_bytes());
                    sig_w.string(&signature.to_bytes());

                    let mut w = Writer::new();
                    w.byte(msg::KEXDH_REPLY);
                    w.string(&host_key_blob);
                    w.mpint(&self.kex.e().to_bytes_be());
                    w.string(&sig_w.finish());
                    self.send_payload(&w.finish());

                    let session_id = self.session_id.clone().unwrap();
                    let enc_c2s = KexHandler::derive_key(&shared_secret, &exchange_hash, b'C', &session_id, 16);
                    let enc_s2c = KexHandler::derive_key(&shared_secret, &exchange_hash, b'D', &session_id, 16);
                    let iv_c2s = KexHandler::derive_key(&shared_secret, &exchange_hash, b'A', &session_id, 16);
                    let iv_s2c = KexHandler::derive_key(&shared_secret, &exchange_hash, b'B', &session_id, 16);
                    let mac_c2s = KexHandler::derive_key(&shared_secret, &exchange_hash, b'E', &session_id, 32);
                    let mac_s2c = KexHandler::derive_key(&shared_secret, &exchange_hash, b'F', &session_id, 32);

                    self.cipher_out = cipher::build(msg::CIPHER_AES128_CTR, &enc_s2c, &iv_s2c).unwrap();
                    self.mac_out = mac::build(msg::MAC_HMAC_SHA2_256, &mac_s2c).unwrap();
                    self.pending_incoming = Some((
                        cipher::build(msg::CIPHER_AES128_CTR, &enc_c2s, &iv_c2s).unwrap(),
                        mac::build(msg::MAC_HMAC_SHA2_256, &mac_c2s).unwrap(),
                    ));

                    let mut w = Writer::new();
                    w.byte(msg::NEWKEYS);
                    self.send_payload(&w.finish());
                }
                msg::NEWKEYS => {
                    if let Some((cipher, mac)) = self.pending_incoming.take() {
                        self.cipher_in = cipher;
                        self.mac_in = mac;
                        self.seqn_in = 0;
                    }
                }
                msg::SERVICE_REQUEST => {
                    let mut w = Writer::new();
                    w.byte(msg::SERVICE_ACCEPT);
                    w.string(b"ssh-userauth");
                    self.send_payload(&w.finish());
                }
                msg::USERAUTH_REQUEST => {
                    let mut r = Reader::new(body);
                    let _username = r.string().unwrap();
                    let _service = r.string().unwrap();
                    let method = r.string().unwrap();
                    if method == b"password" {
                        let mut w = Writer::new();
                        w.byte(msg::USERAUTH_SUCCESS);
                        self.send_payload(&w.finish());
                    } else {
                        let mut w = Writer::new();
                        w.byte(msg::USERAUTH_FAILURE);
                        w.name_list(&NameList::from_tokens(["password"]));
                        w.bool(false);
                        self.send_payload(&w.finish());
                    }
                }
                msg::CHANNEL_OPEN => {
                    let mut r = Reader::new(body);
                    let _channel_type = r.string().unwrap();
                    let local_id = r.u32().unwrap();
                    let _window = r.u32().unwrap();
                    let _max_packet = r.u32().unwrap();
                    self.remote_channel_id = Some(local_id);

                    let mut w = Writer::new();
                    w.byte(msg::CHANNEL_OPEN_CONFIRMATION);
                    w.u32(local_id);
                    w.u32(99);
                    w.u32(1024 * 1024);
                    w.u32(32 * 1024 - 1);
                    self.send_payload(&w.finish());
                }
                msg::CHANNEL_DATA => {
                    let mut r = Reader::new(body);
                    let _remote_id = r.u32().unwrap();
                    let echoed = r.string().unwrap().to_vec();

                    let remote_id = self.remote_channel_id.unwrap();
                    let mut w = Writer::new();
                    w.byte(msg::CHANNEL_DATA);
                    w.u32(remote_id);
                    w.string(&echoed);
                    self.send_payload(&w.finish());
                }
                _ => {}
            }
        }
    }

    fn new_pipes() -> (Pipe, Pipe) {
        (Rc::new(RefCell::new(VecDeque::new())), Rc::new(RefCell::new(VecDeque::new())))
    }

    fn run_to_connected(core: &mut ConnectionCore, server: &mut FakeServer, c2s: &Pipe, s2c: &Pipe) {
        for _ in 0..20 {
            server.pump(c2s);
            core.poll_once().unwrap();
            if core.state() == State::Connected {
                return;
            }
        }
        panic!("handshake did not reach Connected within the iteration budget");
    }

    #[test]
    fn full_handshake_password_auth_and_channel_round_trip() {
        let (c2s, s2c) = new_pipes();
        let mut server = FakeServer::new(s2c.clone());

        let opened = Rc::new(RefCell::new(false));
        let opened_clone = opened.clone();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();

        let c2s_send = c2s.clone();
        let s2c_recv = s2c.clone();

        let config = Config {
            send: Box::new(move |bytes: &[u8]| {
                c2s_send.borrow_mut().extend(bytes);
                Some(bytes.len())
            }),
            recv: Box::new(move |buf: &mut [u8]| {
                let mut queue = s2c_recv.borrow_mut();
                let n = buf.len().min(queue.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = queue.pop_front().unwrap();
                }
                Some(n)
            }),
            on_auth: Box::new(|_method, scratch: &mut Vec<u8>| {
                scratch.extend_from_slice(b"hunter2");
                Some(scratch.len())
            }),
            on_connect: Box::new(|| {}),
            on_event: Box::new(move |_id, event| match event {
                ChannelEvent::Opened => *opened_clone.borrow_mut() = true,
                ChannelEvent::Data { bytes, .. } => received_clone.borrow_mut().extend(bytes),
                ChannelEvent::Closed => {}
            }),
            on_log: Box::new(|_level, _message| {}),
            host_key_verifier: Some(Box::new(|_blob, _hostname| true)),
            auth_methods: vec![AuthMethod::None, AuthMethod::Password],
            username: "alice".to_string(),
            log_level: crate::config::LogLevel::Trace,
        };

        let mut core = ConnectionCore::new(config);
        core.connect().unwrap();

        run_to_connected(&mut core, &mut server, &c2s, &s2c);
        assert_eq!(core.state(), State::Connected);

        let local_id = core.open_channel("session");
        for _ in 0..5 {
            server.pump(&c2s);
            core.poll_once().unwrap();
            if *opened.borrow() {
                break;
            }
        }
        assert!(*opened.borrow(), "channel never reached the Opened state");

        core.send_channel_data(local_id, b"hello, server").unwrap();
        for _ in 0..5 {
            server.pump(&c2s);
            core.poll_once().unwrap();
            if !received.borrow().is_empty() {
                break;
            }
        }
        assert_eq!(&*received.borrow(), b"hello, server");
    }
}
