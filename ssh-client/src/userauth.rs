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

//! User authentication (RFC 4252). Builds `SSH_MSG_USERAUTH_REQUEST`
//! payloads for the `none` and `password` methods and parses the server's
//! `FAILURE`/`BANNER` responses. `publickey`, `keyboard-interactive` and
//! `gssapi-*` are out of scope.

use crate::encoding::{Reader, Writer};
use crate::error::{Error, Result};
use crate::namelist::NameList;

const SERVICE_CONNECTION: &str = "ssh-connection";

/// An authentication method this core can attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Password,
}

impl AuthMethod {
    fn name(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password => "password",
        }
    }
}

/// Builds the `none` probe request (spec.md §4.10.5): sent first, usually
/// rejected, but its `FAILURE` response carries the server's permitted
/// method list.
pub fn none_request(username: &str) -> Vec<u8> {
    request_header(username, &AuthMethod::None).finish()
}

/// Builds a `password` request carrying `password` in the clear, as the
/// binary packet protocol's encryption is what protects it in transit.
pub fn password_request(username: &str, password: &[u8]) -> Vec<u8> {
    let mut w = request_header(username, &AuthMethod::Password);
    w.bool(false); // not a SSH_MSG_USERAUTH_PASSWD_CHANGEREQ response
    w.string(password);
    w.finish()
}

fn request_header(username: &str, method: &AuthMethod) -> Writer {
    let mut w = Writer::new();
    w.byte(crate::msg::USERAUTH_REQUEST);
    w.string(username.as_bytes());
    w.string(SERVICE_CONNECTION.as_bytes());
    w.string(method.name().as_bytes());
    w
}

/// `SSH_MSG_USERAUTH_FAILURE`'s body: the methods still permitted, and
/// whether the just-attempted method at least partially succeeded.
pub struct Failure {
    pub methods: NameList,
    pub partial_success: bool,
}

pub fn parse_failure(body: &[u8]) -> Result<Failure> {
    let mut r = Reader::new(body);
    let methods = r.name_list()?;
    let partial_success = r.bool()?;
    Ok(Failure { methods, partial_success })
}

/// `SSH_MSG_USERAUTH_BANNER`'s body: a message for the user plus a
/// language tag this core ignores.
pub fn parse_banner(body: &[u8]) -> Result<String> {
    let mut r = Reader::new(body);
    let message = r.string()?;
    std::str::from_utf8(message)
        .map(str::to_owned)
        .map_err(|_| Error::MalformedPacket("userauth banner is not valid UTF-8"))
}

/// A caller's ordered queue of methods to try, advancing on each
/// `FAILURE` until exhausted.
pub struct AuthMethodQueue {
    remaining: Vec<AuthMethod>,
}

impl AuthMethodQueue {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        AuthMethodQueue { remaining: methods }
    }

    pub fn next(&mut self) -> Option<AuthMethod> {
        if self.remaining.is_empty() {
            None
        } else {
            Some(self.remaining.remove(0))
        }
    }

    /// Drops any queued method the server's `USERAUTH_FAILURE` no longer
    /// lists as permitted.
    pub fn retain_permitted(&mut self, permitted: &NameList) {
        self.remaining.retain(|method| permitted.contains(method.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_request_has_expected_shape() {
        let payload = none_request("alice");
        let mut r = Reader::new(&payload);
        assert_eq!(r.byte().unwrap(), crate::msg::USERAUTH_REQUEST);
        assert_eq!(r.string().unwrap(), b"alice");
        assert_eq!(r.string().unwrap(), SERVICE_CONNECTION.as_bytes());
        assert_eq!(r.string().unwrap(), b"none");
        assert!(r.is_empty());
    }

    #[test]
    fn password_request_carries_the_secret() {
        let payload = password_request("bob", b"hunter2");
        let mut r = Reader::new(&payload);
        r.byte().unwrap();
        r.string().unwrap();
        r.string().unwrap();
        assert_eq!(r.string().unwrap(), b"password");
        assert!(!r.bool().unwrap());
        assert_eq!(r.string().unwrap(), b"hunter2");
    }

    #[test]
    fn parse_failure_reads_methods_and_flag() {
        let mut w = Writer::new();
        w.name_list(&NameList::from_tokens(["password", "publickey"]));
        w.bool(true);
        let failure = parse_failure(&w.finish()).unwrap();
        assert!(failure.methods.contains("password"));
        assert!(failure.partial_success);
    }

    #[test]
    fn auth_method_queue_drains_in_order() {
        let mut queue = AuthMethodQueue::new(vec![AuthMethod::None, AuthMethod::Password]);
        assert_eq!(queue.next(), Some(AuthMethod::None));
        assert_eq!(queue.next(), Some(AuthMethod::Password));
        assert_eq!(queue.next(), None);
    }
}
