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

//! `name-list`: RFC 4251 §5's comma-separated ASCII token list, plus the
//! RFC 4253 §7.1 negotiation rule (client preference order wins).

/// An ordered list of tokens, with the comma-joined wire form cached so
/// building one and re-serializing it doesn't need to re-join each time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameList {
    tokens: Vec<String>,
}

impl NameList {
    pub fn new() -> Self {
        NameList { tokens: Vec::new() }
    }

    pub fn parse(joined: &str) -> Self {
        if joined.is_empty() {
            return NameList::new();
        }
        NameList { tokens: joined.split(',').map(String::from).collect() }
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameList { tokens: tokens.into_iter().map(Into::into).collect() }
    }

    pub fn add(&mut self, token: impl Into<String>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn joined(&self) -> String {
        self.tokens.join(",")
    }

    /// RFC 4253 §7.1: the first token of `client` that also appears in
    /// `server` wins; `server`'s order is irrelevant. `None` if the
    /// intersection is empty (a negotiation failure).
    pub fn select<'a>(client: &'a NameList, server: &NameList) -> Option<&'a str> {
        client.iter().find(|candidate| server.contains(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wire_form() {
        let mut list = NameList::new();
        list.add("zlib");
        let mut w = crate::encoding::Writer::new();
        w.name_list(&list);
        assert_eq!(w.finish(), [0, 0, 0, 4, b'z', b'l', b'i', b'b']);

        list.add("none");
        let mut w = crate::encoding::Writer::new();
        w.name_list(&list);
        assert_eq!(
            w.finish(),
            [0, 0, 0, 9, b'z', b'l', b'i', b'b', b',', b'n', b'o', b'n', b'e']
        );
    }

    #[test]
    fn select_prefers_client_order() {
        let client = NameList::from_tokens(["curve25519-sha256", "diffie-hellman-group14-sha1"]);
        let server = NameList::from_tokens(["diffie-hellman-group14-sha1"]);
        assert_eq!(NameList::select(&client, &server), Some("diffie-hellman-group14-sha1"));
    }

    #[test]
    fn select_empty_intersection() {
        let client = NameList::from_tokens(["a"]);
        let server = NameList::from_tokens(["b"]);
        assert_eq!(NameList::select(&client, &server), None);
    }

    #[test]
    fn select_ignores_server_order() {
        let client = NameList::from_tokens(["a", "b"]);
        let server_ab = NameList::from_tokens(["a", "b"]);
        let server_ba = NameList::from_tokens(["b", "a"]);
        assert_eq!(NameList::select(&client, &server_ab), NameList::select(&client, &server_ba));
    }
}
