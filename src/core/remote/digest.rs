//! HTTP digest authentication (RFC 2617, MD5 and MD5-sess).
//!
//! The first request of a session is sent without credentials; the server's
//! 401 challenge is cached and reused for later requests, with the nonce
//! count incremented per request. Concurrent writers share one challenge.

use regex::Regex;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop_auth: bool,
    pub session: bool,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value. Returns `None` for non-digest
    /// schemes and unsupported algorithms.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let re = Regex::new(r#"([A-Za-z-]+)\s*=\s*(?:"([^"]*)"|([^\s,]+))"#).ok()?;

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop_auth = false;
        let mut session = false;

        for caps in re.captures_iter(params) {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();

            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => {
                    qop_auth = value
                        .split(',')
                        .any(|q| q.trim().eq_ignore_ascii_case("auth"));
                }
                "algorithm" => {
                    if value.eq_ignore_ascii_case("md5-sess") {
                        session = true;
                    } else if !value.eq_ignore_ascii_case("md5") {
                        return None;
                    }
                }
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            nonce: nonce?,
            opaque,
            qop_auth,
            session,
        })
    }
}

/// Build the `Authorization` header value for one request.
pub fn authorization_header(
    challenge: &DigestChallenge,
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let mut ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
    if challenge.session {
        ha1 = md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, cnonce));
    }
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    let nc = format!("{:08x}", nonce_count);

    let response = if challenge.qop_auth {
        md5_hex(&format!(
            "{}:{}:{}:{}:auth:{}",
            ha1, challenge.nonce, nc, cnonce, ha2
        ))
    } else {
        md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2))
    };

    let algorithm = if challenge.session { "MD5-sess" } else { "MD5" };
    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
        username, challenge.realm, challenge.nonce, uri, algorithm, response
    );
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    if challenge.qop_auth {
        header.push_str(&format!(", qop=auth, nc={}, cnonce=\"{}\"", nc, cnonce));
    }
    header
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Cached challenge shared by every request of one store connection.
pub struct DigestSession {
    username: String,
    password: String,
    state: Mutex<Option<(DigestChallenge, u32)>>,
}

impl std::fmt::Debug for DigestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestSession")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DigestSession {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            state: Mutex::new(None),
        }
    }

    /// Replace the cached challenge, resetting the nonce count.
    pub fn set_challenge(&self, challenge: DigestChallenge) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state = Some((challenge, 0));
    }

    /// Header for the next request, or `None` before the first challenge.
    pub fn authorization(&self, method: &str, uri: &str) -> Option<String> {
        let (challenge, nonce_count) = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let (challenge, count) = state.as_mut()?;
            *count += 1;
            (challenge.clone(), *count)
        };

        let cnonce = uuid::Uuid::new_v4().simple().to_string();
        Some(authorization_header(
            &challenge,
            &self.username,
            &self.password,
            method,
            uri,
            nonce_count,
            &cnonce,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_CHALLENGE: &str = r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn parse_rfc_challenge() {
        let challenge = DigestChallenge::parse(RFC_CHALLENGE).unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(
            challenge.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
        assert!(challenge.qop_auth);
        assert!(!challenge.session);
    }

    #[test]
    fn parse_rejects_basic_scheme() {
        assert!(DigestChallenge::parse(r#"Basic realm="dav""#).is_none());
    }

    #[test]
    fn parse_rejects_unsupported_algorithm() {
        let header = r#"Digest realm="dav", nonce="n", algorithm=SHA-256"#;
        assert!(DigestChallenge::parse(header).is_none());
    }

    #[test]
    fn parse_requires_nonce() {
        assert!(DigestChallenge::parse(r#"Digest realm="dav""#).is_none());
    }

    #[test]
    fn authorization_matches_rfc_example() {
        let challenge = DigestChallenge::parse(RFC_CHALLENGE).unwrap();
        let header = authorization_header(
            &challenge,
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            1,
            "0a4f113b",
        );
        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn session_counts_nonce_uses() {
        let session = DigestSession::new("user", "pass");
        assert!(session.authorization("PUT", "/dav/a.js").is_none());

        session.set_challenge(DigestChallenge::parse(RFC_CHALLENGE).unwrap());
        let first = session.authorization("PUT", "/dav/a.js").unwrap();
        let second = session.authorization("PUT", "/dav/b.js").unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));
    }
}
