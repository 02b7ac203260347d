use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;

use super::digest::{DigestChallenge, DigestSession};
use super::{Credentials, MkdirOutcome, RemoteStore};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// WebDAV client for the store's content directory.
pub struct WebDavStore {
    client: Client,
    base: Url,
    digest: DigestSession,
}

impl std::fmt::Debug for WebDavStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavStore")
            .field("base", &self.base.as_str())
            .field("digest", &self.digest)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Operation {
    Mkdir,
    Write,
}

impl WebDavStore {
    /// Validate `url` and prepare a client. No request is sent until the
    /// first `mkdir` or `write_file`.
    pub fn connect(url: &str, credentials: Credentials) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| Error::remote_connect(url, e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(Error::remote_connect(
                url,
                "WebDAV URL must be an http(s) URL",
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::remote_connect(url, e.to_string()))?;

        Ok(Self {
            client,
            base,
            digest: DigestSession::new(credentials.username, credentials.secret),
        })
    }

    /// Full URL for a remote path. Directories get a trailing slash.
    fn url_for(&self, path: &str, directory: bool) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::remote_connect(self.base.as_str(), "invalid base URL"))?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            if directory {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&[u8]>,
        path: &str,
        op: Operation,
    ) -> Result<Response> {
        let uri = request_uri(&url);
        let build = |auth: Option<String>| -> RequestBuilder {
            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(header) = auth {
                request = request.header(AUTHORIZATION, header);
            }
            if let Some(bytes) = body {
                request = request
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.to_vec());
            }
            request
        };

        let auth = self.digest.authorization(method.as_str(), &uri);
        let had_auth = auth.is_some();
        let response = build(auth)
            .send()
            .map_err(|e| transport_error(e, path, op))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Stale or missing challenge: take the new one and retry once.
        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(DigestChallenge::parse)
        else {
            return Ok(response);
        };

        if had_auth {
            crate::log_status!("webdav", "Digest nonce refreshed for {}", path);
        }
        self.digest.set_challenge(challenge);
        let auth = self.digest.authorization(method.as_str(), &uri);
        build(auth)
            .send()
            .map_err(|e| transport_error(e, path, op))
    }
}

impl RemoteStore for WebDavStore {
    fn mkdir(&self, path: &str) -> Result<MkdirOutcome> {
        let url = self.url_for(path, true)?;
        let method = Method::from_bytes(b"MKCOL")
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;
        let response = self.send(method, url, None, path, Operation::Mkdir)?;

        let status = response.status();
        match status {
            StatusCode::METHOD_NOT_ALLOWED => Ok(MkdirOutcome::AlreadyExists),
            s if s.is_success() => Ok(MkdirOutcome::Created),
            s => Err(status_error(s, path, Operation::Mkdir)),
        }
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let url = self.url_for(path, false)?;
        let response = self.send(Method::PUT, url, Some(bytes), path, Operation::Write)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, path, Operation::Write))
        }
    }
}

fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn transport_error(err: reqwest::Error, path: &str, op: Operation) -> Error {
    if err.is_connect() || err.is_timeout() {
        return Error::remote_connect(path, err.to_string());
    }
    match op {
        Operation::Mkdir => Error::remote_mkdir(path, None, err.to_string()),
        Operation::Write => Error::remote_write(path, None, err.to_string()),
    }
}

fn status_error(status: StatusCode, path: &str, op: Operation) -> Error {
    let reason = format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .trim_end()
    .to_string();

    let err = match op {
        Operation::Mkdir => Error::remote_mkdir(path, Some(status.as_u16()), reason),
        Operation::Write => Error::remote_write(path, Some(status.as_u16()), reason),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        err.with_hint("Check the target's credentialSecret and the WebDAV username in deploy.json")
    } else {
        err
    }
}
