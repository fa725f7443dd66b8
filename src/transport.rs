// transport.rs — Blocking HTTP with an explicit single-redirect hop.
//
// The client never follows redirects on its own; we follow exactly one
// Location header ourselves. No retry, no backoff: one failed attempt is
// terminal for that call.

use std::io::Read;
use std::time::Duration;

use crate::config;
use crate::error::{Result, SyncError};

pub struct Fetched {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait Transport {
    /// GET the URL, following at most one redirect. Status >= 400 is an error.
    fn fetch(&self, url: &str) -> Result<Fetched>;

    /// Existence probe: true iff the status after at most one hop is 2xx.
    /// Transport-level failures (DNS, connect, timeout) are still errors.
    fn exists(&self, url: &str) -> Result<bool>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .redirects(0)
            .timeout(Duration::from_secs(config::http::REQUEST_TIMEOUT_SECS))
            .user_agent(config::http::USER_AGENT)
            .build();
        Self { agent }
    }

    // One GET with automatic redirects disabled; a 3xx comes back as a
    // plain response here.
    fn get_once(&self, url: &str) -> Result<ureq::Response> {
        log::debug!("Request: GET {url}");
        match self.agent.get(url).call() {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(status, _)) => Err(SyncError::HttpStatus {
                status,
                url: url.to_string(),
            }),
            Err(e) => Err(SyncError::Network {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn get_following_one_hop(&self, url: &str) -> Result<ureq::Response> {
        let resp = self.get_once(url)?;
        if !is_redirect(resp.status()) {
            return Ok(resp);
        }

        let location = match resp.header("Location") {
            Some(l) => l.to_string(),
            None => {
                return Err(SyncError::Network {
                    url: url.to_string(),
                    message: "redirect without Location header".to_string(),
                })
            }
        };
        let next = resolve_location(url, &location);
        log::debug!("Following redirect: {url} -> {next}");

        let resp = self.get_once(&next)?;
        if is_redirect(resp.status()) {
            // One hop only. A second redirect is reported, not followed.
            return Err(SyncError::HttpStatus {
                status: resp.status(),
                url: next,
            });
        }
        Ok(resp)
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Fetched> {
        let resp = self.get_following_one_hop(url)?;
        let status = resp.status();

        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| SyncError::Network {
                url: url.to_string(),
                message: format!("failed reading response body: {e}"),
            })?;

        log::debug!("Response: status {status}, {} bytes", body.len());
        Ok(Fetched { status, body })
    }

    fn exists(&self, url: &str) -> Result<bool> {
        match self.get_following_one_hop(url) {
            Ok(resp) => Ok((200..300).contains(&resp.status())),
            Err(SyncError::HttpStatus { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolve a Location header value against the URL that produced it.
fn resolve_location(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    if let Some(rest) = location.strip_prefix("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        return format!("{scheme}://{rest}");
    }

    let origin = origin_of(base);
    if location.starts_with('/') {
        return format!("{origin}{location}");
    }

    // Relative path: replace the last segment of the base path.
    match base.rsplit_once('/') {
        Some((dir, _)) if dir.len() >= origin.len() => format!("{dir}/{location}"),
        _ => format!("{origin}/{location}"),
    }
}

// scheme://host[:port], without any path.
fn origin_of(url: &str) -> String {
    let after_scheme = match url.find("://") {
        Some(i) => i + 3,
        None => 0,
    };
    match url[after_scheme..].find('/') {
        Some(i) => url[..after_scheme + i].to_string(),
        None => url.to_string(),
    }
}
