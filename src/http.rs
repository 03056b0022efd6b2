//! Request and response snapshots used throughout the engine.
//!
//! Requests carry just enough identity for routing: method, URL and the
//! declared destination. Responses are full snapshots (status, headers,
//! body bytes) so they can round-trip through a cache partition.

use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

/// Declared destination of a request, mirroring `Request.destination`.
/// Only `Image` affects routing; the rest classify as everything-else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
  #[default]
  Other,
  Document,
  Image,
}

/// An outbound request intercepted by the router.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      destination: Destination::Other,
    }
  }

  pub fn head(url: Url) -> Self {
    Self {
      method: Method::Head,
      url,
      destination: Destination::Other,
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Cache-entry key: hash of method + full URL, so entries from
  /// different methods or query strings never collide.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response snapshot. Either fresh from the network or replayed from a
/// cache partition; callers cannot tell the difference from the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Synthesized response returned when a network-first route exhausts
  /// both the network and the dynamic partition.
  pub fn offline() -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Offline - No cached data".to_vec(),
    }
  }
}
