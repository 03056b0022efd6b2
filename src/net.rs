//! Network access behind a trait so the router and drainer can be
//! exercised without a live server.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::{Method, Request, Response};

/// Performs real outbound fetches.
///
/// A transport failure (connection refused, timeout) is an
/// `Error::NetworkFailure`; an HTTP error status is still a successful
/// fetch and comes back as a `Response`, matching fetch semantics.
pub trait Fetch: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed fetcher used by the binary.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

    Ok(Self { client })
  }
}

fn reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Delete => reqwest::Method::DELETE,
  }
}

impl Fetch for HttpFetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let call = self
      .client
      .request(reqwest_method(request.method), request.url.clone());

    async move {
      let resp = call
        .send()
        .await
        .map_err(|e| Error::NetworkFailure(e.to_string()))?;

      let status = resp.status().as_u16();
      let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
      let body = resp
        .bytes()
        .await
        .map_err(|e| Error::NetworkFailure(e.to_string()))?
        .to_vec();

      Ok(Response {
        status,
        headers,
        body,
      })
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use std::collections::{HashMap, VecDeque};
  use std::sync::Mutex;

  use super::*;

  #[derive(Debug, Clone)]
  enum Outcome {
    Respond(Response),
    Fail,
  }

  /// Scriptable fetcher for tests. Routes are keyed by URL path; a
  /// scripted queue per path takes precedence over the fixed route and
  /// is consumed one outcome per call.
  #[derive(Default)]
  pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Outcome>>,
    scripted: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
  }

  impl FakeFetcher {
    pub fn new() -> Self {
      Self::default()
    }

    /// Always answer `path` with a 200 carrying `body`.
    pub fn respond(&self, path: &str, body: &[u8]) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(path.to_string(), Outcome::Respond(Response::new(200, body)));
    }

    /// Always answer `path` with an empty response carrying `status`.
    pub fn respond_status(&self, path: &str, status: u16) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(path.to_string(), Outcome::Respond(Response::new(status, &b""[..])));
    }

    /// Always fail `path` with a network error.
    pub fn fail(&self, path: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(path.to_string(), Outcome::Fail);
    }

    /// Queue a one-shot success for `path`, consumed before the fixed route.
    pub fn respond_once(&self, path: &str, body: &[u8]) {
      self
        .scripted
        .lock()
        .unwrap()
        .entry(path.to_string())
        .or_default()
        .push_back(Outcome::Respond(Response::new(200, body)));
    }

    /// Queue a one-shot failure for `path`, consumed before the fixed route.
    pub fn fail_once(&self, path: &str) {
      self
        .scripted
        .lock()
        .unwrap()
        .entry(path.to_string())
        .or_default()
        .push_back(Outcome::Fail);
    }

    /// Paths fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
      self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    fn outcome_for(&self, path: &str) -> Outcome {
      if let Some(queue) = self.scripted.lock().unwrap().get_mut(path) {
        if let Some(outcome) = queue.pop_front() {
          return outcome;
        }
      }
      self
        .routes
        .lock()
        .unwrap()
        .get(path)
        .cloned()
        .unwrap_or(Outcome::Fail)
    }
  }

  impl Fetch for FakeFetcher {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
      let path = request.path().to_string();
      self.calls.lock().unwrap().push(path.clone());
      let outcome = self.outcome_for(&path);

      async move {
        match outcome {
          Outcome::Respond(resp) => Ok(resp),
          Outcome::Fail => Err(Error::NetworkFailure(format!("unreachable: {path}"))),
        }
      }
    }
  }
}
