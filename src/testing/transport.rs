//! Scripted in-memory [`Transport`].

use crate::fetch::{HttpResponse, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

type Reply = Result<HttpResponse, String>;

#[derive(Default)]
struct Route {
    /// One-shot replies, consumed in order.
    queue: VecDeque<Reply>,
    /// Reply once the queue is empty.
    steady: Option<Reply>,
}

/// Fake transport with per-URL scripts and attempt counters.
///
/// A URL with no route answers every request with a transport error.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    attempts: Mutex<HashMap<String, u32>>,
}

/// A 200 response whose `Content-Length` matches the body.
#[must_use]
pub fn ok_response(body: impl Into<Vec<u8>>) -> HttpResponse {
    let body = body.into();
    HttpResponse {
        status: 200,
        content_length: Some(body.len() as u64),
        body,
    }
}

/// A 200 response that stopped short of its advertised `Content-Length`.
#[must_use]
pub fn truncated_response(body: impl Into<Vec<u8>>, advertised: u64) -> HttpResponse {
    HttpResponse {
        status: 200,
        content_length: Some(advertised),
        body: body.into(),
    }
}

/// An error status with an empty body.
#[must_use]
pub fn status_response(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        content_length: Some(0),
        body: Vec::new(),
    }
}

impl FakeTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_route(&self, url: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        f(routes.entry(url.to_string()).or_default());
    }

    /// Serve `body` with a correct `Content-Length` on every request.
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        let reply = Ok(ok_response(body));
        self.with_route(url, |r| r.steady = Some(reply));
    }

    /// Answer every request with `response`.
    pub fn respond(&self, url: &str, response: HttpResponse) {
        self.with_route(url, |r| r.steady = Some(Ok(response)));
    }

    /// Fail every request at the transport level.
    pub fn fail_always(&self, url: &str, error: &str) {
        let reply = Err(error.to_string());
        self.with_route(url, |r| r.steady = Some(reply));
    }

    /// Queue one-shot replies answered before the steady reply.
    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.with_route(url, |r| r.queue.extend(replies));
    }

    /// Requests made for `url` so far.
    #[must_use]
    pub fn attempts(&self, url: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.get(url).copied().unwrap_or(0)
    }

    /// Requests made for all URLs.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.values().sum()
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            *attempts.entry(url.to_string()).or_insert(0) += 1;
        }
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.get_mut(url) else {
            return Err(format!("no route for {url}"));
        };
        if let Some(reply) = route.queue.pop_front() {
            return reply;
        }
        route
            .steady
            .clone()
            .unwrap_or_else(|| Err(format!("script for {url} exhausted")))
    }
}
