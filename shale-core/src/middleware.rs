//! Middleware chain applied around the file-serving handler
//!
//! Middlewares run in registration order. A middleware may short-circuit
//! the chain from `before` by producing a response of its own; `after`
//! hooks always run, in the same order, on whatever response was
//! produced.

use crate::error::{Error, Result};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// A request decorator applied around the file server
pub trait Middleware: Send + Sync {
    /// Inspect the request before it reaches the handler. Returning a
    /// response short-circuits the remaining middlewares and the
    /// handler itself.
    fn before(&self, _req: &Request<()>) -> Option<Response<Bytes>> {
        None
    }

    /// Decorate the outgoing response.
    fn after(&self, _req: &Request<()>, _resp: &mut Response<Bytes>) {}
}

/// An ordered middleware chain
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to the chain
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Run `before` hooks in order, stopping at the first short-circuit
    pub fn before(&self, req: &Request<()>) -> Option<Response<Bytes>> {
        for middleware in &self.middlewares {
            if let Some(resp) = middleware.before(req) {
                return Some(resp);
            }
        }
        None
    }

    /// Run all `after` hooks in order
    pub fn after(&self, req: &Request<()>, resp: &mut Response<Bytes>) {
        for middleware in &self.middlewares {
            middleware.after(req, resp);
        }
    }
}

/// Sets a fixed group of headers on every response
pub struct SetHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SetHeaders {
    /// Build from a config-supplied header map, validating names and values
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut headers = Vec::with_capacity(map.len());
        for (name, value) in map {
            let name = name
                .parse::<HeaderName>()
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid header value for '{}': {}", name, e)))?;
            headers.push((name, value));
        }
        Ok(Self { headers })
    }
}

impl Middleware for SetHeaders {
    fn after(&self, _req: &Request<()>, resp: &mut Response<Bytes>) {
        for (name, value) in &self.headers {
            resp.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

/// Logs one line per completed request
pub struct AccessLog;

impl Middleware for AccessLog {
    fn after(&self, req: &Request<()>, resp: &mut Response<Bytes>) {
        tracing::info!(
            "{} {} -> {}",
            req.method(),
            req.uri().path(),
            resp.status().as_u16()
        );
    }
}
