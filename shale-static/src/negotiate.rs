//! Content-encoding negotiation
//!
//! Matches the client's `Accept-Encoding` header against the server's
//! preference-ordered encoding list.

use thiserror::Error;

/// A response content encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// No transform
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Encoding {
    /// Resolve a header or config token to an encoding
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "identity" => Some(Encoding::Identity),
            "gzip" => Some(Encoding::Gzip),
            "deflate" => Some(Encoding::Deflate),
            "br" => Some(Encoding::Brotli),
            "zstd" => Some(Encoding::Zstd),
            _ => None,
        }
    }

    /// The `Content-Encoding` header value
    pub fn token(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
            Encoding::Brotli => "br",
            Encoding::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Error parsing an `Accept-Encoding` header
#[derive(Debug, Error, PartialEq)]
pub enum NegotiateError {
    /// A directive with an empty encoding token
    #[error("empty encoding token in Accept-Encoding")]
    EmptyToken,

    /// A quality value that is not a number in [0, 1]
    #[error("invalid quality value '{0}' in Accept-Encoding")]
    InvalidWeight(String),
}

/// Select a content encoding for the response.
///
/// The server's `supported` list is walked in its fixed preference
/// order and the first encoding the client accepts with nonzero weight
/// wins; client q-values order nothing among mutually acceptable
/// encodings. This deliberately favors server preference over full
/// RFC 7231 quality-value arithmetic.
///
/// - `Ok(Some(encoding))` — the chosen encoding; `Identity` means no
///   transform and is always available unless the client gave it (or
///   `*`) an explicit zero weight.
/// - `Ok(None)` — every supported encoding, identity included, was
///   excluded by the client.
/// - `Err(_)` — the header failed to parse.
pub fn negotiate(
    header: Option<&str>,
    supported: &[Encoding],
) -> Result<Option<Encoding>, NegotiateError> {
    let header = match header {
        Some(h) if !h.trim().is_empty() => h,
        // An absent header places no constraint on the response.
        _ => return Ok(Some(Encoding::Identity)),
    };

    let accepted = parse_accept_encoding(header)?;
    let weight_of = |token: &str| {
        accepted
            .iter()
            .find(|(t, _)| t == token)
            .or_else(|| accepted.iter().find(|(t, _)| t == "*"))
            .map(|(_, q)| *q)
    };

    for encoding in supported {
        if weight_of(encoding.token()).is_some_and(|q| q > 0.0) {
            return Ok(Some(*encoding));
        }
    }

    // Identity fallback, unless explicitly excluded.
    match weight_of("identity") {
        Some(q) if q <= 0.0 => Ok(None),
        _ => Ok(Some(Encoding::Identity)),
    }
}

/// Parse `Accept-Encoding` into `(token, weight)` pairs
fn parse_accept_encoding(header: &str) -> Result<Vec<(String, f32)>, NegotiateError> {
    let mut accepted = Vec::new();

    for directive in header.split(',') {
        let directive = directive.trim();
        if directive.is_empty() {
            continue;
        }

        let mut parts = directive.split(';');
        let token = parts.next().unwrap_or("").trim();
        if token.is_empty() {
            return Err(NegotiateError::EmptyToken);
        }

        let mut weight = 1.0f32;
        for param in parts {
            let param = param.trim();
            if let Some(value) = param
                .strip_prefix("q=")
                .or_else(|| param.strip_prefix("Q="))
            {
                weight = value
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .ok_or_else(|| NegotiateError::InvalidWeight(value.to_string()))?;
            }
        }

        accepted.push((token.to_ascii_lowercase(), weight));
    }

    Ok(accepted)
}
