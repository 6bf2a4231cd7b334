//! Request attributes consumed by the finalizer

/// What the host knows about the request being measured.
///
/// Byte counts are measured by the host; the finalizer never computes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub uri: Option<String>,
    pub method: Option<String>,
    pub response_code: u16,
    pub sent_bytes: Option<u64>,
    pub received_bytes: Option<u64>,
}

impl RequestContext {
    pub fn new(uri: impl Into<String>, method: impl Into<String>, response_code: u16) -> Self {
        Self {
            uri: Some(uri.into()),
            method: Some(method.into()),
            response_code,
            sent_bytes: None,
            received_bytes: None,
        }
    }

    pub fn with_sent_bytes(mut self, bytes: u64) -> Self {
        self.sent_bytes = Some(bytes);
        self
    }

    pub fn with_received_bytes(mut self, bytes: u64) -> Self {
        self.received_bytes = Some(bytes);
        self
    }

    /// Build from CGI environment variables.
    ///
    /// Reads `REQUEST_URI`, `REQUEST_METHOD` and `CONTENT_LENGTH` (as the
    /// received byte count). The response code defaults to 200.
    pub fn from_cgi_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            uri: lookup("REQUEST_URI"),
            method: lookup("REQUEST_METHOD"),
            response_code: 200,
            sent_bytes: None,
            received_bytes: lookup("CONTENT_LENGTH").and_then(|v| v.trim().parse().ok()),
        }
    }
}
