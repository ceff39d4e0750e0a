//! Login URL encoding collaborator.
//!
//! The core only needs a string the desktop can render as a QR code; how
//! that string becomes a bitmap is the client's concern.

/// Turns a token into the scannable payload embedded in the QR code.
pub trait LoginUrlEncoder: Send + Sync {
    fn encode(&self, token: &str) -> String;
}

/// Joins a configured base URL with the token path segment.
pub struct BaseUrlEncoder {
    base_url: String,
}

impl BaseUrlEncoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }
}

impl LoginUrlEncoder for BaseUrlEncoder {
    fn encode(&self, token: &str) -> String {
        format!("{}/{token}", self.base_url)
    }
}
