//! Request identity used for deduplication.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::http::{HttpRequest, RequestPayload, UploadForm};

/// Identity of an HTTP call: method, absolute URL and a digest of the
/// headers and body.
///
/// Header names are compared case-insensitively and in sorted order, so two
/// calls differing only in header insertion order share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    /// Key identifying `request` by method, URL, headers and body
    pub fn for_request(request: &HttpRequest) -> Self {
        let mut hasher = Sha256::new();

        let mut headers: Vec<(&str, &[u8])> =
            request.headers.iter().map(|(name, value)| (name.as_str(), value.as_bytes())).collect();
        headers.sort_unstable();
        for (name, value) in headers {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value);
            hasher.update(b"\n");
        }

        match &request.payload {
            RequestPayload::Empty => hasher.update(b"empty"),
            RequestPayload::Json(body) => {
                hasher.update(b"json:");
                hasher.update(body.as_bytes());
            }
            RequestPayload::Multipart(form) => {
                hasher.update(b"multipart:");
                hasher.update(upload_digest(form));
            }
        }

        Self(format!("{} {}#{}", request.method, request.url, hex::encode(hasher.finalize())))
    }

    /// Key as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 over every text field and file part, length-prefixed so that
/// adjacent parts cannot run together.
fn upload_digest(form: &UploadForm) -> [u8; 32] {
    let mut hasher = Sha256::new();
    let mut feed = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    };

    for (name, value) in form.fields() {
        feed(name.as_bytes());
        feed(value.as_bytes());
    }
    for file in form.files() {
        feed(file.field.as_bytes());
        feed(file.file_name.as_bytes());
        feed(file.mime.as_deref().unwrap_or_default().as_bytes());
        feed(&file.bytes);
    }

    hasher.finalize().into()
}
