//! Request description handed to the executor.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::{RequestError, RequestResult};

/// A fully resolved HTTP call: absolute URL, final headers and body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP verb
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Headers sent as-is
    pub headers: HeaderMap,
    /// Request body
    pub payload: RequestPayload,
    /// Overrides the executor's default timeout
    pub timeout: Option<Duration>,
    /// Caller-owned cancellation; the executor only ever observes a child of it
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    /// Bodyless request without headers, timeout or cancellation
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            payload: RequestPayload::Empty,
            timeout: None,
            cancel: None,
        }
    }

    /// Append a header, rejecting names or values that are not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> RequestResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| RequestError::InvalidRequest(format!("header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| RequestError::InvalidRequest(format!("header value for '{name}': {err}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Replace the body
    pub fn payload(mut self, payload: RequestPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Override the executor's default timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the request when `token` is cancelled
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestPayload {
    #[default]
    Empty,
    /// Serialized JSON document
    Json(String),
    /// Multipart form; the transport writes the boundary header
    Multipart(UploadForm),
}

impl RequestPayload {
    /// Serialize a value into a JSON payload.
    ///
    /// `serde_json::Value` maps are key-sorted, so structurally equal
    /// documents serialize identically.
    pub fn json<T: serde::Serialize + ?Sized>(body: &T) -> RequestResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| RequestError::InvalidRequest(format!("unserializable body: {err}")))?;
        Ok(Self::Json(value.to_string()))
    }
}

/// Multipart upload (bill images, attachments)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    fields: Vec<(String, String)>,
    files: Vec<UploadFile>,
}

impl UploadForm {
    /// Empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Attach a file part
    pub fn file(mut self, file: UploadFile) -> Self {
        self.files.push(file);
        self
    }

    /// Text fields in insertion order
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// File parts in insertion order
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    /// Whether the form has no parts
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    pub(crate) fn into_multipart(self) -> RequestResult<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime) = file.mime {
                part = part.mime_str(&mime)?;
            }
            form = form.part(file.field, part);
        }
        Ok(form)
    }
}

/// One file part of an [`UploadForm`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Form field name
    pub field: String,
    /// File name reported to the server
    pub file_name: String,
    /// Content type of the part
    pub mime: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// File part without an explicit content type
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { field: field.into(), file_name: file_name.into(), mime: None, bytes }
    }

    /// Set the part's content type
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_payload_is_key_sorted() {
        let a = RequestPayload::json(&json!({"qty": 2, "item": "basil"})).unwrap();
        let b = RequestPayload::json(&json!({"item": "basil", "qty": 2})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_header_is_rejected() {
        let url = Url::parse("http://localhost/api/menu").unwrap();
        let err = HttpRequest::new(Method::GET, url).header("bad header", "x").unwrap_err();
        assert!(matches!(err, RequestError::InvalidRequest(_)));
    }

    #[test]
    fn bad_mime_is_rejected() {
        let form = UploadForm::new()
            .file(UploadFile::new("bill", "bill.jpg", vec![1, 2, 3]).with_mime("not a mime"));
        assert!(matches!(form.into_multipart(), Err(RequestError::InvalidRequest(_))));
    }

    #[test]
    fn upload_form_collects_parts() {
        let form = UploadForm::new()
            .text("vendor", "Fresh Farms")
            .file(UploadFile::new("bill", "bill.png", vec![0xFF]).with_mime("image/png"));

        assert_eq!(form.fields().len(), 1);
        assert_eq!(form.files()[0].mime.as_deref(), Some("image/png"));
        assert!(!form.is_empty());
        assert!(form.into_multipart().is_ok());
    }
}
