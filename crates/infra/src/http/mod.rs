//! HTTP transport: request description, response parsing and the
//! single-attempt executor.

mod client;
mod request;
mod response;

pub use client::{RequestExecutor, RequestExecutorBuilder};
pub use request::{HttpRequest, RequestPayload, UploadFile, UploadForm};
pub use response::ResponseBody;
