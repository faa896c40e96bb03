//! Error plumbing between infrastructure failures and the domain error.

mod conversions;

pub use conversions::InfraError;
