//! Integration tests for the Portcullis client
//!
//! This test suite validates:
//! - Trust bootstrap scenarios: issuance, step-up, renewal, rate limiting
//! - Signed operations: freshness, verification, transparent re-issuance
//! - HTTP collaborators against a mock API server
//! - Durable state across client restarts

pub mod test_utils;



#[cfg(test)]
mod http_tests;

#[cfg(test)]
mod persistence_tests;
