//! HTTP binding
//!
//! Verbs map to operations as `GET→read`, `PUT→write`, `POST→invoke`,
//! `DELETE→unlink`. `Content-Type` selects the request codec and `Accept`
//! the response codec.

mod client;
mod server;

pub use client::{HttpClient, HttpClientConfig, HttpClientFactory, HttpsClientFactory};
pub use server::HttpServer;

use axum::http::Method;

use crate::resource::Operation;

/// Operation served for an inbound verb
#[must_use]
pub fn operation_for(method: &Method) -> Option<Operation> {
    match *method {
        Method::GET => Some(Operation::Read),
        Method::PUT => Some(Operation::Write),
        Method::POST => Some(Operation::Invoke),
        Method::DELETE => Some(Operation::Unlink),
        _ => None,
    }
}

/// Default verb a client sends for an operation
#[must_use]
pub fn method_for(operation: Operation) -> Method {
    match operation {
        Operation::Read => Method::GET,
        Operation::Write => Method::PUT,
        Operation::Invoke => Method::POST,
        Operation::Unlink => Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_and_operations_correspond() {
        for op in [Operation::Read, Operation::Write, Operation::Invoke, Operation::Unlink] {
            assert_eq!(operation_for(&method_for(op)), Some(op));
        }
        assert_eq!(operation_for(&Method::PATCH), None);
    }
}
