//! Shared test fixtures: recording actions and signed webhook requests.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::Request;

use crate::handlers::{Action, HandlerError, Invocation};
use crate::webhooks::{compute_signature, format_signature_header};

/// An action that records every invocation and optionally fails.
pub struct RecordingAction {
    name: String,
    fail_with: Option<i32>,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingAction {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(RecordingAction {
            name: name.to_string(),
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, code: i32) -> Arc<Self> {
        Arc::new(RecordingAction {
            name: name.to_string(),
            fail_with: Some(code),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Action for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(invocation.clone());
        match self.fail_with {
            Some(code) => Err(HandlerError::ActionFailed {
                action: self.name.clone(),
                command: "recorded".to_string(),
                code: Some(code),
            }),
            None => Ok(()),
        }
    }
}

/// A JSON POST to `uri`, signed with `secret`.
pub fn signed_request(uri: &str, secret: &[u8], body: &serde_json::Value) -> Request<Body> {
    let body_bytes = serde_json::to_vec(body).unwrap();
    let signature = format_signature_header(&compute_signature(&body_bytes, secret));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body_bytes))
        .unwrap()
}

/// A JSON POST to `uri` with no signature header.
pub fn unsigned_request(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}
