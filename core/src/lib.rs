//! Async API client for the EdTech backend.
//!
//! # Overview
//! One generic operation, `ApiClient::call`, issues a JSON request with the
//! caller's identity attached and normalizes the outcome into either the
//! parsed JSON body or an `ApiError`. `call_with_binary` does the same for a
//! single multipart attachment. The convenience methods in `endpoints` are
//! thin wrappers that fix a path and shape a payload.
//!
//! # Design
//! - Request building and response parsing are pure (`build_*`,
//!   `parse_response`); only `Transport::execute` touches the network.
//! - Identity comes from an injected `IdentityProvider`, read on every call.
//! - Cross-origin and credential behavior is configuration (`OriginPolicy`).
//! - No retry, caching, timeout, or cancellation.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod identity;
pub mod transport;

pub use client::{ApiClient, JsonPayload};
pub use config::{ClientConfig, OriginPolicy};
pub use endpoints::{FeatureUsage, Plan};
pub use error::ApiError;
pub use http::{BinaryPayload, FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use identity::{EnvIdentity, FileIdentity, IdentityProvider, NoIdentity, StaticIdentity};
pub use transport::{ReqwestTransport, Transport};
