//! HTTP request layer for the polling transport.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `error_codes` | Retryable status sets |
//! | `http` | [`HttpClient`] seam and reqwest implementation |
//! | `retrying` | [`RetryingRequest`] with backoff and jitter |

// ============================================================================
// Submodules
// ============================================================================

/// Retryable status sets.
pub mod error_codes;

/// HTTP client seam.
pub mod http;

/// Retrying request primitive.
pub mod retrying;

// ============================================================================
// Re-exports
// ============================================================================

pub use error_codes::ErrorCodes;
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, ReqwestHttpClient};
pub use retrying::{RequestConfig, RequestError, RequestEvent, ResponseBody, RetryingRequest};
