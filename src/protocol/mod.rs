//! Wire protocol: payload values, envelopes and the frame codec.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | Envelope (JSON) | both | `{channel, message, payload}` |
//! | `Subscription: OK` | server → client | subscribe acknowledgement |
//! | eval command | server → client | server-pushed command |
//! | base64 marker | server → client | wraps any of the above |
//! | anything else | server → client | opaque text payload |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `value` | Payload value model |
//! | `envelope` | Envelope type |
//! | `codec` | Encode/decode and transform pipelines |

// ============================================================================
// Submodules
// ============================================================================

/// Encoding, decoding and transform pipelines.
pub mod codec;

/// The envelope wire unit.
pub mod envelope;

/// Payload value model.
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, Decoded, Pipeline, SUBSCRIPTION_OK, Transform, TransformFn};
pub use envelope::Envelope;
pub use value::Value;
