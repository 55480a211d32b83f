//! Client configuration.
//!
//! Settings are passed explicitly to the registry at construction time;
//! nothing is read from ambient global state.

// ============================================================================
// Submodules
// ============================================================================

/// Settings struct, URL assembly and validation.
pub mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use settings::{DEFAULT_ALERT_MESSAGE, Environment, Settings, TransportKind};
