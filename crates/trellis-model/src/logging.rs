//! Logging facilities for Trellis models.
//!
//! This module provides integration with the `tracing` crate for structured
//! logging. Model construction, notification fan-out, conversion, owner
//! re-targeting, and array resynchronization are instrumented at `trace`
//! level so a subscriber can follow value propagation through a model graph.
//!
//! # Tracing Integration
//!
//! Trellis uses the `tracing` crate for instrumentation. To see logs, install
//! a tracing subscriber in your application:
//!
//! ```ignore
//! use tracing_subscriber;
//!
//! fn main() {
//!     // Initialize tracing (you can customize this)
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! # Filtering
//!
//! Every trace event names one of the [`targets`] constants, so a directive
//! such as `trellis_model::convert=trace` narrows output to one subsystem.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const MODEL: &str = "trellis_model";
    /// Type registry target.
    pub const REGISTRY: &str = "trellis_model::registry";
    /// Plain value-model target.
    pub const VALUE_MODEL: &str = "trellis_model::model";
    /// Array model target.
    pub const ARRAY: &str = "trellis_model::array";
    /// Structured tree target.
    pub const STRUCTURED: &str = "trellis_model::structured";
    /// Conversion target.
    pub const CONVERT: &str = "trellis_model::convert";
    /// Property descriptor/source target.
    pub const PROPERTY: &str = "trellis_model::property";
    /// Model connection target.
    pub const CONNECT: &str = "trellis_model::connect";
}
