//! # processio-engine
//!
//! Request-facing half of the processio variable store. The
//! [`VariableEngine`] sits on top of any
//! [`VariableBackend`](processio_store::VariableBackend): it validates
//! input, stamps writes from a [`Clock`], answers `calculate_*` keys through
//! the [`ComputedResolver`] without touching storage, runs bulk batches, and
//! bounds each storage call with a timeout.

pub mod clock;
pub mod engine;
pub mod error;
pub mod resolver;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{DEFAULT_STORAGE_TIMEOUT, VariableEngine};
pub use error::{EngineError, EngineResult};
pub use resolver::{COMPUTED_PREFIX, ComputedResolver, is_computed};
