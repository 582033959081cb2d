//! Observe → Orient → Decide → Act cycle over evaluation batches.
//!
//! - `controller`: the stage functions and `run_cycle`
//! - `policy`: severity banding over unfairness
//! - `hook`: optional mitigation callback for the Act stage

pub mod controller;
pub mod hook;
pub mod policy;

pub use controller::{CycleOutcome, CyclePhase, OodaController, Orientation};
pub use hook::MitigationHook;
pub use policy::SeverityPolicy;
