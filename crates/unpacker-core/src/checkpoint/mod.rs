//! Human-in-the-loop checkpoint.
//!
//! The pipeline suspends here between scoring and refinement. The human sees
//! every idea with its aggregated score and divergence flag, plus any
//! pending criteria, and answers Approve / Revise / Abort.

pub mod decision;
pub mod error;
pub mod gate;

pub use decision::{CheckpointState, Decision};
pub use error::{CheckpointError, CheckpointResult};
pub use gate::{CheckpointGate, HumanInterface};
