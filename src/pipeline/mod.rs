//! Pipeline stages of a watch cycle.
//!
//! - `diff`: classify the current set against the previous snapshot
//! - `compose`: turn a classification into a message
//! - `run`: fetch, diff, notify and persist in one cycle

pub mod compose;
pub mod diff;
pub mod run;

pub use compose::{Composer, Message, Section, SectionKind, compose};
pub use diff::{ChangeKind, Classification, DiffResult, StateDiffer, calculate_diff};
pub use run::{
    CycleContext, DiffPreview, RunMode, RunReport, check, is_first_of_period, preview_diff,
    run_cycle,
};
