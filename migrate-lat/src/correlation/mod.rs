//! Userspace start/completion correlation
//!
//! Same pipeline as the eBPF programs, for operations observed in user
//! space (and for exercising the pipeline without a kernel):
//! - `key`: correlation key from the current task
//! - `table`: sharded, bounded start-timestamp table
//! - `tracer`: start recording, completion matching, sample publishing

pub mod key;
pub mod table;
pub mod tracer;

pub use key::{comm_bytes, TaskSnapshot};
pub use table::{StartEntry, StartTable};
pub use tracer::{
    Completion, CompletionHandler, ManualClock, MigrateOutcome, MonotonicClock, SystemClock,
    Tracer, TracerStats,
};
