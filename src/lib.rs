//! eqperf: instrumentation-driven call-tree profiler.
//!
//! Callers mark region entry and exit; the profilers aggregate elapsed time per
//! nesting path (and per thread for [`MtProfiler`]) and dump sorted,
//! percentage-annotated reports on demand.

mod calltree;
mod clock;
mod config;
mod error;
mod global;
mod mt;
mod region;
mod report;
mod session;
mod st;

pub use calltree::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use global::*;
pub use mt::*;
pub use region::*;
pub use report::*;
pub use session::*;
pub use st::*;
