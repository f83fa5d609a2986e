//! Progress notifications around external compiler runs.

use std::path::Path;

/// Receives notifications around external compiler invocations.
///
/// Implemented by the embedding application to surface "compiling..." status
/// on whatever interface it owns. Notifications are side effects only; they
/// have no bearing on caching or correctness.
pub trait ProgressObserver {
    /// Called immediately before the compiler subprocess is spawned.
    fn compile_started(&self, source: &Path);

    /// Called after the compile attempt finishes.
    fn compile_finished(&self, success: bool);
}
