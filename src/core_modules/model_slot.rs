// THEORY:
// A `ModelSlot` is the home of a heavyweight, shared engine instance: the face
// detector or the emotion model. Such engines are expensive to build, are built
// exactly once, and are then shared by every cycle of a coordinator.
//
// Key architectural principles:
// 1.  **Explicit Ownership**: The slot is created by the application and handed to
//     the coordinators at construction. There is no hidden global.
// 2.  **Single Initialization**: `init` succeeds once. A second call is an error,
//     not a silent replacement.
// 3.  **Loud Before Ready**: `get` on an empty slot returns `NotInitialized`, so a
//     coordinator that runs too early reports a failure instead of doing nothing.
//
// Internally this is a `OnceLock`, the same primitive used for lazily built
// lookup tables, so reads after initialization are lock-free.

use crate::error::{PipelineError, Result};
use std::sync::{Arc, OnceLock};

pub struct ModelSlot<T: ?Sized> {
    name: &'static str,
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized> ModelSlot<T> {
    /// Creates an empty slot. `name` appears in error messages.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceLock::new(),
        }
    }

    /// Installs the instance. Fails if the slot is already filled.
    pub fn init(&self, value: Arc<T>) -> Result<()> {
        self.cell
            .set(value)
            .map_err(|_| PipelineError::AlreadyInitialized(self.name))
    }

    /// Returns a handle to the instance, or `NotInitialized`.
    pub fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get()
            .cloned()
            .ok_or(PipelineError::NotInitialized(self.name))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
