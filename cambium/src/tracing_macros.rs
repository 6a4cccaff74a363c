//! Logging shims for the diff pipeline.
//!
//! The matchers and the edit-script generator report their progress
//! through these macros: pair counts after each matching phase at `debug`,
//! every emitted action as `%op` at `debug`, per-batch queue movement at
//! `trace`. The macros forward to `tracing` when the `tracing` feature is
//! enabled — and always under `cfg(test)`, so failing tests come with the
//! pipeline log — and expand to nothing otherwise, which keeps the default
//! build silent and free of the dependency.

/// Log a fine-grained pipeline event (batch contents, queue movement).
#[cfg(any(test, feature = "tracing"))]
#[macro_export]
macro_rules! trace {
    ($($event:tt)*) => {
        tracing::trace!($($event)*);
    };
}

/// Log a fine-grained pipeline event (expands to nothing in this build).
#[cfg(not(any(test, feature = "tracing")))]
#[macro_export]
macro_rules! trace {
    ($($event:tt)*) => {};
}

/// Log a phase summary or an emitted action.
#[cfg(any(test, feature = "tracing"))]
#[macro_export]
macro_rules! debug {
    ($($event:tt)*) => {
        tracing::debug!($($event)*);
    };
}

/// Log a phase summary or an emitted action (expands to nothing in this build).
#[cfg(not(any(test, feature = "tracing")))]
#[macro_export]
macro_rules! debug {
    ($($event:tt)*) => {};
}
