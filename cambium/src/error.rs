//! Error type for the diff pipeline.

/// Errors surfaced by tree loading, matching, and edit-script generation.
///
/// Every failure is propagated to the caller; nothing is retried or
/// swallowed inside the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Loader arguments were supplied without a loader to consume them.
    #[error("loader arguments were supplied but no loader was given")]
    LoaderArgsWithoutLoader,

    /// The requested language has no entry in the rule table.
    #[error("language {0:?} is not present in the rule table")]
    UnsupportedLanguage(String),

    /// A language-rule document failed to parse or validate.
    #[error("invalid language-rule document: {0}")]
    InvalidRules(#[from] serde_json::Error),

    /// An internal invariant did not hold; this indicates a bug in the
    /// caller-supplied mappings or in the pipeline itself.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
}
