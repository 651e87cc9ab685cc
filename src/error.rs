// Run-level error taxonomy.
//
// Only failures that abort an entire source's run get a typed variant.
// Per-item problems (an unparseable date, a malformed feed record, one
// locale or page failing) are recovered where they occur: log and skip,
// never poison the rest of the batch. Notification failures are non-fatal
// and tracked in the dispatch summary instead.
//
// The originating source is carried as `origin`, not `source` — thiserror
// reserves a field of that name for the error cause.

use thiserror::Error;

use crate::model::Source;

#[derive(Debug, Error)]
pub enum RunError {
    /// The source adapter could not produce a batch at all (network, auth,
    /// HTTP-level failure). Nothing was classified, so the seen-set is
    /// untouched.
    #[error("{origin} fetch failed: {inner}")]
    Fetch { origin: Source, inner: anyhow::Error },

    /// The seen-set store could not be read. Classification correctness
    /// depends on store access, so the run stops before touching anything.
    #[error("{origin} seen-set store unavailable: {inner}")]
    Store { origin: Source, inner: anyhow::Error },
}

impl RunError {
    /// Which source's run this error aborted.
    pub fn origin(&self) -> Source {
        match self {
            RunError::Fetch { origin, .. } | RunError::Store { origin, .. } => *origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_their_source_and_cause() {
        let err = RunError::Fetch {
            origin: Source::Forum,
            inner: anyhow::anyhow!("connection refused"),
        };
        assert_eq!(err.origin(), Source::Forum);
        let text = err.to_string();
        assert!(text.contains("forum"));
        assert!(text.contains("connection refused"));

        let err = RunError::Store {
            origin: Source::AppStore,
            inner: anyhow::anyhow!("no such table"),
        };
        assert_eq!(err.origin(), Source::AppStore);
        assert!(err.to_string().contains("store unavailable"));
    }
}
