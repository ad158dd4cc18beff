use std::path::PathBuf;

/// Unified error type for every fallible store, archive, and quality-test
/// operation.
///
/// All failures are loud: no variant is recovered internally. Quality-test
/// algorithms never produce a `DqmError`; they signal inapplicability with a
/// negative probability which the engine maps to an `Invalid` report status.
#[derive(Debug, thiserror::Error)]
pub enum DqmError {
    /// A monitor-element or directory path uses a character outside the safe
    /// alphabet (`A-Z a-z 0-9 / _ + = - ( ) #` and space).
    #[error("path '{name}' uses characters outside the safe alphabet")]
    IllegalName {
        /// The offending full path.
        name: String,
    },

    /// A wildcard pattern could not be compiled.
    #[error("invalid wildcard pattern '{pattern}': {detail}")]
    BadPattern {
        /// The pattern as given.
        pattern: String,
        /// What is wrong with it.
        detail: String,
    },

    /// `cd` into a directory that does not exist.
    #[error("cannot 'cd' into non-existent directory '{path}'")]
    NoSuchDirectory {
        /// The directory that was requested.
        path: String,
    },

    /// A name collision: re-booking with collation disabled, a directory
    /// colliding with a monitor element (or vice versa), or a duplicate
    /// quality-test name.
    #[error("{context}: '{path}' already exists")]
    Duplicate {
        /// What was being attempted (e.g. `book1D`, `createQTest`).
        context: &'static str,
        /// The colliding path or name.
        path: String,
    },

    /// A quality test referenced an algorithm missing from the catalog.
    #[error("cannot create a quality test using unknown algorithm '{algorithm}'")]
    UnknownAlgorithm {
        /// The requested algorithm name.
        algorithm: String,
    },

    /// Attaching a quality test that was never created.
    #[error("cannot apply non-existent quality test '{qtname}'; create it first")]
    NoSuchQTest {
        /// The requested criterion name.
        qtname: String,
    },

    /// Tagging with the reserved zero tag, or tagging a missing element.
    #[error("cannot tag '{path}' with tag {tag}: {detail}")]
    InvalidTag {
        /// The target element path.
        path: String,
        /// The offending tag value.
        tag: u32,
        /// Why the tag was rejected.
        detail: &'static str,
    },

    /// Archive open/read/write failure, including corrupt payloads.
    #[error("archive error for '{path}': {detail}")]
    ArchiveIo {
        /// The archive file involved.
        path: PathBuf,
        /// Nature of the failure.
        detail: String,
    },

    /// Underlying file-system failure while touching an archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type DqmResult<T> = Result<T, DqmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DqmError>();
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DqmError = io_err.into();
        assert!(matches!(err, DqmError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn duplicate_message_names_context_and_path() {
        let err = DqmError::Duplicate {
            context: "book1D",
            path: "A/B/h".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("book1D"));
        assert!(msg.contains("A/B/h"));
    }

    #[test]
    fn invalid_tag_message_has_value() {
        let err = DqmError::InvalidTag {
            path: "A/n".into(),
            tag: 0,
            detail: "tag must be non-zero",
        };
        assert!(err.to_string().contains("tag 0"));
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn archive_io_message_has_path() {
        let err = DqmError::ArchiveIo {
            path: PathBuf::from("/tmp/t.dqm"),
            detail: "truncated header".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/t.dqm"));
        assert!(msg.contains("truncated"));
    }
}
