use crate::materialize::Step;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TakeoffError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project '{0}' has no takeoff spreadsheet")]
    NoSpreadsheet(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("template spreadsheet has no \"{tab}\" tab (available: {available})")]
    TemplateTabMissing { tab: String, available: String },

    #[error("tab not found: {0}")]
    TabNotFound(String),

    #[error("version not found in tracker: {0}")]
    VersionNotFound(String),

    #[error("version tracker is full ({capacity} slots)")]
    TrackerFull { capacity: u32 },

    #[error("no layout for section '{0}'")]
    MissingSectionLayout(String),

    #[error("cannot delete protected tab '{0}'")]
    ProtectedTab(String),

    #[error("version '{0}' has data; use force to delete anyway")]
    VersionHasData(String),

    #[error("cannot delete the last version tab")]
    LastVersionTab,

    #[error("spreadsheet service error: {0}")]
    Upstream(String),

    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("{step} failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<TakeoffError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Upstream,
    Internal,
}

impl TakeoffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TakeoffError::ProjectNotFound(_)
            | TakeoffError::NoSpreadsheet(_)
            | TakeoffError::TabNotFound(_)
            | TakeoffError::VersionNotFound(_) => ErrorKind::NotFound,
            TakeoffError::Invalid(_)
            | TakeoffError::TrackerFull { .. }
            | TakeoffError::ProtectedTab(_)
            | TakeoffError::LastVersionTab => ErrorKind::Validation,
            TakeoffError::VersionHasData(_) => ErrorKind::Conflict,
            TakeoffError::Upstream(_)
            | TakeoffError::TemplateTabMissing { .. }
            | TakeoffError::Http(_) => ErrorKind::Upstream,
            TakeoffError::Step { source, .. } => source.kind(),
            TakeoffError::MissingSectionLayout(_)
            | TakeoffError::MissingCredentials(_)
            | TakeoffError::Io(_)
            | TakeoffError::Yaml(_)
            | TakeoffError::Json(_)
            | TakeoffError::Sqlite(_) => ErrorKind::Internal,
        }
    }

    /// Wrap this error with the materializer step that produced it.
    pub fn at(self, step: Step) -> Self {
        match self {
            TakeoffError::Step { .. } => self,
            other => TakeoffError::Step {
                step,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, TakeoffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_takes_kind_of_source() {
        let err = TakeoffError::Upstream("503".into()).at(Step::DuplicateTemplate);
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().starts_with("duplicate template"));
    }

    #[test]
    fn at_does_not_double_wrap() {
        let err = TakeoffError::Upstream("x".into())
            .at(Step::RenameTab)
            .at(Step::TransferSetup);
        let TakeoffError::Step { step, .. } = err else {
            panic!("expected Step")
        };
        assert_eq!(step, Step::RenameTab);
    }

    #[test]
    fn missing_project_is_not_found() {
        assert_eq!(
            TakeoffError::ProjectNotFound("p1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TakeoffError::NoSpreadsheet("p1".into()).kind(),
            ErrorKind::NotFound
        );
    }
}
