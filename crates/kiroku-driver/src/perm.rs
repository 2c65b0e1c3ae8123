//! Permission collaborator: per-path owner, group, and mode lookups.
//!
//! The driver never enforces permissions — that is the protocol front's or
//! an operator's concern. It only asks this collaborator what to report in
//! metadata, keyed by root-relative virtual path with no session context.

use thiserror::Error;

/// A permission lookup failed.
#[derive(Debug, Error)]
#[error("permission lookup for {path}: {reason}")]
pub struct PermError {
    /// Root-relative path the lookup was keyed by.
    pub path: String,
    /// What went wrong, in the backend's words.
    pub reason: String,
}

impl PermError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Maps a root-relative virtual path to ownership metadata.
pub trait Perm: Send + Sync {
    /// Permission bits for the path. File-type bits are the driver's
    /// business, not this collaborator's.
    fn mode(&self, path: &str) -> Result<u32, PermError>;

    /// Owning user name.
    fn owner(&self, path: &str) -> Result<String, PermError>;

    /// Owning group name.
    fn group(&self, path: &str) -> Result<String, PermError>;
}

/// Answers every lookup with one fixed owner/group and mode `0o777`.
#[derive(Debug, Clone)]
pub struct SimplePerm {
    owner: String,
    group: String,
}

impl SimplePerm {
    pub fn new(owner: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
        }
    }
}

impl Perm for SimplePerm {
    fn mode(&self, _path: &str) -> Result<u32, PermError> {
        Ok(0o777)
    }

    fn owner(&self, _path: &str) -> Result<String, PermError> {
        Ok(self.owner.clone())
    }

    fn group(&self, _path: &str) -> Result<String, PermError> {
        Ok(self.group.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_perm_fixed_answers() {
        let perm = SimplePerm::new("amy", "staff");
        assert_eq!(perm.mode("any/path").unwrap(), 0o777);
        assert_eq!(perm.owner("any/path").unwrap(), "amy");
        assert_eq!(perm.group("other").unwrap(), "staff");
    }

    #[test]
    fn test_perm_error_display() {
        let err = PermError::new("a/b", "backend offline");
        assert_eq!(err.to_string(), "permission lookup for a/b: backend offline");
    }
}
