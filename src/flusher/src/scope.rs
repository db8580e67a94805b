//! Deletion scopes
//!
//! A scope is a bucket, optionally narrowed to a path inside it. Containers
//! of a bucket form a hierarchy whose levels are joined with the encoded
//! separator `%2F`, so `bucket/a/b` lives in the container `bucket%2Fa%2Fb`.

use std::fmt;
use std::str::FromStr;

/// Encoded hierarchy separator used in container names.
pub const HIERARCHY_SEPARATOR: &str = "%2F";

/// Errors raised while parsing a scope argument
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope '{0}' has an empty bucket name")]
    EmptyBucket(String),
}

/// A bucket plus an optional path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    bucket: String,
    path: Option<String>,
    prefix: String,
}

impl Scope {
    /// Build a scope from an already split bucket and path.
    pub fn new(bucket: impl Into<String>, path: Option<&str>) -> Result<Self, ScopeError> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(ScopeError::EmptyBucket(bucket));
        }

        let path = path
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let prefix = container_hierarchy(&bucket, path.as_deref());

        Ok(Self {
            bucket,
            path,
            prefix,
        })
    }

    /// Parse a `bucket[/path...]` argument.
    pub fn parse(arg: &str) -> Result<Self, ScopeError> {
        let trimmed = arg.trim_end_matches('/');
        match trimmed.split_once('/') {
            Some((bucket, path)) if !bucket.is_empty() => Self::new(bucket, Some(path)),
            Some(_) => Err(ScopeError::EmptyBucket(arg.to_string())),
            None if trimmed.is_empty() => Err(ScopeError::EmptyBucket(arg.to_string())),
            None => Self::new(trimmed, None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Canonical container prefix of this scope.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a listed container belongs to this scope: either the scope's
    /// own container or a strict descendant in the hierarchy.
    pub fn contains(&self, container: &str) -> bool {
        match container.strip_prefix(self.prefix.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(HIERARCHY_SEPARATOR),
            None => false,
        }
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}/{}", self.bucket, path),
            None => write!(f, "{}", self.bucket),
        }
    }
}

/// Encode a bucket and path into the container name of that level.
pub fn container_hierarchy(bucket: &str, path: Option<&str>) -> String {
    match path.map(|p| p.trim_end_matches('/')).filter(|p| !p.is_empty()) {
        None => bucket.to_string(),
        Some(path) => {
            let encoded = path.split('/').collect::<Vec<_>>().join(HIERARCHY_SEPARATOR);
            format!("{bucket}{HIERARCHY_SEPARATOR}{encoded}")
        }
    }
}
