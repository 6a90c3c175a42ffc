//! Package name and version rules for pushes to external targets.

use regex::Regex;

use crate::error::{ReplError, ReplResult};

/// Compiled name/version rules. An empty rule list accepts everything.
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    package_rules: Vec<Regex>,
    version_rules: Vec<Regex>,
}

impl PackageFilter {
    /// Compile rule patterns; an invalid pattern is a configuration error.
    pub fn new<S: AsRef<str>>(package_rules: &[S], version_rules: &[S]) -> ReplResult<Self> {
        Ok(Self {
            package_rules: compile(package_rules)?,
            version_rules: compile(version_rules)?,
        })
    }

    /// Whether any rules are configured.
    pub fn is_empty(&self) -> bool {
        self.package_rules.is_empty() && self.version_rules.is_empty()
    }

    /// Both the package name and the version must match some rule of their list.
    pub fn matches(&self, name: &str, version: &str) -> bool {
        any_match(&self.package_rules, name) && any_match(&self.version_rules, version)
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> ReplResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|e| ReplError::Config {
                msg: format!("invalid rule {:?}: {}", p.as_ref(), e),
            })
        })
        .collect()
}

fn any_match(rules: &[Regex], value: &str) -> bool {
    rules.is_empty() || rules.iter().any(|r| r.is_match(value))
}
