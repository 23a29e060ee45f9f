//! Hook-to-action routing table.
//!
//! Routes are evaluated deterministically: an exact match wins over any
//! prefix, and among prefixes the longest wins. Two prefixes of the same
//! length cannot both match one hook unless they are equal, which the loader
//! rejects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::Action;
use super::command::CommandAction;

/// How a route selects hooks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// The hook name equals this string.
    Exact(String),
    /// The hook name starts with this string.
    Prefix(String),
}

impl Matcher {
    pub fn matches(&self, hook: &str) -> bool {
        match self {
            Matcher::Exact(name) => hook == name,
            Matcher::Prefix(prefix) => hook.starts_with(prefix.as_str()),
        }
    }

    fn pattern(&self) -> &str {
        match self {
            Matcher::Exact(s) | Matcher::Prefix(s) => s,
        }
    }
}

/// One `(matcher, action)` pair.
#[derive(Clone)]
struct Route {
    matcher: Matcher,
    action: Arc<dyn Action>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("matcher", &self.matcher)
            .field("action", &self.action.name())
            .finish()
    }
}

/// Errors building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read handlers file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid handlers file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("empty pattern in {0:?}")]
    EmptyPattern(Matcher),

    #[error("duplicate route for {0:?}")]
    DuplicateMatcher(Matcher),

    #[error("action {0} has no steps")]
    EmptyAction(String),
}

/// An ordered table of routes, fixed for the dispatcher's lifetime.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    routes: Vec<Route>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Rejects empty patterns and a matcher identical to one already present.
    pub fn push(
        &mut self,
        matcher: Matcher,
        action: Arc<dyn Action>,
    ) -> Result<(), RegistryError> {
        if matcher.pattern().is_empty() {
            return Err(RegistryError::EmptyPattern(matcher));
        }
        if self.routes.iter().any(|r| r.matcher == matcher) {
            return Err(RegistryError::DuplicateMatcher(matcher));
        }
        self.routes.push(Route { matcher, action });
        Ok(())
    }

    /// Builder form of [`HandlerRegistry::push`] for an exact route.
    pub fn exact(
        mut self,
        hook: impl Into<String>,
        action: Arc<dyn Action>,
    ) -> Result<Self, RegistryError> {
        self.push(Matcher::Exact(hook.into()), action)?;
        Ok(self)
    }

    /// Builder form of [`HandlerRegistry::push`] for a prefix route.
    pub fn prefix(
        mut self,
        prefix: impl Into<String>,
        action: Arc<dyn Action>,
    ) -> Result<Self, RegistryError> {
        self.push(Matcher::Prefix(prefix.into()), action)?;
        Ok(self)
    }

    /// Finds the action for `hook`: the exact route if any, otherwise the
    /// route with the longest matching prefix.
    pub fn resolve(&self, hook: &str) -> Option<Arc<dyn Action>> {
        let exact = self
            .routes
            .iter()
            .find(|r| matches!(&r.matcher, Matcher::Exact(name) if name == hook));

        exact
            .or_else(|| {
                self.routes
                    .iter()
                    .filter(|r| matches!(r.matcher, Matcher::Prefix(_)) && r.matcher.matches(hook))
                    .max_by_key(|r| r.matcher.pattern().len())
            })
            .map(|r| Arc::clone(&r.action))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Loads command routes from a JSON handlers file.
    ///
    /// ```json
    /// { "routes": [
    ///     { "match": { "exact": "codenames" },
    ///       "action": { "name": "codenames", "only_ref": "refs/heads/main",
    ///                   "steps": [ { "program": "git", "args": ["pull"],
    ///                                "cwd": "/srv/codenames", "run_as": "maint" } ] } },
    ///     { "match": { "prefix": "apps-" },
    ///       "action": { "name": "apps",
    ///                   "steps": [ { "program": "git", "args": ["pull"],
    ///                                "for_each_subdir": "/srv/apps/auto" } ] } }
    /// ] }
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let bytes = std::fs::read(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: HandlersFile =
            serde_json::from_slice(&bytes).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_config(file)
    }

    fn from_config(file: HandlersFile) -> Result<Self, RegistryError> {
        let mut registry = HandlerRegistry::new();
        for route in file.routes {
            if route.action.steps().is_empty() {
                return Err(RegistryError::EmptyAction(route.action.name().to_string()));
            }
            registry.push(route.matcher, Arc::new(route.action))?;
        }
        Ok(registry)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HandlersFile {
    routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteConfig {
    #[serde(rename = "match")]
    matcher: Matcher,
    action: CommandAction,
}
