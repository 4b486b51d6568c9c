// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-call interceptor selection and path building.

use std::fmt;
use std::sync::Arc;

use super::Interceptor;

/// Which interceptors apply to a single call.
#[derive(Clone, Default)]
pub struct InterceptConfig {
    /// Allow-list of names. Empty admits every interceptor.
    pub only: Vec<String>,

    /// Deny-list of names. Wins over `only`.
    pub exclude: Vec<String>,

    /// Extra interceptors for this call. Never filtered.
    pub additional: Vec<Arc<dyn Interceptor>>,
}

impl InterceptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the named interceptor passes the filters.
    pub fn should_apply(&self, name: &str) -> bool {
        if self.exclude.iter().any(|n| n == name) {
            return false;
        }
        self.only.is_empty() || self.only.iter().any(|n| n == name)
    }
}

impl fmt::Debug for InterceptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let additional: Vec<&str> = self.additional.iter().map(|i| i.name()).collect();
        f.debug_struct("InterceptConfig")
            .field("only", &self.only)
            .field("exclude", &self.exclude)
            .field("additional", &additional)
            .finish()
    }
}

/// A modification of an [`InterceptConfig`].
///
/// Options accumulate: two `Only` options admit the union of their names.
#[derive(Clone)]
pub enum InterceptOption {
    Only(Vec<String>),
    Exclude(Vec<String>),
    Additional(Vec<Arc<dyn Interceptor>>),
}

impl InterceptOption {
    pub fn apply(&self, config: &mut InterceptConfig) {
        match self {
            Self::Only(names) => config.only.extend(names.iter().cloned()),
            Self::Exclude(names) => config.exclude.extend(names.iter().cloned()),
            Self::Additional(interceptors) => {
                config.additional.extend(interceptors.iter().cloned())
            }
        }
    }
}

impl fmt::Debug for InterceptOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Only(names) => f.debug_tuple("Only").field(names).finish(),
            Self::Exclude(names) => f.debug_tuple("Exclude").field(names).finish(),
            Self::Additional(list) => {
                let names: Vec<&str> = list.iter().map(|i| i.name()).collect();
                f.debug_tuple("Additional").field(&names).finish()
            }
        }
    }
}

/// Run only the named interceptors.
pub fn with_only<I, S>(names: I) -> InterceptOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    InterceptOption::Only(names.into_iter().map(Into::into).collect())
}

/// Skip the named interceptors.
pub fn with_exclude<I, S>(names: I) -> InterceptOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    InterceptOption::Exclude(names.into_iter().map(Into::into).collect())
}

/// Add interceptors for this call only.
pub fn with_additional(interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>) -> InterceptOption {
    InterceptOption::Additional(interceptors.into_iter().collect())
}

/// One argument to [`join_path`]: a path segment or an option.
#[derive(Debug, Clone)]
pub enum InterceptPart {
    Segment(String),
    Option(InterceptOption),
}

impl From<&str> for InterceptPart {
    fn from(s: &str) -> Self {
        Self::Segment(s.to_string())
    }
}

impl From<String> for InterceptPart {
    fn from(s: String) -> Self {
        Self::Segment(s)
    }
}

impl From<&String> for InterceptPart {
    fn from(s: &String) -> Self {
        Self::Segment(s.clone())
    }
}

impl From<InterceptOption> for InterceptPart {
    fn from(option: InterceptOption) -> Self {
        Self::Option(option)
    }
}

/// Split parts into a dotted path and the options among them.
///
/// Segments are joined with `.`, skipping empty ones; options keep their
/// order.
pub fn join_path<I, P>(parts: I) -> (String, Vec<InterceptOption>)
where
    I: IntoIterator<Item = P>,
    P: Into<InterceptPart>,
{
    let mut path = String::new();
    let mut options = Vec::new();

    for part in parts {
        match part.into() {
            InterceptPart::Segment(segment) => {
                if segment.is_empty() {
                    continue;
                }
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(&segment);
            }
            InterceptPart::Option(option) => options.push(option),
        }
    }

    (path, options)
}

/// Build a `Vec<InterceptPart>` from mixed segments and options.
///
/// ```rust,ignore
/// let (ctx, guard) = ctx.use_intercept(intercept_parts!["Users", "Get", with_only(["tracing"])]);
/// ```
#[macro_export]
macro_rules! intercept_parts {
    ($($part:expr),* $(,)?) => {
        vec![$($crate::intercept::InterceptPart::from($part)),*]
    };
}
