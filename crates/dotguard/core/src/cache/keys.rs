// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Cache keys and path templates

use crate::error::{GuardError, GuardResult};
use crate::models::{ActorId, OrganizationId};
use regex::Regex;
use std::fmt;
use url::form_urlencoded;

/// Canonical key of a cached read
///
/// Two requests for the same path whose query parameters differ only in
/// order produce equal keys. Keys optionally carry the tenant they belong to
/// so that organizations never share entries, and the actor whose personal
/// view they hold. The viewer is kept apart from the query so no request
/// parameter can name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    scope: Option<OrganizationId>,
    viewer: Option<ActorId>,
    path: String,
    query: String,
}

impl CacheKey {
    pub fn new<I, K, V>(path: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params.into_iter().map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())).collect();
        pairs.sort();

        let query = form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();

        Self {
            scope: None,
            viewer: None,
            path: normalize_path(path),
            query,
        }
    }

    /// Parse a request target such as `/projects?page=2&sort=name`
    pub fn parse(target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => Self::new(path, form_urlencoded::parse(query.as_bytes())),
            None => Self::new(target, std::iter::empty::<(&str, &str)>()),
        }
    }

    pub fn scoped(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.scope = Some(organization_id.into());
        self
    }

    pub fn for_viewer(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.viewer = Some(actor_id.into());
        self
    }

    pub fn scope(&self) -> Option<&OrganizationId> {
        self.scope.as_ref()
    }

    pub fn viewer(&self) -> Option<&ActorId> {
        self.viewer.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{}:", scope)?;
        }
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if let Some(viewer) = &self.viewer {
            write!(f, "#{}", viewer)?;
        }
        Ok(())
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// Path pattern with single-segment placeholders
///
/// `:name` and `*` each match exactly one non-empty segment. Query strings
/// never take part in matching.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl PathTemplate {
    pub fn parse(template: &str) -> GuardResult<Self> {
        let path = template.split('?').next().unwrap_or_default();
        let normalized = normalize_path(path);

        let mut segments = Vec::new();
        for raw in normalized.split('/').skip(1).filter(|s| !s.is_empty()) {
            let segment = if raw == "*" {
                Segment::Wildcard
            } else if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    return Err(GuardError::invalid_config(format!("empty placeholder in template '{}'", template)));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(raw.to_string())
            };
            segments.push(segment);
        }

        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<Segment>) -> GuardResult<Self> {
        let mut source = String::new();
        let mut pattern = String::from("^");

        for segment in &segments {
            source.push('/');
            pattern.push('/');
            match segment {
                Segment::Literal(text) => {
                    source.push_str(text);
                    pattern.push_str(&regex::escape(text));
                }
                Segment::Param(name) => {
                    source.push(':');
                    source.push_str(name);
                    pattern.push_str("[^/]+");
                }
                Segment::Wildcard => {
                    source.push('*');
                    pattern.push_str("[^/]+");
                }
            }
        }

        if segments.is_empty() {
            source.push('/');
            pattern.push('/');
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| GuardError::invalid_config(format!("invalid template '{}': {}", source, e)))?;

        Ok(Self { source, segments, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or_default();
        self.regex.is_match(&normalize_path(path))
    }

    /// Replace bound placeholders with literal values
    ///
    /// Unbound placeholders keep matching any segment. A value must fit in
    /// one path segment, so empty values and values containing `/` fail.
    pub fn bind(&self, bindings: &[(&str, &str)]) -> GuardResult<Self> {
        let mut segments = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let bound = match segment {
                Segment::Param(name) => match bindings.iter().find(|(key, _)| *key == name.as_str()) {
                    Some((_, value)) if value.is_empty() || value.contains('/') => {
                        return Err(GuardError::invalid_record(format!("'{}' cannot bind :{} in '{}'", value, name, self.source)));
                    }
                    Some((_, value)) => Segment::Literal((*value).to_string()),
                    None => segment.clone(),
                },
                other => other.clone(),
            };
            segments.push(bound);
        }

        Self::from_segments(segments)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
