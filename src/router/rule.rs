//! Route rules and URI parsing

use std::collections::BTreeSet;

use crate::error::UriError;

/// A URI split into its path and the set of query parameter names.
///
/// Parameter values are discarded; only names take part in matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    /// Path component, always non-empty
    pub path: String,
    /// Query parameter names present on the URI
    pub params: BTreeSet<String>,
}

impl ParsedUri {
    /// Parse a request URI or a configured route spec.
    ///
    /// Accepts origin-form (`/a/b?x=1`) and absolute-form
    /// (`http://host/a/b?x=1`) URIs. The fragment is ignored.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let uri = uri.trim();
        let without_fragment = uri.split_once('#').map_or(uri, |(head, _)| head);
        let (target, query) = match without_fragment.split_once('?') {
            Some((target, query)) => (target, Some(query)),
            None => (without_fragment, None),
        };

        let path = strip_authority(target);
        if path.is_empty() {
            return Err(UriError::MissingPath(uri.to_string()));
        }

        let params = query
            .map(|q| {
                q.split('&')
                    .filter_map(|pair| {
                        let name = pair.split_once('=').map_or(pair, |(name, _)| name);
                        (!name.is_empty()).then(|| name.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            params,
        })
    }
}

/// Drop `scheme://authority` (or a bare `//authority`) in front of the path.
fn strip_authority(target: &str) -> &str {
    let rest = match target.split_once("://") {
        Some((scheme, rest)) if !scheme.contains('/') => rest,
        _ => match target.strip_prefix("//") {
            Some(rest) => rest,
            None => return target,
        },
    };
    rest.find('/').map_or("", |i| &rest[i..])
}

/// A compiled allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    raw: String,
    path: String,
    required: BTreeSet<String>,
}

impl RouteRule {
    /// Compile a route spec such as `/api/search?limit&offset`.
    pub fn parse(spec: &str) -> Result<Self, UriError> {
        let parsed = ParsedUri::parse(spec)?;
        Ok(Self {
            raw: spec.trim().to_string(),
            path: parsed.path,
            required: parsed.params,
        })
    }

    /// The spec as written in configuration; used as the `api` label
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Path the request must equal
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parameter names the request must carry
    pub fn required_params(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Check a parsed request against this rule.
    pub fn accepts(&self, request: &ParsedUri) -> bool {
        self.path == request.path && self.required.is_subset(&request.params)
    }
}
