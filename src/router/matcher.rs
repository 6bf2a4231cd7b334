//! First-match route resolution

use super::rule::{ParsedUri, RouteRule};

/// Return the first rule, in declaration order, that accepts the request.
pub fn match_rules<'a>(request: &ParsedUri, rules: &'a [RouteRule]) -> Option<&'a RouteRule> {
    rules.iter().find(|rule| rule.accepts(request))
}

/// Resolve the `api` label for a request: the raw spec of the first
/// accepting rule, or `None` when nothing matches.
pub fn matches<'a>(request: &ParsedUri, rules: &'a [RouteRule]) -> Option<&'a str> {
    match_rules(request, rules).map(RouteRule::raw)
}
