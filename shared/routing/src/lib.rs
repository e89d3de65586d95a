//! Path pattern matching shared by the gateway's exclusion list and scope rules.
//!
//! Supported patterns:
//! - Static segments: "/api/users"
//! - Dynamic parameters: "/api/users/{id}"
//! - Trailing splat: "/api/users/*"

use http::Method;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
    has_trailing_splat: bool,
}

impl PathPattern {
    pub fn parse(path_str: &str) -> Self {
        let mut normalized_path = path_str.trim().trim_matches('/');

        let mut has_trailing_splat = false;
        if normalized_path == "*" {
            has_trailing_splat = true;
            normalized_path = "";
        } else if let Some(stripped) = normalized_path.strip_suffix("/*") {
            has_trailing_splat = true;
            normalized_path = stripped;
        }

        let segments = normalized_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Static(s.to_string()),
            })
            .collect();

        PathPattern {
            segments,
            has_trailing_splat,
        }
    }

    /// Matches a request path against this pattern.
    /// Returns the captured parameters if the match succeeds.
    /// Leading and trailing slashes on the request path are ignored.
    pub fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let request_segments: Vec<&'a str> = request_path
            .trim()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if request_segments.len() < self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (seg, req_segment) in self.segments.iter().zip(&request_segments) {
            match seg {
                PathSegment::Static(s) if s == req_segment => {}
                PathSegment::Static(_) => return None,
                PathSegment::Param(name) => {
                    params.insert(name.clone(), *req_segment);
                }
            }
        }

        if self.has_trailing_splat || request_segments.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

/// A path pattern, an optional method filter, and the value attached to it.
#[derive(Debug, Clone)]
pub struct Route<A> {
    path: PathPattern,
    methods: Option<Vec<Method>>,
    action: A,
}

impl<A> Route<A> {
    /// An empty method list is treated the same as no filter.
    pub fn new(path: &str, methods: Option<Vec<Method>>, action: A) -> Self {
        Self {
            path: PathPattern::parse(path),
            methods: methods.filter(|m| !m.is_empty()),
            action,
        }
    }

    pub fn matches<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, A>> {
        if let Some(methods) = &self.methods
            && !methods.contains(method)
        {
            return None;
        }

        let params = self.path.matches(path)?;
        Some(RouteMatch {
            params,
            action: &self.action,
        })
    }
}

/// Ordered list of routes; the first match wins.
#[derive(Debug, Clone)]
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> Default for RouteTable<A> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn resolve<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, A>> {
        self.routes
            .iter()
            .find_map(|route| route.matches(method, path))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
