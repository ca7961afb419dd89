//! HTTP front end: a route table built from the actions' `api` declarations.
//!
//! A route is `"<METHOD> <path>"`. Path segments written `<name>` capture the argument
//! of that name; every other argument is read from the request parameters under its
//! destination name.

use super::{Arguments, ParsedRequest};
use crate::actionmap::tree::{ActionTree, ArgSource, ArgumentSpec, Cardinality};
use crate::error::{ConfigError, ValidationError};
use crate::types::ActionId;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Query and form parameters; repeated keys keep every value in order.
pub type RequestParams = IndexMap<String, Vec<String>>;

const ROUTE_PATTERN: &str = r"^(GET|POST|PUT|PATCH|DELETE) (/\S*)$";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// One validated route.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: String,
    pub pattern: String,
    pub id: ActionId,
    segments: Vec<Segment>,
}

impl Route {
    /// Where this route reads `name` from.
    pub fn source_of(&self, name: &str) -> ArgSource {
        if self
            .segments
            .iter()
            .any(|s| matches!(s, Segment::Param(p) if p == name))
        {
            ArgSource::Path
        } else {
            ArgSource::Query
        }
    }

    /// Method and path with parameter names erased; two routes with the same shape
    /// can never be told apart.
    fn shape(&self) -> String {
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(literal) => shape.push_str(literal),
                Segment::Param(_) => shape.push_str("<>"),
            }
        }
        if shape.is_empty() {
            shape.push('/');
        }
        shape
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn capture(&self, parts: &[&str]) -> Option<BTreeMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captured = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = percent_decode_str(part).decode_utf8().ok()?;
                    captured.insert(name.clone(), value.into_owned());
                }
            }
        }
        Some(captured)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parse one declaration against the action's arguments; `Err` carries the reason.
fn parse_route(
    matcher: &Regex,
    declaration: &str,
    id: &ActionId,
    arguments: &[ArgumentSpec],
) -> Result<Route, String> {
    let captures = matcher
        .captures(declaration.trim())
        .ok_or_else(|| "expected '<METHOD> /path'".to_string())?;
    let method = captures[1].to_string();
    let pattern = captures[2].to_string();

    let mut segments = Vec::new();
    for part in split_path(&pattern) {
        if let Some(name) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
            if !arguments.iter().any(|a| a.name == name) {
                return Err(format!("path parameter <{}> is not an argument", name));
            }
            if segments
                .iter()
                .any(|s| matches!(s, Segment::Param(p) if p == name))
            {
                return Err(format!("path parameter <{}> appears twice", name));
            }
            segments.push(Segment::Param(name.to_string()));
        } else if part.contains('<') || part.contains('>') {
            return Err(format!("malformed path segment '{}'", part));
        } else {
            segments.push(Segment::Literal(part.to_string()));
        }
    }

    Ok(Route {
        method,
        pattern,
        id: id.clone(),
        segments,
    })
}

/// Every route of every loaded namespace.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    tree: Arc<ActionTree>,
}

impl RouteTable {
    pub fn build(tree: Arc<ActionTree>) -> Result<Self, ConfigError> {
        let matcher = Regex::new(ROUTE_PATTERN)
            .map_err(|e| ConfigError::Settings(format!("route matcher: {}", e)))?;
        let mut routes: Vec<Route> = Vec::new();
        let mut shapes: HashMap<(String, String), ActionId> = HashMap::new();

        for action in tree.actions() {
            if action.routes.is_empty() {
                continue;
            }
            let mut valid = 0;
            for declaration in &action.routes {
                let route = match parse_route(&matcher, declaration, &action.id, &action.arguments)
                {
                    Ok(route) => route,
                    Err(reason) => {
                        warn!(
                            action = %action.id,
                            route = %declaration,
                            reason = %reason,
                            "Invalid HTTP route skipped"
                        );
                        continue;
                    }
                };
                let key = (route.method.clone(), route.shape());
                if let Some(first) = shapes.get(&key) {
                    return Err(ConfigError::DuplicateRoute {
                        method: route.method,
                        path: route.pattern,
                        first: first.clone(),
                        second: action.id.clone(),
                    });
                }
                shapes.insert(key, action.id.clone());
                routes.push(route);
                valid += 1;
            }
            if valid == 0 {
                return Err(ConfigError::NoValidRoute(action.id.clone()));
            }
        }

        debug!(routes = routes.len(), "HTTP route table built");
        Ok(Self { routes, tree })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the route for a request. The route with the most literal segments wins.
    pub fn resolve(&self, method: &str, path: &str) -> Option<(&Route, BTreeMap<String, String>)> {
        let parts = split_path(path);
        let mut best: Option<(&Route, BTreeMap<String, String>)> = None;
        for route in self.routes.iter().filter(|r| r.method == method) {
            if let Some(captured) = route.capture(&parts) {
                let better = best
                    .as_ref()
                    .map(|(current, _)| route.literal_count() > current.literal_count())
                    .unwrap_or(true);
                if better {
                    best = Some((route, captured));
                }
            }
        }
        best
    }

    /// Build the same request the CLI would have produced.
    pub fn parse(
        &self,
        method: &str,
        path: &str,
        params: &RequestParams,
    ) -> Result<ParsedRequest, ValidationError> {
        let (route, captured) =
            self.resolve(method, path)
                .ok_or_else(|| ValidationError::UnknownRoute {
                    method: method.to_string(),
                    path: path.to_string(),
                })?;
        let action = self
            .tree
            .action(&route.id)
            .ok_or_else(|| ValidationError::UnknownRoute {
                method: method.to_string(),
                path: path.to_string(),
            })?;

        let args = Arguments::collect(&action.arguments, |arg| match route.source_of(&arg.name) {
            ArgSource::Path => captured.get(&arg.name).map(|v| vec![v.clone()]),
            ArgSource::Query => param_values(params, arg),
        })?;
        let globals = Arguments::collect(self.tree.global_arguments(&route.id), |arg| {
            param_values(params, arg)
        })?;

        Ok(ParsedRequest {
            id: route.id.clone(),
            args,
            globals,
        })
    }
}

/// Empty values count as absent; switches are set unless given a false-like value.
fn param_values(params: &RequestParams, arg: &ArgumentSpec) -> Option<Vec<String>> {
    let values = params.get(&arg.name)?;
    if let Cardinality::Flag(_) = arg.cardinality {
        let off = values
            .last()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off"))
            .unwrap_or(false);
        return if off { None } else { Some(Vec::new()) };
    }
    let values: Vec<String> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
