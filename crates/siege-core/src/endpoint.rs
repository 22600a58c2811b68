//! Path normalization and endpoint identity.
//!
//! Two URLs that differ only in numeric or UUID-shaped segments describe the
//! same endpoint; normalization replaces those segments with `{argN}`
//! placeholders so metrics and schemas bucket together.

use std::fmt;

use uuid::Uuid;

/// The type observed for a substituted path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Uuid,
}

/// A path parameter introduced by normalization, in segment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParam {
    pub name: String,
    pub kind: ParamKind,
}

/// A normalized request path plus the parameters it introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    pub path: String,
    pub params: Vec<PathParam>,
}

/// Replace integer and UUID-shaped segments with `{argN}` placeholders.
pub fn normalize_path(path: &str) -> NormalizedPath {
    let mut params = Vec::new();
    let mut parts = Vec::new();

    for segment in path.split('/') {
        if segment.parse::<i64>().is_ok() {
            let name = format!("arg{}", params.len() + 1);
            parts.push(format!("{{{name}}}"));
            params.push(PathParam {
                name,
                kind: ParamKind::Integer,
            });
        } else if Uuid::try_parse(segment).is_ok() {
            let name = format!("arg{}", params.len() + 1);
            parts.push(format!("{{{name}}}"));
            params.push(PathParam {
                name,
                kind: ParamKind::Uuid,
            });
        } else {
            parts.push(segment.to_string());
        }
    }

    NormalizedPath {
        path: parts.join("/"),
        params,
    }
}

/// Metric and schema bucket identity: `(normalized path, method, status)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub path: String,
    pub method: String,
    pub status: u16,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.path, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segment() {
        let n = normalize_path("/users/42");
        assert_eq!(n.path, "/users/{arg1}");
        assert_eq!(n.params.len(), 1);
        assert_eq!(n.params[0].name, "arg1");
        assert_eq!(n.params[0].kind, ParamKind::Integer);
    }

    #[test]
    fn test_uuid_segment() {
        let n = normalize_path("/users/550e8400-e29b-41d4-a716-446655440000/orders");
        assert_eq!(n.path, "/users/{arg1}/orders");
        assert_eq!(n.params.len(), 1);
        assert_eq!(n.params[0].kind, ParamKind::Uuid);
    }

    #[test]
    fn test_plain_path_unchanged() {
        let n = normalize_path("/v1/widgets");
        assert_eq!(n.path, "/v1/widgets");
        assert!(n.params.is_empty());
    }

    #[test]
    fn test_mixed_segments_number_params() {
        let n = normalize_path("/a/1/b/550e8400-e29b-41d4-a716-446655440000/c/2");
        assert_eq!(n.path, "/a/{arg1}/b/{arg2}/c/{arg3}");
        assert_eq!(n.params[0].kind, ParamKind::Integer);
        assert_eq!(n.params[1].kind, ParamKind::Uuid);
        assert_eq!(n.params[2].kind, ParamKind::Integer);
    }

    #[test]
    fn test_numeric_and_uuid_ids_share_a_path() {
        let a = normalize_path("/users/7");
        let b = normalize_path("/users/550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(a.path, b.path);
    }
}
