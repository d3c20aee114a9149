//! Resolve project and revision identity from an event's routing keys.
//!
//! Two layouts are recognised, `<prefix>` being the configured route prefix:
//!
//! - `<prefix>.<project>.<revision_hash>`
//! - `<prefix>.v2.<project>.<revision>.<push id>`
//!
//! The first matching route wins.

use crate::error::{Error, Result};
use crate::model::RouteInfo;

/// Find the first route under `prefix` and extract its identity.
///
/// # Errors
///
/// [`Error::RouteResolution`] when no route matches the prefix, or the
/// matching route carries neither a revision nor a revision hash.
pub fn resolve<S: AsRef<str>>(routes: &[S], prefix: &str) -> Result<RouteInfo> {
    let mut saw_prefix = false;

    for route in routes {
        let Some(rest) = route
            .as_ref()
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('.'))
        else {
            continue;
        };
        saw_prefix = true;

        if let Some(info) = parse(rest) {
            if info.revision.is_empty() && info.revision_hash.is_empty() {
                return Err(Error::RouteResolution(format!(
                    "route {:?} has no revision information",
                    route.as_ref()
                )));
            }
            return Ok(info);
        }
    }

    Err(Error::RouteResolution(if saw_prefix {
        format!("no well-formed route under {prefix:?}")
    } else {
        format!("no route under {prefix:?}")
    }))
}

fn parse(rest: &str) -> Option<RouteInfo> {
    let parts: Vec<&str> = rest.split('.').collect();
    match parts.as_slice() {
        ["v2", project, revision, _push_id] if !project.is_empty() => Some(RouteInfo {
            project: (*project).to_string(),
            revision: (*revision).to_string(),
            revision_hash: String::new(),
        }),
        [project, revision_hash] if !project.is_empty() && *project != "v2" => Some(RouteInfo {
            project: (*project).to_string(),
            revision: String::new(),
            revision_hash: (*revision_hash).to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_route() {
        let info = resolve(&["index.foo", "treeherder.try.abcdef"], "treeherder").unwrap();
        assert_eq!(info.project, "try");
        assert_eq!(info.revision_hash, "abcdef");
        assert!(info.revision.is_empty());
    }

    #[test]
    fn v2_route() {
        let info = resolve(&["treeherder.v2.mozilla-central.0123abcd.4411"], "treeherder").unwrap();
        assert_eq!(info.project, "mozilla-central");
        assert_eq!(info.revision, "0123abcd");
        assert!(info.revision_hash.is_empty());
    }

    #[test]
    fn prefix_must_match_whole_segment() {
        let err = resolve(&["treeherderish.try.abc"], "treeherder").unwrap_err();
        assert!(matches!(err, Error::RouteResolution(_)));
    }

    #[test]
    fn missing_revision_is_rejected() {
        let err = resolve(&["treeherder.v2.try..12"], "treeherder").unwrap_err();
        assert!(err.to_string().contains("no revision"));
    }

    #[test]
    fn no_routes() {
        let routes: [&str; 0] = [];
        assert!(resolve(&routes, "treeherder").is_err());
    }
}
