//! Endpoint path matching

/// How the request path is compared with the configured endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathMatch {
    /// Path must equal the endpoint
    #[default]
    Exact,
    /// Path must start with the endpoint; no segment boundary is required,
    /// so `/test` also matches `/testabc`
    Prefix,
}

/// Path component of a request target, without query or fragment.
///
/// Absolute-form targets (`http://host/path`) are reduced to their path.
pub fn request_path(uri: &str) -> &str {
    let end = uri.find(|c: char| c == '?' || c == '#').unwrap_or(uri.len());
    let target = &uri[..end];
    match target.find("://") {
        Some(scheme_end) => {
            let rest = &target[scheme_end + 3..];
            rest.find('/').map_or("/", |path_start| &rest[path_start..])
        }
        None => target,
    }
}

/// Whether `uri` addresses the endpoint at `path` under `mode`
pub fn path_matches(uri: &str, path: &str, mode: PathMatch) -> bool {
    let requested = request_path(uri);
    match mode {
        PathMatch::Exact => requested == path,
        PathMatch::Prefix => requested.starts_with(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact() {
        assert!(path_matches("/test", "/test", PathMatch::Exact));
        assert!(path_matches("/test?q=v", "/test", PathMatch::Exact));
        assert!(path_matches("/test#frag", "/test", PathMatch::Exact));
        assert!(!path_matches("/testabc", "/test", PathMatch::Exact));
        assert!(!path_matches("/", "/test", PathMatch::Exact));
    }

    #[test]
    fn test_prefix() {
        assert!(path_matches("/test", "/test", PathMatch::Prefix));
        assert!(path_matches("/test?q=v", "/test", PathMatch::Prefix));
        assert!(path_matches("/testabc", "/test", PathMatch::Prefix));
        assert!(!path_matches("/", "/test", PathMatch::Prefix));
    }

    #[test]
    fn test_root_prefix() {
        assert!(path_matches("/", "/", PathMatch::Prefix));
        assert!(path_matches("/test", "/", PathMatch::Prefix));
        assert!(path_matches("/?q=v", "/", PathMatch::Prefix));
    }

    #[test]
    fn test_absolute_form() {
        assert_eq!(request_path("ws://example.com/chat?x=1"), "/chat");
        assert_eq!(request_path("http://example.com"), "/");
        assert!(path_matches("http://test/test", "/test", PathMatch::Exact));
    }

    proptest! {
        #[test]
        fn exact_match_implies_prefix_match(path in "/[a-z]{0,8}", query in "[a-z=&]{0,8}") {
            let uri = format!("{}?{}", path, query);
            if path_matches(&uri, &path, PathMatch::Exact) {
                prop_assert!(path_matches(&uri, &path, PathMatch::Prefix));
            }
            prop_assert!(path_matches(&uri, &path, PathMatch::Exact));
        }

        #[test]
        fn query_never_affects_the_decision(path in "/[a-z]{1,6}", tail in "[a-z]{0,4}", query in "[a-z=]{0,6}") {
            let bare = format!("{}{}", path, tail);
            let with_query = format!("{}?{}", bare, query);
            prop_assert_eq!(
                path_matches(&bare, &path, PathMatch::Prefix),
                path_matches(&with_query, &path, PathMatch::Prefix)
            );
            prop_assert_eq!(
                path_matches(&bare, &path, PathMatch::Exact),
                path_matches(&with_query, &path, PathMatch::Exact)
            );
        }
    }
}
