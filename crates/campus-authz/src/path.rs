//! Request path canonicalization used before any prefix match.
//!
//! Matching on the raw path would let `/Admin`, `/admin/`, `//admin` or
//! `/public/../admin` slip past a rule for `/admin`. Every path is folded to a
//! single canonical form first: query and fragment dropped, percent-escapes
//! decoded, backslashes treated as separators, lower-cased, dot segments
//! resolved, empty segments and the trailing slash removed.

/// Split a request target into its path and optional query.
pub fn split_query(raw: &str) -> (&str, Option<&str>) {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

/// Canonicalize a request path for policy matching.
pub fn normalize_path(raw: &str) -> String {
    let (path, _) = split_query(raw);
    let decoded = match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path.to_string(),
    };
    let lowered = decoded.replace('\\', "/").to_lowercase();

    let mut segments: Vec<&str> = Vec::new();
    for segment in lowered.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(lowered.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Segment-aware prefix test on canonical paths.
///
/// `/admin` covers `/admin` and `/admin/users` but not `/administrator`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_slashes() {
        assert_eq!(normalize_path("/Admin/Users/"), "/admin/users");
        assert_eq!(normalize_path("//admin///users"), "/admin/users");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        assert_eq!(normalize_path("/courses/../admin/users"), "/admin/users");
        assert_eq!(normalize_path("/./admin/./users"), "/admin/users");
        assert_eq!(normalize_path("/../../admin"), "/admin");
    }

    #[test]
    fn normalize_decodes_escapes_and_drops_query() {
        assert_eq!(normalize_path("/%61dmin/users?tab=1"), "/admin/users");
        assert_eq!(normalize_path("/admin%2Fusers"), "/admin/users");
        assert_eq!(normalize_path("/admin\\users#top"), "/admin/users");
    }

    #[test]
    fn split_query_keeps_query() {
        assert_eq!(split_query("/a?b=1#frag"), ("/a", Some("b=1")));
        assert_eq!(split_query("/a"), ("/a", None));
    }

    #[test]
    fn prefix_match_respects_segments() {
        assert!(path_has_prefix("/admin", "/admin"));
        assert!(path_has_prefix("/admin/users", "/admin"));
        assert!(!path_has_prefix("/administrator", "/admin"));
        assert!(path_has_prefix("/anything", "/"));
    }
}
