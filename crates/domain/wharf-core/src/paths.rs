pub struct SitePath;

impl SitePath {
    /// Standardize directory separators to forward slashes.
    /// This is the wire format for cache keys and populate payloads.
    pub fn normalize(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// Reject paths that could escape the content root.
    pub fn verify_safe(rel_path: &str) -> bool {
        let p = std::path::Path::new(rel_path);
        // Must not contain ".." and must be relative
        !p.is_absolute()
            && !p
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }

    /// Key under which a file appears in a populate payload: the normalized
    /// relative path with a single leading slash.
    pub fn wire_key(rel_path: &str) -> String {
        format!("/{}", Self::normalize(rel_path).trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_flips_backslashes() {
        assert_eq!(SitePath::normalize("assets\\img\\logo.png"), "assets/img/logo.png");
        assert_eq!(SitePath::normalize("index.html"), "index.html");
    }

    #[test]
    fn safe_paths_stay_inside_the_root() {
        assert!(SitePath::verify_safe("index.html"));
        assert!(SitePath::verify_safe("a/b/c.txt"));
        assert!(!SitePath::verify_safe("../escape.txt"));
        assert!(!SitePath::verify_safe("a/../../escape.txt"));
        assert!(!SitePath::verify_safe("/etc/passwd"));
    }

    #[test]
    fn wire_key_has_exactly_one_leading_slash() {
        assert_eq!(SitePath::wire_key("index.html"), "/index.html");
        assert_eq!(SitePath::wire_key("/index.html"), "/index.html");
        assert_eq!(SitePath::wire_key("css\\site.css"), "/css/site.css");
    }
}
