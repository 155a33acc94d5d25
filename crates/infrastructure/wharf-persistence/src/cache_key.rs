use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use camino::Utf8Path;
use wharf_core::paths::SitePath;

/// Stable, filesystem-safe key for a deploy target: the relative path from
/// the project root to the content root, base64-encoded with the URL-safe
/// alphabet and no padding. Two targets under one project never collide,
/// and the key never contains a path separator.
pub fn target_key(project_root: &Utf8Path, content_root: &Utf8Path) -> String {
    let rel = content_root
        .strip_prefix(project_root)
        .map(|p| p.as_str())
        .unwrap_or_else(|_| content_root.as_str());
    let rel = SitePath::normalize(if rel.is_empty() { "." } else { rel });
    URL_SAFE_NO_PAD.encode(rel.as_bytes())
}
