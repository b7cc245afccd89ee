//! Dump index page parsing.

/// Collect `href="/..."` targets that contain `pattern` and end with
/// `suffix`, in page order, without the leading slash. Duplicates (the same
/// link appearing twice on a page) are kept once.
pub fn parse_index(html: &str, pattern: &str, suffix: &str) -> Vec<String> {
    const HREF: &str = "href=\"/";
    let mut out: Vec<String> = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(HREF) {
        rest = &rest[start + HREF.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };
        let target = &rest[..end];
        rest = &rest[end..];
        if target.contains(pattern) && target.ends_with(suffix) && !out.iter().any(|t| t == target) {
            out.push(target.to_string());
        }
    }
    out
}

/// URL of the index page for one wiki snapshot.
pub fn index_page_url(root: &str, wiki: &str, snapshot: &str) -> String {
    format!(
        "{}/{}/{}/",
        root.trim_end_matches('/'),
        wiki.trim_matches('/'),
        snapshot.trim_matches('/')
    )
}
