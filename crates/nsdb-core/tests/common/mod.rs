//! Shared fixtures for pipeline integration tests.

pub mod dump_server;

use std::collections::HashMap;
use std::path::Path;

pub const WIKI: &str = "enwiki";
pub const SNAPSHOT: &str = "20200401";

/// A dump with a two-line preamble and `records` single-revision pages.
pub fn dump_xml(tag: &str, records: usize) -> String {
    let mut s = String::from("<mediawiki xml:lang=\"en\">\n  <siteinfo>\n  </siteinfo>\n");
    for i in 0..records {
        s.push_str(&format!(
            "  <page>\n    <title>{}-{}</title>\n    <ns>1</ns>\n  </page>\n",
            tag, i
        ));
    }
    s.push_str("</mediawiki>\n");
    s
}

pub fn archive_name(n: usize) -> String {
    format!("{}-{}-pages-meta-history{}.xml-p1p100.7z", WIKI, SNAPSHOT, n)
}

/// Routes for an index page linking every archive plus the archives
/// themselves. `missing` archives are linked but not served.
pub fn mirror_routes(archives: &[(String, String)], missing: &[String]) -> HashMap<String, Vec<u8>> {
    let mut index = String::from("<html><body><ul>\n");
    let mut routes = HashMap::new();
    for (name, body) in archives {
        let path = format!("/{}/{}/{}", WIKI, SNAPSHOT, name);
        index.push_str(&format!("<li><a href=\"{}\">{}</a></li>\n", path, name));
        routes.insert(path, body.clone().into_bytes());
    }
    for name in missing {
        index.push_str(&format!(
            "<li><a href=\"/{}/{}/{}\">{}</a></li>\n",
            WIKI, SNAPSHOT, name, name
        ));
    }
    index.push_str("</ul></body></html>\n");
    routes.insert(format!("/{}/{}/", WIKI, SNAPSHOT), index.into_bytes());
    routes
}

/// Count record-open lines in a partition and check its framing.
pub fn well_formed_records(path: &Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    anyhow::ensure!(text.starts_with("<mediawiki"), "missing header in {}", path.display());
    anyhow::ensure!(text.ends_with("</mediawiki>\n"), "missing footer in {}", path.display());
    let opens = text.lines().filter(|l| *l == "  <page>").count();
    let closes = text.lines().filter(|l| *l == "  </page>").count();
    anyhow::ensure!(opens == closes, "split record in {}", path.display());
    Ok(opens)
}
