//! Link and title extraction for HTML pages.
//!
//! Anchors are matched with a regex, not parsed. Links inside scripts or
//! comments are picked up too.

use std::collections::HashSet;
use std::sync::LazyLock;

use crawlgrid_core::{Payload, Target};
use crawlgrid_engine::{Extraction, Extractor};
use crawlgrid_store::Entity;
use regex::Regex;
use serde_json::json;
use url::Url;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*["']([^"'#]+)"#).expect("valid regex")
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

/// Finds `<a href>` links and the page `<title>`.
///
/// Each fetched page becomes one `page` entity. Discovered links are
/// resolved against the page URL; with [`same_host`](Self::same_host) only
/// links on the allowed hosts are followed.
#[derive(Debug, Clone, Default)]
pub struct LinkExtractor {
    allowed_hosts: Option<HashSet<String>>,
}

impl LinkExtractor {
    /// Follow every http(s) link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow only links whose host matches one of the `seeds`.
    pub fn same_host(seeds: &[Target]) -> Self {
        let hosts = seeds.iter().filter_map(|s| host_of(s)).collect();
        Self {
            allowed_hosts: Some(hosts),
        }
    }

    fn allows(&self, target: &str) -> bool {
        match (&self.allowed_hosts, host_of(target)) {
            (None, Some(_)) => true,
            (Some(hosts), Some(host)) => hosts.contains(&host),
            (_, None) => false,
        }
    }
}

impl Extractor for LinkExtractor {
    fn extract(&self, target: &Target, payload: &Payload) -> Extraction {
        let mut seen = HashSet::new();
        let links: Vec<Target> = HREF_RE
            .captures_iter(&payload.body)
            .filter_map(|caps| resolve(target, caps[1].trim()))
            .filter(|link| self.allows(link))
            .filter(|link| seen.insert(link.clone()))
            .collect();

        let title = TITLE_RE
            .captures(&payload.body)
            .map(|caps| collapse_whitespace(&caps[1]))
            .filter(|t| !t.is_empty());

        let page = Entity::new(
            "page",
            target.clone(),
            json!({
                "url": target,
                "title": title,
                "links": links.len(),
            }),
        );

        Extraction::new(links, vec![page])
    }
}

/// Lowercased `host[:port]` of an http(s) URL. Default ports are omitted.
pub fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !is_web(&url) {
        return None;
    }
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Resolve `href` against the page at `base`, dropping any fragment.
/// Returns `None` for non-http(s) schemes such as `mailto:` or `javascript:`.
pub fn resolve(base: &str, href: &str) -> Option<Target> {
    let mut url = Url::parse(base).ok()?.join(href).ok()?;
    if !is_web(&url) {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><head><title>
            Garden   Tools
        </title></head>
        <body>
          <a href="/category/rakes">Rakes</a>
          <a class="x" href='spades?page=2'>Spades</a>
          <a href="https://shop.test/category/rakes#reviews">Rakes again</a>
          <a href="//cdn.shop.test/static/catalog.html">Catalog</a>
          <a href="https://elsewhere.test/">Partner</a>
          <a href="mailto:help@shop.test">Mail</a>
          <a href="#top">Top</a>
          <link href="/style.css">
        </body></html>
    "##;

    fn page_url() -> Target {
        "https://shop.test/category/tools".to_string()
    }

    #[test]
    fn resolves_links_in_page_order_without_duplicates() {
        let extraction = LinkExtractor::new().extract(&page_url(), &Payload::new(PAGE));

        assert_eq!(
            extraction.discovered,
            vec![
                "https://shop.test/category/rakes",
                "https://shop.test/category/spades?page=2",
                "https://cdn.shop.test/static/catalog.html",
                "https://elsewhere.test/",
            ]
        );
    }

    #[test]
    fn same_host_drops_foreign_links() {
        let extractor = LinkExtractor::same_host(&["https://Shop.test/".to_string()]);
        let extraction = extractor.extract(&page_url(), &Payload::new(PAGE));

        assert_eq!(
            extraction.discovered,
            vec![
                "https://shop.test/category/rakes",
                "https://shop.test/category/spades?page=2",
            ]
        );
    }

    #[test]
    fn emits_one_page_entity_with_title() {
        let extraction = LinkExtractor::new().extract(&page_url(), &Payload::new(PAGE));

        assert_eq!(extraction.entities.len(), 1);
        let page = &extraction.entities[0];
        assert_eq!(page.kind, "page");
        assert_eq!(page.source, page_url());
        assert_eq!(page.data["title"], "Garden Tools");
        assert_eq!(page.data["links"], 4);
    }

    #[test]
    fn page_without_title_or_links() {
        let extraction = LinkExtractor::new().extract(&page_url(), &Payload::new("plain text"));

        assert!(extraction.discovered.is_empty());
        assert!(extraction.entities[0].data["title"].is_null());
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(
            resolve("https://a.test/x/y.html", "z.html").as_deref(),
            Some("https://a.test/x/z.html")
        );
        assert_eq!(
            resolve("https://a.test", "z.html").as_deref(),
            Some("https://a.test/z.html")
        );
        assert_eq!(
            resolve("https://a.test/x/?q=1/2", "z").as_deref(),
            Some("https://a.test/x/z")
        );
        assert_eq!(
            resolve("https://a.test/shop/tools", "./rakes").as_deref(),
            Some("https://a.test/shop/rakes")
        );
        assert_eq!(
            resolve("https://a.test/shop/tools", "../about").as_deref(),
            Some("https://a.test/about")
        );
        assert_eq!(
            resolve("https://a.test/shop/tools", "?page=2").as_deref(),
            Some("https://a.test/shop/tools?page=2")
        );
        assert_eq!(
            resolve("https://a.test/shop/tools", "rakes#reviews").as_deref(),
            Some("https://a.test/shop/rakes")
        );
        assert_eq!(resolve("https://a.test/", "javascript:void(0)"), None);
        assert_eq!(resolve("https://a.test/", "ftp://files.test/a"), None);
    }

    #[test]
    fn equivalent_spellings_are_discovered_once() {
        let body = r#"<a href="rakes">1</a> <a href="./rakes">2</a>
                      <a href="/category/x/../rakes">3</a>"#;
        let extraction = LinkExtractor::new().extract(&page_url(), &Payload::new(body));

        assert_eq!(extraction.discovered, vec!["https://shop.test/category/rakes"]);
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://A.test:8443/x").as_deref(), Some("a.test:8443"));
        assert_eq!(host_of("https://a.test:443/x").as_deref(), Some("a.test"));
        assert_eq!(host_of("http://user@a.test?x").as_deref(), Some("a.test"));
        assert_eq!(host_of("ftp://a.test/"), None);
        assert_eq!(host_of("not a url"), None);
    }
}
