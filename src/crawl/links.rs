use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const PROFILE_SEGMENT: &str = "/doctor/";

/// Profile links on a listing page, in document order.
///
/// - Resolves relative hrefs against `base`
/// - Keeps only paths containing `/doctor/` on the base host
/// - Drops query and fragment so one profile has one URL
/// - Deduplicates within the page
pub fn profile_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&ANCHOR_SEL) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() || !resolved.path().contains(PROFILE_SEGMENT) {
            continue;
        }
        resolved.set_query(None);
        resolved.set_fragment(None);

        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}
