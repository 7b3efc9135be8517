use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::numeric::{coordinate_from_map_link, map_search_link};
use crate::model::Coordinate;

static JSON_LD_COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""latitude"\s*:\s*"?(-?\d+(?:\.\d+)?)"?\s*,\s*"longitude"\s*:\s*"?(-?\d+(?:\.\d+)?)"?"#,
    )
    .unwrap()
});
static DATA_COORD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-lat][data-lng]").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
static MAP_URL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], iframe[src], [data-src], [data-href]").unwrap());

/// A parsed profile page. Parsing happens once; every strategy reads the same
/// document.
pub struct ProfilePage {
    pub url: String,
    pub document: Html,
}

impl ProfilePage {
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Html::parse_document(html),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Structural,
    Heuristic,
    CoordinateEmbedded,
}

/// One way of locating a field. `None` is a miss, never an error.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn try_extract(&self, page: &ProfilePage) -> Option<String>;
}

/// Parse a selector from a constant. Only called with literals.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A precise locator: the first matching element with non-empty content.
pub struct Structural {
    selector: Selector,
    attr: Option<&'static str>,
}

impl Structural {
    pub fn text(css: &str) -> Self {
        Self {
            selector: selector(css),
            attr: None,
        }
    }

    pub fn attr(css: &str, attr: &'static str) -> Self {
        Self {
            selector: selector(css),
            attr: Some(attr),
        }
    }
}

impl Strategy for Structural {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }

    fn try_extract(&self, page: &ProfilePage) -> Option<String> {
        page.document.select(&self.selector).find_map(|el| {
            let value = match self.attr {
                Some(a) => el.value().attr(a)?.trim().to_string(),
                None => element_text(el),
            };
            (!value.is_empty()).then_some(value)
        })
    }
}

/// A broad scan: the first element in scope whose text matches the pattern,
/// stays within the length bound and is not rejected.
pub struct Heuristic {
    scope: Selector,
    pattern: Regex,
    max_len: usize,
    reject: Option<fn(&str) -> bool>,
}

impl Heuristic {
    pub fn new(scope: &str, pattern: &str, max_len: usize) -> Self {
        Self {
            scope: selector(scope),
            pattern: Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid pattern {pattern:?}: {e}")),
            max_len,
            reject: None,
        }
    }

    pub fn rejecting(mut self, reject: fn(&str) -> bool) -> Self {
        self.reject = Some(reject);
        self
    }
}

impl Strategy for Heuristic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    fn try_extract(&self, page: &ProfilePage) -> Option<String> {
        page.document.select(&self.scope).find_map(|el| {
            let text = element_text(el);
            let fits = !text.is_empty()
                && text.chars().count() <= self.max_len
                && self.pattern.is_match(&text)
                && !self.reject.is_some_and(|r| r(&text));
            fits.then_some(text)
        })
    }
}

/// Looks for a latitude/longitude pair in data attributes, JSON-LD scripts
/// and map URLs, and returns a map-search link for it.
pub struct CoordinateEmbedded;

impl CoordinateEmbedded {
    pub fn find(document: &Html) -> Option<Coordinate> {
        let from_attrs = document.select(&DATA_COORD_SEL).find_map(|el| {
            let lat = el.value().attr("data-lat")?.trim().parse().ok()?;
            let lon = el.value().attr("data-lng")?.trim().parse().ok()?;
            Coordinate::new(lat, lon)
        });

        let from_scripts = || {
            document.select(&SCRIPT_SEL).find_map(|el| {
                let body: String = el.text().collect();
                let caps = JSON_LD_COORD_RE.captures(&body)?;
                Coordinate::new(caps[1].parse().ok()?, caps[2].parse().ok()?)
            })
        };

        let from_urls = || {
            document.select(&MAP_URL_SEL).find_map(|el| {
                ["href", "src", "data-src", "data-href"]
                    .iter()
                    .filter_map(|a| el.value().attr(a))
                    .find_map(coordinate_from_map_link)
            })
        };

        from_attrs.or_else(from_scripts).or_else(from_urls)
    }
}

impl Strategy for CoordinateEmbedded {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CoordinateEmbedded
    }

    fn try_extract(&self, page: &ProfilePage) -> Option<String> {
        Self::find(&page.document).map(map_search_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> ProfilePage {
        ProfilePage::parse("https://example.test/doctor/x", html)
    }

    #[test]
    fn structural_skips_empty_matches() {
        let p = page("<h1 class='t'>  </h1><h1 class='t'>Dr.   Asha\n Rao</h1>");
        assert_eq!(
            Structural::text("h1.t").try_extract(&p).as_deref(),
            Some("Dr. Asha Rao")
        );
    }

    #[test]
    fn structural_reads_attributes() {
        let p = page("<iframe src='https://www.google.com/maps/place/12.9,77.6'></iframe>");
        assert_eq!(
            Structural::attr("iframe[src*='google.com/maps']", "src")
                .try_extract(&p)
                .as_deref(),
            Some("https://www.google.com/maps/place/12.9,77.6")
        );
    }

    #[test]
    fn heuristic_respects_length_bound_and_reject() {
        let long = format!("<p>{} 12 years</p>", "word ".repeat(40));
        let html = format!("{long}<p>a,abbr,b 3 years</p><p>8 years experience</p>");
        let p = page(&html);
        let h = Heuristic::new("p", r"(?i)\d+\s*years", 60)
            .rejecting(|t| t.contains(','));
        assert_eq!(h.try_extract(&p).as_deref(), Some("8 years experience"));
    }

    #[test]
    fn coordinates_from_data_attributes() {
        let p = page("<div data-lat='12.9352' data-lng='77.6146'></div>");
        let link = CoordinateEmbedded.try_extract(&p).unwrap();
        assert!(link.contains("query=12.9352,77.6146"));
    }

    #[test]
    fn coordinates_from_json_ld() {
        let p = page(
            r#"<script type="application/ld+json">{"geo": {"@type": "GeoCoordinates",
               "latitude": "28.5245", "longitude": "77.2066"}}</script>"#,
        );
        let c = CoordinateEmbedded::find(&p.document).unwrap();
        assert_eq!((c.lat, c.lon), (28.5245, 77.2066));
    }

    #[test]
    fn coordinates_from_map_urls() {
        let p = page("<a href='https://maps.google.com/?q=19.0596,72.8295'>Directions</a>");
        let c = CoordinateEmbedded::find(&p.document).unwrap();
        assert_eq!((c.lat, c.lon), (19.0596, 72.8295));
    }

    #[test]
    fn no_coordinate_is_a_miss() {
        let p = page("<a href='/doctor/y'>Other</a><script>var x = 1;</script>");
        assert!(CoordinateEmbedded.try_extract(&p).is_none());
    }
}
