use std::sync::LazyLock;

use regex::Regex;

use crate::model::Coordinate;

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static YEARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*\+?\s*(?:years?|yrs?)").unwrap());

// Map link coordinate forms, tried in order.
static PLACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"maps/place/(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?)").unwrap());
static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&](?:q|query|ll|center)=(-?\d+(?:\.\d+)?)(?:,|%2C)\s*(-?\d+(?:\.\d+)?)")
        .unwrap()
});
static AT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)").unwrap());

/// Thousands separators and currency marks are dropped before matching.
fn strip_separators(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ',' | '₹' | '$'))
        .collect()
}

/// First decimal number in the text ("96%" → 96.0, "4.5 / 5" → 4.5).
pub fn parse_rating(text: &str) -> Option<f64> {
    let cleaned = strip_separators(text);
    DECIMAL_RE.find(&cleaned)?.as_str().parse().ok()
}

/// First integer in the text ("(1,234 votes)" → 1234).
pub fn parse_count(text: &str) -> Option<u32> {
    let cleaned = strip_separators(text);
    INTEGER_RE.find(&cleaned)?.as_str().parse().ok()
}

/// Fee amount in whole currency units ("₹ 1,000" → 1000).
pub fn parse_fee(text: &str) -> Option<u32> {
    let cleaned: String = strip_separators(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    INTEGER_RE.find(&cleaned)?.as_str().parse().ok()
}

/// Years of experience as "<n> years" when a year count is present.
pub fn normalize_experience(text: &str) -> Option<String> {
    let caps = YEARS_RE.captures(text)?;
    let years: u32 = caps[1].parse().ok()?;
    Some(format!("{years} years"))
}

/// Recover a latitude/longitude pair from a map URL.
pub fn coordinate_from_map_link(link: &str) -> Option<Coordinate> {
    [&*PLACE_RE, &*QUERY_RE, &*AT_RE].iter().find_map(|re| {
        let caps = re.captures(link)?;
        let lat = caps[1].parse().ok()?;
        let lon = caps[2].parse().ok()?;
        Coordinate::new(lat, lon)
    })
}

/// Canonical map-search link for a coordinate.
pub fn map_search_link(coord: Coordinate) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        coord.lat, coord.lon
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_takes_first_number() {
        assert_eq!(parse_rating("96%"), Some(96.0));
        assert_eq!(parse_rating("4.5 / 5"), Some(4.5));
        assert_eq!(parse_rating("no rating"), None);
    }

    #[test]
    fn counts_ignore_separators() {
        assert_eq!(parse_count("(1,234 patient votes)"), Some(1234));
        assert_eq!(parse_count("votes"), None);
        assert_eq!(parse_count("99999999999 votes"), None);
    }

    #[test]
    fn fees_strip_currency() {
        assert_eq!(parse_fee("₹ 1,000"), Some(1000));
        assert_eq!(parse_fee("₹500 Consultation fee at clinic"), Some(500));
        assert_eq!(parse_fee("Free?"), None);
    }

    #[test]
    fn experience_normalizes() {
        assert_eq!(
            normalize_experience("12 Years Experience Overall"),
            Some("12 years".to_string())
        );
        assert_eq!(normalize_experience("10+ yrs"), Some("10 years".to_string()));
        assert_eq!(normalize_experience("Experience"), None);
    }

    #[test]
    fn coordinates_from_link_forms() {
        let c = coordinate_from_map_link("http://www.google.com/maps/place/12.9759,77.6549").unwrap();
        assert_eq!((c.lat, c.lon), (12.9759, 77.6549));

        let c = coordinate_from_map_link("https://maps.google.com/?q=12.93,77.61&z=15").unwrap();
        assert_eq!((c.lat, c.lon), (12.93, 77.61));

        let c = coordinate_from_map_link("https://www.google.com/maps/@19.0596,72.8295,15z").unwrap();
        assert_eq!((c.lat, c.lon), (19.0596, 72.8295));

        assert!(coordinate_from_map_link("https://www.google.com/maps/search/Dr+A+Bangalore").is_none());
        assert!(coordinate_from_map_link("https://maps.google.com/?q=120.0,77.0").is_none());
    }

    #[test]
    fn search_link_round_trips_through_parser() {
        let c = Coordinate::new(12.9352, 77.6146).unwrap();
        let link = map_search_link(c);
        assert_eq!(coordinate_from_map_link(&link), Some(c));
    }
}
