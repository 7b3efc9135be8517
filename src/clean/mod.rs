pub mod garbage;
pub mod gazetteer;

use crate::extract::numeric::{coordinate_from_map_link, normalize_experience};
use crate::model::{CleanedRecord, Coordinate, OutputRow, RawRecord};
use gazetteer::Gazetteer;

/// Collapse internal whitespace and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Final location for a record: the validated text if any, otherwise the
/// gazetteer area for the coordinate, otherwise empty.
pub fn resolve_location(
    location: &str,
    coordinate: Option<Coordinate>,
    region: &str,
    gazetteer: &Gazetteer,
) -> String {
    let cleaned = garbage::clean_location(&normalize_text(location));
    if !cleaned.is_empty() {
        return cleaned;
    }
    coordinate
        .map(|c| gazetteer.resolve(c, region))
        .unwrap_or_default()
}

/// Normalized experience. When none was captured, a years figure inside the
/// credentials text (`"BDS, 12 Years Experience"`) stands in.
fn clean_experience(text: &str, credentials: &str) -> String {
    let text = normalize_text(text);
    if text.is_empty() {
        return normalize_experience(credentials).unwrap_or_default();
    }
    normalize_experience(&text).unwrap_or(text)
}

/// The cleaning stage applied to freshly extracted records.
pub fn clean_record(raw: RawRecord, region: &str, gazetteer: &Gazetteer) -> CleanedRecord {
    let text = |v: Option<String>| v.as_deref().map(normalize_text).unwrap_or_default();
    let location = resolve_location(
        raw.location.as_deref().unwrap_or(""),
        raw.coordinate,
        region,
        gazetteer,
    );

    CleanedRecord {
        name: text(raw.name),
        category: text(raw.category),
        credentials: text(raw.credentials.clone()),
        experience: clean_experience(
            raw.experience.as_deref().unwrap_or(""),
            raw.credentials.as_deref().unwrap_or(""),
        ),
        location,
        region: region.to_string(),
        rating: raw.rating,
        vote_count: raw.vote_count,
        fee: raw.fee,
        profile_url: raw.profile_url,
        map_link: raw.map_link.unwrap_or_default(),
        scraped_at: raw.scraped_at,
    }
}

/// The same policy over an already persisted row. The coordinate comes back
/// out of the stored map link. Running this twice changes nothing the second
/// time.
pub fn clean_row(row: &OutputRow, gazetteer: &Gazetteer) -> OutputRow {
    let coordinate = coordinate_from_map_link(&row.map_link);
    OutputRow {
        name: normalize_text(&row.name),
        category: normalize_text(&row.category),
        credentials: normalize_text(&row.credentials),
        experience: clean_experience(&row.experience, &row.credentials),
        location: resolve_location(&row.location, coordinate, &row.region, gazetteer),
        ..row.clone()
    }
}
