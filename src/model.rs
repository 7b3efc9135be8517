use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// `None` when the pair is outside valid latitude/longitude ranges.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0 {
            Some(Self { lat, lon })
        } else {
            None
        }
    }
}

/// One profile page as extracted. Only `profile_url` is guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub profile_url: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub credentials: Option<String>,
    pub experience: Option<String>,
    pub location: Option<String>,
    pub rating: Option<f64>,
    pub vote_count: Option<u32>,
    pub fee: Option<u32>,
    pub map_link: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub scraped_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn empty(profile_url: &str) -> Self {
        Self {
            profile_url: profile_url.to_string(),
            name: None,
            category: None,
            credentials: None,
            experience: None,
            location: None,
            rating: None,
            vote_count: None,
            fee: None,
            map_link: None,
            coordinate: None,
            scraped_at: Utc::now(),
        }
    }
}

/// A record after the cleaning stage. `location` is a validated string, a
/// gazetteer area name, or empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub name: String,
    pub category: String,
    pub credentials: String,
    pub experience: String,
    pub location: String,
    pub region: String,
    pub rating: Option<f64>,
    pub vote_count: Option<u32>,
    pub fee: Option<u32>,
    pub profile_url: String,
    pub map_link: String,
    pub scraped_at: DateTime<Utc>,
}

impl CleanedRecord {
    /// Number of populated fields. Region and profile URL are always set, so
    /// they shift every record equally and are left out.
    pub fn filled_fields(&self) -> usize {
        let texts = [
            &self.name,
            &self.category,
            &self.credentials,
            &self.experience,
            &self.location,
            &self.map_link,
        ];
        texts.iter().filter(|s| !s.is_empty()).count()
            + usize::from(self.rating.is_some())
            + usize::from(self.vote_count.is_some())
            + usize::from(self.fee.is_some())
    }

    pub fn to_row(&self) -> OutputRow {
        OutputRow {
            name: self.name.clone(),
            category: self.category.clone(),
            credentials: self.credentials.clone(),
            experience: self.experience.clone(),
            location: self.location.clone(),
            region: self.region.clone(),
            rating: self.rating.map(|r| r.to_string()).unwrap_or_default(),
            vote_count: self.vote_count.map(|v| v.to_string()).unwrap_or_default(),
            fee: self.fee.map(|f| f.to_string()).unwrap_or_default(),
            profile_url: self.profile_url.clone(),
            map_link: self.map_link.clone(),
            scraped_at: self.scraped_at.to_rfc3339(),
        }
    }
}

/// Persisted shape, in the fixed column order downstream consumers expect.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OutputRow {
    pub name: String,
    pub category: String,
    pub credentials: String,
    pub experience: String,
    pub location: String,
    pub region: String,
    pub rating: String,
    pub vote_count: String,
    pub fee: String,
    pub profile_url: String,
    pub map_link: String,
    pub scraped_at: String,
}

impl OutputRow {
    pub const COLUMNS: [&'static str; 12] = [
        "name",
        "category",
        "degree",
        "experience",
        "location",
        "region",
        "rating",
        "vote_count",
        "fee",
        "profile_url",
        "map_link",
        "scraped_at",
    ];

    /// Same count as [`CleanedRecord::filled_fields`], over stored text.
    pub fn filled_fields(&self) -> usize {
        [
            &self.name,
            &self.category,
            &self.credentials,
            &self.experience,
            &self.location,
            &self.map_link,
            &self.rating,
            &self.vote_count,
            &self.fee,
        ]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .count()
    }

    pub fn fields(&self) -> [&str; 12] {
        [
            self.name.as_str(),
            self.category.as_str(),
            self.credentials.as_str(),
            self.experience.as_str(),
            self.location.as_str(),
            self.region.as_str(),
            self.rating.as_str(),
            self.vote_count.as_str(),
            self.fee.as_str(),
            self.profile_url.as_str(),
            self.map_link.as_str(),
            self.scraped_at.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(12.9, 77.6).is_some());
        assert!(Coordinate::new(91.0, 77.6).is_none());
        assert!(Coordinate::new(12.9, -181.0).is_none());
        assert!(Coordinate::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn row_keeps_column_order() {
        let rec = CleanedRecord {
            name: "Dr. A".into(),
            category: "Dentist".into(),
            credentials: "BDS".into(),
            experience: "5 years".into(),
            location: "Koramangala".into(),
            region: "Bangalore".into(),
            rating: Some(96.0),
            vote_count: Some(120),
            fee: None,
            profile_url: "https://example.test/doctor/a".into(),
            map_link: String::new(),
            scraped_at: Utc::now(),
        };
        let row = rec.to_row();
        let fields = row.fields();
        assert_eq!(fields[0], "Dr. A");
        assert_eq!(fields[5], "Bangalore");
        assert_eq!(fields[6], "96");
        assert_eq!(fields[8], "");
        assert_eq!(fields[9], "https://example.test/doctor/a");
        assert_eq!(rec.filled_fields(), 7);
        assert_eq!(row.filled_fields(), 7);
    }
}
