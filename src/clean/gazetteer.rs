use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::model::Coordinate;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Distances closer than this are treated as equal; load order breaks the tie.
const TIE_TOLERANCE_KM: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GazetteerEntry {
    pub area: String,
    pub lat: f64,
    pub lon: f64,
    pub region: String,
}

/// Named-area centroids, stored once and indexed by region. Entries keep their
/// load order inside each region.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    by_region: HashMap<String, Vec<usize>>,
    max_radius_km: f64,
}

/// Built-in table used when no gazetteer file is configured.
pub static DEFAULT_GAZETTEER: LazyLock<Gazetteer> = LazyLock::new(|| {
    let entries = BUILTIN
        .iter()
        .map(|&(region, area, lat, lon)| GazetteerEntry {
            area: area.to_string(),
            lat,
            lon,
            region: region.to_string(),
        })
        .collect();
    Gazetteer::new(entries, DEFAULT_RADIUS_KM)
});

const DEFAULT_RADIUS_KM: f64 = 5.0;

const BUILTIN: &[(&str, &str, f64, f64)] = &[
    ("Bangalore", "Koramangala", 12.9352, 77.6245),
    ("Bangalore", "Indiranagar", 12.9719, 77.6412),
    ("Bangalore", "Jayanagar", 12.9308, 77.5838),
    ("Bangalore", "JP Nagar", 12.9063, 77.5857),
    ("Bangalore", "BTM Layout", 12.9166, 77.6101),
    ("Bangalore", "HSR Layout", 12.9116, 77.6389),
    ("Bangalore", "Whitefield", 12.9698, 77.7500),
    ("Bangalore", "Marathahalli", 12.9569, 77.7011),
    ("Bangalore", "Electronic City", 12.8452, 77.6602),
    ("Bangalore", "Malleshwaram", 13.0035, 77.5710),
    ("Bangalore", "Rajajinagar", 12.9915, 77.5530),
    ("Bangalore", "Basavanagudi", 12.9422, 77.5760),
    ("Bangalore", "Hebbal", 13.0358, 77.5970),
    ("Bangalore", "Yeshwanthpur", 13.0280, 77.5409),
    ("Bangalore", "Yelahanka", 13.1007, 77.5963),
    ("Bangalore", "Banaswadi", 13.0104, 77.6482),
    ("Bangalore", "Domlur", 12.9610, 77.6387),
    ("Bangalore", "Frazer Town", 12.9986, 77.6150),
    ("Bangalore", "MG Road", 12.9756, 77.6050),
    ("Bangalore", "Bellandur", 12.9304, 77.6784),
    ("Bangalore", "Sarjapur Road", 12.9100, 77.6870),
    ("Bangalore", "Vijayanagar", 12.9719, 77.5332),
    ("Bangalore", "Kengeri", 12.9141, 77.4836),
    ("Bangalore", "Bannerghatta Road", 12.8876, 77.5970),
    ("Delhi", "Connaught Place", 28.6315, 77.2167),
    ("Delhi", "Karol Bagh", 28.6519, 77.1909),
    ("Delhi", "Lajpat Nagar", 28.5677, 77.2433),
    ("Delhi", "Saket", 28.5245, 77.2066),
    ("Delhi", "Dwarka", 28.5921, 77.0460),
    ("Delhi", "Rohini", 28.7495, 77.0565),
    ("Delhi", "Janakpuri", 28.6219, 77.0878),
    ("Mumbai", "Andheri", 19.1136, 72.8697),
    ("Mumbai", "Bandra", 19.0596, 72.8295),
    ("Mumbai", "Colaba", 18.9067, 72.8147),
    ("Mumbai", "Dadar", 19.0178, 72.8478),
    ("Mumbai", "Powai", 19.1176, 72.9060),
    ("Mumbai", "Borivali", 19.2307, 72.8567),
    ("Mumbai", "Chembur", 19.0522, 72.9005),
];

impl Gazetteer {
    pub fn new(entries: Vec<GazetteerEntry>, max_radius_km: f64) -> Self {
        let mut by_region: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            by_region.entry(region_key(&e.region)).or_default().push(i);
        }
        Self {
            entries,
            by_region,
            max_radius_km,
        }
    }

    /// Load a JSON array of `{area, lat, lon, region}` objects.
    pub fn from_json(text: &str, max_radius_km: f64) -> Result<Self, ConfigError> {
        let entries: Vec<GazetteerEntry> =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                what: "gazetteer",
                source,
            })?;
        if let Some(bad) = entries
            .iter()
            .find(|e| e.area.trim().is_empty() || Coordinate::new(e.lat, e.lon).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "gazetteer entry {:?} in {} has an empty name or invalid centroid",
                bad.area, bad.region
            )));
        }
        Ok(Self::new(entries, max_radius_km))
    }

    pub fn load(path: &Path, max_radius_km: f64) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, max_radius_km)
    }

    /// The built-in table with a different resolve radius.
    pub fn builtin(max_radius_km: f64) -> Self {
        Self {
            max_radius_km,
            ..DEFAULT_GAZETTEER.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest area name for the coordinate within the region, or the region
    /// name itself when nothing lies within the radius.
    pub fn resolve(&self, coord: Coordinate, region: &str) -> String {
        self.nearest(coord, region)
            .filter(|(_, dist)| *dist <= self.max_radius_km)
            .map(|(entry, _)| entry.area.clone())
            .unwrap_or_else(|| region.to_string())
    }

    /// Nearest entry by great-circle distance. The first entry in load order
    /// wins among equidistant ones.
    pub fn nearest(&self, coord: Coordinate, region: &str) -> Option<(&GazetteerEntry, f64)> {
        let mut best: Option<(&GazetteerEntry, f64)> = None;
        for &i in self.by_region.get(&region_key(region))? {
            let entry = &self.entries[i];
            let dist = haversine_km(coord.lat, coord.lon, entry.lat, entry.lon);
            match best {
                Some((_, best_dist)) if dist >= best_dist - TIE_TOLERANCE_KM => {}
                _ => best = Some((entry, dist)),
            }
        }
        best
    }
}

fn region_key(region: &str) -> String {
    region.trim().to_lowercase()
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
