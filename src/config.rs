use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConfigError;

const DEFAULT_REGIONS: &[&str] = &["Bangalore", "Delhi", "Mumbai"];

const DEFAULT_CATEGORIES: &[&str] = &[
    "Cardiologist",
    "Chiropractor",
    "Dentist",
    "Dermatologist",
    "Dietitian/Nutritionist",
    "Gastroenterologist",
    "bariatric surgeon",
    "Gynecologist",
    "Infertility Specialist",
    "Neurologist",
    "Neurosurgeon",
    "Ophthalmologist",
    "Orthopedist",
    "Pediatrician",
    "Physiotherapist",
    "Psychiatrist",
    "Pulmonologist",
    "Rheumatologist",
    "Urologist",
];

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    Http,
    Spider,
}

/// Everything a crawl run needs. Missing keys in a config file fall back to
/// the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub regions: Vec<String>,
    pub categories: Vec<String>,
    /// Base used to resolve relative profile links.
    pub site_base: String,
    pub listing_template: String,
    pub alternate_template: Option<String>,
    pub max_pages: u32,
    pub max_consecutive_empty_pages: u32,
    pub concurrency: usize,
    pub politeness_interval_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_resolve_radius_km: f64,
    pub gazetteer_path: Option<PathBuf>,
    pub db_path: PathBuf,
    pub backend: FetchBackend,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            regions: DEFAULT_REGIONS.iter().map(|s| s.to_string()).collect(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            site_base: "https://www.practo.com".into(),
            listing_template: "https://www.practo.com/{region}/{category}?page={page}".into(),
            alternate_template: Some(
                "https://www.practo.com/search/doctors?results_type=doctor\
                 &q={category}&city={region}&page={page}"
                    .into(),
            ),
            max_pages: 20,
            max_consecutive_empty_pages: 2,
            concurrency: 4,
            politeness_interval_ms: 2000,
            max_retries: 3,
            base_backoff_ms: 2000,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.into(),
            max_resolve_radius_km: 5.0,
            gazetteer_path: None,
            db_path: PathBuf::from("data/doctors.sqlite"),
            backend: FetchBackend::Http,
        }
    }
}

impl CrawlConfig {
    /// Load from a JSON file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_json(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            what: "crawl config",
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".into()));
        }
        if self.max_consecutive_empty_pages == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_empty_pages must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        for template in std::iter::once(&self.listing_template).chain(&self.alternate_template) {
            if !template.contains("{page}") {
                return Err(ConfigError::Invalid(format!(
                    "listing template lacks {{page}}: {template}"
                )));
            }
        }
        if !(self.max_resolve_radius_km > 0.0) {
            return Err(ConfigError::Invalid(
                "max_resolve_radius_km must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Every (region, category) pair, regions outermost.
    pub fn targets(&self) -> Vec<(String, String)> {
        self.regions
            .iter()
            .flat_map(|r| self.categories.iter().map(move |c| (r.clone(), c.clone())))
            .collect()
    }

    pub fn politeness_interval(&self) -> Duration {
        Duration::from_millis(self.politeness_interval_ms)
    }

    pub fn retry_policy(&self) -> crate::fetch::RetryPolicy {
        crate::fetch::RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }
}

/// Fill a listing template. In the path, region and category become slugs
/// (`dietitian-nutritionist`); in the query string they are form-encoded.
pub fn render_template(template: &str, region: &str, category: &str, page: u32) -> String {
    let (path, query) = match template.find('?') {
        Some(i) => template.split_at(i),
        None => (template, ""),
    };
    let fill = |part: &str, conv: fn(&str) -> String| {
        part.replace("{region}", &conv(region))
            .replace("{category}", &conv(category))
            .replace("{page}", &page.to_string())
    };
    format!("{}{}", fill(path, slug), fill(query, encode))
}

fn slug(value: &str) -> String {
    value.trim().to_lowercase().replace([' ', '/'], "-")
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.trim().to_lowercase().as_bytes()).collect()
}
