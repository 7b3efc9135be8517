pub mod numeric;
pub mod strategy;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::clean::garbage;
use crate::model::RawRecord;
use numeric::{coordinate_from_map_link, parse_count, parse_fee, parse_rating};
use strategy::{CoordinateEmbedded, Heuristic, ProfilePage, Strategy, StrategyKind, Structural};

static DEGREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:MBBS|BDS|MDS|MD|MS|BHMS|BAMS|BUMS|DNB|DM|MCh|BPT|MPT|PhD)\b").unwrap()
});
static EXPERIENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s*\+?\s*(?:years?|yrs?)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Credentials,
    Experience,
    Location,
    Rating,
    VoteCount,
    Fee,
    MapLink,
}

/// Ordered strategies for one field. The first output that passes the
/// validator is taken; later strategies do not run.
pub struct FieldChain {
    pub field: Field,
    strategies: Vec<Box<dyn Strategy>>,
    validator: fn(&str) -> bool,
}

impl FieldChain {
    pub fn new(field: Field, validator: fn(&str) -> bool) -> Self {
        Self {
            field,
            strategies: Vec::new(),
            validator,
        }
    }

    pub fn then(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn run(&self, page: &ProfilePage) -> Option<String> {
        self.strategies.iter().enumerate().find_map(|(i, s)| {
            let value = s.try_extract(page).filter(|v| (self.validator)(v))?;
            debug!(field = ?self.field, strategy = i, kind = ?s.kind(), "field matched");
            Some(value)
        })
    }
}

/// Turns a fetched profile page into a [`RawRecord`].
pub struct ExtractionEngine {
    chains: Vec<FieldChain>,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new(default_chains())
    }
}

impl ExtractionEngine {
    pub fn new(chains: Vec<FieldChain>) -> Self {
        Self { chains }
    }

    pub fn chain(&self, field: Field) -> Option<&FieldChain> {
        self.chains.iter().find(|c| c.field == field)
    }

    /// Extract every field. Missing fields stay `None`; numeric fields that
    /// fail to parse stay `None` too.
    pub fn extract(&self, profile_url: &str, html: &str, category: &str) -> RawRecord {
        let page = ProfilePage::parse(profile_url, html);
        let mut found: HashMap<Field, String> = self
            .chains
            .iter()
            .filter_map(|c| c.run(&page).map(|v| (c.field, v)))
            .collect();

        let map_link = found.remove(&Field::MapLink);
        // A map link that names a place carries no coordinate; the page may.
        let coordinate = map_link
            .as_deref()
            .and_then(coordinate_from_map_link)
            .or_else(|| CoordinateEmbedded::find(&page.document));

        RawRecord {
            name: found.remove(&Field::Name),
            category: Some(category.trim().to_string()).filter(|c| !c.is_empty()),
            credentials: found.remove(&Field::Credentials),
            experience: found.remove(&Field::Experience),
            location: found.remove(&Field::Location),
            rating: found.remove(&Field::Rating).as_deref().and_then(parse_rating),
            vote_count: found.remove(&Field::VoteCount).as_deref().and_then(parse_count),
            fee: found.remove(&Field::Fee).as_deref().and_then(parse_fee),
            map_link,
            coordinate,
            ..RawRecord::empty(profile_url)
        }
    }
}

fn short(max: usize) -> impl Fn(&str) -> bool {
    move |s: &str| !s.is_empty() && s.chars().count() <= max
}

fn valid_name(s: &str) -> bool {
    short(100)(s) && s.chars().any(char::is_alphabetic)
}

fn valid_credentials(s: &str) -> bool {
    short(300)(s)
}

fn valid_experience(s: &str) -> bool {
    short(100)(s) && EXPERIENCE_RE.is_match(s)
}

fn valid_location(s: &str) -> bool {
    !s.trim().is_empty() && !garbage::is_garbage(s)
}

fn valid_rating(s: &str) -> bool {
    parse_rating(s).is_some()
}

fn valid_count(s: &str) -> bool {
    parse_count(s).is_some()
}

fn valid_fee(s: &str) -> bool {
    parse_fee(s).is_some()
}

fn valid_map_link(s: &str) -> bool {
    s.starts_with("http") && (s.contains("google.com/maps") || s.contains("maps.google"))
}

/// Selector chains for the directory's profile markup, most specific first.
pub fn default_chains() -> Vec<FieldChain> {
    vec![
        FieldChain::new(Field::Name, valid_name)
            .then(Structural::text("h1.c-profile__title"))
            .then(Structural::text("h1[data-qa-id='doctor_name']"))
            .then(Structural::text(".doctor-name h1, .profile-title h1"))
            .then(Structural::text("h1")),
        FieldChain::new(Field::Credentials, valid_credentials)
            .then(Structural::text("p.c-profile__details"))
            .then(Structural::text("[data-qa-id='doctor_qualifications']"))
            .then(Heuristic::new(
                ".c-profile__details p, .degree, .qualification, .doctor-qualifications, p",
                DEGREE_RE.as_str(),
                300,
            )),
        FieldChain::new(Field::Experience, valid_experience)
            .then(Structural::text("div.c-profile__details h2"))
            .then(Structural::text("[data-qa-id='doctor_experience']"))
            .then(Heuristic::new(
                "h2, h3, span, p, div",
                r"(?i)\d+\s*\+?\s*(?:years?|yrs?)",
                80,
            )),
        FieldChain::new(Field::Location, valid_location)
            .then(Structural::text("h4.c-profile--clinic__location"))
            .then(Structural::text(".c-profile--clinic__location"))
            .then(Structural::text(
                "[data-qa-id='doctor_location'], [data-qa-id='clinic_locality']",
            ))
            .then(
                Heuristic::new(
                    "[class*='location'], [class*='address'], [class*='locality']",
                    r"[A-Za-z]{3}",
                    100,
                )
                .rejecting(garbage::is_garbage),
            ),
        FieldChain::new(Field::Rating, valid_rating)
            .then(Structural::text("span.u-green-text.u-bold.u-large-font"))
            .then(Structural::text("[data-qa-id='doctor_score']"))
            .then(Heuristic::new(
                "[class*='rating'], [class*='score']",
                r"^\d{1,3}(?:\.\d+)?\s*%?$",
                10,
            )),
        FieldChain::new(Field::VoteCount, valid_count)
            .then(Structural::text("span.u-smallest-font.u-grey_3-text"))
            .then(Structural::text("[data-qa-id='doctor_votes']"))
            .then(Heuristic::new(
                "span, p, div",
                r"(?i)\d[\d,]*\s*(?:patient\s+)?(?:votes?|reviews?|stories)",
                60,
            )),
        FieldChain::new(Field::Fee, valid_fee)
            .then(Structural::text("span.u-strike"))
            .then(Structural::text("[data-qa-id='consultation_fee']"))
            .then(Structural::text(
                "div.u-f-right.u-large-font.u-bold.u-valign--middle.u-lheight-normal",
            ))
            .then(Heuristic::new(
                "span, p, div",
                r"(?i)(?:₹|rs\.?|inr)\s*\d",
                60,
            )),
        FieldChain::new(Field::MapLink, valid_map_link)
            .then(Structural::attr("iframe[src*='google.com/maps']", "src"))
            .then(Structural::attr("iframe[src*='maps.google']", "src"))
            .then(Structural::attr("a[href*='google.com/maps']", "href"))
            .then(Structural::attr("a[href*='maps.google']", "href"))
            .then(CoordinateEmbedded),
    ]
}
