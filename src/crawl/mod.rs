pub mod links;
pub mod paginator;
pub mod scheduler;

pub use paginator::{AbortReason, ExhaustReason, ListingTarget, PageState};
pub use scheduler::CrawlScheduler;
