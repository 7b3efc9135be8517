use std::collections::HashSet;

use crate::errors::FetchError;

/// One (region, category) pagination job.
#[derive(Debug, Clone)]
pub struct ListingTarget {
    pub region: String,
    pub category: String,
    page: u32,
    visited: HashSet<String>,
}

impl ListingTarget {
    pub fn new(region: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            category: category.into(),
            page: 1,
            visited: HashSet::new(),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    PageLimit,
    EmptyStreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// Nothing could be fetched at all; usually a bad template or host.
    FirstPageFailed(FetchError),
    RetriesExhausted { page: u32, error: FetchError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    Init,
    FetchingPage(u32),
    Exhausted(ExhaustReason),
    Aborted(AbortReason),
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PageState::Exhausted(_) | PageState::Aborted(_))
    }
}

/// Pagination control for one target, free of I/O.
///
/// The caller asks for the next page, fetches it, and reports the links it
/// found (or the failure). Every recorded page either advances the page number
/// or terminates, so at most `max_pages` pages are ever requested.
#[derive(Debug)]
pub struct Paginator {
    target: ListingTarget,
    state: PageState,
    max_pages: u32,
    max_empty: u32,
    empty_streak: u32,
    fetched: u32,
}

impl Paginator {
    pub fn new(target: ListingTarget, max_pages: u32, max_consecutive_empty_pages: u32) -> Self {
        Self {
            target,
            state: PageState::Init,
            max_pages,
            max_empty: max_consecutive_empty_pages.max(1),
            empty_streak: 0,
            fetched: 0,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn target(&self) -> &ListingTarget {
        &self.target
    }

    /// Pages whose outcome has been recorded, successful or not.
    pub fn pages_fetched(&self) -> u32 {
        self.fetched
    }

    /// The page to fetch next, or `None` once terminal.
    pub fn next_request(&mut self) -> Option<u32> {
        match self.state {
            PageState::Init if self.max_pages == 0 => {
                self.state = PageState::Exhausted(ExhaustReason::PageLimit);
                None
            }
            PageState::Init => {
                self.state = PageState::FetchingPage(1);
                Some(1)
            }
            PageState::FetchingPage(n) => Some(n),
            PageState::Exhausted(_) | PageState::Aborted(_) => None,
        }
    }

    /// Record the links found on the current page. Returns the ones not seen
    /// before, in page order.
    pub fn record_links(&mut self, links: Vec<String>) -> Vec<String> {
        let PageState::FetchingPage(n) = self.state else {
            return Vec::new();
        };

        self.fetched += 1;
        let fresh: Vec<String> = links
            .into_iter()
            .filter(|l| self.target.visited.insert(l.clone()))
            .collect();

        if fresh.is_empty() {
            self.empty_streak += 1;
        } else {
            self.empty_streak = 0;
        }

        self.state = if self.empty_streak >= self.max_empty {
            PageState::Exhausted(ExhaustReason::EmptyStreak)
        } else if n >= self.max_pages {
            PageState::Exhausted(ExhaustReason::PageLimit)
        } else {
            self.target.page = n + 1;
            PageState::FetchingPage(n + 1)
        };
        fresh
    }

    /// Record that the current page could not be fetched.
    pub fn record_failure(&mut self, error: FetchError) {
        let PageState::FetchingPage(n) = self.state else {
            return;
        };
        self.fetched += 1;
        let reason = if n == 1 {
            AbortReason::FirstPageFailed(error)
        } else {
            AbortReason::RetriesExhausted { page: n, error }
        };
        self.state = PageState::Aborted(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(range: std::ops::Range<u32>) -> Vec<String> {
        range.map(|i| format!("https://x/doctor/{i}")).collect()
    }

    fn paginator(max_pages: u32, max_empty: u32) -> Paginator {
        Paginator::new(ListingTarget::new("Bangalore", "Dentist"), max_pages, max_empty)
    }

    #[test]
    fn advances_while_new_links_arrive() {
        let mut p = paginator(10, 2);
        assert_eq!(p.next_request(), Some(1));
        assert_eq!(p.record_links(links(0..5)).len(), 5);
        assert_eq!(p.next_request(), Some(2));
        assert_eq!(p.record_links(links(3..8)), links(5..8));
        assert_eq!(p.state(), &PageState::FetchingPage(3));
        assert_eq!(p.target().page(), 3);
        assert_eq!(p.target().visited().len(), 8);
        assert_eq!(p.pages_fetched(), 2);
    }

    #[test]
    fn repeated_page_hits_empty_streak() {
        let mut p = paginator(20, 2);
        let mut emitted = Vec::new();
        let mut fetches = 0;
        while p.next_request().is_some() {
            fetches += 1;
            emitted.extend(p.record_links(links(0..20)));
        }
        assert_eq!(emitted.len(), 20);
        assert_eq!(fetches, 3);
        assert_eq!(p.state(), &PageState::Exhausted(ExhaustReason::EmptyStreak));
    }

    #[test]
    fn streak_resets_on_new_links() {
        let mut p = paginator(20, 2);
        p.next_request();
        p.record_links(links(0..2));
        p.next_request();
        p.record_links(vec![]);
        p.next_request();
        p.record_links(links(2..3));
        p.next_request();
        p.record_links(vec![]);
        assert!(!p.state().is_terminal());
    }

    #[test]
    fn page_limit_bounds_fetches() {
        let mut p = paginator(4, 2);
        let mut fetches = 0;
        while let Some(n) = p.next_request() {
            fetches += 1;
            p.record_links(links(n * 10..n * 10 + 3));
        }
        assert_eq!(fetches, 4);
        assert_eq!(p.state(), &PageState::Exhausted(ExhaustReason::PageLimit));
        assert_eq!(p.target().visited().len(), 12);
    }

    #[test]
    fn failure_on_first_page_and_later() {
        let err = FetchError::transport("https://x/list", "reset");

        let mut p = paginator(5, 2);
        p.next_request();
        p.record_failure(err.clone());
        assert_eq!(
            p.state(),
            &PageState::Aborted(AbortReason::FirstPageFailed(err.clone()))
        );
        assert_eq!(p.next_request(), None);

        let mut p = paginator(5, 2);
        p.next_request();
        p.record_links(links(0..3));
        p.next_request();
        p.record_failure(err.clone());
        assert_eq!(
            p.state(),
            &PageState::Aborted(AbortReason::RetriesExhausted { page: 2, error: err })
        );
        assert_eq!(p.pages_fetched(), 2);
    }

    #[test]
    fn terminal_state_ignores_further_input() {
        let mut p = paginator(1, 2);
        p.next_request();
        p.record_links(links(0..3));
        assert!(p.state().is_terminal());
        assert!(p.record_links(links(5..9)).is_empty());
        assert_eq!(p.target().visited().len(), 3);
    }
}
