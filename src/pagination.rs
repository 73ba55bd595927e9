//! Page-number pagination shared by the HTML views and the JSON API.
//!
//! Page lookups are lenient: a missing or unparseable number yields the
//! first page, a number past the end yields the last page, and an empty
//! listing still has one (empty) page.

use serde::{Deserialize, Serialize};

/// Posts per page on `/`.
pub const INDEX_PAGE_SIZE: usize = 5;
/// Posts per page on `/group/<slug>/`.
pub const GROUP_PAGE_SIZE: usize = 5;
/// Posts per page on `/<username>/`.
pub const PROFILE_PAGE_SIZE: usize = 6;
/// Posts per page on `/follow/`.
pub const FOLLOW_PAGE_SIZE: usize = 10;

/// `?page=` query parameter, kept raw so bad input can fall back to page 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: usize,
    per_page: usize,
}

impl Paginator {
    pub fn new(count: usize, per_page: usize) -> Self {
        Self { count, per_page: per_page.max(1) }
    }

    pub fn count(&self) -> usize { self.count }

    pub fn per_page(&self) -> usize { self.per_page }

    pub fn num_pages(&self) -> usize {
        if self.count == 0 { 1 } else { self.count.div_ceil(self.per_page) }
    }

    /// Resolves a raw page parameter to a valid 1-based page number.
    pub fn page_number(&self, raw: Option<&str>) -> usize {
        let requested = raw
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|&n| n >= 1)
            .unwrap_or(1);
        requested.min(self.num_pages())
    }

    /// `(offset, limit)` of the given page.
    pub fn bounds(&self, number: usize) -> (usize, usize) {
        let offset = (number.max(1) - 1) * self.per_page;
        (offset.min(self.count), self.per_page)
    }
}

/// One page of results plus what templates need to draw the page links.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(object_list: Vec<T>, number: usize, paginator: &Paginator) -> Self {
        let num_pages = paginator.num_pages();
        let has_next = number < num_pages;
        let has_previous = number > 1;
        Self {
            object_list,
            number,
            num_pages,
            count: paginator.count(),
            per_page: paginator.per_page(),
            has_next,
            has_previous,
            next_page_number: has_next.then(|| number + 1),
            previous_page_number: has_previous.then(|| number - 1),
        }
    }

    /// Paginates an already-loaded list.
    pub fn from_vec(items: Vec<T>, per_page: usize, raw: Option<&str>) -> Self {
        let paginator = Paginator::new(items.len(), per_page);
        let number = paginator.page_number(raw);
        let (offset, limit) = paginator.bounds(number);
        let object_list = items.into_iter().skip(offset).take(limit).collect();
        Self::new(object_list, number, &paginator)
    }

    pub fn len(&self) -> usize { self.object_list.len() }

    pub fn is_empty(&self) -> bool { self.object_list.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_items_split_five_and_one() {
        let items: Vec<i32> = (1..=6).collect();
        let first = Page::from_vec(items.clone(), INDEX_PAGE_SIZE, Some("1"));
        assert_eq!(first.len(), 5);
        assert!(first.has_next);
        assert_eq!(first.next_page_number, Some(2));
        let second = Page::from_vec(items, INDEX_PAGE_SIZE, Some("2"));
        assert_eq!(second.object_list, vec![6]);
        assert!(!second.has_next);
        assert_eq!(second.previous_page_number, Some(1));
    }

    #[test]
    fn lenient_page_numbers() {
        let p = Paginator::new(12, 5);
        assert_eq!(p.num_pages(), 3);
        assert_eq!(p.page_number(None), 1);
        assert_eq!(p.page_number(Some("abc")), 1);
        assert_eq!(p.page_number(Some("0")), 1);
        assert_eq!(p.page_number(Some("-2")), 1);
        assert_eq!(p.page_number(Some("99")), 3);
        assert_eq!(p.bounds(3), (10, 5));
    }

    #[test]
    fn empty_listing_has_one_page() {
        let page: Page<i32> = Page::from_vec(Vec::new(), 10, Some("4"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(page.is_empty());
        assert!(!page.has_next && !page.has_previous);
    }
}
