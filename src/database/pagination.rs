use serde::Serialize;

use crate::constants::MAX_PAGE_SIZE;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub count: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_rows(results: Vec<T>, count: i64, limit: i64, offset: i64) -> Self {
        let next = offset.saturating_add(limit);
        let next_offset = (next < count).then_some(next);
        let prev_offset = (offset > 0).then(|| offset.saturating_sub(limit).max(0));

        Self {
            count,
            next_offset,
            prev_offset,
            results,
        }
    }
}

/// Clamps a client-supplied limit/offset pair. Limits are capped at `MAX_PAGE_SIZE`.
pub fn window(limit: Option<i64>, offset: i64, page_size: i64) -> (i64, i64) {
    let limit = limit
        .filter(|limit| *limit > 0)
        .unwrap_or(page_size)
        .min(MAX_PAGE_SIZE);
    (limit, offset.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let page = Page::from_rows(vec![1, 2], 10, 2, 4);
        assert_eq!(page.next_offset, Some(6));
        assert_eq!(page.prev_offset, Some(2));
    }

    #[test]
    fn edges() {
        let first = Page::from_rows(vec![1, 2], 3, 2, 0);
        assert_eq!(first.prev_offset, None);
        assert_eq!(first.next_offset, Some(2));

        let last = Page::from_rows(vec![3], 3, 2, 2);
        assert_eq!(last.next_offset, None);
        assert_eq!(last.prev_offset, Some(0));
    }

    #[test]
    fn window_defaults() {
        assert_eq!(window(None, -3, 6), (6, 0));
        assert_eq!(window(Some(0), 12, 6), (6, 12));
        assert_eq!(window(Some(2), 4, 6), (2, 4));
    }

    #[test]
    fn huge_client_values_do_not_overflow() {
        let (limit, offset) = window(Some(i64::MAX), 1, 6);
        assert_eq!(limit, MAX_PAGE_SIZE);

        let page = Page::from_rows(Vec::<i32>::new(), 3, limit, offset);
        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(0));

        let (limit, offset) = window(Some(50), i64::MAX, 6);
        let page = Page::from_rows(Vec::<i32>::new(), 3, limit, offset);
        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(i64::MAX - 50));
    }
}
