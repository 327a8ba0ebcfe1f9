use serde::Deserialize;

/// Items per page on every listing endpoint.
pub const ITEM_LIMIT: usize = 10;

/// `?page=N`. Missing, non-numeric and values below 1 all mean page 1.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }
}

/// Items `[(page - 1) * ITEM_LIMIT, page * ITEM_LIMIT)` of `items`; empty past the end.
pub fn paginate<T: Clone>(items: &[T], page: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(ITEM_LIMIT);
    let end = start.saturating_add(ITEM_LIMIT).min(items.len());
    if start >= items.len() {
        return Vec::new();
    }
    items[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
        }
    }

    #[test]
    fn test_page_defaults() {
        assert_eq!(query(None).page(), 1);
        assert_eq!(query(Some("abc")).page(), 1);
        assert_eq!(query(Some("0")).page(), 1);
        assert_eq!(query(Some("-3")).page(), 1);
        assert_eq!(query(Some("3")).page(), 3);
    }

    #[test]
    fn test_paginate_windows() {
        let items: Vec<usize> = (0..25).collect();
        assert_eq!(paginate(&items, 1), (0..10).collect::<Vec<_>>());
        assert_eq!(paginate(&items, 2), (10..20).collect::<Vec<_>>());
        assert_eq!(paginate(&items, 3), (20..25).collect::<Vec<_>>());
        assert!(paginate(&items, 4).is_empty());
        assert!(paginate(&items, usize::MAX).is_empty());
    }

    #[test]
    fn test_paginate_empty() {
        let items: Vec<u8> = Vec::new();
        assert!(paginate(&items, 1).is_empty());
    }
}
