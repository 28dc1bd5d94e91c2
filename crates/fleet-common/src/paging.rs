/// Window over an identity-sorted listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Paging {
    /// Sentinel meaning "every row".
    #[default]
    All,
    Page { page: usize, per_page: usize },
}

impl Paging {
    pub fn apply<T>(self, rows: Vec<T>) -> Vec<T> {
        match self {
            Paging::All => rows,
            Paging::Page { page, per_page } => rows
                .into_iter()
                .skip(page.saturating_mul(per_page))
                .take(per_page)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keeps_everything() {
        assert_eq!(Paging::All.apply(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_page_window() {
        let rows: Vec<u32> = (0..7).collect();
        assert_eq!(Paging::Page { page: 1, per_page: 3 }.apply(rows.clone()), vec![3, 4, 5]);
        assert_eq!(Paging::Page { page: 2, per_page: 3 }.apply(rows.clone()), vec![6]);
        assert!(Paging::Page { page: 5, per_page: 3 }.apply(rows).is_empty());
    }
}
