use serde::Serialize;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Paginator<T> {
    /// `last_page` is at least 1, even for an empty result.
    pub fn new(items: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 {
            1
        } else {
            total.div_ceil(per_page).max(1)
        };
        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page <= 1
    }

    /// 1-based index of the first item on this page, if any.
    pub fn from(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| (self.current_page - 1) * self.per_page + 1)
    }

    /// 1-based index of the last item on this page, if any.
    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Paginator<U>, E> {
        Ok(Paginator {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        })
    }
}
