use crate::storage::page::PageId;
use std::fmt::Debug;

pub trait Replacer: Send + Sync + Debug {
    /// Remove and return the best victim among pages for which `evictable`
    /// holds. Returns None if no tracked page qualifies.
    fn evict(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId>;

    /// Record a use of `page_id`, tracking it if it is new.
    fn record_access(&mut self, page_id: PageId);

    /// Stop tracking `page_id`.
    fn remove(&mut self, page_id: PageId);

    /// Number of tracked pages.
    fn size(&self) -> usize;
}
