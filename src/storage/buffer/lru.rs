use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Tracked pages, least recently used at front
    lru_list: VecDeque<PageId>,
    /// Position of each page in `lru_list`
    page_map: HashMap<PageId, usize>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
            page_map: HashMap::with_capacity(capacity),
        }
    }

    fn update_indices(&mut self) {
        for (idx, &page_id) in self.lru_list.iter().enumerate() {
            self.page_map.insert(page_id, idx);
        }
    }

    fn take(&mut self, page_id: PageId) -> bool {
        match self.page_map.remove(&page_id) {
            Some(idx) => {
                self.lru_list.remove(idx);
                self.update_indices();
                true
            }
            None => false,
        }
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId> {
        let victim = self.lru_list.iter().copied().find(|&id| evictable(id))?;
        self.take(victim);
        Some(victim)
    }

    fn record_access(&mut self, page_id: PageId) {
        self.take(page_id);
        self.lru_list.push_back(page_id);
        self.page_map.insert(page_id, self.lru_list.len() - 1);
    }

    fn remove(&mut self, page_id: PageId) {
        self.take(page_id);
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}
