//! Page and selection bookkeeping for the NFT grid.

use std::collections::BTreeMap;

use crate::nft::Nft;

pub const PAGE_LIMIT: usize = 15;

/// What a completed fetch means for the pager.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    /// A full page; more may follow.
    Page,
    /// Fewer items than the limit; this page is the last one.
    LastPage,
    /// An empty page past the start. The pager has stepped back and the
    /// previous page must be fetched again.
    Overshot,
}

/// Offset/limit pagination with a lazily discovered upper bound.
#[derive(Clone, Debug)]
pub struct Pager {
    offset: usize,
    limit: usize,
    max: Option<usize>,
}

impl Pager {
    pub fn new(limit: usize) -> Self {
        Self {
            offset: 0,
            limit,
            max: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn page_number(&self) -> usize {
        self.offset / self.limit + 1
    }

    pub fn can_prev(&self) -> bool {
        self.offset > 0
    }

    pub fn can_next(&self) -> bool {
        match self.max {
            Some(max) => self.offset + self.limit < max,
            None => true,
        }
    }

    pub fn prev(&mut self) -> bool {
        if !self.can_prev() {
            return false;
        }
        self.offset = self.offset.saturating_sub(self.limit);
        true
    }

    pub fn next(&mut self) -> bool {
        if !self.can_next() {
            return false;
        }
        self.offset += self.limit;
        true
    }

    /// Records how many items the fetch for the current offset returned.
    ///
    /// An empty page past offset zero means the pager overshot the data
    /// source: the bound is recorded at the current offset and the pager
    /// steps back one page so the caller can refetch.
    pub fn record_fetch(&mut self, returned: usize) -> FetchOutcome {
        if returned == 0 && self.offset > 0 {
            self.max = Some(self.offset);
            self.offset = self.offset.saturating_sub(self.limit);
            FetchOutcome::Overshot
        } else if returned < self.limit {
            self.max = Some(self.offset + 1);
            FetchOutcome::LastPage
        } else {
            FetchOutcome::Page
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectMode {
    Single,
    Multi,
}

/// The user's current picks, keyed by `contract/token_id`.
///
/// Single mode holds at most one entry and replaces it wholesale; multi mode
/// toggles entries in and out.
#[derive(Clone, Debug)]
pub struct SelectionSet {
    mode: SelectMode,
    items: BTreeMap<String, Nft>,
}

impl SelectionSet {
    pub fn new(mode: SelectMode) -> Self {
        Self {
            mode,
            items: BTreeMap::new(),
        }
    }

    pub fn toggle(&mut self, nft: &Nft) {
        let key = nft.key();
        if self.items.remove(&key).is_some() {
            return;
        }
        if self.mode == SelectMode::Single {
            self.items.clear();
        }
        self.items.insert(key, nft.clone());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Nft> {
        self.items.values().next()
    }

    pub fn selected(&self) -> Vec<Nft> {
        self.items.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn nft(contract: &str, id: &str) -> Nft {
        Nft {
            token_address: contract.to_string(),
            token_id: id.to_string(),
            metadata: None,
            name: format!("Token {id}"),
            symbol: "TKN".to_string(),
        }
    }

    #[test]
    fn full_page_leaves_max_unset_and_next_enabled() {
        let mut pager = Pager::new(PAGE_LIMIT);
        assert_eq!(pager.record_fetch(PAGE_LIMIT), FetchOutcome::Page);
        assert_eq!(pager.max(), None);
        assert!(pager.can_next());
        assert!(!pager.can_prev());
    }

    #[test]
    fn short_page_marks_the_last_page_and_disables_next() {
        let mut pager = Pager::new(PAGE_LIMIT);
        assert_eq!(pager.record_fetch(PAGE_LIMIT - 1), FetchOutcome::LastPage);
        assert!(pager.max().is_some());
        assert!(!pager.can_next());
    }

    #[test]
    fn empty_page_past_the_start_steps_back_for_a_refetch() {
        let mut pager = Pager::new(PAGE_LIMIT);
        assert!(pager.next());
        assert_eq!(pager.offset(), 15);
        assert_eq!(pager.record_fetch(0), FetchOutcome::Overshot);
        assert_eq!(pager.max(), Some(15));
        assert_eq!(pager.offset(), 0);
    }

    #[test]
    fn empty_first_page_is_just_a_short_last_page() {
        let mut pager = Pager::new(PAGE_LIMIT);
        assert_eq!(pager.record_fetch(0), FetchOutcome::LastPage);
        assert_eq!(pager.offset(), 0);
        assert!(!pager.can_next());
    }

    #[test]
    fn prev_is_disabled_at_the_first_page() {
        let mut pager = Pager::new(PAGE_LIMIT);
        assert!(!pager.prev());
        assert!(pager.next());
        assert!(pager.prev());
        assert_eq!(pager.offset(), 0);
        assert_eq!(pager.page_number(), 1);
    }

    #[test]
    fn next_stops_at_the_discovered_bound() {
        let mut pager = Pager::new(PAGE_LIMIT);
        pager.next();
        pager.record_fetch(0);
        // Bound is now 15; offset 0 + limit 15 reaches it.
        assert!(!pager.can_next());
        assert!(!pager.next());
    }

    #[test]
    fn single_select_replaces_the_previous_pick() {
        let mut selection = SelectionSet::new(SelectMode::Single);
        selection.toggle(&nft("0xa", "1"));
        selection.toggle(&nft("0xa", "2"));
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.first().unwrap().token_id, "2");
        assert!(!selection.contains("0xa/1"));
    }

    #[test]
    fn toggling_the_same_item_twice_restores_the_set() {
        let mut selection = SelectionSet::new(SelectMode::Multi);
        selection.toggle(&nft("0xa", "1"));
        let before = selection.selected();
        selection.toggle(&nft("0xb", "9"));
        selection.toggle(&nft("0xb", "9"));
        assert_eq!(selection.selected(), before);
    }

    #[test]
    fn choose_is_gated_on_a_non_empty_selection() {
        let mut selection = SelectionSet::new(SelectMode::Single);
        assert!(selection.is_empty());
        selection.toggle(&nft("0xa", "1"));
        assert!(!selection.is_empty());
        selection.toggle(&nft("0xa", "1"));
        assert!(selection.is_empty());
    }

    proptest! {
        #[test]
        fn multi_select_size_tracks_distinct_toggles(ids in prop::collection::vec(0u8..30, 0..60)) {
            let mut selection = SelectionSet::new(SelectMode::Multi);
            let mut expected = std::collections::BTreeSet::new();
            for id in ids {
                let item = nft("0xc", &id.to_string());
                selection.toggle(&item);
                if !expected.insert(item.key()) {
                    expected.remove(&item.key());
                }
            }
            prop_assert_eq!(selection.len(), expected.len());
        }

        #[test]
        fn single_select_never_exceeds_one(ids in prop::collection::vec(0u8..30, 1..60)) {
            let mut selection = SelectionSet::new(SelectMode::Single);
            for id in ids {
                selection.toggle(&nft("0xc", &id.to_string()));
                prop_assert!(selection.len() <= 1);
            }
        }

        #[test]
        fn pager_offset_stays_aligned_to_the_limit(steps in prop::collection::vec(any::<bool>(), 0..40)) {
            let mut pager = Pager::new(PAGE_LIMIT);
            for forward in steps {
                if forward { pager.next(); } else { pager.prev(); }
                prop_assert_eq!(pager.offset() % PAGE_LIMIT, 0);
            }
        }
    }
}
