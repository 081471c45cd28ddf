//! Ordered child collections.
//!
//! [`ListValue`] keeps a set of child entities ordered by an externally supplied
//! comparator and reconciles them against an unordered raw list on every update.
//! Children are individually diffed, so an unchanged match inside a changed
//! schedule keeps its allocation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::cell::Cacheable;
use crate::error::MalformedDatum;

/// Describes how a raw list maps onto ordered child entities.
pub trait ListSpec: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    type Item;
    type Entry: Cacheable<Self::Item>;

    fn key_of(item: &Self::Item) -> Self::Key;

    fn create(key: &Self::Key, item: &Self::Item) -> Result<Self::Entry, MalformedDatum>;

    /// Iteration order of the collection.
    ///
    /// Must return `Equal` only for equal keys. The collection is only sorted
    /// when the order is also transitive over the keys it holds; with a
    /// non-transitive comparator, such as match keys where some fail to parse
    /// and fall back to string order, iteration order is unspecified and
    /// lookups of the offending keys may miss.
    fn compare(a: &Self::Key, b: &Self::Key) -> Ordering;
}

struct SortKey<S: ListSpec>(S::Key);

impl<S: ListSpec> Clone for SortKey<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: ListSpec> PartialEq for SortKey<S> {
    fn eq(&self, other: &Self) -> bool {
        S::compare(&self.0, &other.0) == Ordering::Equal
    }
}

impl<S: ListSpec> Eq for SortKey<S> {}

impl<S: ListSpec> PartialOrd for SortKey<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: ListSpec> Ord for SortKey<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        S::compare(&self.0, &other.0)
    }
}

/// A comparator-ordered collection of child entities.
pub struct ListValue<S: ListSpec> {
    entries: BTreeMap<SortKey<S>, Arc<S::Entry>>,
}

impl<S: ListSpec> ListValue<S> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a collection from an initial raw list.
    pub fn from_items(items: &[S::Item]) -> Result<Self, MalformedDatum> {
        let mut list = Self::new();
        list.apply(items)?;
        Ok(list)
    }

    /// Reconcile the collection with a fresh raw list.
    ///
    /// Entities missing from `items` are dropped, present ones are updated in
    /// place and unknown keys are created. Returns whether anything changed.
    /// When the same key appears twice in `items` the later item wins.
    pub fn apply(&mut self, items: &[S::Item]) -> Result<bool, MalformedDatum> {
        let mut index: HashMap<S::Key, &S::Item> = HashMap::with_capacity(items.len());
        for item in items {
            index.insert(S::key_of(item), item);
        }

        let before = self.entries.len();
        self.entries.retain(|key, _| index.contains_key(&key.0));
        let mut changed = self.entries.len() != before;

        for (key, entry) in self.entries.iter_mut() {
            let Some(item) = index.remove(&key.0) else {
                continue;
            };
            let mut next = S::Entry::clone(entry);
            if next.update(item)? {
                *entry = Arc::new(next);
                changed = true;
            }
        }

        for (key, item) in index {
            let entry = S::create(&key, item)?;
            self.entries.insert(SortKey(key), Arc::new(entry));
            changed = true;
        }

        Ok(changed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &S::Key) -> Option<&S::Entry> {
        self.entries.get(&SortKey(key.clone())).map(Arc::as_ref)
    }

    /// Shared handle to one entity, for callers that outlive the collection.
    pub fn get_shared(&self, key: &S::Key) -> Option<Arc<S::Entry>> {
        self.entries.get(&SortKey(key.clone())).cloned()
    }

    pub fn contains_key(&self, key: &S::Key) -> bool {
        self.entries.contains_key(&SortKey(key.clone()))
    }

    /// Keys in collection order.
    pub fn keys(&self) -> impl Iterator<Item = &S::Key> {
        self.entries.keys().map(|key| &key.0)
    }

    /// Entities in collection order.
    pub fn values(&self) -> impl Iterator<Item = &S::Entry> {
        self.entries.values().map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S::Key, &S::Entry)> {
        self.entries.iter().map(|(key, entry)| (&key.0, entry.as_ref()))
    }
}

impl<S: ListSpec> Default for ListValue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ListSpec> Clone for ListValue<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: ListSpec> fmt::Debug for ListValue<S>
where
    S::Entry: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<S: ListSpec> Cacheable<Vec<S::Item>> for ListValue<S> {
    fn update(&mut self, data: &Vec<S::Item>) -> Result<bool, MalformedDatum> {
        self.apply(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::VersionedCell;
    use crate::testing::{NoteDatum, NoteList};

    fn notes(items: &[(&str, &str)]) -> Vec<NoteDatum> {
        items
            .iter()
            .map(|(key, text)| NoteDatum::new(key, text))
            .collect()
    }

    fn keys(list: &ListValue<NoteList>) -> Vec<String> {
        list.keys().cloned().collect()
    }

    #[test]
    fn test_iterates_in_comparator_order_not_input_order() {
        // NoteList orders by key length, then lexicographically
        let list =
            ListValue::<NoteList>::from_items(&notes(&[("ccc", "3"), ("a", "1"), ("bb", "2")]))
                .unwrap();
        assert_eq!(keys(&list), vec!["a", "bb", "ccc"]);

        let shuffled =
            ListValue::<NoteList>::from_items(&notes(&[("bb", "2"), ("ccc", "3"), ("a", "1")]))
                .unwrap();
        assert_eq!(keys(&shuffled), keys(&list));
    }

    #[test]
    fn test_identical_list_reports_no_change() {
        let items = notes(&[("a", "1"), ("bb", "2")]);
        let mut list = ListValue::<NoteList>::from_items(&items).unwrap();

        assert!(!list.apply(&items).unwrap());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_removed_item_marks_change() {
        let mut list = ListValue::<NoteList>::from_items(&notes(&[("a", "1"), ("bb", "2")])).unwrap();

        assert!(list.apply(&notes(&[("a", "1")])).unwrap());
        assert_eq!(keys(&list), vec!["a"]);
    }

    #[test]
    fn test_added_item_marks_change() {
        let mut list = ListValue::<NoteList>::from_items(&notes(&[("a", "1")])).unwrap();

        assert!(list.apply(&notes(&[("a", "1"), ("bb", "2")])).unwrap());
        assert_eq!(list.get(&"bb".to_string()).unwrap().text, "2");
    }

    #[test]
    fn test_child_update_marks_change_and_keeps_untouched_siblings() {
        let mut list = ListValue::<NoteList>::from_items(&notes(&[("a", "1"), ("bb", "2")])).unwrap();
        let untouched = list.get_shared(&"a".to_string()).unwrap();

        assert!(list.apply(&notes(&[("a", "1"), ("bb", "two")])).unwrap());

        assert_eq!(list.get(&"bb".to_string()).unwrap().text, "two");
        assert!(Arc::ptr_eq(
            &untouched,
            &list.get_shared(&"a".to_string()).unwrap()
        ));
    }

    #[test]
    fn test_duplicate_keys_keep_last_item() {
        let list = ListValue::<NoteList>::from_items(&notes(&[("a", "first"), ("a", "second")]))
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(&"a".to_string()).unwrap().text, "second");
    }

    #[test]
    fn test_malformed_child_discards_whole_list_update() {
        let cell = VersionedCell::new(
            ListValue::<NoteList>::from_items(&notes(&[("a", "1"), ("bb", "2")])).unwrap(),
            1,
        );

        // removal of "a" and the new "ccc" must not leak out with the bad child
        let result = cell.prepare(&notes(&[("bb", ""), ("ccc", "3")]));

        assert!(result.is_err());
        assert_eq!(keys(&cell.peek()), vec!["a", "bb"]);
        assert_eq!(cell.peek().get(&"bb".to_string()).unwrap().text, "2");
    }
}
