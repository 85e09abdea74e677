use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Records that belong to a single network element.
pub trait Keyed {
    fn element_id(&self) -> i64;
}

struct Entry<T> {
    records: Vec<T>,
    hits: Cell<u64>,
}

/// Regulatory records indexed by the id of the element they apply to.
///
/// Built once before the rewrite pass and read-only afterwards. The only
/// interior mutation is a per-key hit counter, so that records which never
/// matched an element can be reported at the end of a run.
pub struct FeatureTable<T> {
    entries: HashMap<i64, Entry<T>>,
    record_count: usize,
}

impl<T: Keyed> FeatureTable<T> {
    /// Group records by element id, keeping source order within a group.
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        let mut entries: HashMap<i64, Entry<T>> = HashMap::new();
        let mut record_count = 0;
        for record in records {
            record_count += 1;
            entries
                .entry(record.element_id())
                .or_insert_with(|| Entry {
                    records: Vec::new(),
                    hits: Cell::new(0),
                })
                .records
                .push(record);
        }
        Self {
            entries,
            record_count,
        }
    }

    /// Like [`FeatureTable::new`], with every group stably sorted by `compare`.
    pub fn new_sorted<F>(records: impl IntoIterator<Item = T>, mut compare: F) -> Self
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut table = Self::new(records);
        for entry in table.entries.values_mut() {
            entry.records.sort_by(&mut compare);
        }
        table
    }

    /// Records for `id`, empty if there are none. Counts as an access.
    pub fn lookup(&self, id: i64) -> &[T] {
        match self.entries.get(&id) {
            Some(entry) => {
                entry.hits.set(entry.hits.get() + 1);
                &entry.records
            }
            None => &[],
        }
    }

    /// Element ids that were never looked up, in ascending order.
    pub fn unaccessed_ids(&self) -> Vec<i64> {
        self.unaccessed().into_iter().map(|(id, _)| id).collect()
    }

    /// Every record, group by group.
    pub fn all_values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().flat_map(|entry| entry.records.iter())
    }

    /// Groups that were never looked up, in ascending id order.
    pub fn unaccessed(&self) -> Vec<(i64, &[T])> {
        let mut groups: Vec<(i64, &[T])> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.hits.get() == 0)
            .map(|(id, entry)| (*id, entry.records.as_slice()))
            .collect();
        groups.sort_unstable_by_key(|(id, _)| *id);
        groups
    }

    /// Groups, each with at least one record.
    pub fn groups(&self) -> impl Iterator<Item = (i64, &[T])> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.records.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.record_count
    }

    /// Number of distinct element ids.
    pub fn element_count(&self) -> usize {
        self.entries.len()
    }
}
