//! Ordered storage of known_hosts entries.
//!
//! An [`EntryStore`] keeps entries in the order they were appended, which is the order of the lines
//! in a known_hosts file.
//! Every appended entry is identified by an [`EntryRef`], which stays valid until exactly that
//! entry is removed.
//! Removing an entry leaves the references of all other entries untouched.
//!
//! # Examples
//!
//! ```
//! use knownhosts::{
//!     algorithm::KeyAlgorithm,
//!     entry::KnownHostEntry,
//!     pattern::HostPattern,
//!     store::EntryStore,
//! };
//!
//! # fn main() -> testresult::TestResult {
//! let mut store = EntryStore::new();
//! let first = store.append(KnownHostEntry::new(
//!     HostPattern::plain("one.example.org", None)?,
//!     KeyAlgorithm::SshEd25519,
//!     vec![1],
//!     None,
//! )?);
//! let second = store.append(KnownHostEntry::new(
//!     HostPattern::plain("two.example.org", None)?,
//!     KeyAlgorithm::SshEd25519,
//!     vec![2],
//!     None,
//! )?);
//!
//! store.remove(first)?;
//! assert!(store.get(first).is_err());
//! assert_eq!(store.get(second)?.key(), [2]);
//! assert_eq!(store.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::entry::KnownHostEntry;

/// Source of unique [`EntryStore`] identifiers.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// An error that may occur when accessing an [`EntryStore`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An entry reference does not point at a live entry.
    #[error("There is no entry for {entry}")]
    NotFound {
        /// The offending reference.
        entry: EntryRef,
    },

    /// An entry reference was handed out by another store.
    #[error("The entry reference {entry} belongs to another store")]
    ForeignReference {
        /// The offending reference.
        entry: EntryRef,
    },
}

/// A stable reference to an entry of an [`EntryStore`].
///
/// A reference is only meaningful for the store that created it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntryRef {
    store: u64,
    index: usize,
}

impl EntryRef {
    /// Returns the zero-based position at which the entry was appended to its store.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Display for EntryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry #{} of store {}", self.index, self.store)
    }
}

/// A line of an [`EntryStore`], as returned by [`EntryStore::lines`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Line<'a> {
    /// A live entry and its reference.
    Entry(EntryRef, &'a KnownHostEntry),

    /// A line kept as is, without its line break.
    Verbatim(&'a [u8]),
}

/// An ordered collection of [`KnownHostEntry`]s.
///
/// Besides entries, a store keeps verbatim lines (e.g. comments or lines that could not be
/// decoded) at their position between the entries, so that a file can be written back without
/// losing them.
///
/// The store is not internally synchronized.
/// Removed entries leave an empty slot behind, so that all other references stay valid.
/// Slots are never reused, as the position of a slot is the position of its entry in a file.
/// A store therefore grows with every append, also when entries are removed again.
/// Rebuilding the store (see [`EntryStore::try_flat_map`]) drops all empty slots.
#[derive(Debug)]
pub struct EntryStore {
    id: u64,
    slots: Vec<Option<KnownHostEntry>>,
    live: usize,
    /// Verbatim lines and the number of slots in front of them, in ascending order.
    verbatim: Vec<(usize, Vec<u8>)>,
}

impl EntryStore {
    /// Creates a new, empty [`EntryStore`].
    pub fn new() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            live: 0,
            verbatim: Vec::new(),
        }
    }

    /// Returns the number of slots, including those of removed entries.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Appends a line that is kept as is, after all current entries.
    ///
    /// A trailing line break is removed.
    pub fn append_verbatim(&mut self, line: impl Into<Vec<u8>>) {
        let mut line = line.into();
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        self.verbatim.push((self.slots.len(), line));
    }

    /// Returns the number of verbatim lines.
    pub fn verbatim_count(&self) -> usize {
        self.verbatim.len()
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the store contains no entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Appends `entry` at the end of the store and returns a reference to it.
    pub fn append(&mut self, entry: KnownHostEntry) -> EntryRef {
        let entry_ref = EntryRef {
            store: self.id,
            index: self.slots.len(),
        };
        self.slots.push(Some(entry));
        self.live += 1;
        entry_ref
    }

    /// Checks that `entry` belongs to this store.
    fn own(&self, entry: EntryRef) -> Result<(), Error> {
        if entry.store != self.id {
            return Err(Error::ForeignReference { entry });
        }
        Ok(())
    }

    /// Returns the entry referenced by `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `entry` belongs to another store,
    /// - or the entry has been removed.
    pub fn get(&self, entry: EntryRef) -> Result<&KnownHostEntry, Error> {
        self.own(entry)?;
        self.slots
            .get(entry.index)
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound { entry })
    }

    /// Removes the entry referenced by `entry` and returns it.
    ///
    /// Only `entry` is invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `entry` belongs to another store,
    /// - or the entry has already been removed.
    pub fn remove(&mut self, entry: EntryRef) -> Result<KnownHostEntry, Error> {
        self.own(entry)?;
        let removed = self
            .slots
            .get_mut(entry.index)
            .and_then(Option::take)
            .ok_or(Error::NotFound { entry })?;
        self.live -= 1;
        Ok(removed)
    }

    /// Returns an iterator over all entries in store order.
    ///
    /// Every call starts a fresh pass from the first entry.
    pub fn iter(&self) -> impl Iterator<Item = (EntryRef, &KnownHostEntry)> {
        let store = self.id;
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_ref()
                    .map(|entry| (EntryRef { store, index }, entry))
            })
    }

    /// Returns an iterator over all entries in store order, without their references.
    pub fn entries(&self) -> impl Iterator<Item = &KnownHostEntry> {
        self.slots.iter().flatten()
    }

    /// Returns an iterator over all live entries and verbatim lines, in file order.
    ///
    /// # Examples
    ///
    /// ```
    /// use knownhosts::{file::read_from, store::Line};
    ///
    /// # fn main() -> testresult::TestResult {
    /// let loaded = read_from(&b"# comment\nexample.org ssh-ed25519 AAAACw==\n"[..])?;
    /// let lines: Vec<_> = loaded.store.lines().collect();
    ///
    /// assert_eq!(lines[0], Line::Verbatim(b"# comment"));
    /// assert!(matches!(lines[1], Line::Entry(..)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn lines(&self) -> impl Iterator<Item = Line<'_>> {
        let store = self.id;
        let mut verbatim = self.verbatim.iter().peekable();
        (0..=self.slots.len()).flat_map(move |index| {
            let mut lines = Vec::new();
            while let Some((_, line)) = verbatim.next_if(|(position, _)| *position == index) {
                lines.push(Line::Verbatim(line.as_slice()));
            }
            if let Some(Some(entry)) = self.slots.get(index) {
                lines.push(Line::Entry(EntryRef { store, index }, entry));
            }
            lines
        })
    }

    /// Creates a new store, in which every entry is replaced by the entries `map` returns for it.
    ///
    /// Verbatim lines keep their position relative to the surrounding entries.
    /// The new store hands out new references and has no empty slots.
    ///
    /// # Errors
    ///
    /// Returns the first error returned by `map`.
    pub fn try_flat_map<E>(
        &self,
        mut map: impl FnMut(&KnownHostEntry) -> Result<Vec<KnownHostEntry>, E>,
    ) -> Result<Self, E> {
        let mut store = Self::new();
        for line in self.lines() {
            match line {
                Line::Entry(_, entry) => store.extend(map(entry)?),
                Line::Verbatim(line) => store.append_verbatim(line),
            }
        }
        Ok(store)
    }

    /// Returns the reference of the entry following `cursor`.
    ///
    /// A `cursor` of [`None`] returns the first entry.
    /// Returns [`None`] once the end of the store is reached.
    /// The cursor itself does not need to point at a live entry, so that enumeration can continue
    /// after the current entry has been removed.
    /// Each call only visits the slots between `cursor` and the next live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `cursor` belongs to another store.
    pub fn get_next(&self, cursor: Option<EntryRef>) -> Result<Option<EntryRef>, Error> {
        let start = match cursor {
            Some(cursor) => {
                self.own(cursor)?;
                cursor.index + 1
            }
            None => 0,
        };
        Ok(self
            .slots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, slot)| slot.is_some())
            .map(|(index, _)| EntryRef {
                store: self.id,
                index,
            }))
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<KnownHostEntry> for EntryStore {
    fn extend<T: IntoIterator<Item = KnownHostEntry>>(&mut self, iter: T) {
        for entry in iter {
            self.append(entry);
        }
    }
}

impl IntoIterator for EntryStore {
    type Item = KnownHostEntry;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Option<KnownHostEntry>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter().flatten()
    }
}

impl FromIterator<KnownHostEntry> for EntryStore {
    fn from_iter<T: IntoIterator<Item = KnownHostEntry>>(iter: T) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use testresult::TestResult;

    use super::*;
    use crate::{algorithm::KeyAlgorithm, pattern::HostPattern};

    fn entry(host: &str, key: u8) -> TestResult<KnownHostEntry> {
        Ok(KnownHostEntry::new(
            HostPattern::plain(host, None)?,
            KeyAlgorithm::SshEd25519,
            vec![key],
            None,
        )?)
    }

    #[fixture]
    fn store() -> TestResult<(EntryStore, Vec<EntryRef>)> {
        let mut store = EntryStore::new();
        let mut refs = Vec::new();
        for index in 0..5 {
            refs.push(store.append(entry(&format!("host{index}.example.org"), index)?));
        }
        Ok((store, refs))
    }

    #[rstest]
    fn iteration_is_ordered_and_restartable(
        store: TestResult<(EntryStore, Vec<EntryRef>)>,
    ) -> TestResult {
        let (store, refs) = store?;

        let first: Vec<_> = store.iter().map(|(entry_ref, _)| entry_ref).collect();
        let second: Vec<_> = store.iter().map(|(entry_ref, _)| entry_ref).collect();
        assert_eq!(first, refs);
        assert_eq!(first, second);
        assert_eq!(
            store.entries().map(|entry| entry.key()[0]).collect::<Vec<_>>(),
            [0, 1, 2, 3, 4]
        );

        Ok(())
    }

    #[rstest]
    fn remove_keeps_other_references(
        store: TestResult<(EntryStore, Vec<EntryRef>)>,
    ) -> TestResult {
        let (mut store, refs) = store?;

        let removed = store.remove(refs[2])?;
        assert_eq!(removed.key(), [2]);
        assert_eq!(store.len(), 4);
        assert!(matches!(store.get(refs[2]), Err(Error::NotFound { .. })));
        assert!(matches!(store.remove(refs[2]), Err(Error::NotFound { .. })));

        for (index, entry_ref) in refs.iter().enumerate().filter(|(index, _)| *index != 2) {
            assert_eq!(store.get(*entry_ref)?.key(), [index as u8]);
        }

        let appended = store.append(entry("late.example.org", 9)?);
        assert_eq!(appended.index(), 5);
        assert_eq!(store.iter().last().map(|(entry_ref, _)| entry_ref), Some(appended));

        Ok(())
    }

    #[rstest]
    fn get_next_walks_the_store(store: TestResult<(EntryStore, Vec<EntryRef>)>) -> TestResult {
        let (mut store, refs) = store?;
        store.remove(refs[0])?;
        store.remove(refs[3])?;

        let mut cursor = None;
        let mut walked = Vec::new();
        while let Some(next) = store.get_next(cursor)? {
            walked.push(next);
            cursor = Some(next);
        }
        assert_eq!(walked, [refs[1], refs[2], refs[4]]);

        // continuing from a removed entry
        store.remove(refs[1])?;
        assert_eq!(store.get_next(Some(refs[1]))?, Some(refs[2]));

        Ok(())
    }

    #[rstest]
    fn verbatim_lines_keep_their_position(
        store: TestResult<(EntryStore, Vec<EntryRef>)>,
    ) -> TestResult {
        let (mut store, refs) = store?;
        store.append_verbatim(b"# trailer\n".to_vec());
        store.remove(refs[4])?;

        let mut other = EntryStore::new();
        other.append_verbatim("# header");
        other.extend(store.into_iter().take(2));
        other.append_verbatim("broken line");
        other.append(entry("late.example.org", 9)?);

        let lines: Vec<_> = other
            .lines()
            .map(|line| match line {
                Line::Entry(_, entry) => format!("entry {}", entry.key()[0]),
                Line::Verbatim(line) => String::from_utf8_lossy(line).into_owned(),
            })
            .collect();
        assert_eq!(
            lines,
            ["# header", "entry 0", "entry 1", "broken line", "entry 9"]
        );
        assert_eq!(other.verbatim_count(), 2);
        assert_eq!(other.len(), 3);

        Ok(())
    }

    /// Ensures that rebuilding a store keeps verbatim lines in place and drops empty slots.
    #[rstest]
    fn rebuild_drops_removed_slots(store: TestResult<(EntryStore, Vec<EntryRef>)>) -> TestResult {
        let (mut store, refs) = store?;
        store.append_verbatim("# trailer");
        for entry_ref in &refs[..3] {
            store.remove(*entry_ref)?;
        }
        assert_eq!(store.slot_count(), 5);

        let rebuilt = store.try_flat_map(|entry| {
            Ok::<_, Error>(vec![entry.clone(), entry.clone()])
        })?;

        assert_eq!(rebuilt.slot_count(), 4);
        assert_eq!(rebuilt.len(), 4);
        assert!(matches!(
            rebuilt.lines().last(),
            Some(Line::Verbatim(line)) if line == b"# trailer"
        ));
        assert!(matches!(
            rebuilt.get(refs[3]),
            Err(Error::ForeignReference { .. })
        ));

        Ok(())
    }

    #[test]
    fn empty_store() {
        let store = EntryStore::default();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
        assert!(matches!(store.get_next(None), Ok(None)));
    }

    #[test]
    fn foreign_reference_is_rejected() -> TestResult {
        let mut first = EntryStore::new();
        let mut second = EntryStore::new();
        let entry_ref = first.append(entry("example.org", 1)?);
        second.append(entry("example.org", 1)?);

        assert!(matches!(
            second.get(entry_ref),
            Err(Error::ForeignReference { .. })
        ));
        assert!(matches!(
            second.remove(entry_ref),
            Err(Error::ForeignReference { .. })
        ));
        assert_eq!(second.len(), 1);

        Ok(())
    }

    #[test]
    fn collect_into_store() -> TestResult {
        let store: EntryStore = [entry("a.example.org", 1)?, entry("b.example.org", 2)?]
            .into_iter()
            .collect();
        assert_eq!(store.len(), 2);
        Ok(())
    }
}
