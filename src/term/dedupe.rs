// src/term/dedupe.rs

//! Content-addressed store for evicted history lines.
//!
//! Identical lines (think repeated build output) are stored once and
//! shared by tag across every terminal holding a reference. Tags are
//! reference counted; an entry is freed when its last holder releases it.
//! The store is single-threaded, like the rest of the core; terminals
//! share it through `Rc<RefCell<_>>`.

use log::{debug, trace};
use std::collections::hash_map::{DefaultHasher, Entry as MapEntry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::glyph::Cell;

/// Stable identifier of a stored line.
pub type Tag = u64;

#[derive(Debug)]
struct Entry {
    cells: Vec<Cell>,
    /// Soft-wrap continuation flag carried with the line.
    cont: bool,
    refs: u32,
}

/// The shared line store.
#[derive(Debug, Default)]
pub struct Deduper {
    entries: HashMap<Tag, Entry>,
    /// Sum of refs across entries, i.e. the number of lines the holders
    /// collectively believe they have.
    total_refs: u64,
}

impl Deduper {
    pub fn new() -> Self {
        Deduper::default()
    }

    fn content_hash(cells: &[Cell], cont: bool) -> Tag {
        let mut hasher = DefaultHasher::new();
        cells.hash(&mut hasher);
        cont.hash(&mut hasher);
        hasher.finish()
    }

    /// Stores a line and returns its tag, holding one reference for the
    /// caller. Identical content shares one entry; a genuine hash
    /// collision falls through to the next free tag.
    pub fn store(&mut self, cells: Vec<Cell>, cont: bool) -> Tag {
        let mut tag = Self::content_hash(&cells, cont);
        loop {
            match self.entries.entry(tag) {
                MapEntry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    if entry.cells == cells && entry.cont == cont {
                        entry.refs += 1;
                        self.total_refs += 1;
                        trace!("dedupe hit for tag {:#018x} (refs {})", tag, entry.refs);
                        return tag;
                    }
                    // Collision with different content. Probe onward.
                    tag = tag.wrapping_add(1);
                }
                MapEntry::Vacant(vacant) => {
                    vacant.insert(Entry {
                        cells,
                        cont,
                        refs: 1,
                    });
                    self.total_refs += 1;
                    return tag;
                }
            }
        }
    }

    /// Takes an additional reference on `tag`.
    pub fn acquire(&mut self, tag: Tag) {
        let entry = self.entries.get_mut(&tag).expect("acquire of unknown tag");
        entry.refs += 1;
        self.total_refs += 1;
    }

    /// Drops one reference; the entry is freed when none remain.
    pub fn release(&mut self, tag: Tag) {
        let entry = self.entries.get_mut(&tag).expect("release of unknown tag");
        entry.refs -= 1;
        self.total_refs -= 1;
        if entry.refs == 0 {
            self.entries.remove(&tag);
        }
    }

    /// The cells of a stored line.
    pub fn lookup(&self, tag: Tag) -> &[Cell] {
        &self.entries.get(&tag).expect("lookup of unknown tag").cells
    }

    /// The continuation flag of a stored line.
    pub fn lookup_cont(&self, tag: Tag) -> bool {
        self.entries.get(&tag).expect("lookup of unknown tag").cont
    }

    pub fn refs(&self, tag: Tag) -> u32 {
        self.entries.get(&tag).map_or(0, |e| e.refs)
    }

    /// (unique stored lines, total referenced lines).
    pub fn stats(&self) -> (usize, u64) {
        (self.entries.len(), self.total_refs)
    }

    /// (bytes held after dedupe, bytes the holders would need without it).
    pub fn stats_bytes(&self) -> (usize, u64) {
        let per_line: usize = std::mem::size_of::<Cell>();
        let stored: usize = self
            .entries
            .values()
            .map(|e| e.cells.len() * per_line)
            .sum();
        let raw: u64 = self
            .entries
            .values()
            .map(|e| (e.cells.len() * per_line) as u64 * u64::from(e.refs))
            .sum();
        (stored, raw)
    }

    /// Logs every entry; wired to a debug key binding.
    pub fn dump(&self) {
        debug!("deduper: {} unique lines, {} refs", self.entries.len(), self.total_refs);
        for (tag, entry) in &self.entries {
            let text: String = entry.cells.iter().map(|c| c.seq.to_char()).collect();
            debug!("  {:#018x} refs={} cont={} |{}|", tag, entry.refs, entry.cont, text.trim_end());
        }
    }
}
