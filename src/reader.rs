//! # Debug Reader Module
//!
//! Sequential access to debug entries.
//!
//! The [`DebugReader`] trait is the cursor every lookup and resolution in this crate works
//! with: [`next`](DebugReader::next) walks the entries depth first in preorder (including
//! the null entries closing a list of children), [`seek`](DebugReader::seek) repositions the
//! cursor to an entry offset and [`skip_children`](DebugReader::skip_children) jumps over the
//! subtree of the entry returned last.
//!
//! [`EntryStream`] is the owned implementation of the trait. It is produced from an object
//! file by [`dwarf_parse`](crate::dwarf_parse) or assembled by hand with an
//! [`EntryStreamBuilder`].

use std::collections::HashMap;

use tracing::trace;

use crate::entry::{Attr, AttrValue, DebugEntry, EntryOffset, EntryTag};
use crate::errors::{ExplorerError, Result};

/// A stateful cursor over debug entries
///
/// Readers are single threaded: every operation moves the one cursor they own.
pub trait DebugReader {
    /// Returns the entry under the cursor and advances it, `None` at the end of the stream
    fn next(&mut self) -> Result<Option<DebugEntry>>;

    /// Moves the cursor so that the next call to [`next`](DebugReader::next) returns the
    /// entry at `offset`. Seeking to [`EntryOffset::START`] rewinds the reader.
    fn seek(&mut self, offset: EntryOffset) -> Result<()>;

    /// Skips the children of the entry returned last. No-op if that entry had no children
    /// or nothing was returned since the last seek.
    fn skip_children(&mut self) -> Result<()>;

    fn rewind(&mut self) -> Result<()> {
        self.seek(EntryOffset::START)
    }
}

/// Owned, seekable stream of debug entries
#[derive(Debug, Clone, Default)]
pub struct EntryStream {
    entries: Vec<DebugEntry>,
    index: HashMap<EntryOffset, usize>,
    position: usize,
    last: Option<usize>,
}

impl EntryStream {
    /// Creates a stream from entries in preorder, null entries included
    pub fn new(entries: Vec<DebugEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_null())
            .map(|(i, e)| (e.offset(), i))
            .collect();
        Self {
            entries,
            index,
            position: 0,
            last: None,
        }
    }

    pub fn builder() -> EntryStreamBuilder {
        EntryStreamBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }
}

impl DebugReader for EntryStream {
    fn next(&mut self) -> Result<Option<DebugEntry>> {
        match self.entries.get(self.position) {
            None => {
                self.last = None;
                Ok(None)
            }
            Some(entry) => {
                self.last = Some(self.position);
                self.position += 1;
                Ok(Some(entry.clone()))
            }
        }
    }

    fn seek(&mut self, offset: EntryOffset) -> Result<()> {
        trace!("seek to {offset}");
        self.position = if offset == EntryOffset::START {
            0
        } else {
            *self
                .index
                .get(&offset)
                .ok_or(ExplorerError::NoSuchOffset(offset))?
        };
        self.last = None;
        Ok(())
    }

    fn skip_children(&mut self) -> Result<()> {
        let Some(last) = self.last.take() else {
            return Ok(());
        };
        if !self.entries[last].has_children() {
            return Ok(());
        }
        let mut depth = 1usize;
        while depth > 0 {
            let Some(entry) = self.entries.get(self.position) else {
                break;
            };
            self.position += 1;
            if entry.is_null() {
                depth -= 1;
            } else if entry.has_children() {
                depth += 1;
            }
        }
        Ok(())
    }
}

/// Assembles an [`EntryStream`] entry by entry
///
/// Offsets are handed out sequentially, so a type reference can point to any entry that was
/// added before the referring one.
///
/// ```
/// use durins_door::entry::{Attr, AttrValue, EntryTag};
/// use durins_door::reader::{DebugReader, EntryStream};
///
/// let mut builder = EntryStream::builder();
/// builder.begin(EntryTag::CompileUnit, [(Attr::Name, AttrValue::String("main.c".into()))]);
/// let int = builder.leaf(
///     EntryTag::BaseType,
///     [
///         (Attr::Name, AttrValue::String("int".into())),
///         (Attr::ByteSize, AttrValue::Udata(4)),
///     ],
/// );
/// builder.leaf(
///     EntryTag::Variable,
///     [
///         (Attr::Name, AttrValue::String("counter".into())),
///         (Attr::Type, AttrValue::Ref(int)),
///     ],
/// );
/// let mut stream = builder.build();
///
/// assert_eq!(stream.next().unwrap().unwrap().tag(), EntryTag::CompileUnit);
/// ```
#[derive(Debug, Clone)]
pub struct EntryStreamBuilder {
    entries: Vec<DebugEntry>,
    open: usize,
    next_offset: u64,
    unit: EntryOffset,
}

impl Default for EntryStreamBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            open: 0,
            // leave room for a unit header, offset 0 means "start of stream"
            next_offset: 0xb,
            unit: EntryOffset::START,
        }
    }
}

impl EntryStreamBuilder {
    fn push(
        &mut self,
        tag: EntryTag,
        children: bool,
        attrs: impl IntoIterator<Item = (Attr, AttrValue)>,
    ) -> EntryOffset {
        let offset = EntryOffset(self.next_offset);
        self.next_offset += 1;
        if tag == EntryTag::CompileUnit {
            self.unit = offset;
        }
        let mut entry = DebugEntry::new(offset, tag, children);
        for (attr, value) in attrs {
            entry.set_attr(attr, value);
        }
        entry.set_unit(self.unit);
        self.entries.push(entry);
        offset
    }

    /// Adds an entry with children; everything added until the matching
    /// [`end`](Self::end) becomes its child
    pub fn begin(
        &mut self,
        tag: EntryTag,
        attrs: impl IntoIterator<Item = (Attr, AttrValue)>,
    ) -> EntryOffset {
        self.open += 1;
        self.push(tag, true, attrs)
    }

    /// Adds an entry without children
    pub fn leaf(
        &mut self,
        tag: EntryTag,
        attrs: impl IntoIterator<Item = (Attr, AttrValue)>,
    ) -> EntryOffset {
        self.push(tag, false, attrs)
    }

    /// Closes the entry opened last
    pub fn end(&mut self) {
        if self.open > 0 {
            self.open -= 1;
            self.entries.push(DebugEntry::null());
        }
    }

    /// Closes all open entries and returns the finished stream
    pub fn build(mut self) -> EntryStream {
        while self.open > 0 {
            self.end();
        }
        EntryStream::new(self.entries)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn named(name: &str) -> [(Attr, AttrValue); 1] {
        [(Attr::Name, AttrValue::String(name.to_string()))]
    }

    fn sample() -> (EntryStream, EntryOffset, EntryOffset) {
        let mut b = EntryStream::builder();
        b.begin(EntryTag::CompileUnit, named("a.c"));
        let s = b.begin(EntryTag::StructureType, named("S"));
        b.leaf(EntryTag::Member, named("x"));
        b.begin(EntryTag::UnionType, named("inner"));
        b.leaf(EntryTag::Member, named("y"));
        b.end();
        b.end();
        let v = b.leaf(EntryTag::Variable, named("v"));
        b.end();
        (b.build(), s, v)
    }

    fn names(stream: &mut EntryStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(e) = stream.next().unwrap() {
            out.push(e.name().unwrap_or("-").to_string());
        }
        out
    }

    #[test]
    fn test_preorder_with_null_entries() {
        let (mut stream, _, _) = sample();
        assert_eq!(
            names(&mut stream),
            ["a.c", "S", "x", "inner", "y", "-", "-", "v", "-"]
        );
        assert!(stream.next().unwrap().is_none());
    }

    #[test]
    fn test_seek_and_rewind() {
        let (mut stream, _, v) = sample();
        stream.seek(v).unwrap();
        assert_eq!(stream.next().unwrap().unwrap().name(), Some("v"));
        stream.rewind().unwrap();
        assert_eq!(stream.next().unwrap().unwrap().name(), Some("a.c"));
        assert!(matches!(
            stream.seek(EntryOffset(0x999)),
            Err(ExplorerError::NoSuchOffset(EntryOffset(0x999)))
        ));
    }

    #[test]
    fn test_skip_children() {
        let (mut stream, s, _) = sample();
        stream.seek(s).unwrap();
        stream.next().unwrap();
        stream.skip_children().unwrap();
        assert_eq!(stream.next().unwrap().unwrap().name(), Some("v"));

        // no entry returned since the seek
        stream.seek(s).unwrap();
        stream.skip_children().unwrap();
        assert_eq!(stream.next().unwrap().unwrap().name(), Some("S"));
    }

    #[test]
    fn test_units_are_recorded() {
        let (stream, _, _) = sample();
        let unit = stream.entries()[0].offset();
        assert!(stream
            .entries()
            .iter()
            .filter(|e| !e.is_null())
            .all(|e| e.unit() == unit));
    }
}
