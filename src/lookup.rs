//! # Entry Lookup Module
//!
//! Name and tag based searches over a [`DebugReader`].
//!
//! Lookups start at the reader's current cursor position. Consecutive lookups usually target
//! entries that come after the previous one, so [`find_entry`] only wraps around to the start
//! of the debug info when the remaining entries do not contain the name.

use tracing::{debug, trace};

use crate::entry::{DebugEntry, EntryTag};
use crate::errors::{ExplorerError, ResolutionError, Result};
use crate::reader::DebugReader;

fn find_in_remaining<R: DebugReader>(reader: &mut R, name: &str) -> Result<Option<DebugEntry>> {
    while let Some(entry) = reader.next()? {
        if entry.name() == Some(name) {
            trace!("found {name} at {}", entry.offset());
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Searches for an entry by name
///
/// The search scans the entries after the cursor first. If the end of the debug info is
/// reached without a match, the reader is rewound and searched once more from the start.
/// On success, the cursor is left right after the returned entry.
///
/// Returns the entry together with the compile unit that contains it, if there is one.
///
/// # Errors
///
/// Fails with [`ExplorerError::NotFound`] if neither pass finds an entry with that name.
pub fn find_entry<R: DebugReader>(
    reader: &mut R,
    name: &str,
) -> Result<(DebugEntry, Option<DebugEntry>)> {
    let entry = match find_in_remaining(reader, name)? {
        Some(entry) => entry,
        None => {
            debug!("{name} is not after the cursor, searching again from the start");
            reader.rewind()?;
            find_in_remaining(reader, name)?
                .ok_or_else(|| ExplorerError::NotFound(name.to_string()))?
        }
    };
    let unit = enclosing_unit(reader, &entry)?;
    Ok((entry, unit))
}

/// Gets the compile unit containing `entry`
///
/// Leaves the cursor right after `entry`.
pub fn enclosing_unit<R: DebugReader>(
    reader: &mut R,
    entry: &DebugEntry,
) -> Result<Option<DebugEntry>> {
    if entry.tag() == EntryTag::CompileUnit {
        return Ok(Some(entry.clone()));
    }
    reader.seek(entry.unit())?;
    let unit = reader
        .next()?
        .filter(|u| u.tag() == EntryTag::CompileUnit);
    reader.seek(entry.offset())?;
    reader.next()?;
    Ok(unit)
}

/// Collects all compile units, skipping over their contents
pub fn list_compile_units<R: DebugReader>(reader: &mut R) -> Result<Vec<DebugEntry>> {
    reader.rewind()?;
    let mut units = Vec::new();
    while let Some(entry) = reader.next()? {
        if entry.tag() == EntryTag::CompileUnit {
            reader.skip_children()?;
            units.push(entry);
        }
    }
    debug!("found {} compile units", units.len());
    Ok(units)
}

/// Collects the immediate children of `parent` that match `predicate`
///
/// Grandchildren are skipped. Leaves the cursor after the last child of `parent`.
///
/// # Errors
///
/// Fails with [`ResolutionError::TruncatedAggregate`] if the debug info ends before the list
/// of children is terminated.
pub fn list_children<R, F>(
    reader: &mut R,
    parent: &DebugEntry,
    predicate: F,
) -> Result<Vec<DebugEntry>>
where
    R: DebugReader,
    F: Fn(&DebugEntry) -> bool,
{
    reader.seek(parent.offset())?;
    reader.next()?;
    let mut children = Vec::new();
    if !parent.has_children() {
        return Ok(children);
    }
    loop {
        let child = reader
            .next()?
            .ok_or_else(|| ResolutionError::TruncatedAggregate(parent.label()))?;
        if child.is_null() {
            break;
        }
        reader.skip_children()?;
        if predicate(&child) {
            children.push(child);
        }
    }
    Ok(children)
}

/// Children worth stepping into: variables and named type definitions
pub fn is_explorable(entry: &DebugEntry) -> bool {
    entry.name().is_some() && (entry.tag().is_variable() || entry.tag().is_type())
}
