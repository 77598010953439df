//! # Type Descriptor Module
//!
//! Resolves debug entries into [`TypeDescriptor`]s, the DWARF free description of a type's
//! memory layout.
//!
//! The debug info describes `T`, `T[n]`, `const T` and `typedef T` as separate entries that
//! reference each other. [`resolve_type`] follows these references until it reaches the
//! entry that carries the size and the members of the type:
//!
//! 1. the type reference of the entry is followed (entries without one describe themselves)
//! 2. an array layer contributes one dimension per subrange and is unwrapped
//! 3. a `const`/`volatile` layer is unwrapped twice, the name of the entry directly beneath
//!    the qualifier becomes the name of the descriptor
//! 4. typedef layers are unwrapped for their size and members, the name is kept
//!
//! Members of struct, class and union types are resolved recursively. Descriptors hold no
//! references into the reader, they are plain values.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::entry::{DebugEntry, EntryTag};
use crate::errors::{ExplorerError, ResolutionError, Result};
use crate::reader::DebugReader;

/// Layout of a type, as found in the debug info
///
/// Sizes and offsets are in bits. For arrays, [`bit_size`](Self::bit_size) is the size of a
/// single element and [`array_ranges`](Self::array_ranges) has one element count per
/// dimension; scalars have the ranges `[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    name: String,
    bit_size: u64,
    struct_offset: u64,
    array_ranges: Vec<u64>,
    children: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Creates a scalar type descriptor that is not part of an aggregate
    pub fn new(name: impl Into<String>, bit_size: u64) -> Self {
        Self {
            name: name.into(),
            bit_size,
            struct_offset: 0,
            array_ranges: vec![0],
            children: Vec::new(),
        }
    }

    /// Places this type at `struct_offset` bits into its enclosing aggregate
    pub fn with_struct_offset(mut self, struct_offset: u64) -> Self {
        self.struct_offset = struct_offset;
        self
    }

    pub fn with_array_ranges(mut self, array_ranges: Vec<u64>) -> Self {
        self.array_ranges = array_ranges;
        self
    }

    pub fn with_children(mut self, children: Vec<TypeDescriptor>) -> Self {
        self.children = children;
        self
    }

    /// Resolves the type of `entry`, see [`resolve_type`]
    #[inline]
    pub fn resolve<R: DebugReader>(reader: &mut R, entry: &DebugEntry) -> Result<Self> {
        resolve_type(reader, entry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bit_size(&self) -> u64 {
        self.bit_size
    }

    /// Size in bytes, rounded up for sizes that are not a multiple of 8 bits
    pub fn byte_size(&self) -> u64 {
        self.bit_size.div_ceil(8)
    }

    pub fn struct_offset(&self) -> u64 {
        self.struct_offset
    }

    pub fn array_ranges(&self) -> &[u64] {
        &self.array_ranges
    }

    pub fn is_array(&self) -> bool {
        self.array_ranges != [0]
    }

    pub fn children(&self) -> &[TypeDescriptor] {
        &self.children
    }

    /// Finds a direct member by name
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::FieldNotFound`] if there is no such member.
    pub fn get_child(&self, name: &str) -> Result<&TypeDescriptor> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ExplorerError::FieldNotFound {
                field: name.to_string(),
                owner: self.name.clone(),
            })
    }

    pub fn list_children(&self) -> Vec<String> {
        self.children.iter().map(|c| c.name.clone()).collect()
    }

    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        write!(
            f,
            "{:indent$}{}: {} bits at bit {}",
            "",
            self.name,
            self.bit_size,
            self.struct_offset,
            indent = depth * 2
        )?;
        if self.is_array() {
            for range in &self.array_ranges {
                write!(f, "[{range}]")?;
            }
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Reads the entry `entry` refers to with its type attribute, or `entry` itself if it has
/// none. Leaves the cursor right after the returned entry.
fn type_entry_of<R: DebugReader>(reader: &mut R, entry: &DebugEntry) -> Result<DebugEntry> {
    let target = entry.type_ref().unwrap_or(entry.offset());
    reader.seek(target).map_err(|e| match e {
        ExplorerError::NoSuchOffset(o) => ResolutionError::DanglingReference(o).into(),
        other => other,
    })?;
    match reader.next()? {
        Some(t) if !t.is_null() => Ok(t),
        _ => Err(ResolutionError::DanglingReference(target).into()),
    }
}

/// Bit offset of a member in its aggregate, `None` if it does not fit in 64 bits
///
/// Bit fields placed with `DW_AT_bit_offset` count from the most significant bit of their
/// storage unit, which is converted to an offset from the start of the aggregate for a little
/// endian layout.
fn struct_offset_of(entry: &DebugEntry, type_bits: u64, bit_size: u64) -> Option<u64> {
    if let Some(bits) = entry.data_bit_offset() {
        return Some(bits);
    }
    let base = entry.data_member_location().unwrap_or(0).checked_mul(8)?;
    match entry.bit_offset() {
        Some(from_msb) => {
            let storage = match entry.byte_size() {
                Some(bytes) => bytes.checked_mul(8)?,
                None => type_bits,
            };
            base.checked_add(storage)?
                .checked_sub(from_msb)?
                .checked_sub(bit_size)
        }
        None => Some(base),
    }
}

/// Collects one element count per subrange child of the array entry the cursor was just
/// moved past
fn array_ranges_of<R: DebugReader>(reader: &mut R, array: &DebugEntry) -> Result<Vec<u64>> {
    let mut ranges = Vec::new();
    if array.has_children() {
        loop {
            let child = reader
                .next()?
                .ok_or_else(|| ResolutionError::TruncatedAggregate(array.label()))?;
            match child.tag() {
                EntryTag::Null => break,
                EntryTag::SubrangeType => match child.element_count() {
                    Some(count) => ranges.push(count),
                    None => {
                        warn!(
                            "array dimension at {} has no element count, using 0",
                            child.offset()
                        );
                        ranges.push(0);
                    }
                },
                _ => reader.skip_children()?,
            }
        }
    }
    if ranges.is_empty() {
        ranges.push(0);
    }
    Ok(ranges)
}

/// Builds the [`TypeDescriptor`] for a variable, member or type entry
///
/// The descriptor is named after `entry`, except for variables, which are described by
/// the name of their type. A `const` qualifier replaces the name with the one of the entry
/// directly beneath it. The struct offset comes from the data member location of `entry`
/// itself, size and members from the type at the end of the reference chain. Bit field
/// members keep their own bit size.
///
/// Resolution moves the cursor of `reader`. Resolving the same entry again yields an equal
/// descriptor.
///
/// # Errors
///
/// * [`ResolutionError::MissingSize`] if the resolved type has neither a bit nor a byte size
/// * [`ResolutionError::UnexpectedKind`] if the reference chain ends in something that is not
///   a type, like a compile unit or a function
/// * [`ResolutionError::TruncatedAggregate`] if the debug info ends inside a list of members
/// * [`ResolutionError::DanglingReference`] for type references to nowhere
/// * [`ResolutionError::Overflow`] for sizes or offsets beyond 64 bits
pub fn resolve_type<R: DebugReader>(reader: &mut R, entry: &DebugEntry) -> Result<TypeDescriptor> {
    if entry.is_null() {
        return Err(ResolutionError::UnexpectedKind {
            name: entry.label(),
            tag: entry.tag(),
        }
        .into());
    }
    trace!("resolving {}", entry.label());

    let mut name: Option<String> = if entry.tag().is_variable() {
        None
    } else {
        entry.name().map(str::to_string)
    };
    let mut array_ranges: Option<Vec<u64>> = None;
    let mut type_entry = type_entry_of(reader, entry)?;

    if type_entry.tag() == EntryTag::ArrayType {
        array_ranges = Some(array_ranges_of(reader, &type_entry)?);
        type_entry = type_entry_of(reader, &type_entry)?;
    }
    if name.is_none() {
        name = type_entry.name().map(str::to_string);
    }

    loop {
        match type_entry.tag() {
            tag if tag.is_qualifier() && type_entry.type_ref().is_some() => {
                let beneath = type_entry_of(reader, &type_entry)?;
                if let Some(n) = beneath.name() {
                    name = Some(n.to_string());
                }
                type_entry = type_entry_of(reader, &beneath)?;
            }
            EntryTag::Typedef if type_entry.type_ref().is_some() => {
                type_entry = type_entry_of(reader, &type_entry)?;
            }
            // typedef'd arrays
            EntryTag::ArrayType if type_entry.type_ref().is_some() => {
                let ranges = array_ranges_of(reader, &type_entry)?;
                match array_ranges.as_mut() {
                    Some(outer) => outer.extend(ranges),
                    None => array_ranges = Some(ranges),
                }
                type_entry = type_entry_of(reader, &type_entry)?;
            }
            _ => break,
        }
    }

    if !type_entry.tag().is_type() {
        return Err(ResolutionError::UnexpectedKind {
            name: entry.label(),
            tag: type_entry.tag(),
        }
        .into());
    }

    let name = name
        .or_else(|| entry.name().map(str::to_string))
        .unwrap_or_default();

    let type_bits = match (type_entry.bit_size(), type_entry.byte_size()) {
        (Some(bits), _) => bits,
        (None, Some(bytes)) => bytes
            .checked_mul(8)
            .ok_or_else(|| ResolutionError::Overflow(name.clone()))?,
        (None, None) => return Err(ResolutionError::MissingSize(name).into()),
    };
    // bit fields are narrower than their type
    let bit_size = match entry.tag() {
        EntryTag::Member => entry.bit_size().unwrap_or(type_bits),
        _ => type_bits,
    };
    let struct_offset = struct_offset_of(entry, type_bits, bit_size)
        .ok_or_else(|| ResolutionError::Overflow(name.clone()))?;

    let mut children = Vec::new();
    if type_entry.tag().is_aggregate() && type_entry.has_children() {
        loop {
            let child = reader
                .next()?
                .ok_or_else(|| ResolutionError::TruncatedAggregate(name.clone()))?;
            if child.is_null() {
                break;
            }
            if child.tag() != EntryTag::Member {
                trace!("skipping {} in {name}", child.label());
                reader.skip_children()?;
                continue;
            }
            children.push(resolve_type(reader, &child)?);
            // resolving the member moved the cursor away
            reader.seek(child.offset())?;
            reader.next()?;
            reader.skip_children()?;
        }
    }

    let descriptor = TypeDescriptor {
        name,
        bit_size,
        struct_offset,
        array_ranges: array_ranges.unwrap_or_else(|| vec![0]),
        children,
    };
    debug!(
        "resolved {}: {} bits, {} members",
        descriptor.name,
        descriptor.bit_size,
        descriptor.children.len()
    );
    Ok(descriptor)
}
