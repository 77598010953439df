//! # DWARF Loading Module
//!
//! Turns the debug info of an object file into an [`EntryStream`].
//!
//! The object format is chosen by the host platform: Mach-O on macOS, ELF everywhere else.
//! The `.debug_*` sections are read with [`object`] and walked unit by unit with [`gimli`].
//! Every debugging information entry becomes an owned [`DebugEntry`]; unit relative
//! references are rewritten to `.debug_info` offsets so they can be used with
//! [`DebugReader::seek`](crate::reader::DebugReader::seek) across units.

use std::borrow::Cow;
use std::path::Path;
use std::rc::Rc;

use gimli::{AttributeValue, Reader, Unit};
use object::{Object, ObjectSection};
use tracing::{debug, info, trace};

use crate::entry::{Attr, AttrValue, DebugEntry, EntryOffset, EntryTag};
use crate::errors::{ExplorerError, Result};
use crate::reader::EntryStream;

// the gimli::Reader we use
pub(crate) type GimliReaderThing = gimli::EndianRcSlice<gimli::RunTimeEndian>;

/// The object format debug files are expected in on this host
pub fn host_format() -> object::BinaryFormat {
    if cfg!(target_os = "macos") {
        object::BinaryFormat::MachO
    } else {
        object::BinaryFormat::Elf
    }
}

/// Reads a debug file from disk and loads all of its debug entries
///
/// # Errors
///
/// Fails if the file cannot be read, is not an object file of the [host format](host_format)
/// or contains malformed DWARF.
pub fn load_debug_file(path: impl AsRef<Path>) -> Result<EntryStream> {
    let path = path.as_ref();
    info!("loading debug info from {}", path.display());
    let data = std::fs::read(path)?;
    parse_debug_data(&data)
}

/// Loads all debug entries of an object file that is already in memory
pub fn parse_debug_data(data: &[u8]) -> Result<EntryStream> {
    let object_info = object::File::parse(data)?;
    if object_info.format() != host_format() {
        return Err(ExplorerError::UnsupportedFormat(format!(
            "found {:?}, this host reads {:?}",
            object_info.format(),
            host_format()
        )));
    }
    let endian = if object_info.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };

    let loader = |section: gimli::SectionId| -> Result<GimliReaderThing> {
        let data: Cow<[u8]> = match object_info.section_by_name(section.name()) {
            Some(s) => s.uncompressed_data()?,
            None => Cow::Borrowed(&[]),
        };
        Ok(GimliReaderThing::new(Rc::from(data.as_ref()), endian))
    };
    let dwarf = gimli::Dwarf::load(loader)?;
    load_entries(&dwarf)
}

fn load_entries(dwarf: &gimli::Dwarf<GimliReaderThing>) -> Result<EntryStream> {
    let mut entries = Vec::new();
    let mut units = dwarf.units();

    while let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        let mut unit_entry: Option<EntryOffset> = None;
        let mut cursor = unit.entries();
        while cursor.next_entry()?.is_some() {
            match cursor.current() {
                None => entries.push(DebugEntry::null()),
                Some(die) => {
                    let mut entry = entry_from_gimli(dwarf, &unit, die)?;
                    let cu = *unit_entry.get_or_insert(entry.offset());
                    entry.set_unit(cu);
                    entries.push(entry);
                }
            }
        }
        debug!("loaded unit at {:?}", unit_entry);
    }

    debug!("loaded {} debug entries", entries.len());
    Ok(EntryStream::new(entries))
}

fn global_offset(unit: &Unit<GimliReaderThing>, offset: gimli::UnitOffset) -> Option<EntryOffset> {
    offset
        .to_debug_info_offset(&unit.header)
        .map(|o| EntryOffset(o.0 as u64))
}

fn entry_from_gimli(
    dwarf: &gimli::Dwarf<GimliReaderThing>,
    unit: &Unit<GimliReaderThing>,
    die: &gimli::DebuggingInformationEntry<'_, '_, GimliReaderThing>,
) -> Result<DebugEntry> {
    let offset = global_offset(unit, die.offset()).ok_or_else(|| {
        ExplorerError::UnsupportedFormat("entries outside of .debug_info".to_string())
    })?;
    let mut entry = DebugEntry::new(offset, EntryTag::from(die.tag()), die.has_children());

    let mut attrs = die.attrs();
    while let Some(raw) = attrs.next()? {
        let Some(attr) = Attr::from_gimli(raw.name()) else {
            continue;
        };
        match parse_attr_value(dwarf, unit, attr, &raw)? {
            Some(value) => entry.set_attr(attr, value),
            None => trace!("ignoring {} of {offset}: {:?}", raw.name(), raw.value()),
        }
    }
    Ok(entry)
}

fn parse_attr_value(
    dwarf: &gimli::Dwarf<GimliReaderThing>,
    unit: &Unit<GimliReaderThing>,
    attr: Attr,
    raw: &gimli::Attribute<GimliReaderThing>,
) -> Result<Option<AttrValue>> {
    Ok(match attr {
        Attr::Name | Attr::CompDir => Some(AttrValue::String(
            dwarf
                .attr_string(unit, raw.value())?
                .to_string_lossy()?
                .into_owned(),
        )),
        Attr::Type => match raw.value() {
            AttributeValue::UnitRef(o) => global_offset(unit, o).map(AttrValue::Ref),
            AttributeValue::DebugInfoRef(o) => Some(AttrValue::Ref(EntryOffset(o.0 as u64))),
            _ => None,
        },
        Attr::LowPc => dwarf
            .attr_address(unit, raw.value())?
            .map(AttrValue::Address),
        Attr::Location | Attr::DataMemberLocation => match raw.value() {
            AttributeValue::Exprloc(expr) => Some(reduce_expression(dwarf, unit, expr)?),
            _ => parse_constant(raw),
        },
        _ => parse_constant(raw),
    })
}

fn parse_constant(raw: &gimli::Attribute<GimliReaderThing>) -> Option<AttrValue> {
    match raw.value() {
        AttributeValue::Sdata(v) => Some(AttrValue::Sdata(v)),
        AttributeValue::Flag(b) => Some(AttrValue::Flag(b)),
        _ => raw.udata_value().map(AttrValue::Udata),
    }
}

/// Reduces single operation expressions to constants
///
/// `DW_OP_addr` and `DW_OP_addrx` become [`AttrValue::Address`], `DW_OP_plus_uconst` (member
/// locations in older DWARF versions) becomes [`AttrValue::Udata`]. Anything else is kept
/// as raw bytes.
fn reduce_expression(
    dwarf: &gimli::Dwarf<GimliReaderThing>,
    unit: &Unit<GimliReaderThing>,
    expr: gimli::Expression<GimliReaderThing>,
) -> Result<AttrValue> {
    let mut ops = expr.clone().operations(unit.encoding());
    let first = ops.next()?;
    let single = ops.next()?.is_none();

    Ok(match (first, single) {
        (Some(gimli::Operation::Address { address }), true) => AttrValue::Address(address),
        (Some(gimli::Operation::AddressIndex { index }), true) => {
            AttrValue::Address(dwarf.address(unit, index)?)
        }
        (Some(gimli::Operation::PlusConstant { value }), true) => AttrValue::Udata(value),
        _ => AttrValue::Expr(expr.0.to_slice()?.into_owned()),
    })
}
