//! # Debug Entry Module
//!
//! Owned representation of one node of the debug info tree.
//!
//! A [`DebugEntry`] carries a tag, the subset of attributes the explorer cares about, and
//! the children flag. Entries are addressed by an [`EntryOffset`], which can be used to
//! [`seek`](crate::reader::DebugReader::seek) a reader back to them. Type references are
//! stored as offsets too, so an entry never borrows from the reader it came from.
//!
//! Children of an entry follow it directly in a preorder stream and are terminated by a
//! null entry ([`EntryTag::Null`]), the same way the DWARF format lays them out.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::addr::Addr;

/// Position of an entry in the debug info
///
/// Offset `0` always refers to the start of the debug info, seeking to it rewinds a reader.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EntryOffset(pub u64);

impl EntryOffset {
    pub const START: EntryOffset = EntryOffset(0);
}

impl Display for EntryOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of a [`DebugEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryTag {
    /// Terminates a list of children
    Null,
    CompileUnit,
    Variable,
    FormalParameter,
    Member,
    StructureType,
    UnionType,
    ClassType,
    ArrayType,
    SubrangeType,
    ConstType,
    VolatileType,
    Typedef,
    BaseType,
    PointerType,
    EnumerationType,
    Enumerator,
    Subprogram,
    Other(u16),
}

impl EntryTag {
    /// Entries with this tag describe a type (and may be the target of a type reference)
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Self::StructureType
                | Self::UnionType
                | Self::ClassType
                | Self::ArrayType
                | Self::ConstType
                | Self::VolatileType
                | Self::Typedef
                | Self::BaseType
                | Self::PointerType
                | Self::EnumerationType
        )
    }

    /// Struct-like types whose members become children of a type descriptor
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::StructureType | Self::UnionType | Self::ClassType)
    }

    pub fn is_qualifier(&self) -> bool {
        matches!(self, Self::ConstType | Self::VolatileType)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable | Self::FormalParameter)
    }
}

impl From<gimli::DwTag> for EntryTag {
    fn from(value: gimli::DwTag) -> Self {
        match value {
            gimli::DW_TAG_null => Self::Null,
            gimli::DW_TAG_compile_unit => Self::CompileUnit,
            gimli::DW_TAG_variable => Self::Variable,
            gimli::DW_TAG_formal_parameter => Self::FormalParameter,
            gimli::DW_TAG_member => Self::Member,
            gimli::DW_TAG_structure_type => Self::StructureType,
            gimli::DW_TAG_union_type => Self::UnionType,
            gimli::DW_TAG_class_type => Self::ClassType,
            gimli::DW_TAG_array_type => Self::ArrayType,
            gimli::DW_TAG_subrange_type => Self::SubrangeType,
            gimli::DW_TAG_const_type => Self::ConstType,
            gimli::DW_TAG_volatile_type => Self::VolatileType,
            gimli::DW_TAG_typedef => Self::Typedef,
            gimli::DW_TAG_base_type => Self::BaseType,
            gimli::DW_TAG_pointer_type => Self::PointerType,
            gimli::DW_TAG_enumeration_type => Self::EnumerationType,
            gimli::DW_TAG_enumerator => Self::Enumerator,
            gimli::DW_TAG_subprogram => Self::Subprogram,
            other => Self::Other(other.0),
        }
    }
}

impl Display for EntryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null entry"),
            Self::CompileUnit => write!(f, "compile unit"),
            Self::Variable => write!(f, "variable"),
            Self::FormalParameter => write!(f, "formal parameter"),
            Self::Member => write!(f, "member"),
            Self::StructureType => write!(f, "struct type"),
            Self::UnionType => write!(f, "union type"),
            Self::ClassType => write!(f, "class type"),
            Self::ArrayType => write!(f, "array type"),
            Self::SubrangeType => write!(f, "subrange type"),
            Self::ConstType => write!(f, "const type"),
            Self::VolatileType => write!(f, "volatile type"),
            Self::Typedef => write!(f, "typedef"),
            Self::BaseType => write!(f, "base type"),
            Self::PointerType => write!(f, "pointer type"),
            Self::EnumerationType => write!(f, "enumeration type"),
            Self::Enumerator => write!(f, "enumerator"),
            Self::Subprogram => write!(f, "subprogram"),
            Self::Other(raw) => match gimli::DwTag(*raw).static_string() {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "unknown tag {raw:#x}"),
            },
        }
    }
}

/// The attributes the explorer reads from debug entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attr {
    Name,
    ByteSize,
    BitSize,
    DataMemberLocation,
    DataBitOffset,
    BitOffset,
    Type,
    Count,
    LowerBound,
    UpperBound,
    Location,
    LowPc,
    CompDir,
}

impl Attr {
    pub fn from_gimli(at: gimli::DwAt) -> Option<Self> {
        Some(match at {
            gimli::DW_AT_name => Self::Name,
            gimli::DW_AT_byte_size => Self::ByteSize,
            gimli::DW_AT_bit_size => Self::BitSize,
            gimli::DW_AT_data_member_location => Self::DataMemberLocation,
            gimli::DW_AT_data_bit_offset => Self::DataBitOffset,
            gimli::DW_AT_bit_offset => Self::BitOffset,
            gimli::DW_AT_type => Self::Type,
            gimli::DW_AT_count => Self::Count,
            gimli::DW_AT_lower_bound => Self::LowerBound,
            gimli::DW_AT_upper_bound => Self::UpperBound,
            gimli::DW_AT_location => Self::Location,
            gimli::DW_AT_low_pc => Self::LowPc,
            gimli::DW_AT_comp_dir => Self::CompDir,
            _ => return None,
        })
    }

    fn dwarf_name(&self) -> &'static str {
        match self {
            Self::Name => "DW_AT_name",
            Self::ByteSize => "DW_AT_byte_size",
            Self::BitSize => "DW_AT_bit_size",
            Self::DataMemberLocation => "DW_AT_data_member_location",
            Self::DataBitOffset => "DW_AT_data_bit_offset",
            Self::BitOffset => "DW_AT_bit_offset",
            Self::Type => "DW_AT_type",
            Self::Count => "DW_AT_count",
            Self::LowerBound => "DW_AT_lower_bound",
            Self::UpperBound => "DW_AT_upper_bound",
            Self::Location => "DW_AT_location",
            Self::LowPc => "DW_AT_low_pc",
            Self::CompDir => "DW_AT_comp_dir",
        }
    }
}

/// Value of an [`Attr`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    Udata(u64),
    Sdata(i64),
    String(String),
    /// Reference to another entry
    Ref(EntryOffset),
    Address(u64),
    Flag(bool),
    /// A location expression that could not be reduced to a constant
    Expr(Vec<u8>),
}

impl AttrValue {
    pub fn udata(&self) -> Option<u64> {
        match self {
            Self::Udata(v) => Some(*v),
            Self::Sdata(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn sdata(&self) -> Option<i64> {
        match self {
            Self::Sdata(v) => Some(*v),
            Self::Udata(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn entry_ref(&self) -> Option<EntryOffset> {
        match self {
            Self::Ref(o) => Some(*o),
            _ => None,
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udata(v) => write!(f, "{v}"),
            Self::Sdata(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Ref(o) => write!(f, "<{o}>"),
            Self::Address(a) => write!(f, "{a:#x}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Expr(e) => write!(f, "expr {}", hex::encode(e)),
        }
    }
}

/// One node of the debug info tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEntry {
    offset: EntryOffset,
    tag: EntryTag,
    children: bool,
    attrs: Vec<(Attr, AttrValue)>,
    unit: EntryOffset,
}

impl DebugEntry {
    pub fn new(offset: EntryOffset, tag: EntryTag, children: bool) -> Self {
        Self {
            offset,
            tag,
            children,
            attrs: Vec::new(),
            unit: EntryOffset::START,
        }
    }

    /// The entry terminating a list of children
    pub fn null() -> Self {
        Self::new(EntryOffset::START, EntryTag::Null, false)
    }

    pub fn with_attr(mut self, attr: Attr, value: AttrValue) -> Self {
        self.set_attr(attr, value);
        self
    }

    /// Sets an attribute, replacing an earlier value of the same attribute
    pub fn set_attr(&mut self, attr: Attr, value: AttrValue) {
        match self.attrs.iter_mut().find(|(a, _)| *a == attr) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((attr, value)),
        }
    }

    pub(crate) fn set_unit(&mut self, unit: EntryOffset) {
        self.unit = unit;
    }

    #[inline]
    pub fn offset(&self) -> EntryOffset {
        self.offset
    }

    #[inline]
    pub fn tag(&self) -> EntryTag {
        self.tag
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.children
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.tag == EntryTag::Null
    }

    /// Offset of the compile unit this entry belongs to
    #[inline]
    pub fn unit(&self) -> EntryOffset {
        self.unit
    }

    pub fn attrs(&self) -> &[(Attr, AttrValue)] {
        &self.attrs
    }

    pub fn attr(&self, attr: Attr) -> Option<&AttrValue> {
        self.attrs.iter().find(|(a, _)| *a == attr).map(|(_, v)| v)
    }

    pub fn has_attr(&self, attr: Attr) -> bool {
        self.attr(attr).is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.attr(Attr::Name).and_then(AttrValue::as_str)
    }

    /// Name for messages, falls back to the tag and offset for anonymous entries
    pub fn label(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("<anonymous {} at {}>", self.tag, self.offset),
        }
    }

    pub fn type_ref(&self) -> Option<EntryOffset> {
        self.attr(Attr::Type).and_then(AttrValue::entry_ref)
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.attr(Attr::ByteSize).and_then(AttrValue::udata)
    }

    pub fn bit_size(&self) -> Option<u64> {
        self.attr(Attr::BitSize).and_then(AttrValue::udata)
    }

    /// Byte offset of a member within its enclosing aggregate
    pub fn data_member_location(&self) -> Option<u64> {
        self.attr(Attr::DataMemberLocation)
            .and_then(AttrValue::udata)
    }

    pub fn data_bit_offset(&self) -> Option<u64> {
        self.attr(Attr::DataBitOffset).and_then(AttrValue::udata)
    }

    /// Bit offset of a bit field from the most significant bit of its storage unit, the
    /// DWARF 2 and 3 way of placing bit fields
    pub fn bit_offset(&self) -> Option<u64> {
        self.attr(Attr::BitOffset).and_then(AttrValue::udata)
    }

    /// Number of elements described by a subrange entry
    ///
    /// Uses `DW_AT_count`, or `DW_AT_upper_bound - DW_AT_lower_bound + 1` if only the bounds
    /// are given.
    pub fn element_count(&self) -> Option<u64> {
        if let Some(count) = self.attr(Attr::Count).and_then(AttrValue::udata) {
            return Some(count);
        }
        let upper = self.attr(Attr::UpperBound).and_then(AttrValue::sdata)?;
        let lower = self
            .attr(Attr::LowerBound)
            .and_then(AttrValue::sdata)
            .unwrap_or(0);
        // an upper bound of -1 is emitted for zero length arrays
        let count = upper.checked_sub(lower)?.checked_add(1)?;
        u64::try_from(count).ok()
    }

    pub fn low_pc(&self) -> Option<u64> {
        match self.attr(Attr::LowPc)? {
            AttrValue::Address(a) => Some(*a),
            other => other.udata(),
        }
    }

    /// Static address of a variable, as given by its location expression
    ///
    /// Only `DW_OP_addr <address>` expressions describe a static address, the address bytes
    /// follow the opcode in little endian order.
    pub fn location(&self) -> Option<Addr> {
        match self.attr(Attr::Location)? {
            AttrValue::Address(a) => Some(Addr::from(*a)),
            AttrValue::Expr(expr) => parse_addr_expression(expr),
            _ => None,
        }
    }
}

fn parse_addr_expression(expr: &[u8]) -> Option<Addr> {
    let (op, raw) = expr.split_first()?;
    if *op != gimli::DW_OP_addr.0 || raw.is_empty() || raw.len() > 8 {
        return None;
    }
    let addr = raw
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));
    Some(Addr::from(addr))
}

impl Display for DebugEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tag: {}", self.tag)?;
        writeln!(f, "  Children: {}", self.children)?;
        writeln!(f, "  Offset: {}", self.offset)?;
        for (attr, value) in &self.attrs {
            match attr {
                Attr::Location => match self.location() {
                    Some(addr) => writeln!(f, "  {}: {addr}", attr.dwarf_name())?,
                    None => writeln!(f, "  {}: {value}", attr.dwarf_name())?,
                },
                _ => writeln!(f, "  {}: {value}", attr.dwarf_name())?,
            }
        }
        Ok(())
    }
}
