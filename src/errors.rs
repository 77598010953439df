//! # Error Module
//!
//! All fallible operations of this crate return [`Result`], which carries an [`ExplorerError`].
//! Problems found while turning debug entries into a
//! [`TypeDescriptor`](crate::descriptor::TypeDescriptor) are grouped in [`ResolutionError`].
//!
//! None of these errors is fatal: lookups, resolution and memory I/O report them to the
//! caller, who decides what to do.

use thiserror::Error;

use crate::addr::Addr;
use crate::entry::{EntryOffset, EntryTag};

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, ExplorerError>;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Could not find entry {0}")]
    NotFound(String),
    #[error("Could not find field {field} in {owner}")]
    FieldNotFound { field: String, owner: String },
    #[error("Cached value is {available} bytes, too short for field {field} at bytes {start}..{end}", end = .start + .len)]
    FieldOutOfRange {
        field: String,
        start: usize,
        len: usize,
        available: usize,
    },
    #[error("Field {field} starts at bit {bit_offset}, which is not byte aligned")]
    NotByteAligned { field: String, bit_offset: u64 },
    #[error("Field {field} is {bits} bits wide, which is not a whole number of bytes")]
    NotByteSized { field: String, bits: u64 },
    #[error("Field {field} is {bits} bits wide, wider than the 64 bits a field value can hold")]
    FieldTooWide { field: String, bits: u64 },
    #[error("Attempted to set a value of {value_bits} bits, larger than the type with {type_bits} bits")]
    SizeMismatch { value_bits: u64, type_bits: u64 },
    #[error("Variable {0} has no value yet, read or set it first")]
    Uninitialized(String),
    #[error("Cannot access memory for {0}: no memory client is set")]
    NoClient(String),
    #[error("Read the incorrect number of bytes, expected {expected} but got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("Address {0} translated by offset {1:#x} is not a valid address")]
    NegativeAddress(Addr, i64),
    #[error("Variable {0} has no static location")]
    NoLocation(String),
    #[error("No debug file was loaded")]
    NoDebugFile,
    #[error("No debug entry at offset {0}")]
    NoSuchOffset(EntryOffset),
    #[error("Unsupported object format: {0}")]
    UnsupportedFormat(String),
    #[error("Could not resolve type: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error while reading DWARF debug info: {0}")]
    Gimli(#[from] gimli::Error),
    #[error("Error while parsing the object file: {0}")]
    Object(#[from] object::Error),
    #[error("Os error: {0}")]
    Os(#[from] nix::Error),
    #[error("Error while working with json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not parse hex bytes: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Could not parse input: {0}")]
    BadInput(String),
    #[error("{0} is not a variable or type")]
    NotAProxy(String),
    #[cfg(feature = "cli")]
    #[error("Error with the command line interface: {0}")]
    Cli(#[from] dialoguer::Error),
}

/// Failures while turning a debug entry into a type layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Could not get bit size of {0}")]
    MissingSize(String),
    #[error("Debug entries ended in the middle of aggregate {0}")]
    TruncatedAggregate(String),
    #[error("{name} is a {tag}, which does not describe a type")]
    UnexpectedKind { name: String, tag: EntryTag },
    #[error("Type reference to offset {0} does not point to an entry")]
    DanglingReference(EntryOffset),
    #[error("Size or offset of {0} does not fit in 64 bits")]
    Overflow(String),
}
