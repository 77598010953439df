//! # Durin's Door
//!
//! Inspect and modify the variables of a compiled program through its DWARF debug info.
//!
//! The debug info is loaded into an [`EntryStream`](reader::EntryStream), a seekable stream of
//! debug entries. From there, [`resolve_type`](descriptor::resolve_type) computes the memory
//! layout of variables and types as [`TypeDescriptor`](descriptor::TypeDescriptor)s, and a
//! [`VariableProxy`](variable::VariableProxy) uses such a layout to read, decode, encode and
//! write the bytes of a variable through a [`MemoryClient`](memory::MemoryClient).
//!
//! The [`NavigationContext`](navigation::NavigationContext) walks compile units, entries and
//! members like directories, and the [`Explorer`](explorer::Explorer) drives all of it from a
//! command line or JSON user interface.
//!
//! ```no_run
//! use durins_door::dwarf_parse::load_debug_file;
//! use durins_door::lookup::find_entry;
//! use durins_door::variable::VariableProxy;
//!
//! # fn main() -> durins_door::errors::Result<()> {
//! let mut reader = load_debug_file("./testcase.dwarf")?;
//! let (entry, _unit) = find_entry(&mut reader, "formula_1_teams")?;
//! let teams = VariableProxy::from_entry(&mut reader, &entry)?;
//! println!("{}", teams.type_descriptor());
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod descriptor;
pub mod dwarf_parse;
pub mod entry;
pub mod errors;
pub mod explorer;
pub mod feedback;
pub mod lookup;
pub mod memory;
pub mod navigation;
pub mod reader;
pub mod ui;
pub mod variable;

#[cfg(test)]
mod fixtures;
