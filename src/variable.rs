//! # Variable Module
//!
//! A [`VariableProxy`] is a named, typed and addressed handle onto the memory of the explored
//! program. It caches the raw bytes of the variable, decodes and encodes single fields of
//! that buffer and moves it from and to a [`MemoryClient`].
//!
//! Field values are big-endian unsigned integers of at most 64 bits. Fields must start on a
//! byte boundary.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::addr::Addr;
use crate::descriptor::{resolve_type, TypeDescriptor};
use crate::entry::DebugEntry;
use crate::errors::{ExplorerError, Result};
use crate::memory::MemoryClient;
use crate::reader::DebugReader;

/// A variable of the explored program
///
/// The cached value is never longer than the type: `value.len() * 8 <= bit_size`.
///
/// The proxy only holds a weak reference to its memory client, the client is owned by
/// whoever created it.
#[derive(Debug, Clone)]
pub struct VariableProxy {
    name: String,
    ty: TypeDescriptor,
    address: Addr,
    value: Option<Vec<u8>>,
    client: Option<Weak<RefCell<dyn MemoryClient>>>,
}

impl VariableProxy {
    /// Creates a proxy for a variable entry, resolving its type
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::NoLocation`] if the variable does not have a static
    /// address (locals, optimized out variables), or if its type cannot be resolved.
    pub fn from_entry<R: DebugReader>(reader: &mut R, entry: &DebugEntry) -> Result<Self> {
        let address = entry
            .location()
            .ok_or_else(|| ExplorerError::NoLocation(entry.label()))?;
        let ty = resolve_type(reader, entry)?;
        debug!("created proxy for {} at {address}", entry.label());
        Ok(Self::from_descriptor(entry.label(), ty, address))
    }

    /// Creates a proxy for a variable with a known layout
    pub fn from_descriptor(name: impl Into<String>, ty: TypeDescriptor, address: Addr) -> Self {
        Self {
            name: name.into(),
            ty,
            address,
            value: None,
            client: None,
        }
    }

    /// Sets the memory client used by [`read`](Self::read) and [`write`](Self::write)
    pub fn set_client(&mut self, client: &Rc<RefCell<dyn MemoryClient>>) {
        self.client = Some(Rc::downgrade(client));
    }

    pub fn with_client(mut self, client: &Rc<RefCell<dyn MemoryClient>>) -> Self {
        self.set_client(client);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Addr {
        self.address
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.ty
    }

    /// The cached value, `None` if the variable was never read or set
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Gets the cached value
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::Uninitialized`] if nothing was read or set yet. An empty
    /// value that was set explicitly is returned normally.
    pub fn get(&self) -> Result<&[u8]> {
        self.value
            .as_deref()
            .ok_or_else(|| ExplorerError::Uninitialized(self.name.clone()))
    }

    /// Replaces the cached value
    ///
    /// Values shorter than the type are accepted.
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::SizeMismatch`] if the value has more bits than the type. The
    /// cached value is not changed in that case.
    pub fn set(&mut self, value: impl Into<Vec<u8>>) -> Result<()> {
        let value = value.into();
        let value_bits = value.len() as u64 * 8;
        if value_bits > self.ty.bit_size() {
            return Err(ExplorerError::SizeMismatch {
                value_bits,
                type_bits: self.ty.bit_size(),
            });
        }
        trace!("{} = {}", self.name, hex::encode(&value));
        self.value = Some(value);
        Ok(())
    }

    /// Byte span of a member field in the cached value
    fn field_span(&self, field: &str) -> Result<(usize, usize)> {
        let child = self.ty.get_child(field)?;
        if child.struct_offset() % 8 != 0 {
            return Err(ExplorerError::NotByteAligned {
                field: field.to_string(),
                bit_offset: child.struct_offset(),
            });
        }
        if child.bit_size() % 8 != 0 {
            return Err(ExplorerError::NotByteSized {
                field: field.to_string(),
                bits: child.bit_size(),
            });
        }
        let start = (child.struct_offset() / 8) as usize;
        let len = child.byte_size() as usize;
        Ok((start, len))
    }

    fn out_of_range(field: &str, start: usize, len: usize, available: usize) -> ExplorerError {
        ExplorerError::FieldOutOfRange {
            field: field.to_string(),
            start,
            len,
            available,
        }
    }

    /// Decodes a member field of the cached value as a big-endian unsigned integer
    ///
    /// # Errors
    ///
    /// * [`ExplorerError::FieldNotFound`] if the type has no such member
    /// * [`ExplorerError::NotByteAligned`] and [`ExplorerError::NotByteSized`] for bit fields
    /// * [`ExplorerError::FieldTooWide`] for fields wider than 64 bits
    /// * [`ExplorerError::FieldOutOfRange`] if the cached value ends before the field does
    pub fn get_field(&self, field: &str) -> Result<u64> {
        let (start, len) = self.field_span(field)?;
        if len > 8 {
            return Err(ExplorerError::FieldTooWide {
                field: field.to_string(),
                bits: len as u64 * 8,
            });
        }
        let value = self.get()?;
        let bytes = value
            .get(start..start + len)
            .ok_or_else(|| Self::out_of_range(field, start, len, value.len()))?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Encodes `value` big-endian into a member field of the cached value
    ///
    /// The value is truncated to the byte width of the field, wider fields are padded with
    /// leading zero bytes. All other bytes of the cached value stay untouched.
    ///
    /// # Errors
    ///
    /// Like [`get_field`](Self::get_field), except that there is no width limit.
    pub fn set_field(&mut self, field: &str, value: u64) -> Result<()> {
        let (start, len) = self.field_span(field)?;
        let name = self.name.clone();
        let cached = self
            .value
            .as_mut()
            .ok_or(ExplorerError::Uninitialized(name))?;
        let available = cached.len();
        let span = cached
            .get_mut(start..start + len)
            .ok_or_else(|| Self::out_of_range(field, start, len, available))?;

        let be = value.to_be_bytes();
        if len <= be.len() {
            span.copy_from_slice(&be[be.len() - len..]);
        } else {
            let (padding, low) = span.split_at_mut(len - be.len());
            padding.fill(0);
            low.copy_from_slice(&be);
        }
        trace!("{}.{field} = {value:#x}", self.name);
        Ok(())
    }

    fn client(&self) -> Result<Rc<RefCell<dyn MemoryClient>>> {
        self.client
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ExplorerError::NoClient(self.name.clone()))
    }

    /// Reads the variable from memory into the cached value
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::NoClient`] if no client is set or it was dropped, and with
    /// whatever the client fails with.
    pub fn read(&mut self) -> Result<()> {
        let client = self.client()?;
        let size = (self.ty.bit_size() / 8) as usize;
        let bytes = client.borrow_mut().read(self.address, size)?;
        debug!("read {size} bytes of {} at {}", self.name, self.address);
        self.set(bytes)
    }

    /// Writes the cached value to memory
    pub fn write(&self) -> Result<()> {
        let client = self.client()?;
        let value = self.get()?;
        client.borrow_mut().write(self.address, value)?;
        debug!(
            "wrote {} bytes of {} at {}",
            value.len(),
            self.name,
            self.address
        );
        Ok(())
    }

    /// Creates a proxy for a member of this variable
    ///
    /// The member shares the memory client. If the cached value covers the member, its
    /// bytes are copied into the member's cached value.
    pub fn get_child(&self, field: &str) -> Result<VariableProxy> {
        let (start, len) = self.field_span(field)?;
        let ty = self.ty.get_child(field)?.clone();
        let value = self
            .value
            .as_ref()
            .and_then(|v| v.get(start..start + len))
            .map(<[u8]>::to_vec);
        Ok(VariableProxy {
            name: field.to_string(),
            ty,
            address: self.address + start as u64,
            value,
            client: self.client.clone(),
        })
    }

    pub fn list_children(&self) -> Vec<String> {
        self.ty.list_children()
    }
}

impl Display for VariableProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} bits) at {}",
            self.name,
            self.ty.name(),
            self.ty.bit_size(),
            self.address
        )?;
        match &self.value {
            Some(v) => write!(f, " = {}", hex::encode(v)),
            None => write!(f, " = <unread>"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::{formula_one, MERCEDES_ADDR};
    use crate::lookup::find_entry;
    use crate::memory::FileClient;
    use tempfile::NamedTempFile;

    fn packed() -> VariableProxy {
        let ty = TypeDescriptor::new("Packed", 48).with_children(vec![
            TypeDescriptor::new("foo", 8),
            TypeDescriptor::new("bar", 32).with_struct_offset(8),
            TypeDescriptor::new("baz", 8).with_struct_offset(40),
        ]);
        VariableProxy::from_descriptor("packed", ty, Addr::from(0x40u64))
    }

    #[test]
    fn test_get_field() {
        let mut var = packed();
        var.set(vec![0xfe, 0xed, 0xbe, 0xef, 0xaa, 0xbb]).unwrap();
        assert_eq!(var.get_field("foo").unwrap(), 0xfe);
        assert_eq!(var.get_field("bar").unwrap(), 0xedbeefaa);
        assert_eq!(var.get_field("baz").unwrap(), 0xbb);
        assert!(matches!(
            var.get_field("qux"),
            Err(ExplorerError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_set_field() {
        let mut var = packed();
        var.set(vec![0xfe, 0xed, 0xbe, 0xef, 0xaa, 0xbb]).unwrap();
        var.set_field("bar", 0x01020304).unwrap();
        assert_eq!(var.get_field("bar").unwrap(), 0x01020304);
        assert_eq!(var.get().unwrap(), [0xfe, 1, 2, 3, 4, 0xbb]);

        // truncated to the width of the field
        var.set_field("foo", 0x1234).unwrap();
        assert_eq!(var.get_field("foo").unwrap(), 0x34);
        assert_eq!(var.get().unwrap(), [0x34, 1, 2, 3, 4, 0xbb]);
    }

    #[test]
    fn test_set_field_wide() {
        let ty = TypeDescriptor::new("Wide", 128)
            .with_children(vec![TypeDescriptor::new("big", 96)]);
        let mut var = VariableProxy::from_descriptor("wide", ty, Addr::NULL);
        var.set(vec![0xff; 16]).unwrap();
        var.set_field("big", 0x0102).unwrap();
        let mut expected = vec![0; 10];
        expected.extend([1, 2, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(var.get().unwrap(), expected);
        assert!(matches!(
            var.get_field("big"),
            Err(ExplorerError::FieldTooWide { bits: 96, .. })
        ));
    }

    #[test]
    fn test_size_guard() {
        let mut var = packed();
        var.set(vec![1, 2, 3]).unwrap();
        let err = var.set(vec![0; 7]).unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::SizeMismatch {
                value_bits: 56,
                type_bits: 48
            }
        ));
        // the old value survives
        assert_eq!(var.get().unwrap(), [1, 2, 3]);
        var.set(Vec::new()).unwrap();
        assert!(var.get().unwrap().is_empty());
    }

    #[test]
    fn test_uninitialized_and_short_values() {
        let mut var = packed();
        assert!(matches!(var.get(), Err(ExplorerError::Uninitialized(_))));
        assert!(matches!(
            var.set_field("foo", 1),
            Err(ExplorerError::Uninitialized(_))
        ));

        var.set(vec![0xfe, 0xed, 0xbe]).unwrap();
        assert_eq!(var.get_field("foo").unwrap(), 0xfe);
        assert!(matches!(
            var.get_field("bar"),
            Err(ExplorerError::FieldOutOfRange {
                start: 1,
                len: 4,
                available: 3,
                ..
            })
        ));
        assert!(matches!(
            var.set_field("baz", 1),
            Err(ExplorerError::FieldOutOfRange { .. })
        ));
    }

    #[test]
    fn test_not_byte_aligned() {
        let ty = TypeDescriptor::new("Flags", 32)
            .with_children(vec![TypeDescriptor::new("mode", 32).with_struct_offset(5)]);
        let mut var = VariableProxy::from_descriptor("flags", ty, Addr::NULL);
        var.set(vec![0; 4]).unwrap();
        assert!(matches!(
            var.get_field("mode"),
            Err(ExplorerError::NotByteAligned { bit_offset: 5, .. })
        ));
        assert!(matches!(
            var.set_field("mode", 3),
            Err(ExplorerError::NotByteAligned { .. })
        ));
    }

    #[test]
    fn test_from_entry() {
        let mut reader = formula_one();
        let (entry, _) = find_entry(&mut reader, "mercedes").unwrap();
        let var = VariableProxy::from_entry(&mut reader, &entry).unwrap();
        assert_eq!(var.name(), "mercedes");
        assert_eq!(var.address(), Addr::from(MERCEDES_ADDR));
        assert_eq!(var.type_descriptor().name(), "Team");
        assert!(var.value().is_none());

        let (local, _) = find_entry(&mut reader, "local_counter").unwrap();
        let err = VariableProxy::from_entry(&mut reader, &local).unwrap_err();
        assert!(matches!(err, ExplorerError::NoLocation(n) if n == "local_counter"));
    }

    #[test]
    fn test_get_child() {
        let mut reader = formula_one();
        let (entry, _) = find_entry(&mut reader, "mercedes").unwrap();
        let mut var = VariableProxy::from_entry(&mut reader, &entry).unwrap();

        let unread = var.get_child("last_wdc").unwrap();
        assert_eq!(unread.address(), Addr::from(MERCEDES_ADDR + 36));
        assert!(unread.value().is_none());

        let mut value = vec![0; 48];
        value[36..40].copy_from_slice(&2021u32.to_be_bytes());
        var.set(value).unwrap();
        let last_wdc = var.get_child("last_wdc").unwrap();
        assert_eq!(last_wdc.get().unwrap(), 2021u32.to_be_bytes());
        assert_eq!(var.get_field("last_wdc").unwrap(), 2021);

        let drivers = var.get_child("drivers").unwrap();
        assert_eq!(
            drivers.list_children(),
            ["initials", "car_number", "has_won_wdc"]
        );
    }

    #[test]
    fn test_read_write() {
        let tmp = NamedTempFile::new().unwrap();
        let client: Rc<RefCell<dyn MemoryClient>> =
            Rc::new(RefCell::new(FileClient::open(tmp.path()).unwrap()));
        // the file starts at address 0x40
        client.borrow_mut().set_offset(0x40);

        let mut var = packed().with_client(&client);
        var.set(vec![0xfe, 0xed, 0xbe, 0xef, 0xaa, 0xbb]).unwrap();
        var.write().unwrap();
        assert_eq!(
            std::fs::read(tmp.path()).unwrap(),
            [0xfe, 0xed, 0xbe, 0xef, 0xaa, 0xbb]
        );

        let mut other = packed().with_client(&client);
        other.read().unwrap();
        assert_eq!(other.get_field("bar").unwrap(), 0xedbeefaa);

        drop(client);
        assert!(matches!(other.read(), Err(ExplorerError::NoClient(_))));
        assert!(matches!(packed().write(), Err(ExplorerError::NoClient(_))));
    }

    #[test]
    fn test_display() {
        let mut var = packed();
        assert_eq!(
            var.to_string(),
            "packed (Packed, 48 bits) at 0x0000000000000040 = <unread>"
        );
        var.set(vec![0xab]).unwrap();
        assert!(var.to_string().ends_with(" = ab"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Byte widths of consecutive fields and a value covering all of them
        fn record() -> impl Strategy<Value = (Vec<usize>, Vec<u8>)> {
            prop::collection::vec(1usize..=8, 1..6).prop_flat_map(|widths| {
                let total = widths.iter().sum::<usize>();
                (Just(widths), prop::collection::vec(any::<u8>(), total))
            })
        }

        fn record_type(widths: &[usize]) -> TypeDescriptor {
            let mut start = 0;
            let children = widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let child = TypeDescriptor::new(format!("f{i}"), *w as u64 * 8)
                        .with_struct_offset(start as u64 * 8);
                    start += w;
                    child
                })
                .collect();
            TypeDescriptor::new("Record", start as u64 * 8).with_children(children)
        }

        proptest! {
            #[test]
            fn set_then_get_returns_the_value(
                value in prop::collection::vec(any::<u8>(), 0..32),
                slack in 0u64..64,
            ) {
                let ty = TypeDescriptor::new("blob", value.len() as u64 * 8 + slack);
                let mut var = VariableProxy::from_descriptor("blob", ty, Addr::NULL);
                var.set(value.clone()).unwrap();
                prop_assert_eq!(var.get().unwrap(), value.as_slice());
            }

            #[test]
            fn set_rejects_exactly_the_values_that_do_not_fit(
                bit_size in 0u64..256,
                value in prop::collection::vec(any::<u8>(), 0..40),
            ) {
                let ty = TypeDescriptor::new("blob", bit_size);
                let mut var = VariableProxy::from_descriptor("blob", ty, Addr::NULL);
                let fits = value.len() as u64 * 8 <= bit_size;
                match var.set(value.clone()) {
                    Ok(()) => prop_assert!(fits),
                    Err(ExplorerError::SizeMismatch { value_bits, type_bits }) => {
                        prop_assert!(!fits);
                        prop_assert_eq!(value_bits, value.len() as u64 * 8);
                        prop_assert_eq!(type_bits, bit_size);
                        // nothing was cached
                        prop_assert!(var.get().is_err());
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {}", e),
                }
            }

            #[test]
            fn set_field_only_touches_the_field(
                (widths, initial) in record(),
                pick in any::<prop::sample::Index>(),
                field_value in any::<u64>(),
            ) {
                let mut var = VariableProxy::from_descriptor("rec", record_type(&widths), Addr::NULL);
                var.set(initial.clone()).unwrap();

                let i = pick.index(widths.len());
                let field = format!("f{i}");
                let start: usize = widths[..i].iter().sum();
                let end = start + widths[i];

                var.set_field(&field, field_value).unwrap();
                let expected = match widths[i] {
                    8 => field_value,
                    w => field_value & ((1u64 << (8 * w)) - 1),
                };
                prop_assert_eq!(var.get_field(&field).unwrap(), expected);

                let after = var.get().unwrap();
                prop_assert_eq!(&after[..start], &initial[..start]);
                prop_assert_eq!(&after[end..], &initial[end..]);
            }
        }
    }
}
