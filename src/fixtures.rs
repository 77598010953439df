//! Synthetic debug info shared by the unit tests
//!
//! Mirrors what clang emits for this program (bools padded to 4 bytes):
//!
//! ```c
//! struct Driver { char initials[2]; int car_number; bool has_won_wdc; };
//! struct Team {
//!     Driver drivers[2];
//!     short sponsors[4];
//!     bool has_won_wdc;
//!     int last_wdc;
//!     bool has_won_wcc;
//!     int last_wcc;
//! };
//! typedef Team team_t;
//! typedef Driver driver_t;
//! struct Garage { const driver_t lead; const int spots; };
//!
//! Team formula_1_teams[10];
//! Team mercedes;
//! team_t favorite;
//! const int limit;
//! int grid[2][3];
//! char callsign[8];   // bounds given as DW_AT_upper_bound
//! int laps[];         // no bounds at all
//! ```
//!
//! plus a few broken entries and a second compile unit.

use crate::entry::{Attr, AttrValue, EntryOffset, EntryTag};
use crate::reader::{EntryStream, EntryStreamBuilder};

pub(crate) const MAIN_LOW_PC: u64 = 0x1000;
pub(crate) const TEAMS_ADDR: u64 = 0x1010;
pub(crate) const MERCEDES_ADDR: u64 = 0x2000;

pub(crate) fn name(n: &str) -> (Attr, AttrValue) {
    (Attr::Name, AttrValue::String(n.to_string()))
}

pub(crate) fn byte_size(n: u64) -> (Attr, AttrValue) {
    (Attr::ByteSize, AttrValue::Udata(n))
}

pub(crate) fn type_of(o: EntryOffset) -> (Attr, AttrValue) {
    (Attr::Type, AttrValue::Ref(o))
}

pub(crate) fn member_at(bytes: u64) -> (Attr, AttrValue) {
    (Attr::DataMemberLocation, AttrValue::Udata(bytes))
}

pub(crate) fn count(n: u64) -> (Attr, AttrValue) {
    (Attr::Count, AttrValue::Udata(n))
}

/// `DW_OP_addr <addr>` for a 64 bit target
pub(crate) fn location(addr: u64) -> (Attr, AttrValue) {
    let mut expr = vec![gimli::DW_OP_addr.0];
    expr.extend_from_slice(&addr.to_le_bytes());
    (Attr::Location, AttrValue::Expr(expr))
}

fn no_attrs() -> [(Attr, AttrValue); 0] {
    []
}

fn array(b: &mut EntryStreamBuilder, element: EntryOffset, counts: &[u64]) -> EntryOffset {
    let arr = b.begin(EntryTag::ArrayType, [type_of(element)]);
    for c in counts {
        b.leaf(EntryTag::SubrangeType, [count(*c)]);
    }
    b.end();
    arr
}

fn member(b: &mut EntryStreamBuilder, n: &str, ty: EntryOffset, at: u64) {
    b.leaf(EntryTag::Member, [name(n), type_of(ty), member_at(at)]);
}

pub(crate) fn formula_one() -> EntryStream {
    let mut b = EntryStream::builder();

    b.begin(
        EntryTag::CompileUnit,
        [
            name("main.cpp"),
            (Attr::LowPc, AttrValue::Address(MAIN_LOW_PC)),
        ],
    );
    let char_t = b.leaf(EntryTag::BaseType, [name("char"), byte_size(1)]);
    let int_t = b.leaf(EntryTag::BaseType, [name("int"), byte_size(4)]);
    let bool_t = b.leaf(EntryTag::BaseType, [name("bool"), byte_size(1)]);
    let short_t = b.leaf(EntryTag::BaseType, [name("short"), byte_size(2)]);
    let char_2 = array(&mut b, char_t, &[2]);
    let short_4 = array(&mut b, short_t, &[4]);

    let driver = b.begin(EntryTag::StructureType, [name("Driver"), byte_size(12)]);
    member(&mut b, "initials", char_2, 0);
    member(&mut b, "car_number", int_t, 4);
    member(&mut b, "has_won_wdc", bool_t, 8);
    b.end();
    let driver_2 = array(&mut b, driver, &[2]);

    let team = b.begin(EntryTag::StructureType, [name("Team"), byte_size(48)]);
    member(&mut b, "drivers", driver_2, 0);
    member(&mut b, "sponsors", short_4, 24);
    member(&mut b, "has_won_wdc", bool_t, 32);
    member(&mut b, "last_wdc", int_t, 36);
    member(&mut b, "has_won_wcc", bool_t, 40);
    member(&mut b, "last_wcc", int_t, 44);
    b.end();
    let team_10 = array(&mut b, team, &[10]);

    let team_t = b.leaf(EntryTag::Typedef, [name("team_t"), type_of(team)]);
    let driver_t = b.leaf(EntryTag::Typedef, [name("driver_t"), type_of(driver)]);
    let const_driver_t = b.leaf(EntryTag::ConstType, [type_of(driver_t)]);
    let const_int = b.leaf(EntryTag::ConstType, [type_of(int_t)]);

    b.begin(EntryTag::StructureType, [name("Garage"), byte_size(16)]);
    member(&mut b, "lead", const_driver_t, 0);
    member(&mut b, "spots", const_int, 12);
    b.end();

    let int_2_3 = array(&mut b, int_t, &[2, 3]);
    let char_8 = b.begin(EntryTag::ArrayType, [type_of(char_t)]);
    b.leaf(
        EntryTag::SubrangeType,
        [(Attr::UpperBound, AttrValue::Udata(7))],
    );
    b.end();
    let int_flex = b.begin(EntryTag::ArrayType, [type_of(int_t)]);
    b.leaf(EntryTag::SubrangeType, no_attrs());
    b.end();

    b.leaf(EntryTag::StructureType, [name("Opaque")]);

    b.leaf(
        EntryTag::Variable,
        [name("formula_1_teams"), type_of(team_10), location(TEAMS_ADDR)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("mercedes"), type_of(team), location(MERCEDES_ADDR)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("favorite"), type_of(team_t), location(0x3000)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("limit"), type_of(const_int), location(0x3100)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("grid"), type_of(int_2_3), location(0x3200)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("callsign"), type_of(char_8), location(0x3300)],
    );
    b.leaf(
        EntryTag::Variable,
        [name("laps"), type_of(int_flex), location(0x3400)],
    );

    let main_fn = b.begin(EntryTag::Subprogram, [name("main")]);
    b.leaf(
        EntryTag::Variable,
        [
            name("local_counter"),
            type_of(int_t),
            (Attr::Location, AttrValue::Expr(vec![0x91, 0x7c])),
        ],
    );
    b.end();
    b.leaf(EntryTag::Variable, [name("broken"), type_of(main_fn)]);
    b.end();

    b.begin(
        EntryTag::CompileUnit,
        [name("other.cpp"), (Attr::LowPc, AttrValue::Address(0x8000))],
    );
    let long_t = b.leaf(EntryTag::BaseType, [name("long"), byte_size(8)]);
    b.leaf(
        EntryTag::Variable,
        [name("lap_count"), type_of(long_t), location(0x8010)],
    );
    b.end();

    b.build()
}
