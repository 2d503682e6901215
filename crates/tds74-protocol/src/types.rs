//! Column type id registry.
//!
//! Type ids appear in COLMETADATA descriptors and RPC parameter metadata.
//! The constants keep the names SQL Server's own documentation uses.

/// Type id constants as they appear on the wire.
#[allow(missing_docs)]
pub mod type_id {
    pub const IMAGE: u8 = 34; // 0x22
    pub const TEXT: u8 = 35; // 0x23
    pub const GUID: u8 = 36; // 0x24
    pub const INTN: u8 = 38; // 0x26
    pub const DATEN: u8 = 40; // 0x28
    pub const TIMEN: u8 = 41; // 0x29
    pub const DATETIME2N: u8 = 42; // 0x2A
    pub const DATETIMEOFFSETN: u8 = 43; // 0x2B
    pub const INT1: u8 = 48; // 0x30
    pub const BIT: u8 = 50; // 0x32
    pub const INT2: u8 = 52; // 0x34
    pub const INT4: u8 = 56; // 0x38
    pub const DATETIM4: u8 = 58; // 0x3A
    pub const FLT4: u8 = 59; // 0x3B
    pub const MONEY: u8 = 60; // 0x3C
    pub const DATETIME: u8 = 61; // 0x3D
    pub const FLT8: u8 = 62; // 0x3E
    pub const SSVARIANT: u8 = 98; // 0x62
    pub const NTEXT: u8 = 99; // 0x63
    pub const BITN: u8 = 104; // 0x68
    pub const DECIMALN: u8 = 106; // 0x6A
    pub const NUMERICN: u8 = 108; // 0x6C
    pub const FLTN: u8 = 109; // 0x6D
    pub const MONEYN: u8 = 110; // 0x6E
    pub const DATETIMN: u8 = 111; // 0x6F
    pub const MONEY4: u8 = 122; // 0x7A
    pub const INT8: u8 = 127; // 0x7F
    pub const BIGVARBIN: u8 = 165; // 0xA5
    pub const BIGVARCHR: u8 = 167; // 0xA7
    pub const BIGBINARY: u8 = 173; // 0xAD
    pub const BIGCHAR: u8 = 175; // 0xAF
    pub const NVARCHAR: u8 = 231; // 0xE7
    pub const NCHAR: u8 = 239; // 0xEF
}

/// Fixed on-wire size of a type, if it has one.
///
/// Fixed-size types carry no length prefix in rows and no extra metadata in
/// COLMETADATA; everything else describes its size in the descriptor.
#[must_use]
pub const fn fixed_size(ty: u8) -> Option<u32> {
    match ty {
        type_id::INT1 | type_id::BIT => Some(1),
        type_id::INT2 => Some(2),
        type_id::INT4 | type_id::FLT4 | type_id::DATETIM4 | type_id::MONEY4 => Some(4),
        type_id::INT8 | type_id::FLT8 | type_id::DATETIME | type_id::MONEY => Some(8),
        type_id::DATEN => Some(3),
        _ => None,
    }
}

/// Whether the type's descriptor carries a 5-byte collation.
#[must_use]
pub const fn has_collation(ty: u8) -> bool {
    matches!(
        ty,
        type_id::BIGCHAR | type_id::BIGVARCHR | type_id::NCHAR | type_id::NVARCHAR
    )
}
