//! Attribute-string codec for Proxmox VE property strings.
//!
//! Proxmox packs structured settings into single configuration values such as
//! `net0: virtio=32:90:AC:10:00:91,bridge=vmbr0,firewall=1` or
//! `numa0: cpus=0-3;4-7,hostnodes=0;1,memory=12288`. This module converts
//! between those strings and typed records.
//!
//! Each record declares a static descriptor table ([`Field`]) mapping an
//! attribute name to a typed getter/setter pair. The codec walks that table,
//! so adding a record type never means writing another parser.
//!
//! ## Example
//!
//! ```rust
//! use pvebridge::attrs::AttributeRecord;
//! use pvebridge::VmNetworkDevice;
//!
//! let nic = VmNetworkDevice::from_attr_string("virtio=32:90:AC:10:00:91,bridge=vmbr0,trunks=1;2").unwrap();
//! assert_eq!(nic.bridge, "vmbr0");
//! assert_eq!(nic.trunks, vec![1, 2]);
//! assert_eq!(nic.to_attr_string().unwrap(), "virtio=32:90:AC:10:00:91,bridge=vmbr0,trunks=1;2");
//! ```

mod codec;
pub mod records;

use std::fmt;

pub use codec::{decode, decode_into, encode};
pub use records::{
    VmCloudInitIpConfig, VmCpu, VmHostPci, VmNetworkDevice, VmNuma, VmQemuGuestAgent, VmSmbios,
};

pub use crate::error::AttrError;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, AttrError>;

/// Attribute name marking a descriptor the codec must leave alone.
pub const IGNORE: &str = "-";

/// Separator between `name=value` pairs.
pub const PAIR_SEPARATOR: char = ',';

/// Separator between the elements of a sequence value.
pub const LIST_SEPARATOR: char = ';';

/// One entry of a record's descriptor table.
pub struct Field<R> {
    /// Canonical attribute name, emitted verbatim on encode.
    pub name: &'static str,
    /// Typed accessor pair for the backing struct field.
    pub access: Access<R>,
}

/// Typed accessors, one variant per supported field kind.
pub enum Access<R> {
    /// Plain boolean, rendered `true`/`false` and never omitted.
    Bool {
        get: fn(&R) -> bool,
        set: fn(&mut R, bool),
    },
    /// String, trimmed on both encode and decode.
    Str {
        get: fn(&R) -> &str,
        set: fn(&mut R, String),
    },
    /// Optional decimal integer.
    Int {
        get: fn(&R) -> Option<i64>,
        set: fn(&mut R, i64),
    },
    /// Optional flag, rendered `1`/`0`.
    Flag {
        get: fn(&R) -> Option<bool>,
        set: fn(&mut R, bool),
    },
    /// `;`-separated strings.
    StrList {
        get: fn(&R) -> &[String],
        set: fn(&mut R, Vec<String>),
    },
    /// `;`-separated decimal integers.
    IntList {
        get: fn(&R) -> &[i64],
        set: fn(&mut R, Vec<i64>),
    },
    /// A platform field whose Rust type has no attribute-string form.
    ///
    /// Encoding a record carrying one always fails; decoding fails only when
    /// the input actually names it.
    Opaque { type_name: &'static str },
}

impl<R> Field<R> {
    pub const fn boolean(name: &'static str, get: fn(&R) -> bool, set: fn(&mut R, bool)) -> Self {
        Self { name, access: Access::Bool { get, set } }
    }

    pub const fn string(name: &'static str, get: fn(&R) -> &str, set: fn(&mut R, String)) -> Self {
        Self { name, access: Access::Str { get, set } }
    }

    pub const fn int(name: &'static str, get: fn(&R) -> Option<i64>, set: fn(&mut R, i64)) -> Self {
        Self { name, access: Access::Int { get, set } }
    }

    pub const fn flag(name: &'static str, get: fn(&R) -> Option<bool>, set: fn(&mut R, bool)) -> Self {
        Self { name, access: Access::Flag { get, set } }
    }

    pub const fn strings(
        name: &'static str,
        get: fn(&R) -> &[String],
        set: fn(&mut R, Vec<String>),
    ) -> Self {
        Self { name, access: Access::StrList { get, set } }
    }

    pub const fn ints(name: &'static str, get: fn(&R) -> &[i64], set: fn(&mut R, Vec<i64>)) -> Self {
        Self { name, access: Access::IntList { get, set } }
    }

    pub const fn opaque(name: &'static str, type_name: &'static str) -> Self {
        Self { name, access: Access::Opaque { type_name } }
    }

    /// Whether the codec reads and writes this field at all.
    pub fn is_mapped(&self) -> bool {
        !self.name.is_empty() && self.name != IGNORE
    }

    pub fn kind(&self) -> FieldKind {
        match self.access {
            Access::Bool { .. } => FieldKind::Bool,
            Access::Str { .. } => FieldKind::String,
            Access::Int { .. } => FieldKind::OptionalInt,
            Access::Flag { .. } => FieldKind::OptionalFlag,
            Access::StrList { .. } => FieldKind::StringList,
            Access::IntList { .. } => FieldKind::IntList,
            Access::Opaque { .. } => FieldKind::Opaque,
        }
    }
}

/// Field kinds, for introspection and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    String,
    OptionalInt,
    OptionalFlag,
    StringList,
    IntList,
    Opaque,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::OptionalInt => "int?",
            FieldKind::OptionalFlag => "flag?",
            FieldKind::StringList => "string[]",
            FieldKind::IntList => "int[]",
            FieldKind::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// A record with a static attribute descriptor table.
pub trait AttributeRecord: Default + Sized + 'static {
    /// Descriptor table, in encode order.
    fn fields() -> &'static [Field<Self>];

    /// Render the record as a property string.
    fn to_attr_string(&self) -> Result<String> {
        encode(self)
    }

    /// Parse a property string into a fresh record.
    fn from_attr_string(input: &str) -> Result<Self> {
        decode(input)
    }

    /// Canonical names of every mapped field.
    fn field_names() -> Vec<&'static str> {
        Self::fields()
            .iter()
            .filter(|f| f.is_mapped())
            .map(|f| f.name)
            .collect()
    }
}
