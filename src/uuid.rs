// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! GATT UUIDs: 16-, 32- and 128-bit forms with canonical cross-width
//! equality against the Bluetooth Base UUID.

use std::fmt;

use uuid::Uuid;

/// `0000xxxx-0000-1000-8000-00805F9B34FB`, the base every short-form
/// Bluetooth UUID expands against.
const BASE_UUID_BYTES: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// A GATT attribute UUID, in whichever width the peer advertised it.
#[derive(Debug, Clone, Copy, Eq)]
pub enum GattUuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(Uuid),
}

impl GattUuid {
    /// Database Hash characteristic, 0x2B2A.
    pub const DATABASE_HASH: GattUuid = GattUuid::Uuid16(0x2B2A);
    /// Service Changed characteristic, 0x2A05.
    pub const SERVICE_CHANGED: GattUuid = GattUuid::Uuid16(0x2A05);

    /// Expand this UUID to its canonical 128-bit form.
    pub fn to_uuid128(self) -> Uuid {
        match self {
            GattUuid::Uuid128(u) => u,
            GattUuid::Uuid16(short) => expand_base(u32::from(short)),
            GattUuid::Uuid32(short) => expand_base(short),
        }
    }

    /// True if this is a 16-bit UUID equal to the Bluetooth SIG-assigned
    /// value `short`.
    pub fn is_short(&self, short: u16) -> bool {
        matches!(self, GattUuid::Uuid16(v) if *v == short)
    }
}

fn expand_base(short: u32) -> Uuid {
    let mut bytes = BASE_UUID_BYTES;
    bytes[0..4].copy_from_slice(&short.to_be_bytes());
    Uuid::from_bytes(bytes)
}

impl PartialEq for GattUuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_uuid128() == other.to_uuid128()
    }
}

impl std::hash::Hash for GattUuid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_uuid128().hash(state)
    }
}

impl fmt::Display for GattUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattUuid::Uuid16(v) => write!(f, "{v:04x}"),
            GattUuid::Uuid32(v) => write!(f, "{v:08x}"),
            GattUuid::Uuid128(u) => write!(f, "{u}"),
        }
    }
}
