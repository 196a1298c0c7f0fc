// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{handle::AttHandle, uuid::GattUuid};

/// Primary vs. secondary GATT service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    Primary,
    Secondary,
}

/// The four attribute levels the store tracks, used by kind-filtered
/// lookups and size queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Service,
    IncludedService,
    Characteristic,
    Descriptor,
}

bitflags! {
    /// Characteristic properties bitmask, as carried in the characteristic
    /// declaration value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CharProperties: u8 {
        const BROADCAST = 0b0000_0001;
        const READ = 0b0000_0010;
        const WRITE_WITHOUT_RESPONSE = 0b0000_0100;
        const WRITE = 0b0000_1000;
        const NOTIFY = 0b0001_0000;
        const INDICATE = 0b0010_0000;
        const AUTHENTICATED_SIGNED_WRITES = 0b0100_0000;
        const EXTENDED_PROPERTIES = 0b1000_0000;
    }
}

/// One discovered GATT descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRecord {
    pub handle: AttHandle,
    pub uuid: GattUuid,
}

/// One discovered GATT characteristic, with its descriptors attached.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicRecord {
    pub definition_handle: AttHandle,
    pub value_handle: AttHandle,
    pub properties: CharProperties,
    pub uuid: GattUuid,
    pub descriptors: Vec<DescriptorRecord>,
}

impl CharacteristicRecord {
    /// The end of this characteristic's attribute range: one before the
    /// next characteristic's definition handle, or the owning service's end
    /// handle if this is the last characteristic. Never stored — always
    /// recomputed, since it depends on a sibling.
    pub fn effective_end_handle(&self, next: Option<&CharacteristicRecord>, svc_end: AttHandle) -> AttHandle {
        match next {
            Some(n) => n.definition_handle.prev(),
            None => svc_end,
        }
    }
}

/// One discovered "include" relationship between services.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedServiceRecord {
    pub handle: AttHandle,
    pub included_start_handle: AttHandle,
    pub included_end_handle: AttHandle,
    pub uuid: GattUuid,
}

/// One discovered GATT service, with its includes and characteristics
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub kind: ServiceKind,
    pub start_handle: AttHandle,
    pub end_handle: AttHandle,
    pub uuid: GattUuid,
    pub included_services: Vec<IncludedServiceRecord>,
    pub characteristics: Vec<CharacteristicRecord>,
}

impl ServiceRecord {
    pub fn new(kind: ServiceKind, start_handle: AttHandle, end_handle: AttHandle, uuid: GattUuid) -> Self {
        ServiceRecord {
            kind,
            start_handle,
            end_handle,
            uuid,
            included_services: Vec::new(),
            characteristics: Vec::new(),
        }
    }
}
