// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Byte-exact persisted-record encode/decode: a depth-first replay of one
//! peer's attribute store plus a trailing integrity checksum.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::{
    error::PersistenceError,
    handle::AttHandle,
    store::{
        AttributeStore, CharProperties, CharacteristicRecord, DescriptorRecord,
        IncludedServiceRecord, ServiceKind, ServiceRecord,
    },
    transport::BdAddr,
    uuid::GattUuid,
};

const ATTR_TYPE_SERVICE: u8 = 0;
const ATTR_TYPE_INCLUDED: u8 = 1;
const ATTR_TYPE_CHARACTERISTIC: u8 = 2;
const ATTR_TYPE_DESCRIPTOR: u8 = 3;

const UUID_WIDTH_16: u8 = 0;
const UUID_WIDTH_32: u8 = 1;
const UUID_WIDTH_128: u8 = 2;

fn put_uuid(buf: &mut BytesMut, uuid: &GattUuid) {
    match uuid {
        GattUuid::Uuid16(v) => {
            buf.put_u8(UUID_WIDTH_16);
            buf.put_u16_le(*v);
        }
        GattUuid::Uuid32(v) => {
            buf.put_u8(UUID_WIDTH_32);
            buf.put_u32_le(*v);
        }
        GattUuid::Uuid128(v) => {
            buf.put_u8(UUID_WIDTH_128);
            buf.put_slice(v.as_bytes());
        }
    }
}

fn get_uuid(buf: &mut Bytes) -> Result<GattUuid, PersistenceError> {
    if buf.remaining() < 1 {
        return Err(PersistenceError::Truncated);
    }
    let width = buf.get_u8();
    match width {
        UUID_WIDTH_16 => {
            if buf.remaining() < 2 {
                return Err(PersistenceError::Truncated);
            }
            Ok(GattUuid::Uuid16(buf.get_u16_le()))
        }
        UUID_WIDTH_32 => {
            if buf.remaining() < 4 {
                return Err(PersistenceError::Truncated);
            }
            Ok(GattUuid::Uuid32(buf.get_u32_le()))
        }
        UUID_WIDTH_128 => {
            if buf.remaining() < 16 {
                return Err(PersistenceError::Truncated);
            }
            let mut raw = [0u8; 16];
            buf.copy_to_slice(&mut raw);
            Ok(GattUuid::Uuid128(uuid::Uuid::from_bytes(raw)))
        }
        _ => Err(PersistenceError::InvalidRecord("unknown uuid width tag")),
    }
}

/// Encode `addr`, `hash` and every attribute in `store` (depth first) into
/// the persisted record format, with a trailing SHA-256 integrity
/// checksum.
pub fn encode(addr: BdAddr, hash: &[u8; 16], store: &AttributeStore) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u8(addr.addr_type);
    body.put_slice(&addr.bytes);
    body.put_bytes(0, 9);
    body.put_slice(hash);
    body.put_u32_le(store.attr_count() as u32);

    for svc in store.services() {
        body.put_u8(ATTR_TYPE_SERVICE);
        body.put_u8(match svc.kind {
            ServiceKind::Primary => 0,
            ServiceKind::Secondary => 1,
        });
        body.put_u16_le(svc.start_handle.0);
        body.put_u16_le(svc.end_handle.0);
        put_uuid(&mut body, &svc.uuid);

        for inc in &svc.included_services {
            body.put_u8(ATTR_TYPE_INCLUDED);
            body.put_u16_le(inc.handle.0);
            body.put_u16_le(inc.included_start_handle.0);
            body.put_u16_le(inc.included_end_handle.0);
            put_uuid(&mut body, &inc.uuid);
        }

        for chr in &svc.characteristics {
            body.put_u8(ATTR_TYPE_CHARACTERISTIC);
            body.put_u16_le(chr.definition_handle.0);
            body.put_u16_le(chr.value_handle.0);
            body.put_u8(chr.properties.bits());
            put_uuid(&mut body, &chr.uuid);

            for dsc in &chr.descriptors {
                body.put_u8(ATTR_TYPE_DESCRIPTOR);
                body.put_u16_le(dsc.handle.0);
                put_uuid(&mut body, &dsc.uuid);
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let checksum = hasher.finalize();

    let mut out = body.to_vec();
    out.extend_from_slice(&checksum);
    out
}

/// Decode a persisted record, rejecting it if the trailing checksum
/// doesn't match or if the replayed structure violates a store invariant.
pub fn decode(raw: &[u8]) -> Result<(BdAddr, [u8; 16], AttributeStore), PersistenceError> {
    if raw.len() < 32 {
        return Err(PersistenceError::Truncated);
    }
    let (body, checksum) = raw.split_at(raw.len() - 32);
    let mut hasher = Sha256::new();
    hasher.update(body);
    if hasher.finalize().as_slice() != checksum {
        return Err(PersistenceError::ChecksumMismatch);
    }

    let mut buf = Bytes::copy_from_slice(body);
    if buf.remaining() < 16 + 16 + 4 {
        return Err(PersistenceError::Truncated);
    }
    let addr_type = buf.get_u8();
    let mut addr_bytes = [0u8; 6];
    buf.copy_to_slice(&mut addr_bytes);
    buf.advance(9);
    let mut hash = [0u8; 16];
    buf.copy_to_slice(&mut hash);
    let count = buf.get_u32_le() as usize;

    let mut store = AttributeStore::new();
    let mut cur_service: Option<usize> = None;
    let mut cur_char_handle: Option<AttHandle> = None;
    let mut replayed = 0usize;

    while buf.has_remaining() {
        if buf.remaining() < 1 {
            return Err(PersistenceError::Truncated);
        }
        let attr_type = buf.get_u8();
        match attr_type {
            ATTR_TYPE_SERVICE => {
                if buf.remaining() < 1 + 2 + 2 {
                    return Err(PersistenceError::Truncated);
                }
                let kind = match buf.get_u8() {
                    0 => ServiceKind::Primary,
                    1 => ServiceKind::Secondary,
                    _ => return Err(PersistenceError::InvalidRecord("unknown service kind tag")),
                };
                let start = AttHandle(buf.get_u16_le());
                let end = AttHandle(buf.get_u16_le());
                let uuid = get_uuid(&mut buf)?;
                let idx = store.insert_service(ServiceRecord::new(kind, start, end, uuid));
                cur_service = Some(idx);
                cur_char_handle = None;
            }
            ATTR_TYPE_INCLUDED => {
                if buf.remaining() < 6 {
                    return Err(PersistenceError::Truncated);
                }
                let handle = AttHandle(buf.get_u16_le());
                let included_start = AttHandle(buf.get_u16_le());
                let included_end = AttHandle(buf.get_u16_le());
                let uuid = get_uuid(&mut buf)?;
                let svc_idx = cur_service
                    .ok_or(PersistenceError::InvalidRecord("included service before any service"))?;
                store
                    .insert_included(svc_idx, IncludedServiceRecord {
                        handle,
                        included_start_handle: included_start,
                        included_end_handle: included_end,
                        uuid,
                    })
                    .map_err(|_| PersistenceError::InvalidRecord("include record attach failed"))?;
            }
            ATTR_TYPE_CHARACTERISTIC => {
                if buf.remaining() < 5 {
                    return Err(PersistenceError::Truncated);
                }
                let def = AttHandle(buf.get_u16_le());
                let value = AttHandle(buf.get_u16_le());
                let props = CharProperties::from_bits_truncate(buf.get_u8());
                let uuid = get_uuid(&mut buf)?;
                let svc_idx = cur_service
                    .ok_or(PersistenceError::InvalidRecord("characteristic before any service"))?;
                store
                    .insert_characteristic(svc_idx, CharacteristicRecord {
                        definition_handle: def,
                        value_handle: value,
                        properties: props,
                        uuid,
                        descriptors: Vec::new(),
                    })
                    .map_err(|_| PersistenceError::InvalidRecord("characteristic attach failed"))?;
                cur_char_handle = Some(value);
            }
            ATTR_TYPE_DESCRIPTOR => {
                if buf.remaining() < 2 {
                    return Err(PersistenceError::Truncated);
                }
                let handle = AttHandle(buf.get_u16_le());
                let uuid = get_uuid(&mut buf)?;
                let svc_idx = cur_service
                    .ok_or(PersistenceError::InvalidRecord("descriptor before any service"))?;
                let char_handle = cur_char_handle
                    .ok_or(PersistenceError::InvalidRecord("descriptor before any characteristic"))?;
                store
                    .insert_descriptor(svc_idx, char_handle, DescriptorRecord { handle, uuid })
                    .map_err(|_| PersistenceError::InvalidRecord("descriptor attach failed"))?;
            }
            _ => return Err(PersistenceError::InvalidRecord("unknown attribute type tag")),
        }
        replayed += 1;
    }

    if replayed != count {
        return Err(PersistenceError::InvalidRecord("attribute count mismatch"));
    }
    store
        .sanity_pass()
        .map_err(|_| PersistenceError::InvalidRecord("replayed store failed its sanity pass"))?;

    Ok((BdAddr { addr_type, bytes: addr_bytes }, hash, store))
}
