// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Handle-ordered storage and lookup for one peer's discovered GATT
//! database.

use crate::{
    error::StoreError,
    handle::{AttHandle, AttHandleRange},
    store::model::{
        AttrKind, CharacteristicRecord, DescriptorRecord, IncludedServiceRecord, ServiceRecord,
    },
    uuid::GattUuid,
};

/// The in-memory attribute database for a single peer.
#[derive(Debug, Default)]
pub struct AttributeStore {
    services: Vec<ServiceRecord>,
}

impl AttributeStore {
    pub fn new() -> Self {
        AttributeStore::default()
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn service_at(&self, idx: usize) -> Option<&ServiceRecord> {
        self.services.get(idx)
    }

    /// Insert a service in start-handle order. Idempotent: if a service
    /// with this start handle already exists, its index is returned
    /// unchanged rather than inserting a duplicate.
    pub fn insert_service(&mut self, rec: ServiceRecord) -> usize {
        match self
            .services
            .binary_search_by_key(&rec.start_handle, |s| s.start_handle)
        {
            Ok(idx) => idx,
            Err(idx) => {
                self.services.insert(idx, rec);
                idx
            }
        }
    }

    pub fn find_service_index_by_start_handle(&self, handle: AttHandle) -> Option<usize> {
        self.services
            .binary_search_by_key(&handle, |s| s.start_handle)
            .ok()
    }

    /// Insert an included-service relationship under the service at
    /// `service_idx`, in handle order, idempotently.
    pub fn insert_included(
        &mut self,
        service_idx: usize,
        rec: IncludedServiceRecord,
    ) -> Result<(), StoreError> {
        let svc = self
            .services
            .get_mut(service_idx)
            .ok_or(StoreError::ParentMissing(AttHandle(0)))?;
        match svc
            .included_services
            .binary_search_by_key(&rec.handle, |r| r.handle)
        {
            Ok(_) => {}
            Err(idx) => svc.included_services.insert(idx, rec),
        }
        Ok(())
    }

    /// Insert a characteristic under the service at `service_idx`, in
    /// value-handle order, idempotently.
    pub fn insert_characteristic(
        &mut self,
        service_idx: usize,
        rec: CharacteristicRecord,
    ) -> Result<(), StoreError> {
        let svc = self
            .services
            .get_mut(service_idx)
            .ok_or(StoreError::ParentMissing(AttHandle(0)))?;
        match svc
            .characteristics
            .binary_search_by_key(&rec.value_handle, |c| c.value_handle)
        {
            Ok(_) => {}
            Err(idx) => svc.characteristics.insert(idx, rec),
        }
        Ok(())
    }

    /// Insert a descriptor under the characteristic identified by
    /// `char_value_handle` within the service at `service_idx`, in handle
    /// order, idempotently.
    pub fn insert_descriptor(
        &mut self,
        service_idx: usize,
        char_value_handle: AttHandle,
        rec: DescriptorRecord,
    ) -> Result<(), StoreError> {
        let svc = self
            .services
            .get_mut(service_idx)
            .ok_or(StoreError::ParentMissing(AttHandle(0)))?;
        let chr = svc
            .characteristics
            .iter_mut()
            .find(|c| c.value_handle == char_value_handle)
            .ok_or(StoreError::ParentMissing(char_value_handle))?;
        match chr.descriptors.binary_search_by_key(&rec.handle, |d| d.handle) {
            Ok(_) => {}
            Err(idx) => chr.descriptors.insert(idx, rec),
        }
        Ok(())
    }

    pub fn services_by_uuid(&self, uuid: &GattUuid) -> Vec<&ServiceRecord> {
        self.services.iter().filter(|s| &s.uuid == uuid).collect()
    }

    pub fn characteristics_by_uuid(
        &self,
        uuid: &GattUuid,
    ) -> Vec<(&ServiceRecord, &CharacteristicRecord)> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter().map(move |c| (s, c)))
            .filter(|(_, c)| &c.uuid == uuid)
            .collect()
    }

    pub fn descriptors_by_path(
        &self,
        svc_start: AttHandle,
        char_value_handle: AttHandle,
    ) -> Option<&[DescriptorRecord]> {
        let svc = self
            .services
            .iter()
            .find(|s| s.start_handle == svc_start)?;
        svc.characteristics
            .iter()
            .find(|c| c.value_handle == char_value_handle)
            .map(|c| c.descriptors.as_slice())
    }

    /// Every handle present in the store within `range`, across every
    /// attribute level, in ascending order.
    pub fn in_range(&self, range: AttHandleRange) -> Vec<AttHandle> {
        let mut out = Vec::new();
        for svc in &self.services {
            if range.contains(svc.start_handle) {
                out.push(svc.start_handle);
            }
            for inc in &svc.included_services {
                if range.contains(inc.handle) {
                    out.push(inc.handle);
                }
            }
            for chr in &svc.characteristics {
                if range.contains(chr.definition_handle) {
                    out.push(chr.definition_handle);
                }
                for dsc in &chr.descriptors {
                    if range.contains(dsc.handle) {
                        out.push(dsc.handle);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    pub fn in_range_with_kind(&self, range: AttHandleRange, kind: AttrKind) -> Vec<AttHandle> {
        let mut out = Vec::new();
        for svc in &self.services {
            match kind {
                AttrKind::Service => {
                    if range.contains(svc.start_handle) {
                        out.push(svc.start_handle);
                    }
                }
                AttrKind::IncludedService => {
                    for inc in &svc.included_services {
                        if range.contains(inc.handle) {
                            out.push(inc.handle);
                        }
                    }
                }
                AttrKind::Characteristic => {
                    for chr in &svc.characteristics {
                        if range.contains(chr.definition_handle) {
                            out.push(chr.definition_handle);
                        }
                    }
                }
                AttrKind::Descriptor => {
                    for chr in &svc.characteristics {
                        for dsc in &chr.descriptors {
                            if range.contains(dsc.handle) {
                                out.push(dsc.handle);
                            }
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    pub fn size_with_range(&self, range: AttHandleRange) -> usize {
        self.in_range(range).len()
    }

    pub fn size_with_kind(&self, kind: AttrKind) -> usize {
        match kind {
            AttrKind::Service => self.services.len(),
            AttrKind::IncludedService => self
                .services
                .iter()
                .map(|s| s.included_services.len())
                .sum(),
            AttrKind::Characteristic => self.services.iter().map(|s| s.characteristics.len()).sum(),
            AttrKind::Descriptor => self
                .services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .map(|c| c.descriptors.len())
                .sum(),
        }
    }

    pub fn attr_count(&self) -> usize {
        self.size_with_kind(AttrKind::Service)
            + self.size_with_kind(AttrKind::IncludedService)
            + self.size_with_kind(AttrKind::Characteristic)
            + self.size_with_kind(AttrKind::Descriptor)
    }

    /// Clear the whole database, e.g. before a full rediscovery.
    pub fn clear(&mut self) {
        self.services.clear();
    }

    /// Rewrite any service left at the protocol end-of-range sentinel
    /// because the peer reported no successor service. Each such service's
    /// `end_handle` becomes the handle of its last discovered attribute
    /// (last descriptor of its last characteristic, or that
    /// characteristic's `value_handle` if it has none); a service with no
    /// characteristics at all is left untouched.
    pub fn finalize_open_ended_services(&mut self) {
        for svc in &mut self.services {
            if svc.end_handle != AttHandle::END_OF_RANGE {
                continue;
            }
            if let Some(last_chr) = svc.characteristics.last() {
                svc.end_handle = last_chr
                    .descriptors
                    .last()
                    .map(|d| d.handle)
                    .unwrap_or(last_chr.value_handle);
            }
        }
    }

    /// Verify the ordering and containment invariants of §3: services
    /// sorted by start handle and non-overlapping, characteristics sorted
    /// by value handle and inside their owning service's range,
    /// descriptors sorted by handle and inside their owning
    /// characteristic's effective range.
    pub fn sanity_pass(&self) -> Result<(), StoreError> {
        let mut prev_end: Option<AttHandle> = None;
        for (idx, svc) in self.services.iter().enumerate() {
            if svc.start_handle > svc.end_handle {
                return Err(StoreError::InvalidRecordShape("service start_handle > end_handle"));
            }
            if let Some(prev_end) = prev_end
                && svc.start_handle <= prev_end
            {
                return Err(StoreError::InvalidRecordShape("overlapping services"));
            }
            prev_end = Some(svc.end_handle);

            let mut prev_chr: Option<AttHandle> = None;
            for (cidx, chr) in svc.characteristics.iter().enumerate() {
                if chr.definition_handle < svc.start_handle || chr.value_handle > svc.end_handle {
                    return Err(StoreError::InvalidRecordShape(
                        "characteristic outside owning service range",
                    ));
                }
                if let Some(prev_chr) = prev_chr
                    && chr.value_handle <= prev_chr
                {
                    return Err(StoreError::InvalidRecordShape("characteristics out of order"));
                }
                prev_chr = Some(chr.value_handle);

                let end = chr.effective_end_handle(svc.characteristics.get(cidx + 1), svc.end_handle);
                let mut prev_dsc: Option<AttHandle> = None;
                for dsc in &chr.descriptors {
                    if dsc.handle <= chr.value_handle || dsc.handle > end {
                        return Err(StoreError::InvalidRecordShape(
                            "descriptor outside owning characteristic range",
                        ));
                    }
                    if let Some(prev_dsc) = prev_dsc
                        && dsc.handle <= prev_dsc
                    {
                        return Err(StoreError::InvalidRecordShape("descriptors out of order"));
                    }
                    prev_dsc = Some(dsc.handle);
                }
            }
            let _ = idx;
        }
        Ok(())
    }
}
