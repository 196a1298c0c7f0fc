// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The attribute store: the in-memory representation of one peer's GATT
//! database, plus handle-ordered insert/lookup operations over it.

pub mod attribute_store;
pub mod model;

pub use attribute_store::AttributeStore;
pub use model::{
    AttrKind, CharProperties, CharacteristicRecord, DescriptorRecord, IncludedServiceRecord,
    ServiceKind, ServiceRecord,
};
