//! Target schemas of the summary and detail mappers

use crate::extract::{FieldKind, FieldSpec, Schema};

const SUMMARY_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "url", kind: FieldKind::Text },
    FieldSpec { name: "address", kind: FieldKind::Text },
    FieldSpec { name: "price", kind: FieldKind::Decimal },
    FieldSpec { name: "condo_fee", kind: FieldKind::Decimal },
    FieldSpec { name: "property_tax", kind: FieldKind::Decimal },
    FieldSpec { name: "property_kind", kind: FieldKind::Text },
    FieldSpec { name: "proposal", kind: FieldKind::Text },
    FieldSpec { name: "bedrooms", kind: FieldKind::Integer },
    FieldSpec { name: "suites", kind: FieldKind::Integer },
    FieldSpec { name: "bathrooms", kind: FieldKind::Integer },
    FieldSpec { name: "parking_spaces", kind: FieldKind::Integer },
    FieldSpec { name: "area", kind: FieldKind::Integer },
    FieldSpec { name: "thumbnail", kind: FieldKind::Bytes },
];

const DETAIL_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "address", kind: FieldKind::Text },
    FieldSpec { name: "price", kind: FieldKind::Decimal },
    FieldSpec { name: "condo_fee", kind: FieldKind::Decimal },
    FieldSpec { name: "property_tax", kind: FieldKind::Decimal },
    FieldSpec { name: "property_kind", kind: FieldKind::Text },
    FieldSpec { name: "bedrooms", kind: FieldKind::Integer },
    FieldSpec { name: "suites", kind: FieldKind::Integer },
    FieldSpec { name: "bathrooms", kind: FieldKind::Integer },
    FieldSpec { name: "parking_spaces", kind: FieldKind::Integer },
    FieldSpec { name: "area", kind: FieldKind::Integer },
    FieldSpec { name: "description", kind: FieldKind::Text },
    FieldSpec { name: "broker", kind: FieldKind::Text },
    FieldSpec { name: "floor", kind: FieldKind::Integer },
    FieldSpec { name: "balcony", kind: FieldKind::Flag },
    FieldSpec { name: "published_at", kind: FieldKind::Timestamp },
    FieldSpec { name: "site_updated_at", kind: FieldKind::Timestamp },
];

/// Fields readable from one element of a search-results list
pub const SUMMARY_SCHEMA: Schema = Schema {
    name: "summary",
    fields: SUMMARY_FIELDS,
};

/// Fields readable from a listing's own page
pub const DETAIL_SCHEMA: Schema = Schema {
    name: "detail",
    fields: DETAIL_FIELDS,
};
