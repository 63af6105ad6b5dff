use crate::extract::ExtractedRecord;
use crate::listing::{PropertyKind, Proposal};
use chrono::{DateTime, Utc};

/// Everything known about one listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub url: String,
    pub publisher: Option<String>,
    pub search_url: Option<String>,

    // Summary attributes
    pub proposal: Option<Proposal>,
    pub property_kind: Option<PropertyKind>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub condo_fee: Option<f64>,
    pub property_tax: Option<f64>,
    pub bedrooms: Option<i64>,
    pub suites: Option<i64>,
    pub bathrooms: Option<i64>,
    pub parking_spaces: Option<i64>,
    pub area: Option<i64>,
    pub thumbnail: Option<Vec<u8>>,

    // Detail attributes
    pub description: Option<String>,
    pub broker: Option<String>,
    pub floor: Option<i64>,
    pub balcony: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_updated_at: Option<DateTime<Utc>>,
    pub preview: Option<Vec<u8>>,

    // Bookkeeping
    pub to_inspect: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A partial update of one listing; `None` means "leave as is"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPatch {
    pub url: String,
    pub publisher: Option<String>,
    pub search_url: Option<String>,
    pub proposal: Option<Proposal>,
    pub property_kind: Option<PropertyKind>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub condo_fee: Option<f64>,
    pub property_tax: Option<f64>,
    pub bedrooms: Option<i64>,
    pub suites: Option<i64>,
    pub bathrooms: Option<i64>,
    pub parking_spaces: Option<i64>,
    pub area: Option<i64>,
    pub thumbnail: Option<Vec<u8>>,
    pub description: Option<String>,
    pub broker: Option<String>,
    pub floor: Option<i64>,
    pub balcony: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_updated_at: Option<DateTime<Utc>>,
    pub preview: Option<Vec<u8>>,
    pub to_inspect: Option<bool>,
    pub deleted: Option<bool>,
}

impl ListingPatch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Builds a patch from mapper output
    ///
    /// Unknown names are ignored and `url` is taken from the argument, not the
    /// record. Values of the wrong kind are dropped.
    pub fn from_fields(url: impl Into<String>, fields: &ExtractedRecord) -> Self {
        let mut patch = Self::new(url);
        for (name, value) in fields {
            match name.as_str() {
                "address" => patch.address = value.as_text().map(str::to_string),
                "price" => patch.price = value.as_decimal(),
                "condo_fee" => patch.condo_fee = value.as_decimal(),
                "property_tax" => patch.property_tax = value.as_decimal(),
                "property_kind" => patch.property_kind = value.as_text().map(PropertyKind::from_label),
                "proposal" => patch.proposal = value.as_text().map(Proposal::from_label),
                "bedrooms" => patch.bedrooms = value.as_integer(),
                "suites" => patch.suites = value.as_integer(),
                "bathrooms" => patch.bathrooms = value.as_integer(),
                "parking_spaces" => patch.parking_spaces = value.as_integer(),
                "area" => patch.area = value.as_integer(),
                "thumbnail" => patch.thumbnail = value.as_bytes().map(<[u8]>::to_vec),
                "description" => patch.description = value.as_text().map(str::to_string),
                "broker" => patch.broker = value.as_text().map(str::to_string),
                "floor" => patch.floor = value.as_integer(),
                "balcony" => patch.balcony = value.as_flag(),
                "published_at" => patch.published_at = value.as_timestamp(),
                "site_updated_at" => patch.site_updated_at = value.as_timestamp(),
                _ => {}
            }
        }
        patch
    }
}

impl ListingRecord {
    /// A new record holding exactly what the patch carries
    pub fn from_patch(patch: &ListingPatch, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            url: patch.url.clone(),
            publisher: None,
            search_url: None,
            proposal: None,
            property_kind: None,
            address: None,
            price: None,
            condo_fee: None,
            property_tax: None,
            bedrooms: None,
            suites: None,
            bathrooms: None,
            parking_spaces: None,
            area: None,
            thumbnail: None,
            description: None,
            broker: None,
            floor: None,
            balcony: None,
            published_at: None,
            site_updated_at: None,
            preview: None,
            to_inspect: true,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        record.apply(patch, now);
        record
    }

    /// Merges a patch field by field
    ///
    /// A field is overwritten only when the patch carries a value that
    /// differs. `updated_at` always moves to `max(now, updated_at)`. Returns
    /// whether any attribute changed.
    pub fn apply(&mut self, patch: &ListingPatch, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut self.publisher, &patch.publisher);
        changed |= overwrite(&mut self.search_url, &patch.search_url);
        changed |= overwrite(&mut self.proposal, &patch.proposal);
        changed |= overwrite(&mut self.property_kind, &patch.property_kind);
        changed |= overwrite(&mut self.address, &patch.address);
        changed |= overwrite(&mut self.price, &patch.price);
        changed |= overwrite(&mut self.condo_fee, &patch.condo_fee);
        changed |= overwrite(&mut self.property_tax, &patch.property_tax);
        changed |= overwrite(&mut self.bedrooms, &patch.bedrooms);
        changed |= overwrite(&mut self.suites, &patch.suites);
        changed |= overwrite(&mut self.bathrooms, &patch.bathrooms);
        changed |= overwrite(&mut self.parking_spaces, &patch.parking_spaces);
        changed |= overwrite(&mut self.area, &patch.area);
        changed |= overwrite(&mut self.thumbnail, &patch.thumbnail);
        changed |= overwrite(&mut self.description, &patch.description);
        changed |= overwrite(&mut self.broker, &patch.broker);
        changed |= overwrite(&mut self.floor, &patch.floor);
        changed |= overwrite(&mut self.balcony, &patch.balcony);
        changed |= overwrite(&mut self.published_at, &patch.published_at);
        changed |= overwrite(&mut self.site_updated_at, &patch.site_updated_at);
        changed |= overwrite(&mut self.preview, &patch.preview);

        if let Some(to_inspect) = patch.to_inspect {
            changed |= self.to_inspect != to_inspect;
            self.to_inspect = to_inspect;
        }
        if let Some(deleted) = patch.deleted {
            changed |= self.deleted != deleted;
            self.deleted = deleted;
        }

        self.updated_at = self.updated_at.max(now);
        changed
    }
}

fn overwrite<T: Clone + PartialEq>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(value) => {
            *slot = Some(value.clone());
            true
        }
        _ => false,
    }
}
