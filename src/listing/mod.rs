//! Listing data model
//!
//! A listing is one property publication on a publisher's site, keyed by its
//! URL. Records are only ever changed through `ListingPatch` merges.

mod record;
mod schema;

pub use record::{ListingPatch, ListingRecord};
pub use schema::{DETAIL_SCHEMA, SUMMARY_SCHEMA};

/// Commercial proposal of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal {
    Sell,
    Rent,
    Other,
}

impl Proposal {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Sell => "sell",
            Self::Rent => "rent",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sell" => Some(Self::Sell),
            "rent" => Some(Self::Rent),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Interprets a label shown on a listing page
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if ["venda", "comprar", "compra", "sell", "sale", "buy"]
            .iter()
            .any(|word| label.contains(word))
        {
            Self::Sell
        } else if ["aluguel", "alugar", "locação", "locacao", "rent"]
            .iter()
            .any(|word| label.contains(word))
        {
            Self::Rent
        } else {
            Self::Other
        }
    }
}

/// Kind of property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    House,
    Apartment,
    Other,
}

impl PropertyKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Apartment => "apartment",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "house" => Some(Self::House),
            "apartment" => Some(Self::Apartment),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Interprets a property type label shown on a listing page
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if ["apartamento", "apto", "apartment", "flat", "studio", "kitnet", "cobertura"]
            .iter()
            .any(|word| label.contains(word))
        {
            Self::Apartment
        } else if ["casa", "sobrado", "house", "townhouse"]
            .iter()
            .any(|word| label.contains(word))
        {
            Self::House
        } else {
            Self::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_roundtrip() {
        for proposal in &[Proposal::Sell, Proposal::Rent, Proposal::Other] {
            assert_eq!(
                Proposal::from_db_string(proposal.to_db_string()),
                Some(*proposal)
            );
        }
        assert_eq!(Proposal::from_db_string("lease"), None);
    }

    #[test]
    fn test_proposal_labels() {
        assert_eq!(Proposal::from_label("Venda"), Proposal::Sell);
        assert_eq!(Proposal::from_label(" Aluguel "), Proposal::Rent);
        assert_eq!(Proposal::from_label("Temporada"), Proposal::Other);
    }

    #[test]
    fn test_property_kind_labels() {
        assert_eq!(PropertyKind::from_label("Apartamento padrão"), PropertyKind::Apartment);
        assert_eq!(PropertyKind::from_label("Casa de condomínio"), PropertyKind::House);
        assert_eq!(PropertyKind::from_label("Terreno"), PropertyKind::Other);
        assert_eq!(
            PropertyKind::from_db_string(PropertyKind::House.to_db_string()),
            Some(PropertyKind::House)
        );
    }
}
