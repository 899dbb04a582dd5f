// Registry Row Models

use serde::Serialize;
use std::fmt;

// ============================================================================
// Target Tables
// ============================================================================

/// Base tables populated by the loader, in flush order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    AbrRecords,
    IdentityStatus,
    EntityType,
    PrincipalNames,
    IndividualNames,
    Addresses,
    RegistrationNumbers,
    TaxStatus,
    FundEntries,
    AlternateNames,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::AbrRecords,
        Table::IdentityStatus,
        Table::EntityType,
        Table::PrincipalNames,
        Table::IndividualNames,
        Table::Addresses,
        Table::RegistrationNumbers,
        Table::TaxStatus,
        Table::FundEntries,
        Table::AlternateNames,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::AbrRecords => "abr_records",
            Table::IdentityStatus => "identity_status",
            Table::EntityType => "entity_type",
            Table::PrincipalNames => "principal_names",
            Table::IndividualNames => "individual_names",
            Table::Addresses => "addresses",
            Table::RegistrationNumbers => "registration_numbers",
            Table::TaxStatus => "tax_status",
            Table::FundEntries => "fund_entries",
            Table::AlternateNames => "alternate_names",
        }
    }

    /// Tables with the ABN as primary key; later duplicates are ignored
    pub fn is_keyed(self) -> bool {
        matches!(
            self,
            Table::AbrRecords | Table::IdentityStatus | Table::EntityType
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Row Tuples
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbrRecordRow {
    pub abn: String,
    pub record_last_updated_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityStatusRow {
    pub abn: String,
    pub status: String,
    pub status_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeRow {
    pub abn: String,
    pub entity_type_ind: String,
    pub entity_type_text: String,
}

/// Organisation name, stored search-normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalNameRow {
    pub abn: String,
    pub name_type: String,
    pub name: String,
}

/// Sole-trader name parts, trimmed but otherwise as registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndividualNameRow {
    pub abn: String,
    pub name_type: String,
    pub name_title: String,
    /// All given names joined by single spaces
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRow {
    pub abn: String,
    pub state: String,
    pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationNumberRow {
    pub abn: String,
    pub number: String,
    pub number_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxStatusRow {
    pub abn: String,
    pub status: String,
    pub status_date: String,
}

/// Deductible gift recipient entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundEntryRow {
    pub abn: String,
    pub status_date: String,
    pub name_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternateNameRow {
    pub abn: String,
    pub name_type: String,
    pub name: String,
}

// ============================================================================
// Normalized Record
// ============================================================================

/// Every row one registry record contributes, grouped by target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    pub record: AbrRecordRow,
    pub identity: IdentityStatusRow,
    pub entity_type: Option<EntityTypeRow>,
    pub principal_name: Option<PrincipalNameRow>,
    pub individual_name: Option<IndividualNameRow>,
    pub address: Option<AddressRow>,
    pub registration_numbers: Vec<RegistrationNumberRow>,
    pub tax_status: Option<TaxStatusRow>,
    pub fund_entries: Vec<FundEntryRow>,
    pub alternate_names: Vec<AlternateNameRow>,
}

impl NormalizedRecord {
    pub fn abn(&self) -> &str {
        &self.record.abn
    }

    /// Rows this record would add to `table`
    pub fn row_count(&self, table: Table) -> usize {
        match table {
            Table::AbrRecords | Table::IdentityStatus => 1,
            Table::EntityType => usize::from(self.entity_type.is_some()),
            Table::PrincipalNames => usize::from(self.principal_name.is_some()),
            Table::IndividualNames => usize::from(self.individual_name.is_some()),
            Table::Addresses => usize::from(self.address.is_some()),
            Table::RegistrationNumbers => self.registration_numbers.len(),
            Table::TaxStatus => usize::from(self.tax_status.is_some()),
            Table::FundEntries => self.fund_entries.len(),
            Table::AlternateNames => self.alternate_names.len(),
        }
    }

    pub fn total_rows(&self) -> usize {
        Table::ALL.iter().map(|t| self.row_count(*t)).sum()
    }
}
