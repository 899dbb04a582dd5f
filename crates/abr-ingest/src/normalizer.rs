// Record Normalization
//
// Fans one parsed <ABR> record out into the row tuples of every target
// table. Organisation and alternate names are search-normalized; everything
// else is trimmed only. Missing elements read as empty strings.

use crate::models::{
    AbrRecordRow, AddressRow, AlternateNameRow, EntityTypeRow, FundEntryRow, IdentityStatusRow,
    IndividualNameRow, NormalizedRecord, PrincipalNameRow, RegistrationNumberRow, TaxStatusRow,
};
use crate::parser::XmlNode;
use abr_common::text::{clean_field, normalize_name};

/// Alternate name types kept: trading name, business name, other trading name
pub const ALTERNATE_NAME_TYPES: [&str; 3] = ["TRD", "BN", "OTN"];

/// Normalize one record, or `None` when it has no ABN
pub fn normalize(record: &XmlNode) -> Option<NormalizedRecord> {
    let abn = clean_field(record.text("ABN"));
    if abn.is_empty() {
        return None;
    }

    let (principal_name, individual_name) = principal_name(record, &abn);

    Some(NormalizedRecord {
        record: AbrRecordRow {
            abn: abn.clone(),
            record_last_updated_date: clean_field(record.attr("recordLastUpdatedDate")),
        },
        identity: IdentityStatusRow {
            abn: abn.clone(),
            status: clean_field(record.attr_at("ABN", "status")),
            status_date: clean_field(record.attr_at("ABN", "ABNStatusFromDate")),
        },
        entity_type: entity_type(record, &abn),
        principal_name,
        individual_name,
        address: address(record, &abn),
        registration_numbers: registration_numbers(record, &abn),
        tax_status: tax_status(record, &abn),
        fund_entries: fund_entries(record, &abn),
        alternate_names: alternate_names(record, &abn),
    })
}

fn entity_type(record: &XmlNode, abn: &str) -> Option<EntityTypeRow> {
    let ind = clean_field(record.text("EntityType/EntityTypeInd"));
    let text = clean_field(record.text("EntityType/EntityTypeText"));
    if ind.is_empty() && text.is_empty() {
        return None;
    }
    Some(EntityTypeRow {
        abn: abn.to_string(),
        entity_type_ind: ind,
        entity_type_text: text,
    })
}

fn principal_name(
    record: &XmlNode,
    abn: &str,
) -> (Option<PrincipalNameRow>, Option<IndividualNameRow>) {
    if let Some(organisation) = record.find("MainEntity/NonIndividualName") {
        let name = normalize_name(organisation.text("NonIndividualNameText"));
        let row = (!name.is_empty()).then(|| PrincipalNameRow {
            abn: abn.to_string(),
            name_type: clean_field(organisation.attr("type")),
            name,
        });
        return (row, None);
    }

    if let Some(individual) = record.find("LegalEntity/IndividualName") {
        let given_name = individual
            .find_all("GivenName")
            .into_iter()
            .map(|given| clean_field(given.own_text()))
            .filter(|given| !given.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let row = IndividualNameRow {
            abn: abn.to_string(),
            name_type: clean_field(individual.attr("type")),
            name_title: clean_field(individual.text("NameTitle")),
            given_name,
            family_name: clean_field(individual.text("FamilyName")),
        };
        return (None, Some(row));
    }

    (None, None)
}

fn address(record: &XmlNode, abn: &str) -> Option<AddressRow> {
    let details = record.find("//BusinessAddress/AddressDetails")?;
    let state = clean_field(details.text("State"));
    let postcode = clean_field(details.text("Postcode"));
    if state.is_empty() && postcode.is_empty() {
        return None;
    }
    Some(AddressRow {
        abn: abn.to_string(),
        state,
        postcode,
    })
}

fn registration_numbers(record: &XmlNode, abn: &str) -> Vec<RegistrationNumberRow> {
    record
        .find_all("ASICNumber")
        .into_iter()
        .filter_map(|asic| {
            let number = clean_field(asic.own_text());
            let number_type = clean_field(asic.attr("ASICNumberType"));
            (!number.is_empty() && !number_type.is_empty()).then(|| RegistrationNumberRow {
                abn: abn.to_string(),
                number,
                number_type,
            })
        })
        .collect()
}

fn tax_status(record: &XmlNode, abn: &str) -> Option<TaxStatusRow> {
    let gst = record.find("GST")?;
    let status = clean_field(gst.attr("status"));
    if status.is_empty() {
        return None;
    }
    Some(TaxStatusRow {
        abn: abn.to_string(),
        status,
        status_date: clean_field(gst.attr("GSTStatusFromDate")),
    })
}

fn fund_entries(record: &XmlNode, abn: &str) -> Vec<FundEntryRow> {
    record
        .find_all("DGR")
        .into_iter()
        .filter_map(|dgr| {
            let status_date = clean_field(dgr.attr("DGRStatusFromDate"));
            let name = clean_field(dgr.text("NonIndividualName/NonIndividualNameText"));
            if status_date.is_empty() && name.is_empty() {
                return None;
            }
            Some(FundEntryRow {
                abn: abn.to_string(),
                status_date,
                name_type: clean_field(dgr.attr_at("NonIndividualName", "type")),
                name,
            })
        })
        .collect()
}

fn alternate_names(record: &XmlNode, abn: &str) -> Vec<AlternateNameRow> {
    record
        .find_all("OtherEntity/NonIndividualName")
        .into_iter()
        .filter_map(|other| {
            let name_type = clean_field(other.attr("type"));
            if !ALTERNATE_NAME_TYPES.contains(&name_type.as_str()) {
                return None;
            }
            let name = normalize_name(other.text("NonIndividualNameText"));
            (!name.is_empty()).then(|| AlternateNameRow {
                abn: abn.to_string(),
                name_type,
                name,
            })
        })
        .collect()
}
