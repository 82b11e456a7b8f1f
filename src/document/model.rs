use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// "Create document" payload. Field names follow the remote API exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub description: Description,
    pub doc_id: String,
    pub doc_status: String,
    pub doc_type: String,
    #[serde(rename = "importRequest")]
    pub import_request: bool,
    pub owner_inn: String,
    pub participant_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: String,
    pub reg_date: NaiveDate,
    pub reg_number: String,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub participant_inn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub certificate_document: String,
    // Opaque on the wire; the API does not pin a date format for it.
    pub certificate_document_date: String,
    pub certificate_document_number: String,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub tnved_code: String,
    pub uit_code: String,
    pub uitu_code: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn product(uit_code: &str) -> Product {
        Product {
            certificate_document: "CONFORMITY_CERTIFICATE".to_string(),
            certificate_document_date: "2023-12-01".to_string(),
            certificate_document_number: "RU-0001".to_string(),
            owner_inn: "7700000001".to_string(),
            producer_inn: "7700000002".to_string(),
            production_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            tnved_code: "6401100000".to_string(),
            uit_code: uit_code.to_string(),
            uitu_code: format!("{}-U", uit_code),
        }
    }

    pub fn document(doc_id: &str) -> Document {
        Document {
            description: Description {
                participant_inn: "7700000001".to_string(),
            },
            doc_id: doc_id.to_string(),
            doc_status: "DRAFT".to_string(),
            doc_type: "LP_INTRODUCE_GOODS".to_string(),
            import_request: true,
            owner_inn: "7700000001".to_string(),
            participant_inn: "7700000001".to_string(),
            producer_inn: "7700000002".to_string(),
            production_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            production_type: "OWN_PRODUCTION".to_string(),
            reg_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            reg_number: "REG-42".to_string(),
            products: vec![product("010000000001"), product("010000000002"), product("010000000003")],
        }
    }
}
