use serde::Serialize;
use serde_json::Value;

use crate::backend::Row;

/// Columns recognised in an upload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Location,
    Description,
    ContactEmail,
    TrustScore,
    Price,
    ContactPhone,
    Website,
    BusinessHours,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Name,
        Column::Location,
        Column::Description,
        Column::ContactEmail,
        Column::TrustScore,
        Column::Price,
        Column::ContactPhone,
        Column::Website,
        Column::BusinessHours,
    ];

    pub const REQUIRED: [Column; 4] = [
        Column::Name,
        Column::Location,
        Column::Description,
        Column::ContactEmail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Location => "location",
            Column::Description => "description",
            Column::ContactEmail => "contact_email",
            Column::TrustScore => "trust_score",
            Column::Price => "price",
            Column::ContactPhone => "contact_phone",
            Column::Website => "website",
            Column::BusinessHours => "business_hours",
        }
    }

    /// Case-insensitive header lookup. Unknown headers map to `None`.
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(header))
    }

    pub fn is_required(self) -> bool {
        Column::REQUIRED.contains(&self)
    }
}

/// One validated data row of an agency upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRecord {
    pub name: String,
    pub location: String,
    pub description: String,
    pub contact_email: String,
    pub trust_score: f64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_hours: Option<String>,
}

impl CsvRecord {
    /// Backend row for this record, stamped with its owner.
    pub fn to_row(&self, owner_id: &str) -> Row {
        let mut row = Row::new();
        row.insert("owner_id".into(), Value::from(owner_id));
        row.insert("name".into(), Value::from(self.name.as_str()));
        row.insert("location".into(), Value::from(self.location.as_str()));
        row.insert("description".into(), Value::from(self.description.as_str()));
        row.insert("contact_email".into(), Value::from(self.contact_email.as_str()));
        row.insert("trust_score".into(), Value::from(self.trust_score));
        row.insert("price".into(), Value::from(self.price));
        if let Some(phone) = &self.contact_phone {
            row.insert("contact_phone".into(), Value::from(phone.as_str()));
        }
        if let Some(website) = &self.website {
            row.insert("website".into(), Value::from(website.as_str()));
        }
        if let Some(hours) = &self.business_hours {
            row.insert("business_hours".into(), Value::from(hours.as_str()));
        }
        row
    }
}
