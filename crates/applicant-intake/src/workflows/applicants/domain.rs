use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier wrapper for stored applicants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId(pub i32);

impl std::fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Person under review, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub id: ApplicantId,
    pub first_name: String,
    pub last_name: String,
    pub second_last_name: Option<String>,
    pub birth_date: NaiveDate,
    pub phone: String,
    pub email: Option<String>,
    /// Secure URL of the hosted photo; set once the upload succeeded.
    pub photo_url: Option<String>,
}

/// Physical address of an applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    pub applicant_id: ApplicantId,
    pub street: String,
    pub exterior_number: String,
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub municipality: String,
    pub state: String,
    pub postal_code: String,
}

/// Intake form captured when the applicant is registered. Never edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    pub applicant_id: ApplicantId,
    pub household_size: i16,
    pub monthly_income: i64,
    pub housing_status: HousingStatus,
    pub has_dependents: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HousingStatus {
    Owned,
    Rented,
    Borrowed,
    Other,
}

impl HousingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            HousingStatus::Owned => "owned",
            HousingStatus::Rented => "rented",
            HousingStatus::Borrowed => "borrowed",
            HousingStatus::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "owned" => Some(HousingStatus::Owned),
            "rented" => Some(HousingStatus::Rented),
            "borrowed" => Some(HousingStatus::Borrowed),
            "other" => Some(HousingStatus::Other),
            _ => None,
        }
    }
}

/// Applicant attributes supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewApplicant {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub second_last_name: Option<String>,
    pub birth_date: NaiveDate,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAddress {
    pub street: String,
    pub exterior_number: String,
    #[serde(default)]
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub municipality: String,
    pub state: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewForm {
    pub household_size: i16,
    pub monthly_income: i64,
    pub housing_status: HousingStatus,
    #[serde(default)]
    pub has_dependents: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured `data` part of the create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicantSubmission {
    #[serde(rename = "solicitante")]
    pub applicant: NewApplicant,
    #[serde(rename = "domicilio")]
    pub address: NewAddress,
    #[serde(rename = "formulario")]
    pub form: NewForm,
}

/// Keeps an explicit `null` apart from an absent key: absent stays `None`,
/// `null` becomes `Some(None)`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Partial update for an applicant; absent fields keep their stored value and
/// `null` clears the nullable ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub second_last_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
}

impl ApplicantPatch {
    pub fn apply(&self, applicant: &mut Applicant) {
        if let Some(first_name) = &self.first_name {
            applicant.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            applicant.last_name = last_name.clone();
        }
        if let Some(second_last_name) = &self.second_last_name {
            applicant.second_last_name = second_last_name.clone();
        }
        if let Some(birth_date) = self.birth_date {
            applicant.birth_date = birth_date;
        }
        if let Some(phone) = &self.phone {
            applicant.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            applicant.email = email.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exterior_number: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub interior_number: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl AddressPatch {
    pub fn apply(&self, address: &mut Address) {
        if let Some(street) = &self.street {
            address.street = street.clone();
        }
        if let Some(exterior_number) = &self.exterior_number {
            address.exterior_number = exterior_number.clone();
        }
        if let Some(interior_number) = &self.interior_number {
            address.interior_number = interior_number.clone();
        }
        if let Some(neighborhood) = &self.neighborhood {
            address.neighborhood = neighborhood.clone();
        }
        if let Some(municipality) = &self.municipality {
            address.municipality = municipality.clone();
        }
        if let Some(state) = &self.state {
            address.state = state.clone();
        }
        if let Some(postal_code) = &self.postal_code {
            address.postal_code = postal_code.clone();
        }
    }
}

/// Body of the edit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicantEdit {
    pub id: ApplicantId,
    #[serde(rename = "reqSolicitante", default)]
    pub applicant: ApplicantPatch,
    #[serde(rename = "reqDomicilio", default)]
    pub address: AddressPatch,
}

/// Body of the single-applicant lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicantLookup {
    pub id: ApplicantId,
}

/// Metadata returned by the image host for an uploaded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Records produced by a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredApplicant {
    #[serde(rename = "createSolicitante")]
    pub applicant: Applicant,
    #[serde(rename = "createDomicilio")]
    pub address: Address,
    #[serde(rename = "createFormulario")]
    pub form: Form,
    #[serde(rename = "foto")]
    pub photo: StoredImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantWithAddress {
    #[serde(rename = "solicitante")]
    pub applicant: Applicant,
    #[serde(rename = "domicilio")]
    pub address: Address,
}
