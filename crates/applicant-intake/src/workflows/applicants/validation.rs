use super::domain::{
    AddressPatch, ApplicantEdit, ApplicantPatch, ApplicantSubmission, NewAddress, NewApplicant,
    NewForm,
};

/// Validation errors raised before any side effect takes place.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("photo attachment is missing")]
    MissingPhoto,
    #[error("expected a single photo attachment, received {count}")]
    MultiplePhotos { count: usize },
    #[error("photo attachment must be an image, received {content_type}")]
    UnsupportedPhotoType { content_type: String },
    #[error("photo attachment is empty")]
    EmptyPhoto,
    #[error("request payload is missing")]
    MissingPayload,
    #[error("request payload is malformed: {0}")]
    MalformedPayload(String),
    #[error("field `{field}` {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

const MAX_NAME_LEN: usize = 80;
const MAX_HOUSEHOLD_SIZE: i16 = 50;

/// Field-level checks for the typed intake payloads.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard;

impl IntakeGuard {
    pub fn check_submission(&self, submission: &ApplicantSubmission) -> Result<(), ValidationError> {
        self.check_applicant(&submission.applicant)?;
        self.check_address(&submission.address)?;
        self.check_form(&submission.form)
    }

    pub fn check_edit(&self, edit: &ApplicantEdit) -> Result<(), ValidationError> {
        self.check_applicant_patch(&edit.applicant)?;
        self.check_address_patch(&edit.address)
    }

    fn check_applicant(&self, applicant: &NewApplicant) -> Result<(), ValidationError> {
        name("firstName", &applicant.first_name)?;
        name("lastName", &applicant.last_name)?;
        if let Some(second) = &applicant.second_last_name {
            name("secondLastName", second)?;
        }
        phone(&applicant.phone)?;
        if let Some(email) = &applicant.email {
            email_address(email)?;
        }
        Ok(())
    }

    fn check_address(&self, address: &NewAddress) -> Result<(), ValidationError> {
        required("street", &address.street)?;
        required("exteriorNumber", &address.exterior_number)?;
        required("neighborhood", &address.neighborhood)?;
        required("municipality", &address.municipality)?;
        required("state", &address.state)?;
        postal_code(&address.postal_code)
    }

    fn check_form(&self, form: &NewForm) -> Result<(), ValidationError> {
        if !(1..=MAX_HOUSEHOLD_SIZE).contains(&form.household_size) {
            return Err(invalid("householdSize", "must be between 1 and 50"));
        }
        if form.monthly_income < 0 {
            return Err(invalid("monthlyIncome", "must not be negative"));
        }
        Ok(())
    }

    fn check_applicant_patch(&self, patch: &ApplicantPatch) -> Result<(), ValidationError> {
        if let Some(value) = &patch.first_name {
            name("firstName", value)?;
        }
        if let Some(value) = &patch.last_name {
            name("lastName", value)?;
        }
        if let Some(Some(value)) = &patch.second_last_name {
            name("secondLastName", value)?;
        }
        if let Some(value) = &patch.phone {
            phone(value)?;
        }
        if let Some(Some(value)) = &patch.email {
            email_address(value)?;
        }
        Ok(())
    }

    fn check_address_patch(&self, patch: &AddressPatch) -> Result<(), ValidationError> {
        let required_fields = [
            ("street", &patch.street),
            ("exteriorNumber", &patch.exterior_number),
            ("neighborhood", &patch.neighborhood),
            ("municipality", &patch.municipality),
            ("state", &patch.state),
        ];
        for (field, value) in required_fields {
            if let Some(value) = value {
                required(field, value)?;
            }
        }
        if let Some(value) = &patch.postal_code {
            postal_code(value)?;
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidField { field, reason }
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be blank"));
    }
    Ok(())
}

fn name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    required(field, value)?;
    if value.chars().count() > MAX_NAME_LEN {
        return Err(invalid(field, "must be at most 80 characters"));
    }
    Ok(())
}

fn phone(value: &str) -> Result<(), ValidationError> {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')'));
    if !allowed || !(7..=15).contains(&digits) {
        return Err(invalid("phone", "must contain 7 to 15 digits"));
    }
    Ok(())
}

fn email_address(value: &str) -> Result<(), ValidationError> {
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(invalid("email", "must be an email address")),
    }
}

fn postal_code(value: &str) -> Result<(), ValidationError> {
    if value.len() != 5 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("postalCode", "must be five digits"));
    }
    Ok(())
}
