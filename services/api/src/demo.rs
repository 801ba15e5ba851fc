use applicant_intake::error::AppError;
use applicant_intake::workflows::applicants::{
    AddressPatch, ApplicantEdit, ApplicantPatch, ApplicantService, ApplicantSubmission,
    HousingStatus, MemoryApplicantStore, MemoryImageStore, NewAddress, NewApplicant, NewForm,
};
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// 1x1 transparent PNG used when no photo is supplied.
const PLACEHOLDER_PNG: [u8; 67] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Photo to attach to the sample applicant. Defaults to a generated 1x1 PNG.
    #[arg(long)]
    pub(crate) photo: Option<PathBuf>,
    /// Skip the image host outage scenario.
    #[arg(long)]
    pub(crate) skip_outage: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { photo, skip_outage } = args;

    // Keeps the generated placeholder alive until the demo finishes.
    let placeholder;
    let photo = match photo {
        Some(path) => path,
        None => {
            placeholder = tempfile::Builder::new()
                .prefix("applicant-demo-")
                .suffix(".png")
                .tempfile()?;
            tokio::fs::write(placeholder.path(), PLACEHOLDER_PNG).await?;
            placeholder.path().to_path_buf()
        }
    };

    println!("Applicant intake demo (in-memory gateways)");
    let store = Arc::new(MemoryApplicantStore::new());
    let images = Arc::new(MemoryImageStore::new());
    let service = ApplicantService::new(store.clone(), images.clone());

    let registered = match service.register(demo_submission(), &photo).await {
        Ok(registered) => registered,
        Err(err) => {
            println!("  Registration rejected [{}]: {}", err.kind().label(), err);
            return Ok(());
        }
    };
    println!(
        "- Registered applicant {} with address {} and form {}",
        registered.applicant.id, registered.address.id.0, registered.form.id.0
    );
    println!(
        "  Photo hosted at {} ({} bytes)",
        registered.photo.secure_url, registered.photo.bytes
    );

    let edit = ApplicantEdit {
        id: registered.applicant.id,
        applicant: ApplicantPatch {
            phone: Some("33 9876 5432".to_string()),
            ..ApplicantPatch::default()
        },
        address: AddressPatch {
            interior_number: Some(Some("7".to_string())),
            ..AddressPatch::default()
        },
    };
    match service.edit(edit).await {
        Ok(updated) => println!(
            "- Edited applicant {} (lookup {}): phone {} | interior {}",
            updated.applicant.id,
            service.address_lookup().label(),
            updated.applicant.phone,
            updated.address.interior_number.as_deref().unwrap_or("-")
        ),
        Err(err) => println!("  Edit failed [{}]: {}", err.kind().label(), err),
    }

    match service.get(registered.applicant.id).await {
        Ok(found) => match serde_json::to_string_pretty(&found) {
            Ok(json) => println!("  Lookup payload:\n{}", json),
            Err(err) => println!("  Lookup payload unavailable: {}", err),
        },
        Err(err) => println!("  Lookup failed [{}]: {}", err.kind().label(), err),
    }

    if !skip_outage {
        println!("\nImage host outage");
        images.set_offline(true);
        match service.register(demo_submission(), &photo).await {
            Ok(_) => println!("  Unexpectedly registered while the host was offline"),
            Err(err) => println!("  Registration failed [{}]: {}", err.kind().label(), err),
        }
        images.set_offline(false);
    }

    let applicants = match service.list().await {
        Ok(applicants) => applicants,
        Err(err) => {
            println!("  Listing failed [{}]: {}", err.kind().label(), err);
            return Ok(());
        }
    };
    println!(
        "\nStored: {} applicants | {} addresses | {} forms | {} hosted photos",
        applicants.len(),
        store.address_count().await,
        store.form_count().await,
        images.uploads().len()
    );

    Ok(())
}

fn demo_submission() -> ApplicantSubmission {
    ApplicantSubmission {
        applicant: NewApplicant {
            first_name: "Rosa".to_string(),
            last_name: "Martínez".to_string(),
            second_last_name: Some("Vega".to_string()),
            birth_date: NaiveDate::from_ymd_opt(1991, 7, 23).unwrap_or_default(),
            phone: "33 1234 5678".to_string(),
            email: Some("rosa.martinez@example.mx".to_string()),
        },
        address: NewAddress {
            street: "Avenida Vallarta".to_string(),
            exterior_number: "1500".to_string(),
            interior_number: None,
            neighborhood: "Americana".to_string(),
            municipality: "Guadalajara".to_string(),
            state: "Jalisco".to_string(),
            postal_code: "44160".to_string(),
        },
        form: NewForm {
            household_size: 3,
            monthly_income: 14_000,
            housing_status: HousingStatus::Rented,
            has_dependents: true,
            notes: Some("Prefers contact after 18:00".to_string()),
        },
    }
}
