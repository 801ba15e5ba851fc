//! Applicant intake: registration with a hosted photo, partial edits, and lookups.
//!
//! Every write runs inside one storage transaction. The photo upload happens
//! before that transaction opens and is not rolled back with it.

pub mod cloudinary;
pub mod domain;
pub mod images;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod router;
pub mod service;
pub(crate) mod validation;

#[cfg(test)]
mod tests;

pub use cloudinary::CloudinaryImageStore;
pub use domain::{
    Address, AddressId, AddressPatch, Applicant, ApplicantEdit, ApplicantId, ApplicantLookup,
    ApplicantPatch, ApplicantSubmission, ApplicantWithAddress, Form, FormId, HousingStatus,
    NewAddress, NewApplicant, NewForm, RegisteredApplicant, StoredImage,
};
pub use images::{ImageStore, ImageStoreError, MemoryImageStore};
pub use memory::MemoryApplicantStore;
pub use postgres::PgApplicantStore;
pub use repository::{AddressLookup, ApplicantRepository, ApplicantTransaction, RepositoryError};
pub use router::applicant_router;
pub use service::{ApplicantService, ApplicantServiceError, ErrorKind, ORPHANED_IMAGES_METRIC};
pub use validation::{IntakeGuard, ValidationError};
