use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::domain::{
    Address, AddressId, Applicant, ApplicantId, Form, FormId, NewAddress, NewApplicant, NewForm,
};
use super::repository::{ApplicantRepository, ApplicantTransaction, RepositoryError};

#[derive(Debug, Clone, Default)]
struct Tables {
    applicants: BTreeMap<ApplicantId, Applicant>,
    addresses: BTreeMap<AddressId, Address>,
    forms: BTreeMap<FormId, Form>,
    applicant_seq: i32,
    address_seq: i32,
    form_seq: i32,
}

fn next_id(sequence: &mut i32) -> i32 {
    *sequence += 1;
    *sequence
}

impl Tables {
    fn address_for(&self, applicant: ApplicantId) -> Option<Address> {
        self.addresses
            .values()
            .find(|address| address.applicant_id == applicant)
            .cloned()
    }
}

/// Process-local store used by tests, the demo, and `serve --in-memory`.
///
/// A transaction holds the table lock until it commits or rolls back and
/// writes into a private copy, so concurrent requests are serialized and never
/// observe partial writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryApplicantStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryApplicantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn applicant_count(&self) -> usize {
        self.tables.lock().await.applicants.len()
    }

    pub async fn address_count(&self) -> usize {
        self.tables.lock().await.addresses.len()
    }

    pub async fn form_count(&self) -> usize {
        self.tables.lock().await.forms.len()
    }

    pub async fn forms_for(&self, applicant: ApplicantId) -> Vec<Form> {
        self.tables
            .lock()
            .await
            .forms
            .values()
            .filter(|form| form.applicant_id == applicant)
            .cloned()
            .collect()
    }

    pub async fn address(&self, id: AddressId) -> Option<Address> {
        self.tables.lock().await.addresses.get(&id).cloned()
    }
}

#[async_trait]
impl ApplicantRepository for MemoryApplicantStore {
    async fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        Ok(self.tables.lock().await.applicants.values().cloned().collect())
    }

    async fn fetch(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        Ok(self.tables.lock().await.applicants.get(&id).cloned())
    }

    async fn address_for(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        Ok(self.tables.lock().await.address_for(applicant))
    }

    async fn begin(&self) -> Result<Box<dyn ApplicantTransaction>, RepositoryError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = Tables::clone(&guard);
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl ApplicantTransaction for MemoryTransaction {
    async fn fetch_applicant(
        &mut self,
        id: ApplicantId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        Ok(self.working.applicants.get(&id).cloned())
    }

    async fn fetch_address(&mut self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        Ok(self.working.addresses.get(&id).cloned())
    }

    async fn address_for(
        &mut self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        Ok(self.working.address_for(applicant))
    }

    async fn insert_applicant(
        &mut self,
        applicant: NewApplicant,
        photo_url: Option<String>,
    ) -> Result<Applicant, RepositoryError> {
        let id = ApplicantId(next_id(&mut self.working.applicant_seq));
        let record = Applicant {
            id,
            first_name: applicant.first_name,
            last_name: applicant.last_name,
            second_last_name: applicant.second_last_name,
            birth_date: applicant.birth_date,
            phone: applicant.phone,
            email: applicant.email,
            photo_url,
        };
        self.working.applicants.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_address(
        &mut self,
        applicant: ApplicantId,
        address: NewAddress,
    ) -> Result<Address, RepositoryError> {
        if !self.working.applicants.contains_key(&applicant) {
            return Err(RepositoryError::Missing {
                resource: "applicant",
                id: applicant.0,
            });
        }
        let id = AddressId(next_id(&mut self.working.address_seq));
        let record = Address {
            id,
            applicant_id: applicant,
            street: address.street,
            exterior_number: address.exterior_number,
            interior_number: address.interior_number,
            neighborhood: address.neighborhood,
            municipality: address.municipality,
            state: address.state,
            postal_code: address.postal_code,
        };
        self.working.addresses.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_form(
        &mut self,
        applicant: ApplicantId,
        form: NewForm,
    ) -> Result<Form, RepositoryError> {
        if !self.working.applicants.contains_key(&applicant) {
            return Err(RepositoryError::Missing {
                resource: "applicant",
                id: applicant.0,
            });
        }
        let id = FormId(next_id(&mut self.working.form_seq));
        let record = Form {
            id,
            applicant_id: applicant,
            household_size: form.household_size,
            monthly_income: form.monthly_income,
            housing_status: form.housing_status,
            has_dependents: form.has_dependents,
            notes: form.notes,
        };
        self.working.forms.insert(id, record.clone());
        Ok(record)
    }

    async fn update_applicant(
        &mut self,
        applicant: &Applicant,
    ) -> Result<Applicant, RepositoryError> {
        match self.working.applicants.get_mut(&applicant.id) {
            Some(stored) => {
                *stored = applicant.clone();
                Ok(stored.clone())
            }
            None => Err(RepositoryError::Missing {
                resource: "applicant",
                id: applicant.id.0,
            }),
        }
    }

    async fn update_address(&mut self, address: &Address) -> Result<Address, RepositoryError> {
        match self.working.addresses.get_mut(&address.id) {
            Some(stored) => {
                *stored = address.clone();
                Ok(stored.clone())
            }
            None => Err(RepositoryError::Missing {
                resource: "address",
                id: address.id.0,
            }),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}
