pub mod applicants;
