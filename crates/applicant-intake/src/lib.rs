//! Applicant intake: applicants, their address and intake form, and the
//! hosted photo attached at registration.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
