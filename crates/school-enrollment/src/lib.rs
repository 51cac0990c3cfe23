//! Enrollment transition workflow for school administration: grading of the
//! outgoing class, bulk generation of next-year enrollments, and the
//! confirmation / extraordinary exam flow that finalises each one.

rust_i18n::i18n!("locales", fallback = "pt-PT");

pub mod config;
pub mod error;
pub mod i18n;
pub mod telemetry;
pub mod workflows;
