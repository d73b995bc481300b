pub mod audit_log;
pub mod question;
pub mod submission;
