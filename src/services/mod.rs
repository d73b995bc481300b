pub mod audit_service;
pub mod grading_service;
pub mod submission_service;
pub mod test_service;
