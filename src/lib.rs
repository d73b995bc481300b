pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::database::AssessmentStore;
use crate::services::{
    audit_service::AuditService, submission_service::SubmissionService,
    test_service::TestService,
};

#[derive(Clone)]
pub struct AppState {
    pub test_service: TestService,
    pub submission_service: SubmissionService,
    pub audit_service: AuditService,
}

impl AppState {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self {
            test_service: TestService::new(store.clone()),
            submission_service: SubmissionService::new(store.clone()),
            audit_service: AuditService::new(store),
        }
    }
}
