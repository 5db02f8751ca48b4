pub mod audit_service;
pub mod background_jobs;
pub mod error;
pub mod fees;
pub mod lifecycle_service;
pub mod notification_service;
pub mod payment_gateway;
pub mod verification;
