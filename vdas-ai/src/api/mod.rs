//! HTTP API handlers for vdas-ai

pub mod assessments;
pub mod health;
pub mod upload;

pub use assessments::assessment_routes;
pub use health::health_routes;
pub use upload::upload_routes;
