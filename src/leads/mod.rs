//! Lead capture: validation, persistence, notification and reconciliation.

pub mod model;
pub mod reconcile;
pub mod routes;
pub mod service;
pub mod template;
pub mod validate;

pub use model::{ClientMeta, Lead, LeadSubmission, NewLead, NotificationLog, NotificationOutcome};
pub use routes::lead_routes;
pub use service::{Accepted, LeadService};
