//! lead-relay — contact-form lead capture with SMS, WhatsApp and email notifications.

pub mod channels;
pub mod config;
pub mod error;
pub mod leads;
pub mod rate_limit;
pub mod server;
pub mod store;
