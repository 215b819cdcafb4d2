//! The authorization server the courier links accounts against.
//!
//! `descriptor` holds validated data (HTTPS endpoints, enabled grants, client authentication
//! mode, quirks). `strategy` holds behavior: how token endpoint failures are classified and which
//! extra form fields a provider wants on token requests.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
