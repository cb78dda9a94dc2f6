//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` holds validated endpoint metadata plus the quirks the keeper honors (PKCE,
//! scope delimiter, fallback token lifetime). `strategy` defines [`ProviderStrategy`], the hook
//! that decides which token endpoint failures are permanent and which API statuses mean
//! "unauthorized".

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
