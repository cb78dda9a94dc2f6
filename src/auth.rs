//! Token models and the pure expiration policy.

pub mod policy;
pub mod token;

pub use policy::*;
pub use token::{record::*, secret::*};
