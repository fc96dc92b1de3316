pub mod builders;
pub mod email;
pub mod error;
pub mod policy;
pub mod processor;
pub mod strategy;
pub mod validate;
