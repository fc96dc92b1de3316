pub mod employment;
pub mod person;
pub mod position;
pub mod user;
