pub mod profile;
pub mod resolver;
