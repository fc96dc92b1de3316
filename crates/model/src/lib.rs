pub mod contact;
pub mod entity;
pub mod outcome;
pub mod payload;
pub mod record;
