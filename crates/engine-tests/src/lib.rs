//! End-to-end tests driving the engine through the public runtime surface,
//! with in-memory stand-ins for the target system and the sinks.

pub mod support;

#[cfg(test)]
mod creation;
#[cfg(test)]
mod disable;
#[cfg(test)]
mod migration;
#[cfg(test)]
mod updates;
