// tactus/src/state/mod.rs
pub mod templates;
