pub mod open_flags;
pub mod open_options;
