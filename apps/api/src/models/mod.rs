pub mod letter;
pub mod profile;
