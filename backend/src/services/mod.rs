pub mod imports;
pub mod mapping;
pub mod settings;
