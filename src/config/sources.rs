pub mod global_file;
pub mod stored_settings;
