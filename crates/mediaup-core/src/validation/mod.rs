//! Validation modules

pub mod upload;

pub use upload::{
    allowed_content_types, build_object_key, extension_matches_content_type, max_size_bytes,
    part_count, part_range, sanitize_file_name, validate_upload, MAX_FILE_NAME_LENGTH,
};
