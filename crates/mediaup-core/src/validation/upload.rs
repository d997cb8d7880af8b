//! Upload request validation, object key construction and part arithmetic

use std::ops::Range;

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::AppError;
use crate::models::LogicalFileType;

pub const MAX_FILE_NAME_LENGTH: usize = 255;

const MB: u64 = 1024 * 1024;

const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

const VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/wmv",
    "video/quicktime",
    "video/flv",
    "video/webm",
    "video/mkv",
];

/// Accepted extensions per content type. Types missing here accept any extension.
const EXTENSIONS: &[(&str, &[&str])] = &[
    ("video/mp4", &["mp4"]),
    ("video/avi", &["avi"]),
    ("video/mov", &["mov"]),
    ("video/quicktime", &["mov"]),
    ("video/wmv", &["wmv"]),
    ("video/flv", &["flv"]),
    ("video/webm", &["webm"]),
    ("video/mkv", &["mkv"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/jpg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("image/bmp", &["bmp"]),
    ("image/tiff", &["tiff", "tif"]),
];

pub fn max_size_bytes(logical_type: LogicalFileType) -> u64 {
    match logical_type {
        LogicalFileType::Image => 50 * MB,
        LogicalFileType::Avatar => 10 * MB,
        LogicalFileType::Video | LogicalFileType::Work | LogicalFileType::Other => 500 * MB,
    }
}

pub fn allowed_content_types(logical_type: LogicalFileType) -> Vec<&'static str> {
    match logical_type {
        LogicalFileType::Image | LogicalFileType::Avatar => IMAGE_TYPES.to_vec(),
        LogicalFileType::Video => VIDEO_TYPES.to_vec(),
        LogicalFileType::Work | LogicalFileType::Other => {
            IMAGE_TYPES.iter().chain(VIDEO_TYPES).copied().collect()
        }
    }
}

pub fn extension_matches_content_type(file_name: &str, content_type: &str) -> bool {
    let Some(allowed) = EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, exts)| *exts)
    else {
        return true;
    };

    match file_name.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            allowed.iter().any(|a| *a == ext)
        }
        None => false,
    }
}

/// Check name, size and content type against the limits of `logical_type`.
pub fn validate_upload(
    file_name: &str,
    size: u64,
    content_type: &str,
    logical_type: LogicalFileType,
) -> Result<(), AppError> {
    let name_len = file_name.chars().count();
    if name_len == 0 || name_len > MAX_FILE_NAME_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "File name must be between 1 and {} characters",
            MAX_FILE_NAME_LENGTH
        )));
    }

    if size == 0 {
        return Err(AppError::InvalidInput(
            "File size must be at least 1 byte".to_string(),
        ));
    }

    let max = max_size_bytes(logical_type);
    if size > max {
        return Err(AppError::InvalidInput(format!(
            "File size {} exceeds the {} limit of {} MB",
            size,
            logical_type,
            max / MB
        )));
    }

    let content_type = content_type.to_lowercase();
    if !allowed_content_types(logical_type).contains(&content_type.as_str()) {
        return Err(AppError::InvalidInput(format!(
            "Content type {} is not allowed for {} uploads",
            content_type, logical_type
        )));
    }

    if !extension_matches_content_type(file_name, &content_type) {
        return Err(AppError::InvalidInput(format!(
            "File extension does not match content type {}",
            content_type
        )));
    }

    Ok(())
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `{type}s/{category}/{owner}/{unix_millis}_{random8}_{sanitized_name}`
pub fn build_object_key(
    logical_type: LogicalFileType,
    category: &str,
    owner_id: &str,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();

    format!(
        "{}s/{}/{}/{}_{}_{}",
        logical_type,
        sanitize_file_name(category),
        sanitize_file_name(owner_id),
        now.timestamp_millis(),
        random,
        sanitize_file_name(file_name)
    )
}

/// `ceil(size / part_size)`; zero when either is zero.
pub fn part_count(size: u64, part_size: u64) -> u32 {
    if size == 0 || part_size == 0 {
        return 0;
    }
    size.div_ceil(part_size) as u32
}

/// Byte range of part `index`; the last part may be shorter.
pub fn part_range(index: u32, size: u64, part_size: u64) -> Range<u64> {
    let start = (index as u64).saturating_mul(part_size).min(size);
    let end = start.saturating_add(part_size).min(size);
    start..end
}
