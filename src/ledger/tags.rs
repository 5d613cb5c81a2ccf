//! Versioned tag scheme for chunk identification.
//!
//! Chunks are found again by tag, not by transaction id, so the tag values
//! must be stable across integration versions: a downloader queries by the
//! versioned chunk id and will only see blobs written by a compatible
//! uploader.

use super::remote::Tag;

pub const INTEGRATION_VERSION_MAJOR: u32 = 1;
pub const INTEGRATION_VERSION_MINOR: u32 = 0;

pub const TAG_VERSION_MAJOR: &str = "App-Version-Major";
pub const TAG_VERSION_MINOR: &str = "App-Version-Minor";
pub const TAG_CHUNK_ID: &str = "Chunk-Id";
pub const TAG_CHUNK_ID_VERSIONED: &str = "Chunk-Id-Versioned";

/// The version-scoped chunk id used as the download query key.
pub fn versioned_chunk_id(chunk_id: &str) -> String {
    format!("v{INTEGRATION_VERSION_MAJOR}.{INTEGRATION_VERSION_MINOR}:{chunk_id}")
}

/// Full tag set attached to every submitted chunk.
pub fn chunk_tags(chunk_id: &str) -> Vec<Tag> {
    vec![
        Tag::new(TAG_VERSION_MAJOR, INTEGRATION_VERSION_MAJOR.to_string()),
        Tag::new(TAG_VERSION_MINOR, INTEGRATION_VERSION_MINOR.to_string()),
        Tag::new(TAG_CHUNK_ID, chunk_id),
        Tag::new(TAG_CHUNK_ID_VERSIONED, versioned_chunk_id(chunk_id)),
    ]
}
