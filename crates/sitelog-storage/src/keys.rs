//! Shared object key generation.
//!
//! Key format: `{owner_record_id}/{filename}` for the first upload of a file,
//! `{owner_record_id}/{stem}~{revision}.{ext}` for replacements. `~` never
//! survives sanitization, so the revision marker is unambiguous.

use sitelog_core::StoreError;
use uuid::Uuid;

const MAX_FILENAME_LEN: usize = 200;
const MAX_OWNER_LEN: usize = 128;
const REVISION_MARKER: char = '~';

/// Reduce a user-supplied filename to a safe key component.
///
/// Directory parts are dropped, characters outside `[A-Za-z0-9._-]` become `_`
/// and leading dots are removed.
pub fn sanitize_filename(filename: &str) -> Result<String, StoreError> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "filename '{}' has no usable characters",
            filename
        )));
    }
    if cleaned.len() > MAX_FILENAME_LEN {
        return Err(StoreError::InvalidInput(format!(
            "filename longer than {} characters",
            MAX_FILENAME_LEN
        )));
    }
    Ok(cleaned.to_string())
}

/// Validate an owner record id for use as the key prefix.
pub fn validate_owner(owner_record_id: &str) -> Result<&str, StoreError> {
    let owner = owner_record_id.trim();
    let valid_chars = owner
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if owner.is_empty() || owner.len() > MAX_OWNER_LEN || !valid_chars || owner.starts_with('.') {
        return Err(StoreError::InvalidInput(format!(
            "invalid owner record id '{}'",
            owner_record_id
        )));
    }
    Ok(owner)
}

/// Key for the first upload of `filename` under `owner_record_id`.
pub fn document_key(owner_record_id: &str, filename: &str) -> Result<String, StoreError> {
    let owner = validate_owner(owner_record_id)?;
    let filename = sanitize_filename(filename)?;
    Ok(format!("{}/{}", owner, filename))
}

/// Key for a replacement of `filename`, distinct from every earlier key.
pub fn revision_key(owner_record_id: &str, filename: &str) -> String {
    let revision = Uuid::new_v4().simple().to_string();
    let revision = &revision[..12];
    match split_extension(filename) {
        (stem, Some(ext)) => format!(
            "{}/{}{}{}.{}",
            owner_record_id, stem, REVISION_MARKER, revision, ext
        ),
        (stem, None) => format!("{}/{}{}{}", owner_record_id, stem, REVISION_MARKER, revision),
    }
}

/// Split a key produced by this module into `(owner, original filename)`,
/// dropping any revision marker.
pub fn parse_key(key: &str) -> Result<(String, String), StoreError> {
    let invalid = || StoreError::InvalidInput(format!("malformed object key '{}'", key));

    let (owner, name) = key.split_once('/').ok_or_else(invalid)?;
    if name.is_empty() || name.contains('/') {
        return Err(invalid());
    }
    let owner = validate_owner(owner).map_err(|_| invalid())?;

    let (stem, ext) = split_extension(name);
    let stem = stem
        .split_once(REVISION_MARKER)
        .map(|(base, _)| base)
        .unwrap_or(stem);
    if stem.is_empty() {
        return Err(invalid());
    }

    let filename = match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    };
    Ok((owner.to_string(), filename))
}

/// Reject keys that could escape the bucket prefix.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() || key.starts_with('/') || key.split('/').any(|p| p == "..") {
        return Err(StoreError::InvalidInput(format!("invalid object key '{}'", key)));
    }
    Ok(())
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}
