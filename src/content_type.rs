use mime_guess::from_path;

/// Resolve the MIME type for a storage key from its file suffix.
///
/// Unknown or missing suffixes fall back to `application/octet-stream`.
pub fn content_type_for_key(storage_key: &str) -> String {
    from_path(storage_key).first_or_octet_stream().to_string()
}
