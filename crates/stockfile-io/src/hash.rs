use sha2::{Digest as _, Sha256};

/// Content hash used to recognise re-uploads.
///
/// The digest covers the full byte content only, so the same workbook saved
/// under a different file name hashes identically.
pub fn generate_file_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}
