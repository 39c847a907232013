//! Resource names owned by a single scenario.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const NAME_PREFIX: &str = "smokepack";

/// Generates a fresh image name for one scenario.
///
/// Names are lowercase so they are valid image references.
pub fn random_name() -> String {
    format!("{}-{}", NAME_PREFIX, Uuid::new_v4().simple())
}

/// Cache volumes `pack` creates for an image built as `<name>:latest`.
///
/// pack derives them from the fully qualified image reference, so they can be
/// computed up front and removed even if the build failed halfway.
pub fn cache_volume_names(name: &str) -> Vec<String> {
    let reference = format!("index.docker.io/library/{}:latest", name);
    let digest = Sha256::digest(reference.as_bytes());
    let short = hex::encode(&digest[..6]);

    ["build", "launch", "cache"]
        .iter()
        .map(|kind| format!("pack-cache-library_{}_latest-{}.{}", name, short, kind))
        .collect()
}
