use crate::wrapper::{FjallCodecError, FjallCodecResult};
use cargo_toml::{Dependency, Manifest};

const ENGINE: &str = "fjall";

/// Fjall version requirement declared by this adapter, reported as the `engine`
/// backend attribute.
pub(crate) fn engine_version() -> FjallCodecResult<String> {
    declared_version(include_str!("../Cargo.toml"), ENGINE)
}

fn declared_version(manifest: &str, name: &str) -> FjallCodecResult<String> {
    let manifest =
        Manifest::from_str(manifest).map_err(|e| FjallCodecError::ManifestError(e.to_string()))?;

    let version = match manifest.dependencies.get(name) {
        Some(Dependency::Simple(version)) => Some(version.clone()),
        Some(Dependency::Detailed(detail)) => detail.version.clone(),
        // workspace inheritance cannot be resolved from a single manifest
        Some(Dependency::Inherited(_)) | None => None,
    };
    version.ok_or_else(|| FjallCodecError::UndeclaredVersion(name.to_string()))
}
