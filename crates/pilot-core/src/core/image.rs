//! Container image selection from a platform → image map.

use std::path::Path;

use pilot_domain::{list_contains, Dictionary, Projection, ANY};
use serde::Serialize;
use tracing::debug;

use crate::core::config::LegacyImages;
use crate::core::tooling::errors::LaunchError;

pub const DEFAULT_PLATFORM: &str = "default";
/// Restriction requiring images to live on the shared filesystem.
pub const CVMFS_RESTRICTION: &str = "cvmfs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedImage {
    pub platform: String,
    pub reference: String,
}

/// `scheme://...` references are resolved by the runtime, not the host
/// filesystem.
#[must_use]
pub fn is_url_reference(reference: &str) -> bool {
    reference
        .split_once("://")
        .is_some_and(|(scheme, _)| !scheme.is_empty() && !scheme.contains('/'))
}

/// Folds the standalone legacy overrides into the map; each one replaces any
/// entry with the same key.
pub fn merge_legacy_images(
    map: &Dictionary,
    legacy: &LegacyImages,
) -> Result<Dictionary, LaunchError> {
    let mut merged = map.clone();
    for (key, value) in [
        (DEFAULT_PLATFORM, &legacy.default),
        ("rhel6", &legacy.rhel6),
        ("rhel7", &legacy.rhel7),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            merged.insert(key, Some(value))?;
        }
    }
    Ok(merged)
}

/// Picks the image for the first requested platform present in `map`,
/// falling back to `default` and then to the map's first entry when the
/// request includes `any`.
pub fn select_image(
    map: &Dictionary,
    platforms: &str,
    restrictions: &str,
    shared_root: &Path,
) -> Result<SelectedImage, LaunchError> {
    let direct = platforms
        .split(',')
        .map(str::trim)
        .filter(|platform| !platform.is_empty() && *platform != ANY)
        .find_map(|platform| {
            map.lookup(&[platform])
                .non_empty()
                .map(|reference| (platform.to_string(), reference.to_string()))
        });

    let selected = match direct {
        Some((platform, reference)) => Some(SelectedImage {
            platform,
            reference,
        }),
        None if list_contains(platforms, ANY) => {
            match map.lookup(&[DEFAULT_PLATFORM]).non_empty() {
                Some(reference) => Some(SelectedImage {
                    platform: DEFAULT_PLATFORM.to_string(),
                    reference: reference.to_string(),
                }),
                None => Some(SelectedImage {
                    platform: map.first(Projection::Key),
                    reference: map.first(Projection::Value),
                })
                .filter(|image| !image.reference.is_empty()),
            }
        }
        None => None,
    };

    let selected = selected.ok_or_else(|| LaunchError::NoImageAvailable {
        platforms: platforms.to_string(),
        candidates: map.keys().into_iter().map(str::to_string).collect(),
    })?;
    debug!(platform = %selected.platform, image = %selected.reference, "selected image");
    validate_image(&selected.reference, restrictions, shared_root)?;
    Ok(selected)
}

/// Applies the restriction list and the existence check to an image
/// reference, however it was chosen.
pub fn validate_image(
    reference: &str,
    restrictions: &str,
    shared_root: &Path,
) -> Result<(), LaunchError> {
    if list_contains(restrictions, CVMFS_RESTRICTION)
        && !Path::new(reference).starts_with(shared_root)
    {
        return Err(LaunchError::RestrictionViolation {
            image: reference.to_string(),
            restriction: CVMFS_RESTRICTION.to_string(),
        });
    }
    if !is_url_reference(reference) && !Path::new(reference).exists() {
        return Err(LaunchError::ImageNotFound {
            image: reference.to_string(),
        });
    }
    Ok(())
}
