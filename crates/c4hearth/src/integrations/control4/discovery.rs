//! Cover discovery from a director category listing.
//!
//! The director returns one flat list per category that mixes the logical
//! cover items with the physical devices they hang off. Covers are picked out
//! by their `type` tag, and each cover's parent device is found by scanning
//! the same list for a matching `id`.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::error;

use super::descriptor::Classification;
use super::descriptor::CoverDescriptor;
use super::descriptor::DeviceDescriptor;
use super::descriptor::ItemId;
use super::descriptor::MalformedDescriptor;
use super::director::DirectorApi;
use super::director::DirectorError;
use super::director::ItemAttributes;
use super::director::director_get_entry_variables;

/// Everything needed to build one cover entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCoverInfo {
    pub name: String,
    pub id: ItemId,
    /// Name of the parent device, if it was found
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub parent_id: ItemId,
    pub area: String,
    /// Director variables fetched at setup
    pub attributes: ItemAttributes,
}

impl ResolvedCoverInfo {
    fn resolve(cover: CoverDescriptor, descriptors: &[Result<DeviceDescriptor, MalformedDescriptor>]) -> Self {
        // Last match wins; items without an id never match.
        let parent = descriptors
            .iter()
            .filter_map(|d| d.as_ref().ok())
            .filter(|d| d.id.as_ref() == Some(&cover.parent_id))
            .last();

        Self {
            name: cover.name,
            id: cover.id,
            device_name: parent.and_then(|p| p.name.clone()),
            manufacturer: parent.and_then(|p| p.manufacturer.clone()),
            model: parent.and_then(|p| p.model.clone()),
            parent_id: cover.parent_id,
            area: cover.room_name,
            attributes: ItemAttributes::new(),
        }
    }
}

/// Pick the covers of `expected_type` out of a category listing and resolve
/// their parent devices.
///
/// Malformed items are logged and skipped. The result keeps input order and
/// has empty attributes.
pub fn resolve_covers(items: &[Value], expected_type: &ItemId) -> Vec<ResolvedCoverInfo> {
    let descriptors: Vec<_> = items.iter().map(DeviceDescriptor::from_value).collect();

    let mut covers = Vec::new();
    for (item, descriptor) in items.iter().zip(&descriptors) {
        let classification = descriptor
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|d| d.classify(expected_type));

        match classification {
            Ok(Classification::Cover(cover)) => {
                covers.push(ResolvedCoverInfo::resolve(cover, &descriptors));
            }
            Ok(Classification::Other) => continue,
            Err(e) => {
                error!(
                    "Unknown device properties received from Control4 ({}): {}",
                    e, item
                );
                continue;
            }
        }
    }

    covers
}

/// Discover covers and fetch each one's attribute snapshot.
///
/// Attribute fetches run one after another in input order. A failed fetch
/// aborts discovery.
pub async fn discover(
    director: &dyn DirectorApi,
    items: &[Value],
    expected_type: &ItemId,
) -> Result<Vec<ResolvedCoverInfo>, DirectorError> {
    let mut covers = resolve_covers(items, expected_type);

    for cover in &mut covers {
        cover.attributes = director_get_entry_variables(director, &cover.id).await?;
        debug!(
            "Fetched {} attributes for cover {} ({})",
            cover.attributes.len(),
            cover.name,
            cover.id
        );
    }

    Ok(covers)
}
