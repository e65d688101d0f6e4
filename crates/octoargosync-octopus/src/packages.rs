//! Package version selection: server baseline rules and image-tag
//! overrides.
//!
//! The release server proposes a baseline version per template package
//! (feed search constrained by channel rules); the variable convention can
//! override individual packages with the tag of a running container image.
//! The merge is left-biased on the baseline so the selected set always has
//! the template's cardinality.

use octoargosync_core::model::{
    split_image, Channel, ChannelRule, ImagePackageBinding, ReleaseTemplatePackage,
    SelectedPackage,
};
use tracing::error;

/// Feed query for the newest package version a channel admits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageVersionQuery {
    pub package_id: String,
    pub take: i32,
    pub pre_release_tag: Option<String>,
    pub version_range: Option<String>,
}

/// The first channel rule governing this package, if any. A package is
/// governed by at most one rule.
pub fn rule_for_package<'a>(
    channel: &'a Channel,
    package: &ReleaseTemplatePackage,
) -> Option<&'a ChannelRule> {
    channel.rules.iter().find(|rule| {
        rule.action_packages.iter().any(|action_package| {
            action_package.deployment_action == package.action_name
                && action_package.package_reference == package.package_reference_name
        })
    })
}

/// Builds the take-1 feed query for a resolvable template package,
/// applying the governing channel rule's tag and version range.
pub fn version_query(package: &ReleaseTemplatePackage, channel: &Channel) -> PackageVersionQuery {
    let rule = rule_for_package(channel, package);
    PackageVersionQuery {
        package_id: package.package_id.clone(),
        take: 1,
        pre_release_tag: rule
            .map(|rule| rule.tag.clone())
            .filter(|tag| !tag.is_empty()),
        version_range: rule
            .map(|rule| rule.version_range.clone())
            .filter(|range| !range.is_empty()),
    }
}

/// Turns the binding's image/package pairs into version overrides using
/// the update's running images.
///
/// A binding whose image is not among the update's images is skipped (the
/// baseline version will be used); a package reference with more than one
/// `:` is malformed and skipped. Both cases are logged with their stable
/// event keys.
pub fn override_selections(
    bindings: &[ImagePackageBinding],
    images: &[String],
) -> Vec<SelectedPackage> {
    let mut overrides = Vec::new();

    for binding in bindings {
        let tag = images.iter().find_map(|image| {
            split_image(image)
                .filter(|(repository, _)| *repository == binding.image)
                .map(|(_, tag)| tag.to_string())
        });
        let Some(tag) = tag else {
            error!(
                event = "octoargosync-init-argoimagenotfound",
                image = %binding.image,
                "image for a package version override is not running in the application, the baseline package version will be used"
            );
            continue;
        };

        let parts: Vec<&str> = binding.package_reference.split(':').collect();
        match parts.as_slice() {
            [action_name] => overrides.push(SelectedPackage {
                action_name: action_name.to_string(),
                package_reference_name: String::new(),
                version: tag,
            }),
            [action_name, package_reference_name] => overrides.push(SelectedPackage {
                action_name: action_name.to_string(),
                package_reference_name: package_reference_name.to_string(),
                version: tag,
            }),
            _ => {
                error!(
                    event = "octoargosync-init-octopackagereferenceerror",
                    reference = %binding.package_reference,
                    "package reference must be <action> or <action>:<packageName>"
                );
            }
        }
    }

    overrides
}

/// Applies `overrides` to `baseline`, left-biased: every baseline entry
/// survives, with its version replaced by the matching override's. An
/// override without a package reference name matches on action name
/// alone.
pub fn merge_selections(
    baseline: Vec<SelectedPackage>,
    overrides: &[SelectedPackage],
) -> Vec<SelectedPackage> {
    baseline
        .into_iter()
        .map(|selection| {
            let matching = overrides.iter().find(|candidate| {
                candidate.action_name == selection.action_name
                    && (candidate.package_reference_name.is_empty()
                        || candidate.package_reference_name == selection.package_reference_name)
            });
            match matching {
                Some(candidate) => SelectedPackage {
                    version: candidate.version.clone(),
                    ..selection
                },
                None => selection,
            }
        })
        .collect()
}
