//! Project discovery through the variable naming convention.
//!
//! A release-server project subscribes to an application by carrying
//! variables of the form
//! `Metadata.ArgoCD.Application[<namespace>/<application>].<Key>`. The
//! matcher scans a project's variable set and produces a [`ProjectBinding`]
//! when the required `Environment` key is present for the given
//! application.

use crate::model::{ImagePackageBinding, OctopusProject, ProjectBinding, VariableSet};
use regex::Regex;
use std::sync::LazyLock;

static ENVIRONMENT_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Metadata\.ArgoCD\.Application\[([^\[\]]*?)\]\.Environment$").unwrap()
});

static CHANNEL_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Metadata\.ArgoCD\.Application\[([^\[\]]*?)\]\.Channel$").unwrap()
});

static RELEASE_VERSION_IMAGE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Metadata\.ArgoCD\.Application\[([^\[\]]*?)\]\.ImageForReleaseVersion$").unwrap()
});

static PACKAGE_VERSION_IMAGE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Metadata\.ArgoCD\.Application\[([^\[\]]*?)\]\.ImageForPackageVersion\[([^\[\]]*?)\]$",
    )
    .unwrap()
});

/// The `<namespace>/<application>` key the bracketed part of a variable
/// name must equal.
pub fn application_key(namespace: &str, application: &str) -> String {
    format!("{namespace}/{application}")
}

/// Name of the variable a project must carry to subscribe to an
/// application. Quoted in operator-facing logs when nothing matched.
pub fn required_variable_name(app_key: &str) -> String {
    format!("Metadata.ArgoCD.Application[{app_key}].Environment")
}

/// Scans `variables` and returns the project's binding for `app_key`, or
/// `None` when the project does not subscribe to the application.
///
/// Variables with whitespace-only values are ignored. `Environment`,
/// `Channel`, and `ImageForReleaseVersion` are single-valued; the first
/// occurrence wins. `ImageForPackageVersion[<imageRepo>]` may appear any
/// number of times, each contributing an [`ImagePackageBinding`] with the
/// bracketed repository and the variable's value as package reference.
pub fn match_project(
    project: &OctopusProject,
    variables: &VariableSet,
    app_key: &str,
) -> Option<ProjectBinding> {
    let mut environment_name: Option<String> = None;
    let mut channel_name: Option<String> = None;
    let mut release_version_image: Option<String> = None;
    let mut package_bindings: Vec<ImagePackageBinding> = Vec::new();

    for variable in &variables.variables {
        if variable.value.trim().is_empty() {
            continue;
        }

        if let Some(captures) = ENVIRONMENT_VARIABLE.captures(&variable.name) {
            if &captures[1] == app_key && environment_name.is_none() {
                environment_name = Some(variable.value.clone());
            }
        } else if let Some(captures) = CHANNEL_VARIABLE.captures(&variable.name) {
            if &captures[1] == app_key && channel_name.is_none() {
                channel_name = Some(variable.value.clone());
            }
        } else if let Some(captures) = RELEASE_VERSION_IMAGE_VARIABLE.captures(&variable.name) {
            if &captures[1] == app_key && release_version_image.is_none() {
                release_version_image = Some(variable.value.clone());
            }
        } else if let Some(captures) = PACKAGE_VERSION_IMAGE_VARIABLE.captures(&variable.name) {
            if &captures[1] == app_key {
                package_bindings.push(ImagePackageBinding {
                    image: captures[2].to_string(),
                    package_reference: variable.value.clone(),
                });
            }
        }
    }

    environment_name.map(|environment_name| ProjectBinding {
        project: project.clone(),
        environment_name,
        channel_name,
        release_version_image,
        package_bindings,
    })
}
