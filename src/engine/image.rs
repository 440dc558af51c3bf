//! Image references and their resolution to runtime image identities.

use std::fmt;
use std::str::FromStr;

use bollard::models::ImageSummary;

use super::runtime::ContainerRuntime;
use crate::error::{ConfigError, ContainerError, TestpodError};

/// Tag applied when a reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

const ID_DIGEST_PREFIX: &str = "sha256:";
const ID_HEX_LEN: usize = 64;

/// A `name:tag` image reference.
///
/// The tag is never empty: references without one are normalised to
/// [`DEFAULT_TAG`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    name: String,
    tag: String,
}

impl ImageReference {
    /// Create a reference from a name and optional tag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `name` is empty or
    /// whitespace-only.
    pub fn new(name: impl Into<String>, tag: Option<&str>) -> Result<Self, TestpodError> {
        let name_value = name.into();
        let trimmed_name = name_value.trim();

        if trimmed_name.is_empty() {
            return Err(TestpodError::from(ConfigError::MissingRequired {
                field: String::from("image"),
            }));
        }

        let normalised_tag = tag
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_TAG);

        Ok(Self {
            name: String::from(trimmed_name),
            tag: String::from(normalised_tag),
        })
    }

    /// Parse a `name[:tag]` reference.
    ///
    /// The tag separator is the last `:` after the final `/`, so registry
    /// ports such as `localhost:5000/redis` are kept in the name. A
    /// `sha256:` content ID is kept whole and never split into a tag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when the name is empty.
    pub fn parse(reference: &str) -> Result<Self, TestpodError> {
        let trimmed = reference.trim();
        if trimmed.starts_with(ID_DIGEST_PREFIX) {
            return Self::new(trimmed, None);
        }

        let path_start = trimmed.rfind('/').map_or(0, |index| index + 1);

        match trimmed.rfind(':').filter(|index| *index >= path_start) {
            Some(index) => {
                let (name, tag_with_separator) = trimmed.split_at(index);
                Self::new(name, tag_with_separator.strip_prefix(':'))
            }
            None => Self::new(trimmed, None),
        }
    }

    /// Return the image name without tag.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the normalised tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether this reference names a content ID rather than a repository.
    ///
    /// True for `sha256:<hex>` and for a bare 64-character hex digest.
    #[must_use]
    pub fn is_content_id(&self) -> bool {
        let bare = self.name.strip_prefix(ID_DIGEST_PREFIX);
        let is_hex = |value: &str| {
            !value.is_empty() && value.chars().all(|ch| ch.is_ascii_hexdigit())
        };
        match bare {
            Some(digest) => is_hex(digest),
            None => self.name.len() == ID_HEX_LEN && is_hex(&self.name),
        }
    }

    /// Whether a locally listed image matches this reference.
    ///
    /// Matches on a repository tag equal to `name:tag`, or on the image ID
    /// when the name is itself an ID (with or without the `sha256:` prefix).
    #[must_use]
    pub fn matches(&self, image: &ImageSummary) -> bool {
        let full_name = self.to_string();
        if image.repo_tags.iter().any(|repo_tag| *repo_tag == full_name) {
            return true;
        }

        let bare_id = image
            .id
            .strip_prefix(ID_DIGEST_PREFIX)
            .unwrap_or(&image.id);
        let bare_name = self
            .name
            .strip_prefix(ID_DIGEST_PREFIX)
            .unwrap_or(&self.name);
        !bare_id.is_empty() && bare_id == bare_name
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_content_id() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.tag)
        }
    }
}

impl FromStr for ImageReference {
    type Err = TestpodError;

    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        Self::parse(reference)
    }
}

/// Resolve `image` to a runtime image ID, pulling once if it is absent.
///
/// A failed pull is fatal and is not retried. Content IDs are never pulled.
pub(crate) async fn resolve_image_id<R: ContainerRuntime>(
    runtime: &R,
    image: &ImageReference,
) -> Result<String, TestpodError> {
    if let Some(id) = find_local_image(runtime, image).await? {
        return Ok(id);
    }

    if image.is_content_id() {
        return Err(image_unavailable(image, "no local image has this ID"));
    }

    tracing::info!(image = %image, "image not present locally, pulling");
    runtime
        .pull_image(image.name(), image.tag())
        .await
        .map_err(|error| image_unavailable(image, error.to_string()))?;

    find_local_image(runtime, image)
        .await?
        .ok_or_else(|| image_unavailable(image, "image not listed after pull"))
}

async fn find_local_image<R: ContainerRuntime>(
    runtime: &R,
    image: &ImageReference,
) -> Result<Option<String>, TestpodError> {
    let images = runtime
        .list_images()
        .await
        .map_err(|error| image_unavailable(image, format!("failed to list images: {error}")))?;

    Ok(images
        .into_iter()
        .find(|summary| image.matches(summary))
        .map(|summary| summary.id))
}

fn image_unavailable(image: &ImageReference, message: impl Into<String>) -> TestpodError {
    TestpodError::from(ContainerError::ImageUnavailable {
        image: image.to_string(),
        message: message.into(),
    })
}
