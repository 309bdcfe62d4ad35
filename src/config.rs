use anyhow::{bail, Result};
use std::path::PathBuf;

/// Separator between the owner namespace and the model name ("owner/name")
pub const NAMESPACE_SEPARATOR: char = '/';

/// Prefix shard that collects identifiers without a namespace separator
pub const CATCH_ALL_SHARD: &str = "_other";

/// Pads single-character identifiers to a two-character bucket key
pub const ALPHA_FILLER: char = '0';

/// Bucket for identifiers whose first character is not alphanumeric
pub const ALPHA_FALLBACK_KEY: &str = "__";

/// Node attributes copied into component artifacts
pub const DEFAULT_ATTRIBUTES: &[&str] = &[
    "likes",
    "downloads",
    "createdAt",
    "pipeline_tag",
    "library_name",
];

/// Fields every component node record carries. Attributes are flattened next
/// to them, so none of these may be selected as an attribute.
pub const RESERVED_NODE_FIELDS: &[&str] = &["id", "name", "size"];

/// Constant visual weight written on every node record
pub const NODE_VISUAL_WEIGHT: f64 = 1.0;

/// Member identifiers kept per component in the primary index stats
pub const SAMPLE_MODELS_PER_COMPONENT: usize = 5;

/// Concurrent uploads in flight
pub const DEFAULT_UPLOAD_WORKERS: usize = 20;

pub const UPLOAD_CONTENT_TYPE: &str = "application/gzip";
pub const UPLOAD_CONTENT_ENCODING: &str = "gzip";

/// Grouping-key parameters shared by both chunk builders and the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub separator: char,
    pub catch_all: String,
    pub filler: char,
    pub fallback: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            separator: NAMESPACE_SEPARATOR,
            catch_all: CATCH_ALL_SHARD.to_string(),
            filler: ALPHA_FILLER,
            fallback: ALPHA_FALLBACK_KEY.to_string(),
        }
    }
}

impl KeyConfig {
    /// The fallback key must be two characters and start with a non-alphanumeric
    /// character, otherwise it could collide with a key derived from a real identifier.
    ///
    /// The catch-all key only needs to be non-empty. A key containing the
    /// separator can never equal a namespace, so it keeps the shard exclusive;
    /// the default `_other` is shared with an owner of that name.
    pub fn validate(&self) -> Result<()> {
        if self.catch_all.is_empty() {
            bail!("Catch-all shard key must not be empty");
        }
        let mut fallback = self.fallback.chars();
        match (fallback.next(), fallback.next(), fallback.next()) {
            (Some(first), Some(_), None) if !first.is_ascii_alphanumeric() => {}
            _ => bail!(
                "Fallback bucket key {:?} must be two characters starting with a non-alphanumeric character",
                self.fallback
            ),
        }
        Ok(())
    }
}

pub struct BuildConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub attributes: Vec<String>,
    pub keys: KeyConfig,
    pub clean: bool,
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        self.keys.validate()?;
        for attr in &self.attributes {
            if attr.is_empty() {
                bail!("Attribute names must not be empty");
            }
            if RESERVED_NODE_FIELDS.contains(&attr.as_str()) {
                bail!(
                    "Attribute {:?} clashes with a node record field ({})",
                    attr,
                    RESERVED_NODE_FIELDS.join(", ")
                );
            }
        }
        Ok(())
    }

    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            attributes: DEFAULT_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
            keys: KeyConfig::default(),
            clean: false,
        }
    }
}
