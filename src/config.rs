//! TOML configuration for keyframe selection and loop closure.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::algo::{
    BadFramesOnly, BadFramesOnlyConfig, CloseLoops, ComputeRefHomography, DescriptorMatcherConfig,
    Exhaustive, ExhaustiveConfig, HomographyGuided, HomographyGuidedConfig, Keyframe,
    KeyframeConfig, KeyframeSelectorConfig, MatchFeatures, MultiMethod,
};
use crate::error::{Error, Result};

/// Configuration of a loop-closure strategy, selected by its `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseLoopsConfig {
    BadFramesOnly(BadFramesOnlyConfig),
    HomographyGuided(HomographyGuidedConfig),
    Exhaustive(ExhaustiveConfig),
    Keyframe(KeyframeConfig),
    MultiMethod(MultiMethodConfig),
}

impl Default for CloseLoopsConfig {
    fn default() -> Self {
        CloseLoopsConfig::BadFramesOnly(BadFramesOnlyConfig::default())
    }
}

impl CloseLoopsConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            CloseLoopsConfig::BadFramesOnly(c) => c.validate(),
            CloseLoopsConfig::HomographyGuided(c) => c.validate(),
            CloseLoopsConfig::Exhaustive(_) => Ok(()),
            CloseLoopsConfig::Keyframe(c) => c.validate(),
            CloseLoopsConfig::MultiMethod(c) => c.validate(),
        }
    }

    fn fixup_relative_paths(&mut self, dirname: &Path) {
        match self {
            CloseLoopsConfig::HomographyGuided(c) => {
                if let Some(path) = c.homography_filename.as_mut() {
                    if path.is_relative() {
                        *path = dirname.join(&*path);
                    }
                }
            }
            CloseLoopsConfig::MultiMethod(c) => {
                for method in c.methods.iter_mut() {
                    method.fixup_relative_paths(dirname);
                }
            }
            CloseLoopsConfig::BadFramesOnly(_)
            | CloseLoopsConfig::Exhaustive(_)
            | CloseLoopsConfig::Keyframe(_) => {}
        }
    }
}

/// Chain of loop-closure strategies run one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMethodConfig {
    /// Number of strategies to run, taken from the front of `methods`
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub methods: Vec<CloseLoopsConfig>,
}

fn default_count() -> usize {
    1
}

impl Default for MultiMethodConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            methods: Vec::new(),
        }
    }
}

impl MultiMethodConfig {
    pub fn validate(&self) -> Result<()> {
        if self.count < 1 {
            return Err(Error::InvalidConfig(
                "multi_method count must be at least 1".into(),
            ));
        }
        if self.methods.len() < self.count {
            return Err(Error::InvalidConfig(format!(
                "multi_method count is {} but only {} methods are configured",
                self.count,
                self.methods.len()
            )));
        }
        self.methods.iter().take(self.count).try_for_each(CloseLoopsConfig::validate)
    }
}

/// Configuration of a full stitching stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StitchingConfig {
    #[serde(default)]
    pub keyframe_selector: KeyframeSelectorConfig,
    #[serde(default)]
    pub matcher: DescriptorMatcherConfig,
    #[serde(default)]
    pub close_loops: CloseLoopsConfig,
}

impl StitchingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: StitchingConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML file. Relative output paths are taken relative to the
    /// directory holding the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&contents)?;
        if let Some(dirname) = path.parent() {
            cfg.close_loops.fixup_relative_paths(dirname);
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.keyframe_selector.validate()?;
        self.close_loops.validate()
    }
}

type RefHomographyFactory = Box<dyn Fn() -> Box<dyn ComputeRefHomography>>;

/// Builds loop-closure strategies from configuration.
///
/// All strategies share one feature matcher. Each homography-guided
/// strategy gets its own reference homography estimator from the factory.
pub struct CloseLoopsBuilder {
    matcher: Arc<dyn MatchFeatures>,
    ref_homography: Option<RefHomographyFactory>,
}

impl CloseLoopsBuilder {
    pub fn new(matcher: Arc<dyn MatchFeatures>) -> Self {
        Self {
            matcher,
            ref_homography: None,
        }
    }

    pub fn with_ref_homography<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ComputeRefHomography> + 'static,
    {
        self.ref_homography = Some(Box::new(factory));
        self
    }

    /// Validate `config` and build the strategy it describes.
    pub fn build(&self, config: &CloseLoopsConfig) -> Result<Box<dyn CloseLoops>> {
        config.validate()?;
        self.build_validated(config)
    }

    fn build_validated(&self, config: &CloseLoopsConfig) -> Result<Box<dyn CloseLoops>> {
        let method: Box<dyn CloseLoops> = match config {
            CloseLoopsConfig::BadFramesOnly(c) => {
                Box::new(BadFramesOnly::new(*c, self.matcher.clone()))
            }
            CloseLoopsConfig::HomographyGuided(c) => {
                let factory = self.ref_homography.as_ref().ok_or_else(|| {
                    Error::InvalidConfig(
                        "homography_guided loop closure needs a reference homography estimator"
                            .into(),
                    )
                })?;
                Box::new(HomographyGuided::new(
                    c.clone(),
                    self.matcher.clone(),
                    factory(),
                ))
            }
            CloseLoopsConfig::Exhaustive(c) => Box::new(Exhaustive::new(*c, self.matcher.clone())),
            CloseLoopsConfig::Keyframe(c) => Box::new(Keyframe::new(*c, self.matcher.clone())),
            CloseLoopsConfig::MultiMethod(c) => {
                let methods = c
                    .methods
                    .iter()
                    .take(c.count)
                    .map(|m| self.build_validated(m))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(MultiMethod::new(methods))
            }
        };
        Ok(method)
    }
}
