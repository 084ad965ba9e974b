//! Environment-driven configuration.

use std::{
    env::{self, VarError},
    ffi::OsString,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::labels::LabelPolicy;

const CLASSIFIER_MODEL: &str = "HANDSIGN_CLASSIFIER_MODEL";
const LANDMARK_MODEL: &str = "HANDSIGN_LANDMARK_MODEL";
const LABELS: &str = "HANDSIGN_LABELS";
const LABEL_POLICY: &str = "HANDSIGN_LABEL_POLICY";
const MIN_DETECTION_CONFIDENCE: &str = "HANDSIGN_MIN_DETECTION_CONFIDENCE";
const MIRROR: &str = "HANDSIGN_MIRROR";

/// Settings needed to construct a [`Pipeline`][crate::Pipeline].
///
/// See the crate documentation for the environment variables read by [`Config::from_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    classifier_model: PathBuf,
    landmark_model: PathBuf,
    labels: PathBuf,
    label_policy: LabelPolicy,
    min_detection_confidence: f32,
    mirror: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier_model: "models/keypoint_classifier.onnx".into(),
            landmark_model: "models/hand_landmark_full.onnx".into(),
            labels: "models/keypoint_classifier_label.csv".into(),
            label_policy: LabelPolicy::Lenient,
            min_detection_confidence: 0.7,
            mirror: true,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their default value. Returns an error if a variable is set to an
    /// invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| env::var_os(name))
    }

    /// Builds a configuration from a variable lookup function.
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let var = |name: &str| -> anyhow::Result<Option<String>> {
            match lookup(name).map(OsString::into_string) {
                None => Ok(None),
                Some(Ok(value)) => Ok(Some(value)),
                Some(Err(value)) => anyhow::bail!(
                    "invalid value set for `{}` variable: {}",
                    name,
                    VarError::NotUnicode(value),
                ),
            }
        };
        let path = |name: &str| -> Option<PathBuf> { lookup(name).map(PathBuf::from) };

        let mut config = Self::default();
        if let Some(p) = path(CLASSIFIER_MODEL) {
            config.classifier_model = p;
        }
        if let Some(p) = path(LANDMARK_MODEL) {
            config.landmark_model = p;
        }
        if let Some(p) = path(LABELS) {
            config.labels = p;
        }
        if let Some(policy) = var(LABEL_POLICY)? {
            config.label_policy = parse(LABEL_POLICY, &policy)?;
        }
        if let Some(conf) = var(MIN_DETECTION_CONFIDENCE)? {
            let conf: f32 = parse(MIN_DETECTION_CONFIDENCE, &conf)?;
            anyhow::ensure!(
                (0.0..=1.0).contains(&conf),
                "invalid value set for `{}` variable: {} is not in range 0.0 to 1.0",
                MIN_DETECTION_CONFIDENCE,
                conf,
            );
            config.min_detection_confidence = conf;
        }
        if let Some(mirror) = var(MIRROR)? {
            config.mirror = parse(MIRROR, &mirror)?;
        }

        log::debug!("{:?}", config);
        Ok(config)
    }

    pub fn with_classifier_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.classifier_model = path.into();
        self
    }

    pub fn with_landmark_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.landmark_model = path.into();
        self
    }

    pub fn with_labels(mut self, path: impl Into<PathBuf>) -> Self {
        self.labels = path.into();
        self
    }

    pub fn with_label_policy(mut self, policy: LabelPolicy) -> Self {
        self.label_policy = policy;
        self
    }

    pub fn with_min_detection_confidence(mut self, confidence: f32) -> Self {
        self.min_detection_confidence = confidence;
        self
    }

    /// Sets whether input images are mirrored horizontally before detection.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn classifier_model(&self) -> &Path {
        &self.classifier_model
    }

    pub fn landmark_model(&self) -> &Path {
        &self.landmark_model
    }

    pub fn labels(&self) -> &Path {
        &self.labels
    }

    pub fn label_policy(&self) -> LabelPolicy {
        self.label_policy
    }

    pub fn min_detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }
}

fn parse<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        anyhow::anyhow!(
            "invalid value set for `{}` variable: '{}' ({})",
            name,
            value,
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect::<HashMap<_, _>>();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.label_policy(), LabelPolicy::Lenient);
        assert_eq!(config.min_detection_confidence(), 0.7);
        assert!(config.mirror());
        assert_eq!(
            config.classifier_model(),
            Path::new("models/keypoint_classifier.onnx")
        );
    }

    #[test]
    fn overrides() {
        let config = from_map(&[
            (CLASSIFIER_MODEL, "/srv/classifier.onnx"),
            (LANDMARK_MODEL, "/srv/hand.onnx"),
            (LABELS, "/srv/labels.csv"),
            (LABEL_POLICY, "strict"),
            (MIN_DETECTION_CONFIDENCE, "0.5"),
            (MIRROR, "false"),
        ])
        .unwrap();

        assert_eq!(
            config.classifier_model(),
            Path::new("/srv/classifier.onnx")
        );
        assert_eq!(config.landmark_model(), Path::new("/srv/hand.onnx"));
        assert_eq!(config.labels(), Path::new("/srv/labels.csv"));
        assert_eq!(config.label_policy(), LabelPolicy::Strict);
        assert_eq!(config.min_detection_confidence(), 0.5);
        assert!(!config.mirror());
    }

    #[test]
    fn invalid_values() {
        assert!(from_map(&[(LABEL_POLICY, "sometimes")]).is_err());
        assert!(from_map(&[(MIN_DETECTION_CONFIDENCE, "high")]).is_err());
        assert!(from_map(&[(MIN_DETECTION_CONFIDENCE, "1.5")]).is_err());
        assert!(from_map(&[(MIN_DETECTION_CONFIDENCE, "NaN")]).is_err());
        assert!(from_map(&[(MIRROR, "yes")]).is_err());

        let err = from_map(&[(MIRROR, "yes")]).unwrap_err();
        assert!(err.to_string().contains(MIRROR), "{err}");
    }

    #[test]
    fn builder() {
        let config = Config::default()
            .with_labels("labels.csv")
            .with_label_policy(LabelPolicy::Strict)
            .with_mirror(false);
        assert_eq!(config.labels(), Path::new("labels.csv"));
        assert_eq!(config.label_policy(), LabelPolicy::Strict);
        assert!(!config.mirror());
    }
}
