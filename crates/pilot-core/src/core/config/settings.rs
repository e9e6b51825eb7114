use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pilot_domain::{Dictionary, ANY};
use serde::{Deserialize, Serialize};

use crate::core::tooling::errors::LaunchError;

pub const DEFAULT_SHARED_ROOT: &str = "/cvmfs";
pub const DEFAULT_BIND_CHECKS: &str = "e";
pub const DEFAULT_ENV_PREFIX: &str = "SINGULARITYENV_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars_os()
                .filter_map(|(k, v)| k.into_string().ok().zip(v.into_string().ok()))
                .collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// The variable's value when it is set to something other than blanks.
    #[must_use]
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Site defaults file (`--config` / `PILOT_CONFIG`), TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteFile {
    pub bindpath: Option<String>,
    pub bindpath_default: Option<String>,
    pub bind_checks: Option<String>,
    pub images: Option<Dictionary>,
    pub image_default: Option<String>,
    pub image_default6: Option<String>,
    pub image_default7: Option<String>,
    pub platforms: Option<String>,
    pub restrictions: Option<String>,
    pub container_env: Option<String>,
    pub runtime_path: Option<PathBuf>,
    pub shared_root: Option<PathBuf>,
    pub extra_opts: Option<String>,
    pub global_opts: Option<String>,
    pub env_prefix: Option<String>,
}

impl SiteFile {
    /// Reads and parses a site file.
    ///
    /// # Errors
    /// Returns [`LaunchError::Config`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LaunchError> {
        let contents = fs::read_to_string(path).map_err(|err| LaunchError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        toml_edit::de::from_str(&contents).map_err(|err| LaunchError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// The three standalone image overrides kept for older site configs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LegacyImages {
    pub default: Option<String>,
    pub rhel6: Option<String>,
    pub rhel7: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub binds_primary: String,
    pub binds_secondary: String,
    pub bind_checks: String,
    pub images: Dictionary,
    pub legacy_images: LegacyImages,
    pub platforms: String,
    pub restrictions: String,
    pub container_env: String,
    pub runtime_hint: Option<PathBuf>,
    pub shared_root: PathBuf,
    pub extra_opts: String,
    pub global_opts: String,
    pub env_prefix: String,
    pub job_ad: Option<PathBuf>,
    pub error_sink: Option<PathBuf>,
}

impl Settings {
    /// Builds settings from the process environment layered over the site
    /// file named by `config` (or `PILOT_CONFIG`).
    ///
    /// # Errors
    /// Returns an error when the site file cannot be loaded.
    pub fn load(config: Option<&Path>) -> Result<Self, LaunchError> {
        let snapshot = EnvSnapshot::capture();
        let path = config
            .map(Path::to_path_buf)
            .or_else(|| snapshot.non_empty("PILOT_CONFIG").map(PathBuf::from));
        let site = match path {
            Some(path) => SiteFile::load(&path)?,
            None => SiteFile::default(),
        };
        Ok(Self::from_snapshot(&snapshot, site))
    }

    /// Environment values win over the site file, which wins over defaults.
    #[must_use]
    pub fn from_snapshot(snapshot: &EnvSnapshot, site: SiteFile) -> Self {
        let string = |key: &str, file: Option<String>, default: &str| -> String {
            snapshot
                .non_empty(key)
                .map(str::to_string)
                .or(file)
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str, file: Option<String>| -> Option<String> {
            snapshot.non_empty(key).map(str::to_string).or(file)
        };
        let path = |key: &str, file: Option<PathBuf>| -> Option<PathBuf> {
            snapshot.non_empty(key).map(PathBuf::from).or(file)
        };

        let images = snapshot
            .non_empty("PILOT_IMAGES_DICT")
            .map(Dictionary::parse)
            .or(site.images)
            .unwrap_or_default();

        Self {
            binds_primary: string("PILOT_BINDPATH", site.bindpath, ""),
            binds_secondary: string("PILOT_BINDPATH_DEFAULT", site.bindpath_default, ""),
            bind_checks: string("PILOT_BIND_CHECKS", site.bind_checks, DEFAULT_BIND_CHECKS),
            images,
            legacy_images: LegacyImages {
                default: optional("PILOT_IMAGE_DEFAULT", site.image_default),
                rhel6: optional("PILOT_IMAGE_DEFAULT6", site.image_default6),
                rhel7: optional("PILOT_IMAGE_DEFAULT7", site.image_default7),
            },
            platforms: string("PILOT_PLATFORMS", site.platforms, ANY),
            restrictions: string("PILOT_RESTRICTIONS", site.restrictions, ""),
            container_env: string("PILOT_CONTAINER_ENV", site.container_env, ""),
            runtime_hint: path("PILOT_RUNTIME_PATH", site.runtime_path),
            shared_root: path("PILOT_SHARED_ROOT", site.shared_root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARED_ROOT)),
            extra_opts: string("PILOT_EXTRA_OPTS", site.extra_opts, ""),
            global_opts: string("PILOT_GLOBAL_OPTS", site.global_opts, ""),
            env_prefix: string("PILOT_ENV_PREFIX", site.env_prefix, DEFAULT_ENV_PREFIX),
            job_ad: path("_CONDOR_JOB_AD", None),
            error_sink: path("_CONDOR_WRAPPER_ERROR_FILE", None),
        }
    }
}
