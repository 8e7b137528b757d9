use crate::config::{BuildProfile, ClassLookup, ScriptingOverrides};
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    runtime_config: Option<PathBuf>,
    hostfxr_path: Option<PathBuf>,
    dotnet_root: Option<PathBuf>,
    configuration: Option<BuildProfile>,
    class_lookup: Option<ClassLookup>,
}

impl CliOverrides {
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "runtime-config" => overrides.runtime_config = Some(PathBuf::from(value)),
                "hostfxr" => overrides.hostfxr_path = Some(PathBuf::from(value)),
                "dotnet-root" => overrides.dotnet_root = Some(PathBuf::from(value)),
                "configuration" => {
                    overrides.configuration =
                        Some(value.parse().with_context(|| format!("Invalid configuration '{value}'"))?);
                }
                "class-lookup" => {
                    overrides.class_lookup =
                        Some(value.parse().with_context(|| format!("Invalid class lookup '{value}'"))?);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --runtime-config, --hostfxr, --dotnet-root, \
                     --configuration, --class-lookup."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn into_config_overrides(self) -> ScriptingOverrides {
        ScriptingOverrides {
            runtime_config: self.runtime_config,
            hostfxr_path: self.hostfxr_path,
            dotnet_root: self.dotnet_root,
            configuration: self.configuration,
            class_lookup: self.class_lookup,
        }
    }
}
