use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    timeperiod::{Timeperiod, Timeperiods, config},
};

use crate::{
    TZ,
    args::{self, Arg, Configurable, Usage},
};

/// The `-c/--config` flag, naming a file of time period definitions.
#[derive(Clone, Debug, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
}

impl ConfigFile {
    pub const USAGE: Usage = Usage::flag(
        "config",
        "A file of `define timeperiod { ... }` definitions. Other object \
         types in the file are skipped. Required.",
    )
    .short('c')
    .value("<path>");

    /// Read the configuration file and build every time period in it.
    ///
    /// Problems with individual time periods don't cause an error here.
    /// Only a missing or malformed file does.
    pub fn load(&self) -> anyhow::Result<Timeperiods> {
        let Some(ref path) = self.path else {
            anyhow::bail!(
                "missing required flag {}",
                ConfigFile::USAGE.name(),
            )
        };
        let defs = config::read(path)?;
        log::debug!(
            "read {len} time period definitions from {path}",
            len = defs.len(),
            path = path.display(),
        );
        Ok(Timeperiods::new(&defs, TZ.clone()))
    }
}

impl Configurable for ConfigFile {
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool> {
        if !arg.is(&ConfigFile::USAGE) {
            return Ok(false);
        }
        let path = p.value().with_context(|| ConfigFile::USAGE.name())?;
        self.path = Some(PathBuf::from(path));
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[ConfigFile::USAGE]
    }
}

/// The `-p/--period` flag, naming the time period to query.
#[derive(Clone, Debug, Default)]
pub struct Period {
    name: Option<String>,
}

impl Period {
    pub const USAGE: Usage = Usage::flag(
        "period",
        "The `timeperiod_name` of the time period to query. Templates \
         (definitions with `register 0`) can't be queried. Required.",
    )
    .short('p')
    .value("<name>");

    /// Look up the time period named by this flag.
    pub fn find<'t>(
        &self,
        periods: &'t Timeperiods,
    ) -> anyhow::Result<&'t Arc<Timeperiod>> {
        let Some(ref name) = self.name else {
            anyhow::bail!("missing required flag {}", Period::USAGE.name())
        };
        periods
            .find_by_name(name)
            .with_context(|| format!("unknown time period `{name}`"))
    }
}

impl Configurable for Period {
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool> {
        if !arg.is(&Period::USAGE) {
            return Ok(false);
        }
        self.name = Some(args::value(p, &Period::USAGE)?);
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[Period::USAGE]
    }
}
