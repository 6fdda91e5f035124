// Command line parsing.
//
// A command is configured by a list of targets. Each target claims the flags
// or positional values it understands, and documents them with a `Usage`.
// The help output of a command is assembled from the same targets, so a flag
// is documented everywhere it is accepted and nowhere else.

use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    str::FromStr,
};

use anyhow::Context;

pub mod flags;

pub trait Configurable: Debug {
    /// Claim `arg` when it belongs to this target, reading a flag's value
    /// from `p` as needed. Returns false when `arg` is left for another
    /// target.
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool>;

    /// The flags and arguments claimed by this target.
    fn usage(&self) -> &[Usage];
}

/// A command line argument that no longer borrows from the parser.
///
/// This lets a target ask the parser for the value of a flag while looking
/// at the flag itself.
#[derive(Debug)]
pub enum Arg {
    Short(char),
    Long(String),
    Value(OsString),
}

impl Arg {
    fn new(arg: lexopt::Arg<'_>) -> Arg {
        match arg {
            lexopt::Arg::Short(c) => Arg::Short(c),
            lexopt::Arg::Long(name) => Arg::Long(name.to_string()),
            lexopt::Arg::Value(value) => Arg::Value(value),
        }
    }

    /// Returns true when this is the flag documented by `usage`, in either
    /// its short or long form.
    pub fn is(&self, usage: &Usage) -> bool {
        let Kind::Flag { short, long, .. } = usage.kind else { return false };
        match *self {
            Arg::Short(c) => short == Some(c),
            Arg::Long(ref name) => name == long,
            Arg::Value(_) => false,
        }
    }

    /// Take a positional value out of this argument. Flags give `None`.
    pub fn take_value(&mut self) -> Option<OsString> {
        match *self {
            Arg::Value(ref mut value) => Some(std::mem::take(value)),
            _ => None,
        }
    }

    fn unexpected(self) -> lexopt::Error {
        match self {
            Arg::Short(c) => lexopt::Arg::Short(c).unexpected(),
            Arg::Long(name) => lexopt::Arg::Long(&name).unexpected(),
            Arg::Value(value) => lexopt::Arg::Value(value).unexpected(),
        }
    }
}

/// Hand every remaining argument to the first target that claims it.
///
/// `doc` is the help text of the command. Its `%args%` and `%flags%`
/// placeholders are filled in from the targets when `-h/--help` is given.
pub fn configure(
    p: &mut lexopt::Parser,
    doc: &str,
    targets: &mut [&mut dyn Configurable],
) -> anyhow::Result<()> {
    while let Some(arg) = p.next()? {
        let mut arg = Arg::new(arg);
        if arg.is(&Help::USAGE) {
            return Err(anyhow::Error::from(Help(help(doc, targets))));
        }
        let mut claimed = false;
        for t in targets.iter_mut() {
            if t.configure(p, &mut arg)? {
                claimed = true;
                break;
            }
        }
        if !claimed {
            return Err(arg.unexpected().into());
        }
    }
    Ok(())
}

/// Returns the name of the command to run.
///
/// `-h/--help` and `--version` are the only flags accepted before a command,
/// so they are handled here.
pub fn command(doc: &str, p: &mut lexopt::Parser) -> anyhow::Result<String> {
    let doc = doc.trim();
    let Some(arg) = p.next()? else { anyhow::bail!("{doc}") };
    let arg = Arg::new(arg);
    if arg.is(&Help::USAGE) {
        return Err(anyhow::Error::from(Help(doc.to_string())));
    }
    if arg.is(&Version::USAGE) {
        return Err(anyhow::Error::from(Version));
    }
    match arg {
        Arg::Value(cmd) => cmd.into_string().map_err(|cmd| {
            anyhow::anyhow!("unrecognized command {cmd:?}")
        }),
        arg => Err(arg.unexpected().into()),
    }
}

/// Read the value of the flag documented by `usage` and parse it into `T`.
/// Errors mention the flag.
pub fn value<T>(p: &mut lexopt::Parser, usage: &Usage) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: Display + Debug + Send + Sync + 'static,
{
    let name = usage.name();
    let value = p.value().with_context(|| name.clone())?;
    let Some(value) = value.to_str() else {
        anyhow::bail!("{name}: `{value:?}` is not valid UTF-8")
    };
    value.parse().map_err(anyhow::Error::msg).with_context(|| name)
}

/// Fill in the `%args%` and `%flags%` placeholders of a command's docs.
fn help(doc: &str, targets: &[&mut dyn Configurable]) -> String {
    let (args, mut flags): (Vec<Usage>, Vec<Usage>) = targets
        .iter()
        .flat_map(|t| t.usage().iter().copied())
        .partition(|u| matches!(u.kind, Kind::Arg { .. }));
    flags.push(Help::USAGE);
    flags.sort_by_key(|u| match u.kind {
        Kind::Flag { long, .. } => long,
        Kind::Arg { name } => name,
    });
    doc.replace("%args%", &table(&args))
        .replace("%flags%", &table(&flags))
        .trim()
        .to_string()
}

/// Lay out usages in two columns, with descriptions wrapped to fit in 79
/// columns and aligned after the longest name.
fn table(usages: &[Usage]) -> String {
    let names: Vec<String> = usages.iter().map(Usage::name).collect();
    let Some(width) = names.iter().map(|name| name.len()).max() else {
        return String::new();
    };
    let hanging = " ".repeat(4 + width + 2);
    let mut out = String::new();
    for (name, usage) in names.iter().zip(usages) {
        let first = format!("    {name:width$}  ");
        let opts = textwrap::Options::new(79)
            .initial_indent(&first)
            .subsequent_indent(&hanging);
        for line in textwrap::wrap(usage.doc, &opts) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// The documentation of a flag or positional argument.
#[derive(Clone, Copy, Debug)]
pub struct Usage {
    kind: Kind,
    /// A one paragraph description.
    doc: &'static str,
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Flag {
        short: Option<char>,
        long: &'static str,
        value: Option<&'static str>,
    },
    Arg {
        name: &'static str,
    },
}

impl Usage {
    /// A flag spelled `--{long}`, without a value.
    pub const fn flag(long: &'static str, doc: &'static str) -> Usage {
        Usage { kind: Kind::Flag { short: None, long, value: None }, doc }
    }

    /// A positional argument, e.g., `<entry>...`.
    pub const fn arg(name: &'static str, doc: &'static str) -> Usage {
        Usage { kind: Kind::Arg { name }, doc }
    }

    /// Give this flag a single character short form.
    pub const fn short(self, c: char) -> Usage {
        match self.kind {
            Kind::Flag { long, value, .. } => Usage {
                kind: Kind::Flag { short: Some(c), long, value },
                doc: self.doc,
            },
            Kind::Arg { .. } => self,
        }
    }

    /// Make this flag take a value, e.g., `<path>`.
    pub const fn value(self, value: &'static str) -> Usage {
        match self.kind {
            Kind::Flag { short, long, .. } => Usage {
                kind: Kind::Flag { short, long, value: Some(value) },
                doc: self.doc,
            },
            Kind::Arg { .. } => self,
        }
    }

    /// Returns how this is written in docs and error messages, e.g.,
    /// `-c/--config <path>`.
    pub fn name(&self) -> String {
        match self.kind {
            Kind::Arg { name } => name.to_string(),
            Kind::Flag { short, long, value } => {
                let mut name = String::new();
                if let Some(c) = short {
                    name.push_str(&format!("-{c}/"));
                }
                name.push_str(&format!("--{long}"));
                if let Some(value) = value {
                    name.push_str(&format!(" {value}"));
                }
                name
            }
        }
    }
}

/// An error type indicating that the error is a `-h/--help` message.
///
/// In other words, it should be printed to stdout with a success exit code.
///
/// We sniff this out in `main` via downcasting an `anyhow::Error`.
#[derive(Debug)]
pub struct Help(String);

impl Help {
    const USAGE: Usage =
        Usage::flag("help", "Print this help message and exit.").short('h');
}

impl std::fmt::Display for Help {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Help {}

/// An error type indicating that the error is a `--version` message.
///
/// Like `Help`, it is printed to stdout with a success exit code.
#[derive(Debug)]
pub struct Version;

impl Version {
    const USAGE: Usage =
        Usage::flag("version", "Print the version of timeperiod and exit.");
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let semver = option_env!("CARGO_PKG_VERSION").unwrap_or("N/A");
        match option_env!("TIMEPERIOD_BUILD_GIT_HASH") {
            None => write!(f, "timeperiod {semver}"),
            Some(hash) => write!(f, "timeperiod {semver} (rev {hash})"),
        }
    }
}

impl std::error::Error for Version {}
