/*!
Reading of Nagios-style `define timeperiod { ... }` object definitions.

A configuration looks like this:

```text
# Comments start with `#` or `;`.
define timeperiod {
    timeperiod_name  workhours
    alias            Normal work hours
    use              base
    exclude          holidays
    monday           09:00-17:00
    day 1 - 15 / 5   00:00-24:00
}
```

The first word of each line inside a block is the key and the rest of the
line is the value. A handful of keys are attributes of the time period
itself. Every other line is a raw entry that is later resolved into a
recurrence rule. Blocks defining other kinds of objects are skipped.
*/

use std::path::Path;

use {anyhow::Context, bstr::ByteSlice};

/// A single `define timeperiod` block, as written.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Definition {
    /// The 1-based line number on which this definition starts.
    pub line: usize,
    /// The name by which this time period is queried and excluded.
    pub timeperiod_name: Option<String>,
    /// The name by which this definition is used as a template.
    pub name: Option<String>,
    pub alias: Option<String>,
    /// The templates to inherit from, in order.
    pub uses: Vec<String>,
    /// Whether this definition is a real time period. When false, it can
    /// only be used as a template.
    pub register: bool,
    pub exclude: Vec<String>,
    /// Raw entries like `monday 09:00-17:00`.
    pub entries: Vec<String>,
}

impl Definition {
    /// Create a new registered definition for the given time period name.
    pub fn new(timeperiod_name: impl Into<String>) -> Definition {
        Definition {
            timeperiod_name: Some(timeperiod_name.into()),
            register: true,
            ..Definition::default()
        }
    }

    /// Add a raw entry.
    pub fn entry(mut self, entry: impl Into<String>) -> Definition {
        self.entries.push(entry.into());
        self
    }

    /// Add the name of a time period to exclude.
    pub fn exclude(mut self, name: impl Into<String>) -> Definition {
        self.exclude.push(name.into());
        self
    }

    /// Add the name of a template to inherit from.
    pub fn uses(mut self, name: impl Into<String>) -> Definition {
        self.uses.push(name.into());
        self
    }

    /// Returns the name used in diagnostics for this definition.
    pub fn display_name(&self) -> &str {
        self.timeperiod_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("unknown_timeperiod")
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let list = || -> Vec<String> {
            value
                .split(',')
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .collect()
        };
        match key {
            "timeperiod_name" => {
                self.timeperiod_name = Some(value.to_string())
            }
            "name" => self.name = Some(value.to_string()),
            "alias" => self.alias = Some(value.to_string()),
            "use" => self.uses.extend(list()),
            "exclude" => self.exclude.extend(list()),
            "register" => {
                self.register = match value {
                    "0" => false,
                    "1" => true,
                    unk => anyhow::bail!(
                        "invalid `register` value `{unk}` (expected 0 or 1)"
                    ),
                }
            }
            _ => self.entries.push(format!("{key} {value}")),
        }
        Ok(())
    }
}

/// Read and parse the configuration file at the given path.
pub fn read(path: &Path) -> anyhow::Result<Vec<Definition>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&data).with_context(|| format!("{}", path.display()))
}

/// Parse every `define timeperiod` block in the given configuration text.
pub fn parse(data: &[u8]) -> anyhow::Result<Vec<Definition>> {
    // Whether we are inside of a block, and if it is one we keep.
    enum State {
        Outside,
        Skipping,
        Inside(Definition),
    }

    let mut defs: Vec<Definition> = vec![];
    let mut state = State::Outside;
    for (i, line) in data.lines().enumerate() {
        let lineno = i + 1;
        let line = line.to_str().with_context(|| {
            format!("line {lineno}: configuration is not valid UTF-8")
        })?;
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("define") {
            if !matches!(state, State::Outside) {
                anyhow::bail!(
                    "line {lineno}: found `define` inside of another \
                     definition",
                );
            }
            let Some(kind) = rest.trim().strip_suffix('{') else {
                anyhow::bail!(
                    "line {lineno}: expected `define <type> {{`, \
                     but got `{line}`",
                );
            };
            let kind = kind.trim();
            state = if kind == "timeperiod" {
                State::Inside(Definition {
                    line: lineno,
                    register: true,
                    ..Definition::default()
                })
            } else {
                log::debug!(
                    "line {lineno}: skipping `{kind}` object definition"
                );
                State::Skipping
            };
            continue;
        }
        if line == "}" {
            match std::mem::replace(&mut state, State::Outside) {
                State::Outside => {
                    anyhow::bail!("line {lineno}: unexpected `}}`")
                }
                State::Skipping => {}
                State::Inside(def) => {
                    check(&def, &defs)
                        .with_context(|| format!("line {}", def.line))?;
                    defs.push(def);
                }
            }
            continue;
        }
        match state {
            State::Outside => anyhow::bail!(
                "line {lineno}: unexpected `{line}` outside of a definition",
            ),
            State::Skipping => {}
            State::Inside(ref mut def) => {
                let (key, value) = match line.split_once(char::is_whitespace)
                {
                    None => (line, ""),
                    Some((key, value)) => (key, value.trim()),
                };
                def.set(key, value)
                    .with_context(|| format!("line {lineno}"))?;
            }
        }
    }
    match state {
        State::Outside => Ok(defs),
        State::Skipping => {
            anyhow::bail!("unterminated object definition at end of input")
        }
        State::Inside(def) => anyhow::bail!(
            "line {}: unterminated definition of `{}`",
            def.line,
            def.display_name(),
        ),
    }
}

/// Check that a just finished definition is usable.
fn check(def: &Definition, defs: &[Definition]) -> anyhow::Result<()> {
    let Some(ref tpname) = def.timeperiod_name else {
        anyhow::ensure!(
            def.name.is_some(),
            "time period definition has neither `timeperiod_name` nor `name`",
        );
        anyhow::ensure!(
            !def.register,
            "time period definition `{}` is missing `timeperiod_name`",
            def.display_name(),
        );
        return Ok(());
    };
    let dupe = defs
        .iter()
        .find(|other| other.timeperiod_name.as_deref() == Some(tpname));
    if let Some(other) = dupe {
        anyhow::bail!(
            "duplicate time period `{tpname}` (first defined on line {})",
            other.line,
        );
    }
    Ok(())
}

/// Strips a trailing comment, if one exists.
///
/// Comments start with `#` or `;`. Both characters are never part of a
/// valid entry.
fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        None => line,
        Some(i) => &line[..i],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let defs = parse(
            b"\
# Working hours.
define timeperiod {
    timeperiod_name  workhours
    alias            Normal work hours   ; inline comment
    use              base, other
    exclude          holidays
    monday           09:00-17:00
    day 1 - 15 / 5   00:00-24:00
}

define timeperiod{
    name      base
    register  0
    sunday    00:00-24:00
}
",
        )
        .unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            defs[0],
            Definition {
                line: 2,
                timeperiod_name: Some("workhours".to_string()),
                name: None,
                alias: Some("Normal work hours".to_string()),
                uses: vec!["base".to_string(), "other".to_string()],
                register: true,
                exclude: vec!["holidays".to_string()],
                entries: vec![
                    "monday 09:00-17:00".to_string(),
                    "day 1 - 15 / 5 00:00-24:00".to_string(),
                ],
            },
        );
        assert_eq!(defs[1].name.as_deref(), Some("base"));
        assert!(!defs[1].register);
        assert_eq!(defs[1].entries, vec!["sunday 00:00-24:00"]);
    }

    #[test]
    fn skips_other_objects() {
        let defs = parse(
            b"\
define command {
    command_name  check_ping
}
define timeperiod {
    timeperiod_name  always
    day 1 - -1       00:00-24:00
}
",
        )
        .unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].display_name(), "always");
    }

    #[test]
    fn errors() {
        let err = |data: &str| {
            format!("{:#}", parse(data.as_bytes()).unwrap_err())
        };

        insta::assert_snapshot!(
            err("define timeperiod {\n timeperiod_name a\n"),
            @"line 1: unterminated definition of `a`",
        );
        insta::assert_snapshot!(
            err("define timeperiod {\ndefine timeperiod {\n"),
            @"line 2: found `define` inside of another definition",
        );
        insta::assert_snapshot!(
            err("}\n"),
            @"line 1: unexpected `}`",
        );
        insta::assert_snapshot!(
            err("monday 00:00-24:00\n"),
            @"line 1: unexpected `monday 00:00-24:00` outside of a definition",
        );
        insta::assert_snapshot!(
            err("define timeperiod {\n alias nope\n}\n"),
            @"line 1: time period definition has neither `timeperiod_name` nor `name`",
        );
        insta::assert_snapshot!(
            err("define timeperiod {\n name tmpl\n}\n"),
            @"line 1: time period definition `tmpl` is missing `timeperiod_name`",
        );
        insta::assert_snapshot!(
            err(
                "define timeperiod {\n timeperiod_name a\n}\n\
                 define timeperiod {\n timeperiod_name a\n}\n",
            ),
            @"line 4: duplicate time period `a` (first defined on line 1)",
        );
        insta::assert_snapshot!(
            err("define timeperiod {\n timeperiod_name a\n register 2\n}\n"),
            @"line 3: invalid `register` value `2` (expected 0 or 1)",
        );
    }

    #[test]
    fn comments() {
        let stripped = strip_comment("monday 09:00-17:00 # hi");
        assert_eq!(stripped, "monday 09:00-17:00 ");
        assert_eq!(strip_comment("; all of it"), "");
        assert_eq!(strip_comment("nothing"), "nothing");
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeperiods.cfg");
        std::fs::write(
            &path,
            "define timeperiod {\n timeperiod_name a\n monday 00:00-24:00\n}\n",
        )
        .unwrap();
        let defs = read(&path).unwrap();
        assert_eq!(defs[0].entries, vec!["monday 00:00-24:00"]);

        let missing = dir.path().join("nope.cfg");
        assert!(read(&missing).is_err());
    }
}
