use std::{
    fmt::Display,
    io::IsTerminal,
    sync::{Arc, LazyLock},
};

use anstyle::{AnsiColor, Style};

/// A theme that indicates how output should be styled.
///
/// A theme is unstyled when the stream isn't a tty, when `NO_COLOR` is set
/// to a non-empty value or when `TERM=dumb`.
#[derive(Clone, Debug)]
pub struct Theme {
    inner: Option<Arc<ThemeInner>>,
}

impl Theme {
    /// Returns a theme for stdout.
    pub fn stdout() -> &'static Theme {
        static THEME: LazyLock<Theme> =
            LazyLock::new(|| Theme::new(tty_stdout()));
        &*THEME
    }

    /// Returns a theme for stderr.
    pub fn stderr() -> &'static Theme {
        static THEME: LazyLock<Theme> =
            LazyLock::new(|| Theme::new(tty_stderr()));
        &*THEME
    }

    fn new(tty: bool) -> Theme {
        if !tty || !can_use_colors() {
            return Theme { inner: None };
        }
        Theme { inner: Some(Arc::new(ThemeInner::default())) }
    }

    pub fn highlight<T: Display>(&self, data: T) -> Styled<'_, T> {
        let style = self.inner().map(|inner| &inner.highlight);
        Styled { data, style }
    }

    /// Styles a configuration warning.
    pub fn warning<T: Display>(&self, data: T) -> Styled<'_, T> {
        let style = self.inner().map(|inner| &inner.warning);
        Styled { data, style }
    }

    /// Styles a configuration error.
    pub fn error<T: Display>(&self, data: T) -> Styled<'_, T> {
        let style = self.inner().map(|inner| &inner.error);
        Styled { data, style }
    }

    /// Styles a log level. Only warnings and errors stand out.
    pub fn level(&self, level: log::Level) -> Styled<'_, log::Level> {
        match level {
            log::Level::Error => self.error(level),
            log::Level::Warn => self.warning(level),
            _ => Styled { data: level, style: None },
        }
    }

    fn inner(&self) -> Option<&ThemeInner> {
        self.inner.as_deref()
    }
}

#[derive(Debug)]
struct ThemeInner {
    highlight: Style,
    warning: Style,
    error: Style,
}

impl Default for ThemeInner {
    fn default() -> ThemeInner {
        ThemeInner {
            highlight: Style::new()
                .bold()
                .fg_color(Some(AnsiColor::Magenta.into())),
            warning: Style::new()
                .bold()
                .fg_color(Some(AnsiColor::Yellow.into())),
            error: Style::new().bold().fg_color(Some(AnsiColor::Red.into())),
        }
    }
}

/// A possibly unstyled piece of renderable data.
#[derive(Clone, Debug)]
pub struct Styled<'s, T> {
    data: T,
    style: Option<&'s Style>,
}

impl<'s, T: Display> Display for Styled<'s, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let Some(style) = self.style else {
            return self.data.fmt(f);
        };
        write!(f, "{style}{}{style:#}", self.data)
    }
}

fn tty_stdout() -> bool {
    static YES: LazyLock<bool> =
        LazyLock::new(|| std::io::stdout().is_terminal());
    *YES
}

fn tty_stderr() -> bool {
    static YES: LazyLock<bool> =
        LazyLock::new(|| std::io::stderr().is_terminal());
    *YES
}

/// Whether colors have been globally disabled or not.
fn can_use_colors() -> bool {
    static YES: LazyLock<bool> = LazyLock::new(|| {
        if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            return false;
        }
        std::env::var_os("TERM").is_none_or(|v| v != "dumb")
    });
    *YES
}
