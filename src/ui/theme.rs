//! Terminal styles for CLI output

use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles keyed by what is printed: table titles, labels, SQL text.
#[derive(Debug, Clone)]
pub struct Theme {
    pub title: Style,
    pub label: Style,
    pub sql: Style,
    pub ok: Style,
    pub warning: Style,
    pub accent: Style,
}

impl Theme {
    /// Colored when stdout is a terminal and `CLICOLOR` does not disable it.
    pub fn detect() -> Self {
        if console::colors_enabled() && console::Term::stdout().is_term() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().white().dimmed(),
            sql: Style::new().bright_black(),
            ok: Style::new().green().bold(),
            warning: Style::new().yellow().bold(),
            accent: Style::new().magenta(),
        }
    }

    pub fn plain() -> Self {
        Self {
            title: Style::new(),
            label: Style::new(),
            sql: Style::new(),
            ok: Style::new(),
            warning: Style::new(),
            accent: Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
