use owo_colors::{OwoColorize, Style};

use crate::permission::CapabilitySet;
use crate::session::EnumerationOutcome;

/// How a fragment of terminal output should read.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tone {
    Heading,
    Good,
    Caution,
    Bad,
    Quiet,
    Emphasis,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Heading => Style::new().bold().cyan(),
            Self::Good => Style::new().bold().green(),
            Self::Caution => Style::new().bold().yellow(),
            Self::Bad => Style::new().bold().red(),
            Self::Quiet => Style::new().dimmed(),
            Self::Emphasis => Style::new().bold(),
        }
    }
}

/// Colours view text when stdout is a terminal and leaves it plain otherwise.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, tone: Tone, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_string()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Heading, text)
    }

    pub(crate) fn muted(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Quiet, text)
    }

    pub(crate) fn value(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Emphasis, text)
    }

    /// Dimmed dash for empty cells.
    pub(crate) fn placeholder(&self) -> String {
        self.muted("-")
    }

    pub(crate) fn yes_no(&self, flag: bool) -> String {
        if flag {
            self.paint(Tone::Good, "yes")
        } else {
            self.muted("no")
        }
    }

    /// Green `none` for an empty set, red names otherwise.
    pub(crate) fn missing(&self, capabilities: &CapabilitySet) -> String {
        if capabilities.is_empty() {
            self.paint(Tone::Good, "none")
        } else {
            self.paint(Tone::Bad, capabilities.to_string())
        }
    }

    /// Short status label for an enumeration outcome.
    pub(crate) fn outcome(&self, outcome: &EnumerationOutcome) -> String {
        let label: &'static str = outcome.into();
        let tone = match outcome {
            EnumerationOutcome::Ready(_) => Tone::Good,
            EnumerationOutcome::Pending => Tone::Quiet,
            EnumerationOutcome::TimedOut => Tone::Caution,
            EnumerationOutcome::Failed(_) => Tone::Bad,
        };
        self.paint(tone, label)
    }
}
