use std::io::IsTerminal;

use yansi::{Condition, Paint};

use super::{LogFormatter, Record};

#[derive(Debug, Clone)]
pub struct Config {
    pub datetime_format: String,
    pub use_ansi: bool,
    /// Width the level name is padded to, so messages line up.
    pub level_width: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            datetime_format: "%Y/%m/%d %H:%M:%S".to_string(),
            use_ansi: std::io::stderr().is_terminal(),
            level_width: 5,
        }
    }

    pub fn plain() -> Self {
        Self {
            use_ansi: false,
            ..Self::new()
        }
    }

    pub fn with_level_width(self, level_width: usize) -> Self {
        Self {
            level_width,
            ..self
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DefaultFormatter {
    config: Config,
}

impl DefaultFormatter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn condition(&self) -> Condition {
        if self.config.use_ansi {
            Condition::ALWAYS
        } else {
            Condition::NEVER
        }
    }

    fn timestamp(&self, record: &Record) -> String {
        let time = record
            .created()
            .with_timezone(&chrono::Local)
            .format(&self.config.datetime_format)
            .to_string();

        time.bright_black().whenever(self.condition()).to_string()
    }

    fn prefix(&self, record: &Record) -> String {
        let level = record.level();
        let prefix = format!("{:<width$} :", level, width = self.config.level_width);

        prefix.fg(level.color()).whenever(self.condition()).to_string()
    }

    fn location(&self, record: &Record, call_depth: usize) -> String {
        match record.location_for(call_depth) {
            Some(location) => format!(" {}:{}:", location.file(), location.line()),
            None => String::new(),
        }
    }

    fn format_msg(&self, record: &Record) -> String {
        record
            .message_text()
            .bold()
            .whenever(self.condition())
            .to_string()
    }
}

impl LogFormatter for DefaultFormatter {
    fn format(&self, record: &Record, call_depth: usize) -> String {
        format!(
            "{} {}{} {}",
            self.prefix(record),
            self.timestamp(record),
            self.location(record, call_depth),
            self.format_msg(record),
        )
    }
}
