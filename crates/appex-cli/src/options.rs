//! Command-line options for the appex binary.

use appex_core::{ExceptionClass, TimestampFormat};
use clap::{Args, ValueEnum};

/// Which class the exception is built from.
#[derive(Args, Debug, Clone)]
pub struct ClassOptions {
    /// Name of the constructed class
    #[arg(long = "class", value_name = "NAME", default_value = ExceptionClass::BASE_NAME)]
    pub class: String,

    /// Intermediate classes between the base and the constructed class,
    /// root first (repeatable)
    #[arg(long = "parent", value_name = "NAME", action = clap::ArgAction::Append)]
    pub parents: Vec<String>,
}

impl Default for ClassOptions {
    fn default() -> Self {
        Self {
            class: ExceptionClass::BASE_NAME.to_string(),
            parents: Vec::new(),
        }
    }
}

/// Call-site values. Each one overrides the same key of `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldOptions {
    /// Message template
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    /// Display message template
    #[arg(long = "display-message")]
    pub display_message: Option<String>,

    /// Symbolic error code
    #[arg(long)]
    pub code: Option<String>,

    /// Numeric error code
    #[arg(long = "num-code")]
    pub num_code: Option<i64>,

    /// Prefix of the exception id
    #[arg(long = "id-prefix")]
    pub id_prefix: Option<String>,

    /// Body of the exception id (random when unset)
    #[arg(long = "id")]
    pub id_body: Option<String>,

    /// Detail entry as key=value; the value is read as JSON when it parses,
    /// as a string otherwise (repeatable)
    #[arg(short = 'd', long = "detail", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub details: Vec<String>,

    /// Use the class name as code when no code is given
    #[arg(long = "use-class-name-as-code")]
    pub use_class_name_as_code: bool,

    /// Use the message as display message when none is given
    #[arg(long = "use-message-as-display-message")]
    pub use_message_as_display_message: bool,

    /// Timestamp format in JSON output: iso or milliseconds
    #[arg(long = "timestamp-format", value_name = "FORMAT", value_parser = parse_timestamp_format)]
    pub timestamp_format: Option<TimestampFormat>,

    /// Text of an upstream cause (repeatable)
    #[arg(long = "cause", value_name = "TEXT", action = clap::ArgAction::Append)]
    pub causes: Vec<String>,
}

fn parse_timestamp_format(s: &str) -> Result<TimestampFormat, String> {
    s.parse()
        .map_err(|_| format!("unknown timestamp format '{s}', expected 'iso' or 'milliseconds'"))
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputKind {
    /// The exported JSON object
    #[default]
    Json,
    /// The compiled message
    Message,
    /// The compiled display message
    Display,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputOptions {
    /// What to print
    #[arg(long = "output", value_enum, default_value_t = OutputKind::Json)]
    pub output: OutputKind,

    /// Indent JSON output
    #[arg(long)]
    pub pretty: bool,
}
