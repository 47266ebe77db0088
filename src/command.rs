//! Console command grammar.
//!
//! One command per input line. Arguments that carry free text (transcript
//! overrides, field edits, facility names) take the rest of the line verbatim.

use crate::fields::Field;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin or resume listening.
    Start,
    /// Pause listening, keeping the transcript.
    Stop,
    /// Stop, clear the transcript, and start fresh.
    Restart,
    /// Print transcript and extracted fields.
    Show,
    /// Print the raw transcript only (for shell capture).
    Copy,
    /// Toggle edit mode.
    Edit,
    /// Replace the transcript (manual override, bypasses debouncing).
    SetTranscript(String),
    /// Edit one extracted field by its 1-based index. `\n` escapes in the
    /// text split list-typed fields into elements.
    SetField(Field, String),
    /// Set the facility name for the document header.
    Facility(String),
    /// Run structured extraction on the current transcript.
    Extract,
    /// Render the prescription document.
    Generate,
    Help,
    Quit,
}

/// Parse failures carry the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

/// Parse one input line. Empty lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "restart" => Command::Restart,
        "show" => Command::Show,
        "copy" => Command::Copy,
        "edit" => Command::Edit,
        "transcript" => Command::SetTranscript(unescape(rest)),
        "set" => {
            let (index, text) = rest
                .split_once(char::is_whitespace)
                .map(|(i, t)| (i, t.trim()))
                .unwrap_or((rest, ""));
            let index: usize = index.parse().map_err(|_| ParseError(format!("'{}' is not a field number (1-8)", index)))?;
            let field = Field::from_index(index).ok_or_else(|| ParseError(format!("no field numbered {}", index)))?;
            Command::SetField(field, unescape(text))
        }
        "facility" => Command::Facility(rest.to_string()),
        "extract" => Command::Extract,
        "generate" => Command::Generate,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError(format!("unknown command '{}', try 'help'", other))),
    };
    Ok(Some(command))
}

/// Turn literal `\n` sequences into newlines so list fields can be edited
/// from a single input line.
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

pub const HELP: &str = "\
Commands:
  start                begin or resume listening
  stop                 pause listening (transcript kept)
  restart              clear transcript and listen fresh
  show                 print transcript and extracted fields
  copy                 print the raw transcript
  edit                 toggle edit mode
  transcript <text>    replace the transcript (edit mode)
  set <n> <text>       edit field n; use \\n to separate list entries (edit mode)
  facility <name>      set the facility name for the document header
  extract              extract prescription fields from the transcript
  generate             write the prescription document
  quit                 exit";
