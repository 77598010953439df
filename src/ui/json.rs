//! Line based JSON protocol over any reader and writer, stdin and stdout by default
//!
//! Every command is one line holding an [`Input`]; every answer is one line holding the
//! [`format_feedback`] of the [`Feedback`].

use std::io::{BufRead, Stdout, StdinLock, Write};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{trace, warn};

use crate::errors::{ExplorerError, Result};
use crate::feedback::Feedback;

use super::{ExplorerUI, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub status: Status,
}

pub fn format_feedback(feedback: &Feedback) -> serde_json::Value {
    json!({ "feedback": feedback })
}

pub struct JsonUI<I: BufRead, O: Write> {
    input: I,
    output: O,
}

impl JsonUI<StdinLock<'static>, Stdout> {
    pub fn build() -> Result<Self> {
        Ok(JsonUI {
            input: std::io::stdin().lock(),
            output: std::io::stdout(),
        })
    }
}

impl<I: BufRead, O: Write> JsonUI<I, O> {
    pub fn with_io(input: I, output: O) -> Self {
        JsonUI { input, output }
    }

    pub fn into_output(self) -> O {
        self.output
    }

    fn send(&mut self, feedback: &Feedback) -> Result<()> {
        writeln!(self.output, "{}", format_feedback(feedback))?;
        self.output.flush()?;
        Ok(())
    }
}

impl<I: BufRead, O: Write> ExplorerUI for JsonUI<I, O> {
    fn process(&mut self, feedback: &Feedback) -> Result<Status> {
        self.send(feedback)?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                trace!("input closed");
                return Ok(Status::Quit);
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Input>(&line) {
                Ok(input) => return Ok(input.status),
                Err(e) => {
                    warn!("could not parse input: {e}");
                    self.send(&Feedback::Error(ExplorerError::Json(e)))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_input_format() {
        let input = Input {
            status: Status::StepInto("main.cpp".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&input).unwrap(),
            r#"{"status":{"StepInto":"main.cpp"}}"#
        );
        let parsed: Input = serde_json::from_str(r#"{"status":"ListCompileUnits"}"#).unwrap();
        assert_eq!(parsed.status, Status::ListCompileUnits);
    }

    #[test]
    fn test_process() {
        let commands = "\n{\"status\":\"Ping\"}\nnot json\n{\"status\":{\"SetOffset\":-16}}\n";
        let mut ui = JsonUI::with_io(Cursor::new(commands), Vec::new());

        assert_eq!(ui.process(&Feedback::Ok).unwrap(), Status::Ping);
        assert_eq!(
            ui.process(&Feedback::Text("pong".into())).unwrap(),
            Status::SetOffset(-16)
        );
        // end of input
        assert_eq!(ui.process(&Feedback::Ok).unwrap(), Status::Quit);

        let output = String::from_utf8(ui.into_output()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], r#"{"feedback":"Ok"}"#);
        assert_eq!(lines[1], r#"{"feedback":{"Text":"pong"}}"#);
        assert!(lines[2].starts_with(r#"{"feedback":{"Error":"Error while working with json"#));
        assert_eq!(lines[3], r#"{"feedback":"Ok"}"#);
    }
}
