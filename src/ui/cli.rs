use dialoguer::theme::ColorfulTheme;
use dialoguer::{BasicHistory, Input};
use tracing::{error, trace};

use super::{ExplorerUI, Status};
use crate::errors::{ExplorerError, Result};
use crate::feedback::Feedback;

const HELP: &str = "\
ls                       list what can be stepped into
cd <name> | .. | /       step into a child, back up one level or to the top
pwd                      show the current path
show                     describe the current level
units                    list all compile units
type [name]              type of the current variable or of a named entry
info <name>              raw debug entry
read [name]              read the current or a named variable from memory
set [name] <hex bytes>   set the raw value of a variable and write it
field <name> [value]     get or set a field of the current variable
offset <offset>          subtract this from addresses before accessing memory
file [path]              load or show the debug file
ping                     check if anyone is home
help                     show this text
quit                     leave";

pub struct CliUi {
    history: BasicHistory,
    prompt: String,
}

impl CliUi {
    pub fn build() -> Result<Self> {
        Ok(CliUi {
            history: BasicHistory::new().max_entries(100).no_duplicates(true),
            prompt: "/".to_string(),
        })
    }

    fn get_line(&mut self) -> Result<String> {
        Ok(Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("door {}", self.prompt))
            .history_with(&mut self.history)
            .interact_text()?)
    }
}

fn parse_u64(raw: &str) -> Result<u64> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| ExplorerError::BadInput(format!("{raw} is not a number: {e}")))
}

fn parse_i64(raw: &str) -> Result<i64> {
    let (negative, magnitude) = match raw.strip_prefix('-') {
        Some(m) => (true, m),
        None => (false, raw),
    };
    let magnitude = i64::try_from(parse_u64(magnitude)?)
        .map_err(|_| ExplorerError::BadInput(format!("{raw} is out of range")))?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_bytes(raw: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(raw.strip_prefix("0x").unwrap_or(raw))?)
}

/// Parses a command line; `None` for requests of the help text
pub fn parse_command(words: &[String]) -> Result<Option<Status>> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let status = match words.as_slice() {
        ["help" | "h" | "?"] => return Ok(None),
        ["quit" | "q" | "exit"] => Status::Quit,
        ["ping"] => Status::Ping,
        ["ls"] => Status::ListChildren,
        ["cd", ".."] | ["up"] => Status::Back,
        ["cd", "/"] | ["cd"] => Status::Reset,
        ["cd", name] => Status::StepInto(name.to_string()),
        ["pwd"] => Status::Where,
        ["show"] => Status::Show,
        ["units" | "cus"] => Status::ListCompileUnits,
        ["type"] => Status::CurrentType,
        ["type", name] => Status::GetType(name.to_string()),
        ["info", name] => Status::EntryInfo(name.to_string()),
        ["read"] => Status::ReadVariable(None),
        ["read", name] => Status::ReadVariable(Some(name.to_string())),
        ["set", value] => Status::SetVariable(None, parse_bytes(value)?),
        ["set", name, value] => Status::SetVariable(Some(name.to_string()), parse_bytes(value)?),
        ["field", name] => Status::GetField(name.to_string()),
        ["field", name, value] => Status::SetField(name.to_string(), parse_u64(value)?),
        ["offset", offset] => Status::SetOffset(parse_i64(offset)?),
        ["file"] => Status::GetDebugFile,
        ["file", path] => Status::SetDebugFile(path.into()),
        _ => {
            return Err(ExplorerError::BadInput(format!(
                "unknown command '{}', try 'help'",
                words.join(" ")
            )))
        }
    };
    Ok(Some(status))
}

impl ExplorerUI for CliUi {
    fn process(&mut self, feedback: &Feedback) -> Result<Status> {
        match feedback {
            Feedback::Ok => (),
            Feedback::Path(_) => {
                self.prompt = feedback.to_string();
            }
            Feedback::Error(e) => error!("{e}"),
            other => println!("{other}"),
        }

        loop {
            let line = self.get_line()?;
            trace!("input: {line}");
            let Some(words) = shlex::split(&line) else {
                error!("could not split the input, check the quotes");
                continue;
            };
            if words.is_empty() {
                continue;
            }
            match parse_command(&words) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => println!("{HELP}"),
                Err(e) => error!("{e}"),
            }
        }
    }
}
