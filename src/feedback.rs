use std::fmt::Display;

use serde::{Serialize, Serializer};

use crate::addr::Addr;
use crate::descriptor::TypeDescriptor;
use crate::errors::ExplorerError;
use crate::variable::VariableProxy;

/// Snapshot of a [`VariableProxy`], as reported to a UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableView {
    pub name: String,
    pub address: Addr,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    /// hex encoded cached value
    pub value: Option<String>,
}

impl From<&VariableProxy> for VariableView {
    fn from(var: &VariableProxy) -> Self {
        Self {
            name: var.name().to_string(),
            address: var.address(),
            ty: var.type_descriptor().clone(),
            value: var.value().map(hex::encode),
        }
    }
}

fn serialize_error<S: Serializer>(
    err: &ExplorerError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&err.to_string())
}

#[derive(Debug, Serialize)]
pub enum Feedback {
    Ok,
    Text(String),
    List(Vec<String>),
    Path(Vec<String>),
    Type(TypeDescriptor),
    Variable(VariableView),
    Field(u64),
    Error(#[serde(serialize_with = "serialize_error")] ExplorerError),
}

impl Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Ok => write!(f, "Ok")?,
            Feedback::Error(e) => write!(f, "Error: {e}")?,
            Feedback::Text(t) => write!(f, "{t}")?,
            Feedback::List(items) => {
                for item in items {
                    writeln!(f, "{item}")?;
                }
            }
            // the first level is the root
            Feedback::Path(levels) => write!(f, "/{}", levels[1.min(levels.len())..].join("/"))?,
            Feedback::Type(t) => write!(f, "{t}")?,
            Feedback::Variable(v) => {
                write!(f, "{} at {}: {}", v.name, v.address, v.ty.name())?;
                match &v.value {
                    Some(hex) => write!(f, " = {hex}")?,
                    None => write!(f, " = <unread>")?,
                }
            }
            Feedback::Field(w) => write!(f, "{w:#x} ({w})")?,
        }

        Ok(())
    }
}

impl From<Result<Feedback, ExplorerError>> for Feedback {
    fn from(value: Result<Feedback, ExplorerError>) -> Self {
        match value {
            Ok(f) => f,
            Err(e) => Feedback::Error(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        let path = Feedback::Path(vec!["/".into(), "main.cpp".into(), "mercedes".into()]);
        assert_eq!(path.to_string(), "/main.cpp/mercedes");
        assert_eq!(Feedback::Path(vec!["/".into()]).to_string(), "/");
        assert_eq!(Feedback::Field(255).to_string(), "0xff (255)");
        let err: Feedback = Err(ExplorerError::NoDebugFile).into();
        assert_eq!(err.to_string(), "Error: No debug file was loaded");
    }

    #[test]
    fn test_serialize() {
        let err = Feedback::Error(ExplorerError::NotFound("mercedes".into()));
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"Error":"Could not find entry mercedes"}"#
        );

        let var = VariableProxy::from_descriptor(
            "limit",
            TypeDescriptor::new("int", 32),
            Addr::from(0x10u64),
        );
        let json = serde_json::to_value(Feedback::Variable(VariableView::from(&var))).unwrap();
        assert_eq!(json["Variable"]["name"], "limit");
        assert_eq!(json["Variable"]["type"]["bit_size"], 32);
        assert!(json["Variable"]["value"].is_null());
    }
}
