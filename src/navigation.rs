//! # Navigation Module
//!
//! A [`NavigationContext`] lets a user walk the debug info of a program like a file system:
//! from the list of compile units into a compile unit, from there into one of its variables
//! or types, and from there into the members of that variable or type, as deep as the
//! layout goes.
//!
//! The context is a stack of [`Level`]s. The bottom level is always
//! [`Level::AllCompileUnits`], the top level is the current one.

use std::fmt::Display;

use tracing::{debug, trace};

use crate::descriptor::{resolve_type, TypeDescriptor};
use crate::entry::{DebugEntry, EntryTag};
use crate::errors::{ExplorerError, Result};
use crate::lookup::{is_explorable, list_children, list_compile_units};
use crate::memory::SharedClient;
use crate::reader::DebugReader;
use crate::variable::VariableProxy;

/// Something with a resolved layout
#[derive(Debug, Clone)]
pub enum Proxy {
    Variable(VariableProxy),
    Type(TypeDescriptor),
}

impl Proxy {
    pub fn name(&self) -> &str {
        match self {
            Proxy::Variable(v) => v.name(),
            Proxy::Type(t) => t.name(),
        }
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        match self {
            Proxy::Variable(v) => v.type_descriptor(),
            Proxy::Type(t) => t,
        }
    }

    pub fn list_children(&self) -> Vec<String> {
        self.type_descriptor().list_children()
    }

    /// Gets a member; members of variables are variables again
    pub fn get_child(&self, name: &str) -> Result<Proxy> {
        Ok(match self {
            Proxy::Variable(v) => Proxy::Variable(v.get_child(name)?),
            Proxy::Type(t) => Proxy::Type(t.get_child(name)?.clone()),
        })
    }
}

impl Display for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proxy::Variable(v) => write!(f, "{v}"),
            Proxy::Type(t) => write!(f, "{t}"),
        }
    }
}

/// One level of a [`NavigationContext`]
#[derive(Debug, Clone)]
pub enum Level {
    AllCompileUnits,
    Entry(DebugEntry),
    Proxy(Proxy),
}

impl Level {
    pub fn name(&self) -> String {
        match self {
            Level::AllCompileUnits => "/".to_string(),
            Level::Entry(e) => e.label(),
            Level::Proxy(p) => p.name().to_string(),
        }
    }
}

/// A stack based cursor through compile units, entries and their layouts
///
/// The context owns its reader: lookups move the reader's cursor, so it must not be shared
/// with anything else.
pub struct NavigationContext<R: DebugReader> {
    reader: R,
    stack: Vec<Level>,
    client: Option<SharedClient>,
}

impl<R: DebugReader> NavigationContext<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            stack: vec![Level::AllCompileUnits],
            client: None,
        }
    }

    /// Memory client attached to the variable proxies created from now on
    pub fn set_client(&mut self, client: Option<SharedClient>) {
        self.client = client;
    }

    pub fn client(&self) -> Option<&SharedClient> {
        self.client.as_ref()
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_reader(self) -> R {
        self.reader
    }

    pub fn current(&self) -> &Level {
        self.stack
            .last()
            .expect("the navigation stack always holds the compile unit level")
    }

    /// Number of levels above [`Level::AllCompileUnits`]
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Names of all levels, from the bottom up
    pub fn path(&self) -> Vec<String> {
        self.stack.iter().map(Level::name).collect()
    }

    /// The compile unit the current level belongs to, if any
    pub fn current_unit(&self) -> Option<&DebugEntry> {
        self.stack.iter().find_map(|level| match level {
            Level::Entry(e) if e.tag() == EntryTag::CompileUnit => Some(e),
            _ => None,
        })
    }

    /// The current variable, if the current level is one
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::NotAProxy`] on any other level.
    pub fn current_variable_mut(&mut self) -> Result<&mut VariableProxy> {
        let level = self.current().name();
        match self.stack.last_mut() {
            Some(Level::Proxy(Proxy::Variable(v))) => Ok(v),
            _ => Err(ExplorerError::NotAProxy(level)),
        }
    }

    fn entry_child(&mut self, parent: &DebugEntry, name: &str) -> Result<Proxy> {
        let child = list_children(&mut self.reader, parent, is_explorable)?
            .into_iter()
            .find(|c| c.name() == Some(name))
            .ok_or_else(|| ExplorerError::NotFound(name.to_string()))?;

        if child.tag().is_variable() {
            let mut var = VariableProxy::from_entry(&mut self.reader, &child)?;
            if let Some(client) = &self.client {
                var.set_client(client);
            }
            Ok(Proxy::Variable(var))
        } else {
            Ok(Proxy::Type(resolve_type(&mut self.reader, &child)?))
        }
    }

    /// Moves one level down, to the child called `name` of the current level
    ///
    /// * from the list of compile units into the compile unit `name`
    /// * from an entry into one of its variables or types
    /// * from a variable or type into one of its members
    ///
    /// Nothing changes if this fails.
    pub fn step_into(&mut self, name: &str) -> Result<&Level> {
        let next = match self.current().clone() {
            Level::AllCompileUnits => {
                let unit = list_compile_units(&mut self.reader)?
                    .into_iter()
                    .find(|u| u.name() == Some(name))
                    .ok_or_else(|| ExplorerError::NotFound(name.to_string()))?;
                self.reader.seek(unit.offset())?;
                self.reader.next()?;
                Level::Entry(unit)
            }
            Level::Entry(parent) => Level::Proxy(self.entry_child(&parent, name)?),
            Level::Proxy(proxy) => Level::Proxy(proxy.get_child(name)?),
        };
        debug!("stepped into {}", next.name());
        self.stack.push(next);
        Ok(self.current())
    }

    /// Moves one level up
    ///
    /// Does nothing on the bottom level. When returning to an entry, the reader is
    /// positioned right after that entry again.
    pub fn back(&mut self) -> Result<()> {
        if self.stack.len() == 1 {
            trace!("already at the bottom of the navigation stack");
            return Ok(());
        }
        self.stack.pop();
        if let Level::Entry(e) = self.current() {
            let offset = e.offset();
            self.reader.seek(offset)?;
            self.reader.next()?;
        }
        debug!("back at {}", self.current().name());
        Ok(())
    }

    #[inline]
    pub fn up(&mut self) -> Result<()> {
        self.back()
    }

    /// Returns to the list of compile units
    pub fn reset(&mut self) -> Result<()> {
        self.stack.truncate(1);
        self.reader.rewind()
    }

    /// Moves from a variable to its type
    ///
    /// Does nothing if the current level already is a type.
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::NotAProxy`] on compile units and entries.
    pub fn get_type(&mut self) -> Result<&TypeDescriptor> {
        let ty = match self.current() {
            Level::Proxy(Proxy::Variable(v)) => Some(v.type_descriptor().clone()),
            Level::Proxy(Proxy::Type(_)) => None,
            other => return Err(ExplorerError::NotAProxy(other.name())),
        };
        if let Some(ty) = ty {
            self.stack.push(Level::Proxy(Proxy::Type(ty)));
        }
        match self.current() {
            Level::Proxy(p) => Ok(p.type_descriptor()),
            other => Err(ExplorerError::NotAProxy(other.name())),
        }
    }

    /// Names of everything [`step_into`](Self::step_into) accepts on the current level
    pub fn list_children(&mut self) -> Result<Vec<String>> {
        let names = match self.current().clone() {
            Level::AllCompileUnits => list_compile_units(&mut self.reader)?
                .iter()
                .map(DebugEntry::label)
                .collect(),
            Level::Entry(e) => list_children(&mut self.reader, &e, is_explorable)?
                .iter()
                .map(DebugEntry::label)
                .collect(),
            Level::Proxy(p) => p.list_children(),
        };
        Ok(names)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::addr::Addr;
    use crate::fixtures::{formula_one, TEAMS_ADDR};
    use crate::memory::FileClient;
    use crate::reader::EntryStream;

    fn context() -> NavigationContext<EntryStream> {
        NavigationContext::new(formula_one())
    }

    const TEAM_MEMBERS: [&str; 6] = [
        "drivers",
        "sponsors",
        "has_won_wdc",
        "last_wdc",
        "has_won_wcc",
        "last_wcc",
    ];

    #[test]
    fn test_navigation_scenario() {
        let mut nav = context();
        assert!(matches!(nav.current(), Level::AllCompileUnits));

        nav.step_into("main.cpp").unwrap();
        assert!(matches!(nav.current(), Level::Entry(e) if e.name() == Some("main.cpp")));

        nav.step_into("formula_1_teams").unwrap();
        let Level::Proxy(Proxy::Variable(teams)) = nav.current() else {
            panic!("expected a variable, got {:?}", nav.current());
        };
        assert_eq!(teams.type_descriptor().name(), "Team");
        assert_eq!(teams.address(), Addr::from(TEAMS_ADDR));
        assert_eq!(nav.list_children().unwrap(), TEAM_MEMBERS);

        nav.back().unwrap();
        nav.back().unwrap();
        assert!(matches!(nav.current(), Level::AllCompileUnits));
        // the bottom level cannot be left
        nav.back().unwrap();
        assert!(matches!(nav.current(), Level::AllCompileUnits));
        assert_eq!(nav.depth(), 0);
    }

    #[test]
    fn test_list_children_per_level() {
        let mut nav = context();
        assert_eq!(nav.list_children().unwrap(), ["main.cpp", "other.cpp"]);

        nav.step_into("main.cpp").unwrap();
        let children = nav.list_children().unwrap();
        for name in ["int", "Driver", "team_t", "formula_1_teams", "laps"] {
            assert!(children.iter().any(|c| c == name), "{name} missing");
        }
        // functions and their locals are not listed
        assert!(!children.iter().any(|c| c == "main" || c == "local_counter"));

        nav.step_into("Team").unwrap();
        assert_eq!(nav.list_children().unwrap(), TEAM_MEMBERS);
    }

    #[test]
    fn test_deep_steps() {
        let mut nav = context();
        nav.step_into("main.cpp").unwrap();
        nav.step_into("mercedes").unwrap();
        nav.step_into("drivers").unwrap();
        nav.step_into("car_number").unwrap();
        assert_eq!(
            nav.path(),
            ["/", "main.cpp", "mercedes", "drivers", "car_number"]
        );
        let Level::Proxy(Proxy::Variable(car)) = nav.current() else {
            panic!("expected a variable");
        };
        assert_eq!(car.address(), Addr::from(crate::fixtures::MERCEDES_ADDR + 4));
        assert_eq!(nav.current_unit().and_then(|u| u.name()), Some("main.cpp"));
    }

    #[test]
    fn test_failed_steps_change_nothing() {
        let mut nav = context();
        assert!(matches!(
            nav.step_into("nowhere.cpp"),
            Err(ExplorerError::NotFound(_))
        ));
        assert_eq!(nav.depth(), 0);

        nav.step_into("main.cpp").unwrap();
        assert!(nav.step_into("local_counter").is_err());
        assert!(matches!(
            nav.step_into("Opaque"),
            Err(ExplorerError::Resolution(_))
        ));
        nav.step_into("Driver").unwrap();
        assert!(matches!(
            nav.step_into("pit_crew"),
            Err(ExplorerError::FieldNotFound { .. })
        ));
        assert_eq!(nav.path(), ["/", "main.cpp", "Driver"]);
    }

    #[test]
    fn test_back_repositions_reader() {
        let mut nav = context();
        nav.step_into("main.cpp").unwrap();
        nav.step_into("favorite").unwrap();
        nav.back().unwrap();
        let first = nav.reader_mut().next().unwrap().unwrap();
        assert_eq!(first.name(), Some("char"));
    }

    #[test]
    fn test_get_type() {
        let mut nav = context();
        assert!(matches!(nav.get_type(), Err(ExplorerError::NotAProxy(_))));
        nav.step_into("main.cpp").unwrap();
        assert!(matches!(nav.get_type(), Err(ExplorerError::NotAProxy(_))));

        nav.step_into("favorite").unwrap();
        assert_eq!(nav.get_type().unwrap().name(), "team_t");
        assert!(matches!(nav.current(), Level::Proxy(Proxy::Type(_))));
        assert_eq!(nav.depth(), 3);
        // already a type
        nav.get_type().unwrap();
        assert_eq!(nav.depth(), 3);
        nav.back().unwrap();
        assert!(matches!(nav.current(), Level::Proxy(Proxy::Variable(_))));
    }

    #[test]
    fn test_variables_get_the_client() {
        let tmp = NamedTempFile::new().unwrap();
        let client: SharedClient = Rc::new(RefCell::new(FileClient::open(tmp.path()).unwrap()));
        client.borrow_mut().set_offset(TEAMS_ADDR as i64);
        client
            .borrow_mut()
            .write(Addr::from(TEAMS_ADDR + 36), &2008u32.to_be_bytes())
            .unwrap();
        client
            .borrow_mut()
            .write(Addr::from(TEAMS_ADDR + 44), &[0, 0, 0, 0])
            .unwrap();

        let mut nav = context();
        nav.set_client(Some(client.clone()));
        nav.step_into("main.cpp").unwrap();
        nav.step_into("formula_1_teams").unwrap();
        let var = nav.current_variable_mut().unwrap();
        var.read().unwrap();
        assert_eq!(var.get_field("last_wdc").unwrap(), 2008);
    }

    #[test]
    fn test_reset() {
        let mut nav = context();
        nav.step_into("other.cpp").unwrap();
        nav.step_into("lap_count").unwrap();
        nav.reset().unwrap();
        assert!(matches!(nav.current(), Level::AllCompileUnits));
        assert!(matches!(
            nav.current_variable_mut(),
            Err(ExplorerError::NotAProxy(_))
        ));
    }
}
