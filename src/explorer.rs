//! # Explorer Module
//!
//! The [`Explorer`] ties everything together for interactive use. It owns the debug info of
//! one program, a [`NavigationContext`] over it and optionally a [`MemoryClient`] with the
//! memory of that program, and executes the [`Status`] commands a UI sends.
//!
//! [`MemoryClient`]: crate::memory::MemoryClient

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::descriptor::resolve_type;
use crate::dwarf_parse::load_debug_file;
use crate::entry::DebugEntry;
use crate::errors::{ExplorerError, Result};
use crate::feedback::{Feedback, VariableView};
use crate::lookup::{find_entry, list_compile_units};
use crate::memory::SharedClient;
use crate::navigation::{Level, NavigationContext, Proxy};
use crate::reader::EntryStream;
use crate::ui::{ExplorerUI, Status};
use crate::variable::VariableProxy;

/// How addresses from the debug info are mapped to addresses of the memory client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressTranslation {
    /// Subtract a fixed offset
    Fixed(i64),
    /// Subtract the low pc of the compile unit the variable belongs to
    CompileUnitLowPc,
}

impl Default for AddressTranslation {
    fn default() -> Self {
        AddressTranslation::Fixed(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub translation: AddressTranslation,
}

pub struct Explorer<UI: ExplorerUI> {
    ui: UI,
    config: ExplorerConfig,
    debug_file: Option<PathBuf>,
    nav: Option<NavigationContext<EntryStream>>,
    client: Option<SharedClient>,
}

impl<UI: ExplorerUI> Explorer<UI> {
    pub fn build(ui: UI, config: ExplorerConfig) -> Self {
        Explorer {
            ui,
            config,
            debug_file: None,
            nav: None,
            client: None,
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn set_client(&mut self, client: SharedClient) {
        if let Some(nav) = self.nav.as_mut() {
            nav.set_client(Some(client.clone()));
        }
        self.client = Some(client);
    }

    /// Uses already loaded debug entries, replacing the current ones
    pub fn set_entries(&mut self, entries: EntryStream) {
        let mut nav = NavigationContext::new(entries);
        nav.set_client(self.client.clone());
        self.nav = Some(nav);
    }

    pub fn set_debug_file(&mut self, path: impl AsRef<Path>) -> Result<Feedback> {
        let path = path.as_ref();
        let entries = load_debug_file(path)?;
        info!("loaded {} debug entries from {}", entries.len(), path.display());
        self.set_entries(entries);
        self.debug_file = Some(path.to_owned());
        Ok(Feedback::Ok)
    }

    pub fn debug_file(&self) -> Result<Feedback> {
        match &self.debug_file {
            Some(p) => Ok(Feedback::Text(p.to_string_lossy().to_string())),
            None => {
                let err = ExplorerError::NoDebugFile;
                error!("{err}");
                Err(err)
            }
        }
    }

    fn nav(&mut self) -> Result<&mut NavigationContext<EntryStream>> {
        match self.nav.as_mut() {
            Some(nav) => Ok(nav),
            None => {
                let err = ExplorerError::NoDebugFile;
                error!("{err}");
                Err(err)
            }
        }
    }

    /// Sets the base offset of the memory client for a variable of `unit`
    fn apply_translation(&self, unit: Option<&DebugEntry>) {
        let Some(client) = &self.client else {
            return;
        };
        let offset = match self.config.translation {
            AddressTranslation::Fixed(offset) => offset,
            AddressTranslation::CompileUnitLowPc => {
                match unit.and_then(DebugEntry::low_pc) {
                    Some(pc) => pc as i64,
                    None => {
                        warn!("compile unit has no low pc, not translating addresses");
                        0
                    }
                }
            }
        };
        debug!("memory client offset: {offset:#x}");
        client.borrow_mut().set_offset(offset);
    }

    pub fn list_compile_units(&mut self) -> Result<Feedback> {
        let units = list_compile_units(self.nav()?.reader_mut())?;
        Ok(Feedback::List(units.iter().map(DebugEntry::label).collect()))
    }

    pub fn list_children(&mut self) -> Result<Feedback> {
        Ok(Feedback::List(self.nav()?.list_children()?))
    }

    pub fn step_into(&mut self, name: &str) -> Result<Feedback> {
        let nav = self.nav()?;
        nav.step_into(name)?;
        Ok(Feedback::Path(nav.path()))
    }

    pub fn back(&mut self) -> Result<Feedback> {
        let nav = self.nav()?;
        nav.back()?;
        Ok(Feedback::Path(nav.path()))
    }

    pub fn reset(&mut self) -> Result<Feedback> {
        let nav = self.nav()?;
        nav.reset()?;
        Ok(Feedback::Path(nav.path()))
    }

    pub fn path(&mut self) -> Result<Feedback> {
        Ok(Feedback::Path(self.nav()?.path()))
    }

    /// Describes the current level
    pub fn show(&mut self) -> Result<Feedback> {
        if matches!(self.nav()?.current(), Level::AllCompileUnits) {
            return self.list_compile_units();
        }
        Ok(match self.nav()?.current() {
            Level::AllCompileUnits => Feedback::Ok,
            Level::Entry(e) => Feedback::Text(e.to_string()),
            Level::Proxy(Proxy::Variable(v)) => Feedback::Variable(VariableView::from(v)),
            Level::Proxy(Proxy::Type(t)) => Feedback::Type(t.clone()),
        })
    }

    pub fn current_type(&mut self) -> Result<Feedback> {
        Ok(Feedback::Type(self.nav()?.get_type()?.clone()))
    }

    pub fn get_type(&mut self, name: &str) -> Result<Feedback> {
        let reader = self.nav()?.reader_mut();
        let (entry, _) = find_entry(reader, name)?;
        Ok(Feedback::Type(resolve_type(reader, &entry)?))
    }

    pub fn entry_info(&mut self, name: &str) -> Result<Feedback> {
        let (entry, _) = find_entry(self.nav()?.reader_mut(), name)?;
        Ok(Feedback::Text(entry.to_string()))
    }

    /// Looks up a top level variable and attaches the memory client to it
    fn variable_by_name(&mut self, name: &str) -> Result<VariableProxy> {
        let reader = self.nav()?.reader_mut();
        let (entry, unit) = find_entry(reader, name)?;
        let mut var = VariableProxy::from_entry(reader, &entry)?;
        if let Some(client) = &self.client {
            var.set_client(client);
        }
        self.apply_translation(unit.as_ref());
        Ok(var)
    }

    /// Prepares the memory client for the variable on the current level
    fn current_variable(&mut self) -> Result<&mut VariableProxy> {
        let unit = self.nav()?.current_unit().cloned();
        self.apply_translation(unit.as_ref());
        self.nav()?.current_variable_mut()
    }

    /// Reads a variable from memory, the current one if `name` is `None`
    pub fn read_variable(&mut self, name: Option<&str>) -> Result<Feedback> {
        match name {
            Some(name) => {
                let mut var = self.variable_by_name(name)?;
                var.read()?;
                Ok(Feedback::Variable(VariableView::from(&var)))
            }
            None => {
                let var = self.current_variable()?;
                var.read()?;
                Ok(Feedback::Variable(VariableView::from(&*var)))
            }
        }
    }

    /// Sets the raw value of a variable and writes it to memory
    pub fn set_variable(&mut self, name: Option<&str>, value: Vec<u8>) -> Result<Feedback> {
        match name {
            Some(name) => {
                let mut var = self.variable_by_name(name)?;
                var.set(value)?;
                var.write()?;
                Ok(Feedback::Variable(VariableView::from(&var)))
            }
            None => {
                let var = self.current_variable()?;
                var.set(value)?;
                var.write()?;
                Ok(Feedback::Variable(VariableView::from(&*var)))
            }
        }
    }

    /// Decodes a field of the cached value of the current variable
    pub fn get_field(&mut self, field: &str) -> Result<Feedback> {
        let var = self.nav()?.current_variable_mut()?;
        Ok(Feedback::Field(var.get_field(field)?))
    }

    /// Changes a field of the current variable and writes the variable to memory
    pub fn set_field(&mut self, field: &str, value: u64) -> Result<Feedback> {
        let var = self.current_variable()?;
        var.set_field(field, value)?;
        var.write()?;
        Ok(Feedback::Variable(VariableView::from(&*var)))
    }

    pub fn set_offset(&mut self, offset: i64) -> Result<Feedback> {
        self.config.translation = AddressTranslation::Fixed(offset);
        self.apply_translation(None);
        Ok(Feedback::Ok)
    }

    /// Executes a single command
    ///
    /// [`Status::Quit`] does nothing here, it only ends [`run`](Self::run).
    pub fn execute(&mut self, status: Status) -> Result<Feedback> {
        match status {
            Status::Ping => Ok(Feedback::Text("pong".to_string())),
            Status::Quit => Ok(Feedback::Ok),
            Status::SetDebugFile(path) => self.set_debug_file(path),
            Status::GetDebugFile => self.debug_file(),
            Status::ListCompileUnits => self.list_compile_units(),
            Status::ListChildren => self.list_children(),
            Status::StepInto(name) => self.step_into(&name),
            Status::Back => self.back(),
            Status::Reset => self.reset(),
            Status::Where => self.path(),
            Status::Show => self.show(),
            Status::CurrentType => self.current_type(),
            Status::GetType(name) => self.get_type(&name),
            Status::EntryInfo(name) => self.entry_info(&name),
            Status::ReadVariable(name) => self.read_variable(name.as_deref()),
            Status::SetVariable(name, value) => self.set_variable(name.as_deref(), value),
            Status::GetField(field) => self.get_field(&field),
            Status::SetField(field, value) => self.set_field(&field, value),
            Status::SetOffset(offset) => self.set_offset(offset),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut feedback: Feedback = Feedback::Ok;
        loop {
            let ui_res = self.ui.process(&feedback);
            feedback = match ui_res {
                Err(e) => {
                    error!("{e}");
                    return Err(e);
                }
                Ok(Status::Quit) => break,
                Ok(s) => self.execute(s),
            }
            .into();
        }

        Ok(())
    }
}
