//! Memory cell registry.
//!
//! Cells are named integer slots that remember every value ever assigned
//! to them. A [`Memory`] is owned by one System and shared by all of the
//! threads that execute its tasks during a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::error::{Error, Result};

/// Recorded state of one cell at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Last assigned value, if any.
    pub value: Option<i64>,
    /// Every value assigned during the run, in order.
    pub history: Vec<i64>,
}

/// State of every cell of a System at the end of a run, keyed by cell name.
pub type Snapshot = BTreeMap<String, CellRecord>;

#[derive(Debug)]
struct CellState {
    value: Option<i64>,
    history: Vec<i64>,
}

/// Handle to a named memory cell.
///
/// Handles obtained for the same name from the same [`Memory`] share state.
#[derive(Debug, Clone)]
pub struct Cell {
    name: Arc<str>,
    state: Arc<Mutex<CellState>>,
}

impl Cell {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(CellState {
                value: None,
                history: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a value and append it to the history in one step.
    pub fn set(&self, value: i64) {
        let mut state = self.lock();
        state.value = Some(value);
        state.history.push(value);
    }

    /// Current value.
    ///
    /// # Errors
    /// `UninitializedVariableRead` if nothing was assigned since the last reset.
    pub fn read(&self) -> Result<i64> {
        self.lock()
            .value
            .ok_or_else(|| Error::UninitializedVariableRead(self.name.to_string()))
    }

    pub fn value(&self) -> Option<i64> {
        self.lock().value
    }

    pub fn history(&self) -> Vec<i64> {
        self.lock().history.clone()
    }

    /// Unset the value and empty the history.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.value = None;
        state.history.clear();
    }

    pub fn record(&self) -> CellRecord {
        let state = self.lock();
        CellRecord {
            value: state.value,
            history: state.history.clone(),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Cell {}

/// Name-keyed registry of memory cells.
#[derive(Debug, Default)]
pub struct Memory {
    cells: RwLock<BTreeMap<String, Cell>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cell by name, creating an uninitialized one on first use.
    pub fn get_or_create(&self, name: &str) -> Cell {
        if let Some(cell) = self.get(name) {
            return cell;
        }
        self.cells
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Cell::new(name))
            .clone()
    }

    pub fn set(&self, name: &str, value: i64) {
        self.get_or_create(name).set(value);
    }

    fn get(&self, name: &str) -> Option<Cell> {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Current value of `name`. Unknown names are not registered.
    pub fn read(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(cell) => cell.read(),
            None => Err(Error::UninitializedVariableRead(name.to_string())),
        }
    }

    pub fn reset(&self, name: &str) {
        if let Some(cell) = self.get(name) {
            cell.reset();
        }
    }

    /// Reset every known cell.
    pub fn reset_all(&self) {
        for cell in self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            cell.reset();
        }
    }

    /// Names of every cell created so far, sorted.
    pub fn names(&self) -> Vec<String> {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Copy the state of every cell.
    pub fn snapshot(&self) -> Snapshot {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, cell)| (name.clone(), cell.record()))
            .collect()
    }
}
