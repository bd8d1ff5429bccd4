//! Program and MIDI-program tables.

use serde::{Deserialize, Serialize};

/// Named programs with the current selection (-1 = unset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramList {
    pub names: Vec<String>,
    pub current: i32,
}

impl Default for ProgramList {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            current: -1,
        }
    }
}

impl ProgramList {
    pub fn new(names: Vec<String>) -> Self {
        Self { names, current: -1 }
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// True for -1 and every in-range index.
    pub fn is_valid_index(&self, index: i32) -> bool {
        index == -1 || (index >= 0 && (index as usize) < self.names.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiProgramData {
    pub bank: u32,
    pub program: u32,
    pub name: String,
}

impl MidiProgramData {
    pub fn new(bank: u32, program: u32, name: &str) -> Self {
        Self {
            bank,
            program,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiProgramList {
    pub data: Vec<MidiProgramData>,
    pub current: i32,
}

impl Default for MidiProgramList {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            current: -1,
        }
    }
}

impl MidiProgramList {
    pub fn new(data: Vec<MidiProgramData>) -> Self {
        Self { data, current: -1 }
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: i32) -> Option<&MidiProgramData> {
        usize::try_from(index).ok().and_then(|i| self.data.get(i))
    }

    pub fn is_valid_index(&self, index: i32) -> bool {
        index == -1 || (index >= 0 && (index as usize) < self.data.len())
    }

    /// Index of the entry with this bank/program pair.
    pub fn find(&self, bank: u32, program: u32) -> Option<i32> {
        self.data
            .iter()
            .position(|p| p.bank == bank && p.program == program)
            .map(|i| i as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_list_indices() {
        let list = ProgramList::new(vec!["A".into(), "B".into()]);
        assert_eq!(list.current, -1);
        assert!(list.is_valid_index(-1));
        assert!(list.is_valid_index(1));
        assert!(!list.is_valid_index(2));
        assert!(!list.is_valid_index(-2));
        assert_eq!(list.name(1), Some("B"));
        assert_eq!(list.name(-1), None);
    }

    #[test]
    fn test_midi_program_find() {
        let list = MidiProgramList::new(vec![
            MidiProgramData::new(0, 0, "Init"),
            MidiProgramData::new(1, 3, "Pad"),
        ]);
        assert_eq!(list.find(1, 3), Some(1));
        assert_eq!(list.find(1, 4), None);
        assert_eq!(list.get(0).map(|p| p.name.as_str()), Some("Init"));
    }
}
