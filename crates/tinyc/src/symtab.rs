//! Dense name-to-slot allocation for user variables.
//!
//! A name's slot is simply its declaration index, so the `k`-th distinct
//! variable declared gets slot `k`. Compiler temporaries (loop counters and
//! the like) are allocated separately by the codegen `DataArea`, counting
//! down from the top of the data region, so the two schemes never collide.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{line}: '{name}' is already declared")]
    DuplicateDeclaration { name: String, line: u32 },

    #[error("{line}: '{name}' is not declared")]
    UndefinedVariable { name: String, line: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, line: u32) -> Result<u32> {
        if self.names.iter().any(|n| n == name) {
            return Err(Error::DuplicateDeclaration {
                name: name.to_string(),
                line,
            });
        }
        self.names.push(name.to_string());
        Ok((self.names.len() - 1) as u32)
    }

    pub fn slot_of(&self, name: &str, line: u32) -> Result<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
            .ok_or_else(|| Error::UndefinedVariable {
                name: name.to_string(),
                line,
            })
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.names.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_in_order() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare("x", 1).unwrap(), 0);
        assert_eq!(table.declare("y", 1).unwrap(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn rejects_duplicate_declaration() {
        let mut table = SymbolTable::new();
        table.declare("x", 1).unwrap();
        assert!(matches!(
            table.declare("x", 2),
            Err(Error::DuplicateDeclaration { .. })
        ));
    }

    #[test]
    fn rejects_undefined_reference() {
        let table = SymbolTable::new();
        assert!(matches!(
            table.slot_of("x", 1),
            Err(Error::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn resolves_declared_slot() {
        let mut table = SymbolTable::new();
        table.declare("x", 1).unwrap();
        table.declare("y", 1).unwrap();
        assert_eq!(table.slot_of("y", 2).unwrap(), 1);
    }
}
