use std::collections::{BTreeMap, HashMap};

/// A caller-owned set of named variables of one numeric kind.
///
/// The engine never keeps a slot past a single write, and repeated lookups of
/// the same name must hit the same storage.
pub trait VariableStore<T> {
    /// A writable reference to the variable's current value.
    fn try_get_slot(&mut self, name: &str) -> Option<&mut T>;

    /// Reads the variable without borrowing it mutably.
    fn lookup(&self, name: &str) -> Option<T>;
}

impl<T: Copy> VariableStore<T> for HashMap<String, T> {
    fn try_get_slot(&mut self, name: &str) -> Option<&mut T> {
        self.get_mut(name)
    }

    fn lookup(&self, name: &str) -> Option<T> {
        self.get(name).copied()
    }
}

impl<T: Copy> VariableStore<T> for BTreeMap<String, T> {
    fn try_get_slot(&mut self, name: &str) -> Option<&mut T> {
        self.get_mut(name)
    }

    fn lookup(&self, name: &str) -> Option<T> {
        self.get(name).copied()
    }
}

/// The two stores one parse + evaluate call works against.
///
/// Passed explicitly to the lexer and the evaluator, so independent
/// expressions in the same process never see each other's variables.
pub struct Stores<'s> {
    pub floats: &'s mut dyn VariableStore<f64>,
    pub ints: &'s mut dyn VariableStore<i64>,
}

impl<'s> Stores<'s> {
    pub fn new(
        floats: &'s mut dyn VariableStore<f64>,
        ints: &'s mut dyn VariableStore<i64>,
    ) -> Self {
        Stores { floats, ints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_write_through() {
        let mut ints: HashMap<String, i64> = HashMap::from([("x".to_string(), 1)]);
        *ints.try_get_slot("x").expect("x exists") = 7;
        assert_eq!(ints.lookup("x"), Some(7));
        assert!(ints.try_get_slot("y").is_none());
    }

    #[test]
    fn btree_store() {
        let mut floats: BTreeMap<String, f64> = BTreeMap::new();
        floats.insert("rate".into(), 2.5);
        assert_eq!(floats.lookup("rate"), Some(2.5));
        assert_eq!(floats.lookup("tau"), None);
    }
}
