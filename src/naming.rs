//! Symbol table mapping LP variable names to column indices.
//!
//! Names are built from the components a variable stands for, so that two
//! call sites constructing the same decision-rule entry land on the same
//! column. A table lives for the construction and solve of one program.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Result, SearchError};

#[derive(Clone, Debug, Default)]
pub struct VarNaming {
    numbers: HashMap<String, usize>,
    names: Vec<String>,
}

impl VarNaming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, returning its column. Registering a name twice
    /// returns the column it already has.
    pub fn set_number(&mut self, name: String) -> usize {
        if let Some(&index) = self.numbers.get(&name) {
            return index;
        }
        let index = self.names.len();
        self.numbers.insert(name.clone(), index);
        self.names.push(name);
        index
    }

    pub fn number(&self, name: &str) -> Result<usize> {
        self.numbers
            .get(name)
            .copied()
            .ok_or_else(|| SearchError::UnknownVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.numbers.contains_key(name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Scalar weight variable `v{k}`.
    pub fn weight_name(k: usize) -> String {
        format!("v{k}")
    }

    /// Joint decision-rule entry `a(u | o)`.
    pub fn joint_decision_name<U: Debug, O: Debug>(joint: &U, history: &O) -> String {
        format!("a_{joint:?}_{history:?}")
    }

    /// Local decision-rule entry `a_i(u_i | o_i)`.
    pub fn local_decision_name<U: Debug, O: Debug>(local: &U, history: &O, agent: usize) -> String {
        format!("a{agent}_{local:?}_{history:?}")
    }

    /// Indicator selecting which successor point of witness `k` is binding.
    pub fn responsibility_name<X: Debug, O: Debug>(k: usize, hidden: &X, history: &O) -> String {
        format!("omega_{k}_{hidden:?}_{history:?}")
    }

    /// Prefix shared by every indicator of witness `k`.
    pub fn responsibility_prefix(k: usize) -> String {
        format!("omega_{k}_")
    }
}

#[cfg(test)]
mod tests {
    use super::VarNaming;
    use crate::error::SearchError;

    #[test]
    fn numbers_are_dense_and_stable() {
        let mut naming = VarNaming::new();
        let a = naming.set_number(VarNaming::weight_name(0));
        let b = naming.set_number(VarNaming::joint_decision_name(&1usize, &vec![0usize]));
        let again = naming.set_number(VarNaming::weight_name(0));
        assert_eq!((a, b, again), (0, 1, 0));
        assert_eq!(naming.len(), 2);
        assert_eq!(naming.name(1), Some("a_1_[0]"));
        assert_eq!(naming.number("v0").unwrap(), 0);
    }

    #[test]
    fn unknown_names_are_errors() {
        let naming = VarNaming::new();
        assert!(matches!(
            naming.number("missing"),
            Err(SearchError::UnknownVariable(name)) if name == "missing"
        ));
    }

    #[test]
    fn responsibility_prefixes_do_not_collide() {
        let one = VarNaming::responsibility_name(1, &0usize, &vec![2usize]);
        let ten = VarNaming::responsibility_name(10, &0usize, &vec![2usize]);
        assert!(one.starts_with(&VarNaming::responsibility_prefix(1)));
        assert!(!ten.starts_with(&VarNaming::responsibility_prefix(1)));
    }
}
