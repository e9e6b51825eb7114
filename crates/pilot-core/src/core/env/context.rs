//! An explicit stand-in for the process environment table.
//!
//! The policy engine mutates an [`EnvContext`] instead of the real table.
//! The context remembers the snapshot it started from and every change made
//! since, so callers can hand the result straight to a child process,
//! [`commit`](EnvContext::commit) it to the current process, or
//! [`rollback`](EnvContext::rollback).

use std::env;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::jobad::is_env_name;
use crate::core::tooling::errors::LaunchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EnvChange {
    Set { key: String, value: String },
    Unset { key: String },
}

#[derive(Debug, Clone, Default)]
pub struct EnvContext {
    snapshot: IndexMap<String, String>,
    vars: IndexMap<String, String>,
    log: Vec<EnvChange>,
}

impl EnvContext {
    /// Snapshots the current process environment. Entries that are not valid
    /// UTF-8 are left out.
    #[must_use]
    pub fn capture() -> Self {
        let vars = env::vars_os()
            .filter_map(|(k, v)| k.into_string().ok().zip(v.into_string().ok()));
        Self::from_pairs(vars)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: IndexMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            snapshot: vars.clone(),
            vars,
            log: Vec::new(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// True when the variable is set, even to an empty string.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Sets a variable.
    ///
    /// # Errors
    /// Returns [`LaunchError::ValidationFailed`] for names a process
    /// environment cannot carry.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), LaunchError> {
        if !is_env_name(key) || value.contains('\0') {
            return Err(LaunchError::ValidationFailed {
                message: format!("cannot export environment variable {key:?}"),
            });
        }
        self.vars.insert(key.to_string(), value.to_string());
        self.log.push(EnvChange::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    /// Unsets a variable, returning its previous value.
    pub fn unset(&mut self, key: &str) -> Option<String> {
        let previous = self.vars.shift_remove(key);
        if previous.is_some() {
            self.log.push(EnvChange::Unset {
                key: key.to_string(),
            });
        }
        previous
    }

    /// Names of the variables whose name starts with `prefix`, in table
    /// order.
    #[must_use]
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.vars
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Changes made since the snapshot, in order.
    #[must_use]
    pub fn changes(&self) -> &[EnvChange] {
        &self.log
    }

    /// The full current table, for handing to a child process.
    #[must_use]
    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Applies the change log to the real process environment and starts a
    /// fresh log from the current state.
    ///
    /// The process table is global state; callers must not commit from more
    /// than one thread.
    pub fn commit(&mut self) {
        for change in self.log.drain(..) {
            match change {
                EnvChange::Set { key, value } => env::set_var(key, value),
                EnvChange::Unset { key } => env::remove_var(key),
            }
        }
        self.snapshot = self.vars.clone();
    }

    /// Discards every change since the snapshot (or the last commit).
    pub fn rollback(&mut self) {
        self.vars = self.snapshot.clone();
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn set_unset_are_logged_and_rollback_restores() {
        let mut ctx = EnvContext::from_pairs([("A", "1"), ("B", "")]);
        ctx.set("C", "3").unwrap();
        assert_eq!(ctx.unset("A"), Some("1".into()));
        assert_eq!(ctx.unset("MISSING"), None);
        assert!(ctx.is_set("B"), "empty values still count as set");
        assert_eq!(ctx.changes().len(), 2);

        ctx.rollback();
        assert_eq!(ctx.var("A"), Some("1"));
        assert!(!ctx.is_set("C"));
        assert!(ctx.changes().is_empty());
    }

    #[test]
    fn rejects_unexportable_names() {
        let mut ctx = EnvContext::default();
        assert!(ctx.set("BAD=NAME", "x").is_err());
        assert!(ctx.set("", "x").is_err());
        assert!(ctx.set("OK_NAME", "x").is_ok());
    }

    #[test]
    fn prefix_scan_keeps_table_order() {
        let ctx = EnvContext::from_pairs([("_CONDOR_B", "1"), ("X", "2"), ("_CONDOR_A", "3")]);
        assert_eq!(
            ctx.names_with_prefix("_CONDOR_"),
            vec!["_CONDOR_B", "_CONDOR_A"]
        );
    }

    #[test]
    #[serial]
    fn commit_applies_to_process_environment() {
        let key = "PILOT_TEST_COMMIT_VAR";
        env::remove_var(key);
        let mut ctx = EnvContext::capture();
        ctx.set(key, "committed").unwrap();
        assert!(env::var(key).is_err(), "nothing leaks before commit");
        ctx.commit();
        assert_eq!(env::var(key).as_deref(), Ok("committed"));
        ctx.unset(key);
        ctx.commit();
        assert!(env::var(key).is_err());
    }
}
