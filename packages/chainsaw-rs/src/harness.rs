//! The harness: the user-declared map from operation name to implementation.
//!
//! A harness is a tree. Leaves are operations; inner nodes are groups that
//! surface as sub-chains (`chain.at("h").call("x", ())`). The tree is built
//! once by the builder callback and never changes afterwards, so lookups are
//! plain map walks over path segments.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::call::Args;
use crate::chain::Chain;
use crate::engine::Saw;
use crate::error::ChainsawError;

/// Implementation of one operation.
///
/// Receives the engine, the chain of the frame it was dispatched from, and the
/// call's arguments. It must eventually cause `next()` (directly, via a trap,
/// via a nested frame, or via a continuation) or the frame stalls.
pub type Handler = Rc<dyn Fn(&Saw, &Chain, &Args) -> Result<()>>;

/// A harness node.
#[derive(Clone)]
pub enum Entry {
    Operation(Handler),
    Group(Harness),
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Operation(_) => f.write_str("Operation"),
            Entry::Group(h) => f.debug_tuple("Group").field(h).finish(),
        }
    }
}

/// Tree of operations, keyed by name.
#[derive(Clone, Default)]
pub struct Harness {
    entries: BTreeMap<String, Entry>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add an operation, builder style.
    pub fn op<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Saw, &Chain, &Args) -> Result<()> + 'static,
    {
        self.define(name, handler);
        self
    }

    /// Add a group of operations, builder style.
    pub fn group(mut self, name: impl Into<String>, group: Harness) -> Self {
        self.define_group(name, group);
        self
    }

    /// Add or replace an operation in place.
    pub fn define<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Saw, &Chain, &Args) -> Result<()> + 'static,
    {
        self.entries
            .insert(name.into(), Entry::Operation(Rc::new(handler)));
        self
    }

    /// Add or replace a group in place.
    pub fn define_group(&mut self, name: impl Into<String>, group: Harness) -> &mut Self {
        self.entries.insert(name.into(), Entry::Group(group));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Names at this level, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Walk a path of segments from this node.
    pub(crate) fn lookup<'a, I>(&self, path: I) -> Option<&Entry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut segments = path.into_iter();
        let mut entry = self.entries.get(segments.next()?)?;
        for segment in segments {
            match entry {
                Entry::Group(group) => entry = group.entries.get(segment)?,
                Entry::Operation(_) => return None,
            }
        }
        Some(entry)
    }

    /// The group at `prefix` (the whole harness for an empty prefix).
    pub(crate) fn group_at(&self, prefix: &[String]) -> Result<&Harness, ChainsawError> {
        if prefix.is_empty() {
            return Ok(self);
        }
        match self.lookup(prefix.iter().map(String::as_str)) {
            Some(Entry::Group(group)) => Ok(group),
            _ => Err(ChainsawError::NotAGroup {
                name: prefix.join("."),
            }),
        }
    }

    /// Handler at `path`, e.g. `["h", "x"]` for `chain.at("h").call("x", ..)`.
    ///
    /// Segments are matched whole, so a name that itself contains `.` is an
    /// ordinary key.
    pub(crate) fn handler(&self, path: &[String]) -> Result<Handler, ChainsawError> {
        match self.lookup(path.iter().map(String::as_str)) {
            Some(Entry::Operation(handler)) => Ok(handler.clone()),
            _ => Err(ChainsawError::UnknownOperation {
                name: path.join("."),
            }),
        }
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// What a builder callback may return.
///
/// `()` keeps whatever the builder defined on the receiver; a non-empty
/// `Harness` replaces it.
pub trait IntoHarness {
    fn into_harness(self) -> Option<Harness>;
}

impl IntoHarness for () {
    fn into_harness(self) -> Option<Harness> {
        None
    }
}

impl IntoHarness for Harness {
    fn into_harness(self) -> Option<Harness> {
        Some(self)
    }
}

impl IntoHarness for Option<Harness> {
    fn into_harness(self) -> Option<Harness> {
        self
    }
}

/// Pick the harness a builder produced: a non-empty returned one wins.
pub(crate) fn settle(receiver: Harness, returned: Option<Harness>) -> Harness {
    match returned {
        Some(harness) if !harness.is_empty() => harness,
        _ => receiver,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Saw, _: &Chain, _: &Args) -> Result<()> {
        Ok(())
    }

    fn sample() -> Harness {
        Harness::new().op("x", noop).group(
            "h",
            Harness::new()
                .op("y", noop)
                .group("deep", Harness::new().op("z", noop)),
        )
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_handler_resolves_group_paths() {
        let harness = sample();
        assert!(harness.handler(&path(&["x"])).is_ok());
        assert!(harness.handler(&path(&["h", "y"])).is_ok());
        assert!(harness.handler(&path(&["h", "deep", "z"])).is_ok());
    }

    #[test]
    fn test_handler_rejects_groups_and_unknown_names() {
        let harness = sample();
        assert_eq!(
            harness.handler(&path(&["h"])).err(),
            Some(ChainsawError::UnknownOperation { name: "h".into() })
        );
        assert!(harness.handler(&path(&["x", "y"])).is_err());
        assert!(harness.handler(&path(&["nope"])).is_err());
    }

    #[test]
    fn test_dotted_name_is_a_single_key() {
        let harness = Harness::new()
            .op("a.b", noop)
            .group("a", Harness::new().op("c", noop));

        assert!(harness.handler(&path(&["a.b"])).is_ok());
        assert!(harness.handler(&path(&["a", "b"])).is_err());
        assert!(harness.handler(&path(&["a", "c"])).is_ok());
        assert!(harness.handler(&path(&["a.c"])).is_err());
    }

    #[test]
    fn test_group_at_walks_prefix() {
        let harness = sample();
        let deep = harness
            .group_at(&["h".to_string(), "deep".to_string()])
            .unwrap();
        assert_eq!(deep.names().collect::<Vec<_>>(), vec!["z"]);

        assert_eq!(
            harness.group_at(&["x".to_string()]).unwrap_err(),
            ChainsawError::NotAGroup { name: "x".into() }
        );
    }

    #[test]
    fn test_define_replaces_existing_entry() {
        let mut harness = Harness::new();
        harness.define("x", noop);
        harness.define_group("x", Harness::new());
        assert_eq!(harness.len(), 1);
        assert!(matches!(harness.get("x"), Some(Entry::Group(_))));
    }

    #[test]
    fn test_settle_prefers_non_empty_returned_harness() {
        let receiver = Harness::new().op("x", noop);
        let returned = Harness::new().op("y", noop);

        let picked = settle(receiver.clone(), Some(returned));
        assert_eq!(picked.names().collect::<Vec<_>>(), vec!["y"]);

        let picked = settle(receiver.clone(), Some(Harness::new()));
        assert_eq!(picked.names().collect::<Vec<_>>(), vec!["x"]);

        let picked = settle(receiver, None);
        assert_eq!(picked.names().collect::<Vec<_>>(), vec!["x"]);
    }
}
