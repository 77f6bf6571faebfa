//! Interned method identifiers.
//!
//! A [`Selector`] names a method independently of any implementation. Two
//! selectors are equal exactly when they were interned from the same name,
//! so comparison and hashing are integer operations.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::{collections::HashMap, fmt};

lazy_static! {
    static ref INTERNER: RwLock<Interner> = RwLock::new(Interner::default());
}

#[derive(Default)]
struct Interner {
    names: Vec<&'static str>,
    ids: HashMap<&'static str, u32>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        // Interned names live for the rest of the process.
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let id = self.names.len() as u32;
        self.names.push(leaked);
        self.ids.insert(leaked, id);
        id
    }
}

/// Identifies a method within a type's dispatch table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector(u32);

impl Selector {
    /// Intern `name` and return its selector.
    pub fn new(name: &str) -> Self {
        if let Some(&id) = INTERNER.read().ids.get(name) {
            return Selector(id);
        }
        Selector(INTERNER.write().intern(name))
    }

    /// The selector dispatched once when an object is destroyed.
    pub fn deinit() -> Self {
        Selector::new("deinit")
    }

    /// The selector consulted when a receiver does not implement a message.
    pub fn forward_invocation() -> Self {
        Selector::new("forwardInvocation")
    }

    /// The interned name.
    pub fn name(self) -> &'static str {
        INTERNER.read().names[self.0 as usize]
    }

    /// Selector of the setter generated for a property named `key`.
    ///
    /// `name` becomes `setName`.
    pub fn setter_for(key: &str) -> Self {
        let mut chars = key.chars();
        let name = match chars.next() {
            Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
            None => "set".to_owned(),
        };
        Selector::new(&name)
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::new(name)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.name())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
