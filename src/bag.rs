use std::fmt;

use indexmap::IndexMap;

/// A removal token issued by a [`Bag`].
///
/// Tokens are issued in strictly increasing order and never repeat for the
/// lifetime of the bag that issued them. The slot counter wraps at
/// `u16::MAX`, at which point the generation is bumped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token {
    generation: u64,
    slot: u16,
}

impl Token {
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn slot(&self) -> u16 {
        self.slot
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "{}", self.slot)
        } else {
            write!(f, "{},{}", self.generation, self.slot)
        }
    }
}

/// Token-addressed unordered storage.
///
/// Insert and remove are O(1). Iteration visits every stored value once, in
/// an order that stays stable until the next mutation. Removing with a stale
/// or unknown token does nothing.
///
/// The bag itself is not synchronised; owners that share it across threads
/// wrap it in a lock (see [`Signal`](crate::Signal)).
pub struct Bag<T> {
    items: IndexMap<Token, T>,
    generation: u64,
    slot: u16,
}

impl<T> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Bag");
        s.field("len", &self.items.len());
        s.field("generation", &self.generation);
        s.field("slot", &self.slot);
        s.finish()
    }
}

impl<T> Bag<T> {
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
            generation: 0,
            slot: 0,
        }
    }

    /// Stores `value` and returns the token that removes it.
    pub fn insert_item(&mut self, value: T) -> Token {
        let token = self.next_token();
        self.items.insert(token, value);
        token
    }

    /// Removes the value stored under `token`, if any.
    pub fn remove_item(&mut self, token: &Token) -> Option<T> {
        self.items.swap_remove(token)
    }

    pub fn get(&self, token: &Token) -> Option<&T> {
        self.items.get(token)
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.items.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Token, &T)> {
        self.items.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Removes every value, handing them out in iteration order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..).map(|(_, value)| value)
    }

    fn next_token(&mut self) -> Token {
        if self.slot == u16::MAX {
            self.generation += 1;
            self.slot = 0;
        }
        self.slot += 1;
        Token {
            generation: self.generation,
            slot: self.slot,
        }
    }
}
