//! Generational slot registry for live connections.
//!
//! Identifiers carry the generation of the slot they were issued for, so an
//! identifier held by a readiness event that outlived its connection never
//! reaches a newer connection reusing the same slot.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifier of a connection in the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl ConnectionId {
    /// Creates an identifier from its parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at issue time.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot vector with generation-checked access.
///
/// Vacant slots are reused before the vector grows.
#[derive(Debug)]
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    len: usize,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    /// Inserts the value built by `make` from its new identifier.
    pub fn insert_with(&mut self, make: impl FnOnce(ConnectionId) -> T) -> ConnectionId {
        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        let id = ConnectionId::new(index, slot.generation);
        slot.value = Some(make(id));
        self.len += 1;
        id
    }

    fn slot(&self, id: ConnectionId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Returns the value for `id` if it is still live.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    /// Returns the value for `id` mutably if it is still live.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Removes and returns the value for `id`, retiring the identifier.
    pub fn remove(&mut self, id: ConnectionId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Identifiers of all live values, in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| ConnectionId::new(index as u32, slot.generation))
            .collect()
    }

    /// Number of live values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated slots, live or vacant.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
