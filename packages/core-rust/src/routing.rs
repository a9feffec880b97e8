//! Routing key registry: the wire names of every remote operation.
//!
//! A routing key is both the queue name a responder declares and the address
//! a client sends to. Changing the string of an existing key breaks every
//! deployed peer; evolve the protocol by adding keys instead.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Built-in keys
// ---------------------------------------------------------------------------

pub const CREATE_CHARACTER: &str = "CREATE_CHARACTER";
pub const GET_ALL_CHARACTERS: &str = "GET_ALL_CHARACTERS";
pub const DELETE_CHARACTER: &str = "DELETE_CHARACTER";
pub const GET_ALL_LANGUAGE_KEYS: &str = "GET_ALL_LANGUAGE_KEYS";
pub const GET_ALL_LANGUAGE_KEYS_BY_GAME: &str = "GET_ALL_LANGUAGE_KEYS_BY_GAME";
pub const GET_ALL_LANGUAGE_KEYS_BY_GAME_AND_LANGUAGE: &str =
    "GET_ALL_LANGUAGE_KEYS_BY_GAME_AND_LANGUAGE";
pub const GET_INTERNAL_USER: &str = "GET_INTERNAL_USER";
pub const SAVE_NEW_USER: &str = "SAVE_NEW_USER";
pub const GET_GENEFUNK_CLASSES: &str = "GET_GENEFUNK_CLASSES";
pub const GET_GENEFUNK_SPECIES: &str = "GET_GENEFUNK_SPECIES";

/// Every key shipped with the protocol.
pub const BUILTIN_KEYS: &[&str] = &[
    CREATE_CHARACTER,
    GET_ALL_CHARACTERS,
    DELETE_CHARACTER,
    GET_ALL_LANGUAGE_KEYS,
    GET_ALL_LANGUAGE_KEYS_BY_GAME,
    GET_ALL_LANGUAGE_KEYS_BY_GAME_AND_LANGUAGE,
    GET_INTERNAL_USER,
    SAVE_NEW_USER,
    GET_GENEFUNK_CLASSES,
    GET_GENEFUNK_SPECIES,
];

// ---------------------------------------------------------------------------
// RoutingKeyRegistry
// ---------------------------------------------------------------------------

/// Set of routing keys a client is allowed to address.
///
/// Starts from [`BUILTIN_KEYS`]; services with private operations extend it
/// at wiring time. The registry has no runtime behavior beyond membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeyRegistry {
    keys: BTreeSet<String>,
}

impl RoutingKeyRegistry {
    /// Creates a registry with no keys.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    /// Creates a registry holding the built-in protocol keys.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for key in BUILTIN_KEYS {
            registry.register(*key);
        }
        registry
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.register(key);
        self
    }

    /// Adds a key. Returns `false` if it was already present.
    pub fn register(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for RoutingKeyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Compile-time binding of a routing key to its request and response types.
///
/// Declaring a route once and using it on both the client and responder side
/// turns a payload type mismatch into a compile error instead of a decode
/// failure at an arbitrary call site.
///
/// ```
/// use queuecall_core::routing::Route;
///
/// pub const GET_USER: Route<String, u64> = Route::new("GET_INTERNAL_USER");
/// assert_eq!(GET_USER.key(), "GET_INTERNAL_USER");
/// ```
pub struct Route<Req, Resp> {
    key: &'static str,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Route<Req, Resp> {
    #[must_use]
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _types: PhantomData,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl<Req, Resp> Clone for Route<Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for Route<Req, Resp> {}

impl<Req, Resp> fmt::Debug for Route<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Route").field(&self.key).finish()
    }
}

// ---------------------------------------------------------------------------
// GameType
// ---------------------------------------------------------------------------

/// Operation tag used by character responders to multiplex one queue across
/// game systems. Sent as the envelope `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum GameType {
    GENEFUNK,
}

impl GameType {
    pub const ALL: &'static [GameType] = &[GameType::GENEFUNK];

    /// Numeric id used by the public API.
    #[must_use]
    pub const fn value(self) -> i32 {
        match self {
            GameType::GENEFUNK => 0,
        }
    }

    /// Resolves a numeric id, falling back to `default` when it is unknown.
    #[must_use]
    pub fn from_value(value: Option<i32>, default: Option<GameType>) -> Option<GameType> {
        value
            .and_then(|v| Self::ALL.iter().copied().find(|g| g.value() == v))
            .or(default)
    }

    /// Envelope `action` for this tag.
    #[must_use]
    pub const fn as_action(self) -> &'static str {
        match self {
            GameType::GENEFUNK => "GENEFUNK",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_action())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
