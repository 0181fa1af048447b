use std::collections::BTreeMap;
use std::fmt;

use crate::option::{OptionId, OptionValue};

/// Wire shape of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    Empty,
    Opaque,
    Uint,
    Text,
}

impl ValueFormat {
    /// Whether a caller-supplied value variant can be sent in this shape.
    pub fn accepts(self, value: &OptionValue) -> bool {
        matches!(
            (self, value),
            (Self::Empty, OptionValue::Empty)
                | (Self::Opaque, OptionValue::Opaque(_) | OptionValue::Empty)
                | (Self::Uint, OptionValue::Uint(_) | OptionValue::Media(_))
                | (Self::Text, OptionValue::Text(_))
        )
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Opaque => "opaque",
            Self::Uint => "uint",
            Self::Text => "string",
        })
    }
}

/// Registry entry describing one option id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDef {
    pub name: &'static str,
    pub format: ValueFormat,
    pub min_len: usize,
    pub max_len: usize,
}

impl OptionDef {
    pub const fn new(name: &'static str, format: ValueFormat, min_len: usize, max_len: usize) -> Self {
        Self {
            name,
            format,
            min_len,
            max_len,
        }
    }

    /// True when `len` lies within `[min_len, max_len]`.
    pub fn accepts_len(&self, len: usize) -> bool {
        (self.min_len..=self.max_len).contains(&len)
    }
}

/// Id-keyed, immutable-once-built table of option definitions.
///
/// Decoding drops options the registry does not know or whose length falls
/// outside the registered bounds; encoding rejects them.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    defs: BTreeMap<OptionId, OptionDef>,
}

impl OptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The option table of RFC 7252 section 5.10 plus Observe (RFC 7641).
    pub fn rfc7252() -> Self {
        use ValueFormat::{Empty, Opaque, Text, Uint};

        Self::new()
            .with(OptionId::IF_MATCH, OptionDef::new("If-Match", Opaque, 0, 8))
            .with(OptionId::URI_HOST, OptionDef::new("Uri-Host", Text, 1, 255))
            .with(OptionId::ETAG, OptionDef::new("ETag", Opaque, 1, 8))
            .with(OptionId::IF_NONE_MATCH, OptionDef::new("If-None-Match", Empty, 0, 0))
            .with(OptionId::OBSERVE, OptionDef::new("Observe", Uint, 0, 3))
            .with(OptionId::URI_PORT, OptionDef::new("Uri-Port", Uint, 0, 2))
            .with(OptionId::LOCATION_PATH, OptionDef::new("Location-Path", Text, 0, 255))
            .with(OptionId::URI_PATH, OptionDef::new("Uri-Path", Text, 0, 255))
            .with(OptionId::CONTENT_FORMAT, OptionDef::new("Content-Format", Uint, 0, 2))
            .with(OptionId::MAX_AGE, OptionDef::new("Max-Age", Uint, 0, 4))
            .with(OptionId::URI_QUERY, OptionDef::new("Uri-Query", Text, 0, 255))
            .with(OptionId::ACCEPT, OptionDef::new("Accept", Uint, 0, 2))
            .with(OptionId::LOCATION_QUERY, OptionDef::new("Location-Query", Text, 0, 255))
            .with(OptionId::PROXY_URI, OptionDef::new("Proxy-Uri", Text, 1, 1034))
            .with(OptionId::PROXY_SCHEME, OptionDef::new("Proxy-Scheme", Text, 1, 255))
            .with(OptionId::SIZE1, OptionDef::new("Size1", Uint, 0, 4))
    }

    /// Add or replace a definition, builder style.
    pub fn with(mut self, id: OptionId, def: OptionDef) -> Self {
        self.register(id, def);
        self
    }

    /// Add or replace a definition, returning the previous one.
    pub fn register(&mut self, id: OptionId, def: OptionDef) -> Option<OptionDef> {
        self.defs.insert(id, def)
    }

    /// Look up the definition for an id.
    pub fn get(&self, id: OptionId) -> Option<&OptionDef> {
        self.defs.get(&id)
    }

    /// Check if an id has a definition.
    pub fn contains(&self, id: OptionId) -> bool {
        self.defs.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<OptionId> {
        self.defs.keys().copied().collect()
    }
}
