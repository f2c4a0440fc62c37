//! HTTP method registry and permission masks.
//!
//! Every known method owns one bit of a [`MethodMask`]. The registry is
//! built once at startup and installed process-wide before any rules are
//! parsed; tables keep their own handle to it for lookups and printing.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::sync::{Arc, OnceLock};

use super::error::{IpAllowError, IpAllowResult};

/// Well-known HTTP methods in registry order.
pub const WELL_KNOWN_METHODS: [&str; 11] = [
    "CONNECT",
    "DELETE",
    "GET",
    "HEAD",
    "ICP_QUERY",
    "OPTIONS",
    "POST",
    "PURGE",
    "PUT",
    "TRACE",
    "PUSH",
];

/// Maximum number of methods a mask can represent.
pub const MAX_METHODS: usize = u32::BITS as usize;

static GLOBAL_REGISTRY: OnceLock<Arc<MethodRegistry>> = OnceLock::new();

/// Position of a method in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodIndex(u8);

impl MethodIndex {
    /// Get the raw index.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Single-bit mask for this method.
    #[must_use]
    pub const fn mask(self) -> MethodMask {
        MethodMask(1 << self.0)
    }
}

/// Bitmask of permitted methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodMask(u32);

impl MethodMask {
    /// No method permitted.
    pub const NONE: Self = Self(0);

    /// Every method permitted, including ones registered later.
    pub const ALL: Self = Self(!0);

    /// Create a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if the method at `index` is permitted.
    #[must_use]
    pub const fn contains(self, index: MethodIndex) -> bool {
        self.0 & index.mask().0 != 0
    }
}

impl BitAnd for MethodMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for MethodMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MethodMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Not for MethodMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Binary for MethodMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

/// Maps method names to mask bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRegistry {
    names: Vec<String>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl MethodRegistry {
    /// Registry of the well-known HTTP methods.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            names: WELL_KNOWN_METHODS.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    /// Registry of exactly the given methods, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a name repeats or more than [`MAX_METHODS`] are given.
    pub fn with_methods<I, S>(names: I) -> IpAllowResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: Vec::new() }.extend(names)
    }

    /// Append methods to the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is already registered or the registry
    /// would exceed [`MAX_METHODS`].
    pub fn extend<I, S>(mut self, names: I) -> IpAllowResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into().to_ascii_uppercase();
            if self.index_of(&name).is_some() {
                return Err(IpAllowError::DuplicateMethod(name));
            }
            if self.names.len() >= MAX_METHODS {
                return Err(IpAllowError::TooManyMethods { max: MAX_METHODS });
            }
            self.names.push(name);
        }
        Ok(self)
    }

    /// Look up a method by name (case-insensitive).
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<MethodIndex> {
        self.names
            .iter()
            .position(|known| known.eq_ignore_ascii_case(name))
            .and_then(|i| u8::try_from(i).ok())
            .map(MethodIndex)
    }

    /// Name of the method at `index`.
    #[must_use]
    pub fn name_of(&self, index: MethodIndex) -> Option<&str> {
        self.names.get(index.get()).map(String::as_str)
    }

    /// Single-bit mask for the method at `index`.
    #[must_use]
    pub fn mask_of(&self, index: MethodIndex) -> MethodMask {
        index.mask()
    }

    /// Mask with every method permitted.
    #[must_use]
    pub fn all_mask(&self) -> MethodMask {
        MethodMask::ALL
    }

    /// Mask of only the registered methods.
    #[must_use]
    pub fn known_mask(&self) -> MethodMask {
        self.iter()
            .fold(MethodMask::NONE, |mask, (index, _)| mask | index.mask())
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate methods in index order.
    pub fn iter(&self) -> impl Iterator<Item = (MethodIndex, &str)> {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| u8::try_from(i).ok().map(|i| (MethodIndex(i), name.as_str())))
    }

    /// Render a mask as `ALL`, `NONE` or `GET|POST|...`.
    #[must_use]
    pub fn format_mask(&self, mask: MethodMask) -> String {
        let mask = self.all_mask() & mask;
        if mask == self.all_mask() {
            return "ALL".to_string();
        }
        if mask.is_empty() {
            return "NONE".to_string();
        }
        self.iter()
            .filter(|(index, _)| mask.contains(*index))
            .map(|(_, name)| name)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Install this registry as the process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns [`IpAllowError::AlreadyInitialized`] if a registry is already installed.
    pub fn install(self) -> IpAllowResult<Arc<Self>> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| IpAllowError::AlreadyInitialized)?;
        Ok(registry)
    }

    /// Install this registry unless one is already installed, returning the
    /// installed registry either way.
    pub fn get_or_install(self) -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(self)))
    }

    /// The process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns [`IpAllowError::NotInitialized`] before [`MethodRegistry::install`].
    pub fn global() -> IpAllowResult<Arc<Self>> {
        GLOBAL_REGISTRY
            .get()
            .cloned()
            .ok_or(IpAllowError::NotInitialized)
    }
}

/// Mask with every method permitted, from the process-wide registry.
///
/// # Errors
///
/// Returns [`IpAllowError::NotInitialized`] if no registry is installed yet.
pub fn all_mask() -> IpAllowResult<MethodMask> {
    MethodRegistry::global().map(|registry| registry.all_mask())
}
