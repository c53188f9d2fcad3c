//! Knowledge about which methods can be called without observable effect.
//!
//! Dead code elimination may delete an invoke whose result is unused only when the
//! callee is known to be side-effect free. That knowledge comes from a
//! [`PurityOracle`], usually backed by a configured allow-list.

use std::collections::HashSet;

use crate::ir::{MethodRef, RefPool};

/// Answers whether calling a method has effects beyond its return value.
pub trait PurityOracle: Send + Sync {
    /// Returns `true` if invoking `method` changes no state and its result is the only
    /// thing a caller can observe.
    fn is_side_effect_free(&self, method: &MethodRef) -> bool;
}

/// An oracle that trusts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPureMethods;

impl PurityOracle for NoPureMethods {
    fn is_side_effect_free(&self, _method: &MethodRef) -> bool {
        false
    }
}

/// An allow-list of methods assumed to have no side effects.
///
/// # Examples
///
/// ```rust
/// use dexflow::{
///     compiler::{AssumeNoSideEffects, PurityOracle},
///     ir::RefPool,
/// };
///
/// let pool = RefPool::new();
/// let oracle = AssumeNoSideEffects::java_lang_defaults(&pool);
/// let abs = pool.method("Ljava/lang/Math;", "abs", "(I)I")?;
/// assert!(oracle.is_side_effect_free(&abs));
/// # Ok::<(), dexflow::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AssumeNoSideEffects {
    methods: HashSet<MethodRef>,
}

/// Well-known library methods without side effects, as `(owner, name, prototype)`.
const JAVA_LANG_PURE: &[(&str, &str, &str)] = &[
    ("Ljava/lang/Math;", "abs", "(I)I"),
    ("Ljava/lang/Math;", "abs", "(J)J"),
    ("Ljava/lang/Math;", "max", "(II)I"),
    ("Ljava/lang/Math;", "min", "(II)I"),
    ("Ljava/lang/Integer;", "valueOf", "(I)Ljava/lang/Integer;"),
    ("Ljava/lang/Integer;", "intValue", "()I"),
    ("Ljava/lang/Long;", "valueOf", "(J)Ljava/lang/Long;"),
    ("Ljava/lang/Boolean;", "valueOf", "(Z)Ljava/lang/Boolean;"),
    ("Ljava/lang/Object;", "getClass", "()Ljava/lang/Class;"),
    ("Ljava/lang/String;", "length", "()I"),
    ("Ljava/lang/String;", "valueOf", "(I)Ljava/lang/String;"),
    ("Ljava/lang/String;", "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;"),
    ("Ljava/lang/Class;", "getName", "()Ljava/lang/String;"),
    ("Ljava/lang/Class;", "getSimpleName", "()Ljava/lang/String;"),
];

impl AssumeNoSideEffects {
    /// An empty allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The allow-list preloaded with common `java.lang` methods.
    ///
    /// # Panics
    ///
    /// Panics if one of the built-in prototypes fails to parse.
    #[must_use]
    pub fn java_lang_defaults(pool: &RefPool) -> Self {
        let methods = JAVA_LANG_PURE
            .iter()
            .map(|(owner, name, proto)| {
                pool.method(owner, name, proto)
                    .unwrap_or_else(|e| panic!("built-in pure method {owner}.{name}: {e}"))
            })
            .collect();
        AssumeNoSideEffects { methods }
    }

    /// Adds `method` to the list.
    pub fn insert(&mut self, method: MethodRef) {
        self.methods.insert(method);
    }

    /// Number of listed methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Extend<MethodRef> for AssumeNoSideEffects {
    fn extend<T: IntoIterator<Item = MethodRef>>(&mut self, iter: T) {
        self.methods.extend(iter);
    }
}

impl PurityOracle for AssumeNoSideEffects {
    fn is_side_effect_free(&self, method: &MethodRef) -> bool {
        self.methods.contains(method)
    }
}
