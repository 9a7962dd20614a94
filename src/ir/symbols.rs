//! Scoped symbol table and stack-slot allocator.
//!
//! Each CFG owns one table. Scopes are identified by the level integers the
//! lowering pass mints as it enters nested blocks; the parent relation links
//! every non-root level to its nearest lexically enclosing level. Offsets are
//! allocated from a single per-CFG counter, so every slot in a function is
//! distinct and never reclaimed while the CFG lives.

use std::collections::HashMap;

/// Size in bytes of the single supported value type.
pub const WORD_SIZE: i32 = 4;

/// A lexical nesting level. Level 1 is the root scope of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Int,
}

/// Storage metadata for one declared name.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub ty: StorageType,
    pub initialized: bool,
    pub temporary: bool,
    /// Positive multiple of [`WORD_SIZE`]; the slot lives at `-offset(%rbp)`.
    pub offset: i32,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: HashMap<ScopeId, HashMap<String, Symbol>>,
    parents: HashMap<ScopeId, ScopeId>,
    slots: u32,
    temps: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mapping for `scope` if it does not exist yet.
    pub fn create_scope(&mut self, scope: ScopeId) {
        self.scopes.entry(scope).or_default();
    }

    /// Registers the nearest lexically enclosing scope of `scope`. Lookup
    /// ascends through this relation and stops at [`ScopeId::ROOT`].
    pub fn set_parent(&mut self, scope: ScopeId, parent: ScopeId) {
        self.parents.insert(scope, parent);
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.parents.get(&scope).copied()
    }

    /// Allocates the next stack slot and inserts the entry. The caller is
    /// responsible for the redeclaration check (`exists_in_scope`); inserting
    /// a duplicate name replaces the old entry but leaks its slot.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        initialized: bool,
        temporary: bool,
    ) -> i32 {
        self.slots += 1;
        let offset = self.slots as i32 * WORD_SIZE;
        self.scopes.entry(scope).or_default().insert(
            name.to_string(),
            Symbol {
                ty: StorageType::Int,
                initialized,
                temporary,
                offset,
            },
        );
        offset
    }

    /// Exact-scope membership test, no ascent.
    pub fn exists_in_scope(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup_exact(scope, name).is_some()
    }

    /// Ascends the parent chain starting at the parent of `scope` and returns
    /// the nearest level that declares `name`.
    pub fn resolve_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut level = scope;
        while level != ScopeId::ROOT {
            level = self.parent(level)?;
            if self.exists_in_scope(level, name) {
                return Some(level);
            }
        }
        None
    }

    /// Stack offset of `name` as visible from `scope`: the exact scope wins,
    /// otherwise the nearest ancestor.
    pub fn offset_of(&self, scope: ScopeId, name: &str) -> Option<i32> {
        if let Some(sym) = self.lookup_exact(scope, name) {
            return Some(sym.offset);
        }
        let found = self.resolve_scope(scope, name)?;
        self.lookup_exact(found, name).map(|sym| sym.offset)
    }

    pub fn is_initialized(&self, scope: ScopeId, name: &str) -> bool {
        if let Some(sym) = self.lookup_exact(scope, name) {
            return sym.initialized;
        }
        match self.resolve_scope(scope, name) {
            Some(found) => self
                .lookup_exact(found, name)
                .map(|sym| sym.initialized)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Flags `name` as initialized. An exact-scope entry is the only one
    /// touched when present; otherwise every matching entry on the parent
    /// chain is flagged, not just the nearest. Only the nearest binding can
    /// ever be read back, so the extra flips are unobservable through this
    /// table, but callers relying on shadowed entries staying untouched
    /// should know about them.
    pub fn mark_initialized(&mut self, scope: ScopeId, name: &str) {
        if let Some(sym) = self.lookup_exact_mut(scope, name) {
            sym.initialized = true;
            return;
        }
        let mut level = scope;
        while level != ScopeId::ROOT {
            let Some(parent) = self.parent(level) else {
                return;
            };
            level = parent;
            if let Some(sym) = self.lookup_exact_mut(level, name) {
                sym.initialized = true;
            }
        }
    }

    /// Mints a compiler temporary, declares it initialized in `scope`, and
    /// returns its name. The `!` prefix is outside the source identifier
    /// alphabet, so temporaries cannot collide with user declarations.
    pub fn new_temporary(&mut self, scope: ScopeId, prefix: &str) -> String {
        self.temps += 1;
        let name = format!("!{prefix}{}", self.temps);
        self.declare(scope, &name, true, true);
        name
    }

    pub fn symbol(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.lookup_exact(scope, name)
    }

    fn lookup_exact(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.scopes.get(&scope)?.get(name)
    }

    fn lookup_exact_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Symbol> {
        self.scopes.get_mut(&scope)?.get_mut(name)
    }
}
