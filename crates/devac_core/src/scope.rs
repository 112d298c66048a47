//! Scope-derived display names and stable entity identifiers.
//!
//! A symbol's identity must survive edits that merely move it around a
//! file, so nothing here ever looks at line or column numbers. Identity is
//! derived from the lexical scope chain: `Outer.Inner.leaf`. Anonymous
//! symbols borrow the name of whatever binds them: a variable, or the
//! call expression and argument slot they are passed into.

use serde::{Deserialize, Serialize};

/// Placeholder for symbols with no recoverable name at all.
const ANONYMOUS: &str = "<anonymous>";

/// Number of hex characters of the scope hash kept in an entity id.
const SCOPE_HASH_LEN: usize = 12;

/// Explicit lexical scope stack, mutated by the caller while walking a
/// symbol tree.
///
/// # Examples
///
/// ```
/// use devac_core::ScopeStack;
///
/// let mut stack = ScopeStack::new();
/// stack.push("UserService");
/// stack.push("create");
/// assert_eq!(stack.path().unwrap(), "UserService.create");
/// stack.pop();
/// stack.pop();
/// stack.pop(); // popping an empty stack is a no-op
/// assert!(stack.path().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<String>,
}

impl ScopeStack {
    /// Creates an empty stack (module scope).
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a named scope.
    pub fn push(&mut self, name: impl Into<String>) {
        self.frames.push(name.into());
    }

    /// Leaves the innermost scope. No-op when already at module scope.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// True at module scope.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The live scope path joined with `.`, or `None` at module scope.
    pub fn path(&self) -> Option<String> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.join("."))
        }
    }
}

/// Everything known about a symbol when its display name is derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolDescriptor {
    /// Declared name; empty for anonymous symbols.
    pub name: String,
    /// Symbol kind (`function`, `class`, ...). Carried into the entity id.
    pub kind: String,
    /// Declared at the top level of its module.
    pub top_level: bool,
    /// Enclosing symbol's name, for callers that track parents without a
    /// full scope stack.
    pub parent_name: Option<String>,
    /// Variable the symbol is bound to (`const f = () => ...`).
    pub binding_name: Option<String>,
    /// Call expression an anonymous callback is passed into
    /// (`app.get`, `items.map`).
    pub call_expression: Option<String>,
    /// Zero-based positional argument index within that call.
    pub argument_index: Option<usize>,
}

/// Derives the stable display name for a symbol.
///
/// Resolution order:
/// 1. An anonymous symbol bound to a variable takes the variable's name.
/// 2. An anonymous callback passed positionally takes
///    `"{call}.$arg{index}"`, stable because it encodes the call site and
///    slot, never a position in the file.
/// 3. A top-level symbol is its own name.
/// 4. A member of an active scope is the live stack joined with `.` plus
///    the leaf name; with no stack, `parent.name` when a parent is known.
///
/// Identical `(parent, name)` pairs always produce identical strings
/// regardless of processing order, and distinct parents with the same leaf
/// never collide. Empty names degrade to a placeholder rather than
/// panicking; long names pass through untouched (truncation is the
/// caller's policy, not this module's).
pub fn display_name(desc: &SymbolDescriptor, stack: &ScopeStack) -> String {
    if desc.name.is_empty() || desc.name == ANONYMOUS {
        if let Some(binding) = desc.binding_name.as_deref().filter(|b| !b.is_empty()) {
            return qualify(binding, desc, stack);
        }
        if let Some(call) = desc.call_expression.as_deref().filter(|c| !c.is_empty()) {
            let index = desc.argument_index.unwrap_or(0);
            return format!("{}.$arg{}", call, index);
        }
        return qualify(ANONYMOUS, desc, stack);
    }

    qualify(&desc.name, desc, stack)
}

fn qualify(leaf: &str, desc: &SymbolDescriptor, stack: &ScopeStack) -> String {
    if desc.top_level {
        return leaf.to_string();
    }
    if let Some(path) = stack.path() {
        return format!("{}.{}", path, leaf);
    }
    if let Some(parent) = desc.parent_name.as_deref().filter(|p| !p.is_empty()) {
        return format!("{}.{}", parent, leaf);
    }
    leaf.to_string()
}

/// Composes a stable entity id from its scope-derived parts.
///
/// Format: `{repo}:{package}:{kind}:{hash12}` where `hash12` is the first
/// twelve hex characters of the BLAKE3 hash of the scoped display name.
/// Line numbers never participate, so non-renaming edits preserve the id.
///
/// # Examples
///
/// ```
/// use devac_core::entity_id;
///
/// let a = entity_id("webapp", "packages/api", "function", "UserService.create");
/// let b = entity_id("webapp", "packages/api", "function", "UserService.create");
/// assert_eq!(a, b);
/// assert!(a.starts_with("webapp:packages/api:function:"));
/// ```
pub fn entity_id(repo: &str, package: &str, kind: &str, scoped_name: &str) -> String {
    let hash = blake3::hash(scoped_name.as_bytes());
    let short = hex::encode(&hash.as_bytes()[..SCOPE_HASH_LEN / 2]);
    format!("{}:{}:{}:{}", repo, package, kind, short)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> SymbolDescriptor {
        SymbolDescriptor {
            name: name.to_string(),
            kind: "function".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_top_level_symbol_is_its_own_name() {
        let mut desc = named("fetchUser");
        desc.top_level = true;
        assert_eq!(display_name(&desc, &ScopeStack::new()), "fetchUser");
    }

    #[test]
    fn test_member_joins_live_scope_stack() {
        let mut stack = ScopeStack::new();
        stack.push("UserService");
        assert_eq!(
            display_name(&named("create"), &stack),
            "UserService.create"
        );

        stack.push("create");
        assert_eq!(
            display_name(&named("validate"), &stack),
            "UserService.create.validate"
        );
    }

    #[test]
    fn test_parent_name_without_stack() {
        let mut desc = named("create");
        desc.parent_name = Some("UserService".to_string());
        assert_eq!(
            display_name(&desc, &ScopeStack::new()),
            "UserService.create"
        );
    }

    #[test]
    fn test_anonymous_bound_to_variable_takes_binding() {
        let desc = SymbolDescriptor {
            kind: "function".to_string(),
            top_level: true,
            binding_name: Some("handler".to_string()),
            ..Default::default()
        };
        assert_eq!(display_name(&desc, &ScopeStack::new()), "handler");
    }

    #[test]
    fn test_anonymous_callback_encodes_call_site_and_slot() {
        let desc = SymbolDescriptor {
            kind: "function".to_string(),
            call_expression: Some("app.get".to_string()),
            argument_index: Some(1),
            ..Default::default()
        };
        assert_eq!(display_name(&desc, &ScopeStack::new()), "app.get.$arg1");

        // Missing index defaults to slot 0.
        let desc = SymbolDescriptor {
            call_expression: Some("items.map".to_string()),
            ..Default::default()
        };
        assert_eq!(display_name(&desc, &ScopeStack::new()), "items.map.$arg0");
    }

    #[test]
    fn test_empty_name_never_panics() {
        let desc = SymbolDescriptor::default();
        let name = display_name(&desc, &ScopeStack::new());
        assert!(!name.is_empty());

        let mut stack = ScopeStack::new();
        stack.push("Outer");
        assert_eq!(display_name(&desc, &stack), "Outer.<anonymous>");
    }

    #[test]
    fn test_identity_stable_across_processing_order() {
        // Same logical scope stack, built twice.
        let build = || {
            let mut stack = ScopeStack::new();
            stack.push("Repo");
            stack.push("save");
            display_name(&named("retry"), &stack)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_distinct_parents_never_collide() {
        let mut a = ScopeStack::new();
        a.push("UserService");
        let mut b = ScopeStack::new();
        b.push("OrderService");

        let name_a = display_name(&named("create"), &a);
        let name_b = display_name(&named("create"), &b);
        assert_ne!(name_a, name_b);
        assert_ne!(
            entity_id("r", "p", "function", &name_a),
            entity_id("r", "p", "function", &name_b)
        );
    }

    #[test]
    fn test_entity_id_shape_and_determinism() {
        let id = entity_id("webapp", "packages/api", "class", "UserService");
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts[0], "webapp");
        assert_eq!(parts[1], "packages/api");
        assert_eq!(parts[2], "class");
        assert_eq!(parts[3].len(), 12);
        assert_eq!(
            id,
            entity_id("webapp", "packages/api", "class", "UserService")
        );
    }

    #[test]
    fn test_long_names_pass_through() {
        let long = "X".repeat(4096);
        let mut desc = named(&long);
        desc.top_level = true;
        assert_eq!(display_name(&desc, &ScopeStack::new()), long);
    }

    #[test]
    fn test_pop_empty_stack_is_noop() {
        let mut stack = ScopeStack::new();
        stack.pop();
        stack.pop();
        assert!(stack.is_empty());
        stack.push("A");
        assert_eq!(stack.depth(), 1);
    }
}
