//! Fully-qualified name synthesis and generate-label matching.

/// How a child hangs off its parent in a hierarchical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// Plain hierarchy member: `parent.child`.
    Member,
    /// Item of a package scope: `pkg::child`.
    Package,
    /// Array element or generate block: `parent[3]`.
    Index,
    /// Struct or record field: `parent.field`.
    Field,
}

/// Join a parent's full name and a child's name.
///
/// For [`Separator::Index`], `child` is the index text without brackets, or
/// a name that already ends in an index suffix (`loop[2]`), in which case
/// only the suffix is appended.
pub fn join(parent: &str, child: &str, sep: Separator) -> String {
    match sep {
        Separator::Member | Separator::Field => {
            if parent.is_empty() {
                child.to_string()
            } else {
                format!("{parent}.{child}")
            }
        }
        Separator::Package => {
            let scope = parent.strip_suffix("::").unwrap_or(parent);
            format!("{scope}::{child}")
        }
        Separator::Index => match index_suffix(child) {
            Some(suffix) => format!("{parent}{suffix}"),
            None => format!("{parent}[{child}]"),
        },
    }
}

/// Name of element `index` below `parent`.
pub fn indexed(parent: &str, index: i64) -> String {
    format!("{parent}[{index}]")
}

/// Trailing `[...]` of a name, if any.
pub fn index_suffix(name: &str) -> Option<&str> {
    if !name.ends_with(']') {
        return None;
    }
    name.rfind('[').map(|pos| &name[pos..])
}

/// Generate label of a block name: the part before the index suffix.
/// `loop[3]` → `loop`; names without a suffix are returned unchanged.
pub fn generate_label(name: &str) -> &str {
    match index_suffix(name) {
        Some(suffix) => &name[..name.len() - suffix.len()],
        None => name,
    }
}

/// Whether a generate block named `block` belongs to the generate array
/// labelled `label`. Some backends report the block with its full path;
/// only the last path component is compared.
pub fn matches_generate_label(block: &str, label: &str) -> bool {
    let leaf = block.rsplit('.').next().unwrap_or(block);
    generate_label(leaf) == label && index_suffix(leaf).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_and_field() {
        assert_eq!(join("top", "clk", Separator::Member), "top.clk");
        assert_eq!(join("top.s", "a", Separator::Field), "top.s.a");
        assert_eq!(join("", "top", Separator::Member), "top");
    }

    #[test]
    fn package_scope() {
        assert_eq!(join("pkg", "WIDTH", Separator::Package), "pkg::WIDTH");
        assert_eq!(join("pkg::", "WIDTH", Separator::Package), "pkg::WIDTH");
    }

    #[test]
    fn index_forms() {
        assert_eq!(join("top.mem", "3", Separator::Index), "top.mem[3]");
        assert_eq!(join("top.loop", "loop[2]", Separator::Index), "top.loop[2]");
        assert_eq!(indexed("top.v", -1), "top.v[-1]");
    }

    #[test]
    fn labels() {
        assert_eq!(generate_label("loop[3]"), "loop");
        assert_eq!(generate_label("plain"), "plain");
        assert!(matches_generate_label("loop[0]", "loop"));
        assert!(matches_generate_label("top.loop[0]", "loop"));
        assert!(!matches_generate_label("loop2[0]", "loop"));
        assert!(!matches_generate_label("loop", "loop"));
    }
}
