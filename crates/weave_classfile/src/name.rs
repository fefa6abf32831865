//! Type name conversions between the internal (`a/b/C`) and binary
//! (`a.b.C`) forms, and validation of names derived from file paths.

/// The file extension of a compiled Java class.
pub const CLASS_FILE_EXTENSION: &str = ".class";

/// Converts an internal name (`a/b/C`) to a binary name (`a.b.C`).
pub fn internal_to_binary(name: &str) -> String {
    name.replace('/', ".")
}

/// Converts a binary name (`a.b.C`) to an internal name (`a/b/C`).
pub fn binary_to_internal(name: &str) -> String {
    name.replace('.', "/")
}

/// Checks whether a name is a legal internal type name. The JVM accepts
/// almost any segment content (`module-info`, synthetic `$` names), so only
/// structural rules are enforced: no empty segments and no characters that
/// are meaningless in an internal name.
pub fn is_valid_internal_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && !segment.contains(['.', ';', '[']))
}

/// Derives the binary type name for a relative class file path, or `None`
/// if the path does not denote a legal class file candidate.
pub fn binary_name_for_path(path: &str) -> Option<String> {
    let internal = path.strip_suffix(CLASS_FILE_EXTENSION)?;
    if is_valid_internal_name(internal) {
        Some(internal_to_binary(internal))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_internal_and_binary_names() {
        assert_eq!(internal_to_binary("a/b/C"), "a.b.C");
        assert_eq!(binary_to_internal("a.b.C"), "a/b/C");
        assert_eq!(internal_to_binary("C"), "C");
    }

    #[test]
    fn derives_type_names_from_paths() {
        assert_eq!(binary_name_for_path("a/b/C.class").as_deref(), Some("a.b.C"));
        assert_eq!(
            binary_name_for_path("module-info.class").as_deref(),
            Some("module-info")
        );
        assert_eq!(binary_name_for_path("a/b/C.txt"), None);
        assert_eq!(binary_name_for_path("a//C.class"), None);
        assert_eq!(binary_name_for_path(".class"), None);
    }

    #[test]
    fn rejects_malformed_internal_names() {
        assert!(is_valid_internal_name("a/b/C$Inner"));
        assert!(!is_valid_internal_name(""));
        assert!(!is_valid_internal_name("a/"));
        assert!(!is_valid_internal_name("a/b.c/D"));
        assert!(!is_valid_internal_name("La/b;"));
    }
}
