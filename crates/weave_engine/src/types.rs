use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use weave_classfile::{binary_to_internal, ClassSummary, MemberSummary, ACC_INTERFACE};

/// An identity and metadata handle for a class, independent of whether the
/// class is loaded in any runtime. Equality, ordering and hashing are based
/// on the binary name alone, so descriptions resolved with different reader
/// modes compare equal.
#[derive(Debug, Clone)]
pub struct TypeDescription {
    name: String,
    access_flags: u16,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberSummary>,
    methods: Vec<MemberSummary>,
}

impl TypeDescription {
    /// Creates a description that carries nothing but a name. Used for
    /// auxiliary types and as a lightweight identity.
    pub fn of_name(name: impl Into<String>) -> TypeDescription {
        TypeDescription {
            name: name.into(),
            access_flags: 0,
            super_name: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates a description from a parsed class summary.
    pub fn from_summary(summary: ClassSummary) -> TypeDescription {
        TypeDescription {
            name: summary.binary_name,
            access_flags: summary.access_flags,
            super_name: summary.super_name,
            interfaces: summary.interfaces,
            fields: summary.fields,
            methods: summary.methods,
        }
    }

    /// The binary name, e.g. `com.example.Sample`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The internal name, e.g. `com/example/Sample`.
    pub fn internal_name(&self) -> String {
        binary_to_internal(&self.name)
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Declared fields. Empty unless the description was resolved with the
    /// extended reader mode.
    pub fn fields(&self) -> &[MemberSummary] {
        &self.fields
    }

    /// Declared methods. Empty unless the description was resolved with the
    /// extended reader mode.
    pub fn methods(&self) -> &[MemberSummary] {
        &self.methods
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }
}

impl PartialEq for TypeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeDescription {}

impl PartialOrd for TypeDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeDescription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl Hash for TypeDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_the_name() {
        let by_name = TypeDescription::of_name("a.B");
        let mut other = TypeDescription::of_name("a.B");
        other.access_flags = ACC_INTERFACE;
        assert_eq!(by_name, other);
        assert_ne!(by_name, TypeDescription::of_name("a.C"));
    }

    #[test]
    fn exposes_internal_name() {
        assert_eq!(
            TypeDescription::of_name("com.example.Sample").internal_name(),
            "com/example/Sample"
        );
    }
}
