//! The in-progress representation of a type under transformation.

use crate::types::TypeDescription;
use weave_classfile::{ClassFile, ClassReadError};

/// A builder for the transformed representation of a single type. Plugins
/// receive the builder, derive a new one from it, and hand it back; the
/// engine materializes the final builder into a [`DynamicType`].
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    type_description: TypeDescription,
    class_file: ClassFile,
    auxiliary: Vec<(TypeDescription, Vec<u8>)>,
    live_initializers: Vec<TypeDescription>,
}

impl TypeBuilder {
    /// Creates a builder from the original class file bytes.
    pub fn from_bytes(
        type_description: TypeDescription,
        bytes: &[u8],
    ) -> Result<TypeBuilder, ClassReadError> {
        Ok(TypeBuilder {
            type_description,
            class_file: ClassFile::parse(bytes)?,
            auxiliary: Vec::new(),
            live_initializers: Vec::new(),
        })
    }

    pub fn type_description(&self) -> &TypeDescription {
        &self.type_description
    }

    /// The editable class file. Plugins mutate the type through this model.
    pub fn class_file(&self) -> &ClassFile {
        &self.class_file
    }

    pub fn class_file_mut(&mut self) -> &mut ClassFile {
        &mut self.class_file
    }

    /// Appends a field to the type.
    pub fn define_field(
        mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<TypeBuilder, ClassReadError> {
        self.class_file.add_field(access_flags, name, descriptor)?;
        Ok(self)
    }

    /// Registers an auxiliary type that is stored alongside the
    /// transformed type.
    pub fn with_auxiliary_type(
        mut self,
        type_description: TypeDescription,
        bytes: Vec<u8>,
    ) -> TypeBuilder {
        self.auxiliary.push((type_description, bytes));
        self
    }

    /// Records that the transformed type needs initialization code to run
    /// when the given type is loaded.
    pub fn require_live_initializer(mut self, defining_type: TypeDescription) -> TypeBuilder {
        self.live_initializers.push(defining_type);
        self
    }

    /// Materializes the builder into its final representation.
    pub fn make(self) -> DynamicType {
        let mut types = Vec::with_capacity(1 + self.auxiliary.len());
        types.push((self.type_description.clone(), self.class_file.to_bytes()));
        types.extend(self.auxiliary);
        DynamicType {
            type_description: self.type_description,
            types,
            live_initializers: self.live_initializers,
        }
    }
}

/// A finished transformation result: the transformed type, any auxiliary
/// types produced alongside it, and the types whose loading requires a
/// live initializer.
#[derive(Debug, Clone)]
pub struct DynamicType {
    type_description: TypeDescription,
    types: Vec<(TypeDescription, Vec<u8>)>,
    live_initializers: Vec<TypeDescription>,
}

impl DynamicType {
    pub fn type_description(&self) -> &TypeDescription {
        &self.type_description
    }

    /// The transformed type and all auxiliary types, main type first.
    pub fn types(&self) -> &[(TypeDescription, Vec<u8>)] {
        &self.types
    }

    pub fn live_initializers(&self) -> &[TypeDescription] {
        &self.live_initializers
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        TypeDescription,
        Vec<(TypeDescription, Vec<u8>)>,
        Vec<TypeDescription>,
    ) {
        (self.type_description, self.types, self.live_initializers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_classfile::{ClassFile, ACC_PRIVATE};

    fn builder_for(name: &str) -> TypeBuilder {
        let bytes = ClassFile::new(name, "java.lang.Object").to_bytes();
        TypeBuilder::from_bytes(TypeDescription::of_name(name), &bytes).expect("builder")
    }

    #[test]
    fn defines_fields_on_the_class_file() {
        let dynamic_type = builder_for("a.B")
            .define_field(ACC_PRIVATE, "cached", "I")
            .expect("field")
            .make();
        let (_, bytes) = &dynamic_type.types()[0];
        let class_file = ClassFile::parse(bytes).expect("parse");
        assert_eq!(class_file.field_summaries().expect("fields").len(), 1);
    }

    #[test]
    fn collects_auxiliary_types_and_live_initializers() {
        let auxiliary = TypeDescription::of_name("a.B$Auxiliary");
        let dynamic_type = builder_for("a.B")
            .with_auxiliary_type(auxiliary.clone(), vec![1, 2, 3])
            .require_live_initializer(auxiliary.clone())
            .make();
        assert_eq!(dynamic_type.types().len(), 2);
        assert_eq!(dynamic_type.types()[1].0, auxiliary);
        assert_eq!(dynamic_type.live_initializers(), [auxiliary]);
    }
}
