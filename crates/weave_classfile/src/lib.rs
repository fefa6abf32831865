//! Minimal JVM class file reading and editing.
//!
//! This crate covers exactly the subset of the class file format that the
//! weave engine needs: structural parsing (constant pool, fields, methods,
//! attributes as opaque bytes), a fast header-only parse for type
//! resolution, field injection, and byte-exact re-serialization. Method
//! bodies are never interpreted or rewritten.

mod classfile;
mod name;

pub use classfile::{
    ClassFile, ClassReadError, ClassSummary, Constant, ConstantPool, MemberSummary, ACC_ABSTRACT,
    ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC,
};
pub use name::{
    binary_name_for_path, binary_to_internal, internal_to_binary, is_valid_internal_name,
    CLASS_FILE_EXTENSION,
};
