use crate::name::{binary_to_internal, internal_to_binary};
use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;

#[derive(Debug, Error)]
pub enum ClassReadError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 string in constant pool: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
    #[error("field {name} is already declared")]
    DuplicateField { name: String },
    #[error("constant pool exceeds the 65535 entry limit")]
    ConstantPoolOverflow,
}

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl Constant {
    /// Long and double constants occupy two constant pool slots.
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// The constant pool of a class file. Slot zero and the phantom slots
/// following long and double entries are represented as `None`.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    fn empty() -> Self {
        ConstantPool {
            entries: vec![None],
        }
    }

    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassReadError> {
        let count = reader.read_u2()?;
        let mut entries = vec![None];
        while entries.len() < count as usize {
            let tag = reader.read_u1()?;
            let constant = match tag {
                1 => {
                    let length = reader.read_u2()?;
                    let bytes = reader.read_bytes(length as usize)?;
                    Constant::Utf8(String::from_utf8(bytes.to_vec())?)
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => Constant::Float(f32::from_bits(reader.read_u4()?)),
                5 => {
                    let high = reader.read_u4()? as u64;
                    let low = reader.read_u4()? as u64;
                    Constant::Long(((high << 32) | low) as i64)
                }
                6 => {
                    let high = reader.read_u4()? as u64;
                    let low = reader.read_u4()? as u64;
                    Constant::Double(f64::from_bits((high << 32) | low))
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                tag => return Err(ClassReadError::UnsupportedConstant { tag }),
            };
            let wide = constant.is_wide();
            entries.push(Some(constant));
            if wide {
                entries.push(None);
            }
        }
        Ok(ConstantPool { entries })
    }

    fn write(&self, writer: &mut ClassWriter) {
        writer.write_u2(self.entries.len() as u16);
        for entry in self.entries.iter().flatten() {
            match entry {
                Constant::Utf8(value) => {
                    writer.write_u1(1);
                    writer.write_u2(value.len() as u16);
                    writer.write_bytes(value.as_bytes());
                }
                Constant::Integer(value) => {
                    writer.write_u1(3);
                    writer.write_u4(*value as u32);
                }
                Constant::Float(value) => {
                    writer.write_u1(4);
                    writer.write_u4(value.to_bits());
                }
                Constant::Long(value) => {
                    writer.write_u1(5);
                    writer.write_u4((*value as u64 >> 32) as u32);
                    writer.write_u4(*value as u32);
                }
                Constant::Double(value) => {
                    writer.write_u1(6);
                    writer.write_u4((value.to_bits() >> 32) as u32);
                    writer.write_u4(value.to_bits() as u32);
                }
                Constant::Class { name_index } => {
                    writer.write_u1(7);
                    writer.write_u2(*name_index);
                }
                Constant::String { string_index } => {
                    writer.write_u1(8);
                    writer.write_u2(*string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(9);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(10);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(11);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    writer.write_u1(12);
                    writer.write_u2(*name_index);
                    writer.write_u2(*descriptor_index);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    writer.write_u1(15);
                    writer.write_u1(*reference_kind);
                    writer.write_u2(*reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    writer.write_u1(16);
                    writer.write_u2(*descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(17);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.write_u1(18);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::Module { name_index } => {
                    writer.write_u1(19);
                    writer.write_u2(*name_index);
                }
                Constant::Package { name_index } => {
                    writer.write_u1(20);
                    writer.write_u2(*name_index);
                }
            }
        }
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassReadError> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ClassReadError::InvalidConstantIndex { index })
    }

    /// Resolves a UTF-8 constant.
    pub fn utf8(&self, index: u16) -> Result<&str, ClassReadError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(ClassReadError::InvalidConstantIndex { index }),
        }
    }

    /// Resolves the internal name referenced by a class constant.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassReadError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassReadError::InvalidConstantIndex { index }),
        }
    }

    /// Returns the index of a UTF-8 constant with the given value, adding
    /// the constant if it is not present yet.
    pub fn ensure_utf8(&mut self, value: &str) -> Result<u16, ClassReadError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if let Some(Constant::Utf8(existing)) = entry {
                if existing == value {
                    return Ok(index as u16);
                }
            }
        }
        self.push(Constant::Utf8(value.to_string()))
    }

    fn push(&mut self, constant: Constant) -> Result<u16, ClassReadError> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(ClassReadError::ConstantPoolOverflow);
        }
        Ok(self.append(constant))
    }

    fn append(&mut self, constant: Constant) -> u16 {
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        index
    }
}

/// A field or method entry. Attribute payloads are carried as opaque bytes.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// A fully parsed, editable class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Parses a complete class file.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassReadError> {
        let mut reader = ClassReader::new(bytes);
        reader.expect_magic()?;
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;

        let interfaces_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u2()?);
        }

        let fields = parse_members(&mut reader)?;
        let methods = parse_members(&mut reader)?;
        let attributes = parse_attributes(&mut reader)?;

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Creates a minimal class skeleton without fields, methods or
    /// attributes. Mainly useful for synthesizing auxiliary types and test
    /// fixtures.
    pub fn new(binary_name: &str, super_binary_name: &str) -> ClassFile {
        let mut constant_pool = ConstantPool::empty();
        let this_name = constant_pool.append(Constant::Utf8(binary_to_internal(binary_name)));
        let this_class = constant_pool.append(Constant::Class {
            name_index: this_name,
        });
        let super_name =
            constant_pool.append(Constant::Utf8(binary_to_internal(super_binary_name)));
        let super_class = constant_pool.append(Constant::Class {
            name_index: super_name,
        });
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool,
            access_flags: ACC_PUBLIC,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// The binary name of the described class.
    pub fn binary_name(&self) -> Result<String, ClassReadError> {
        Ok(internal_to_binary(
            self.constant_pool.class_name(self.this_class)?,
        ))
    }

    /// The binary name of the super class, or `None` for `java.lang.Object`
    /// and module descriptors.
    pub fn super_binary_name(&self) -> Result<Option<String>, ClassReadError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            Ok(Some(internal_to_binary(
                self.constant_pool.class_name(self.super_class)?,
            )))
        }
    }

    /// The binary names of all directly implemented interfaces.
    pub fn interface_names(&self) -> Result<Vec<String>, ClassReadError> {
        self.interfaces
            .iter()
            .map(|index| {
                self.constant_pool
                    .class_name(*index)
                    .map(internal_to_binary)
            })
            .collect()
    }

    /// Summarizes all declared fields.
    pub fn field_summaries(&self) -> Result<Vec<MemberSummary>, ClassReadError> {
        self.fields
            .iter()
            .map(|field| {
                Ok(MemberSummary {
                    name: self.constant_pool.utf8(field.name_index)?.to_string(),
                    descriptor: self
                        .constant_pool
                        .utf8(field.descriptor_index)?
                        .to_string(),
                    access_flags: field.access_flags,
                })
            })
            .collect()
    }

    /// Appends a field without attributes. Rejects a field name that is
    /// already declared.
    pub fn add_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<(), ClassReadError> {
        for field in &self.fields {
            if self.constant_pool.utf8(field.name_index)? == name {
                return Err(ClassReadError::DuplicateField {
                    name: name.to_string(),
                });
            }
        }
        let name_index = self.constant_pool.ensure_utf8(name)?;
        let descriptor_index = self.constant_pool.ensure_utf8(descriptor)?;
        self.fields.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(())
    }

    /// Serializes the class file. Parsing and re-serializing an unmodified
    /// class yields byte-identical output.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ClassWriter::default();
        writer.write_u4(MAGIC);
        writer.write_u2(self.minor_version);
        writer.write_u2(self.major_version);
        self.constant_pool.write(&mut writer);
        writer.write_u2(self.access_flags);
        writer.write_u2(self.this_class);
        writer.write_u2(self.super_class);
        writer.write_u2(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            writer.write_u2(*interface);
        }
        write_members(&mut writer, &self.fields);
        write_members(&mut writer, &self.methods);
        write_attributes(&mut writer, &self.attributes);
        writer.into_bytes()
    }
}

/// A summarized view of a parsed class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub binary_name: String,
    pub access_flags: u16,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberSummary>,
    pub methods: Vec<MemberSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSummary {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

impl ClassSummary {
    /// Parses only the header of a class file: constant pool, access
    /// flags, this/super class and interfaces. Declared members are left
    /// empty. This is the cheap path for type resolution.
    pub fn parse_header(bytes: &[u8]) -> Result<ClassSummary, ClassReadError> {
        Self::parse_internal(bytes, false)
    }

    /// Parses the header and all declared field and method signatures.
    pub fn parse_full(bytes: &[u8]) -> Result<ClassSummary, ClassReadError> {
        Self::parse_internal(bytes, true)
    }

    fn parse_internal(bytes: &[u8], members: bool) -> Result<ClassSummary, ClassReadError> {
        let mut reader = ClassReader::new(bytes);
        reader.expect_magic()?;
        let _minor_version = reader.read_u2()?;
        let _major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;

        let interfaces_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(internal_to_binary(
                constant_pool.class_name(reader.read_u2()?)?,
            ));
        }

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        if members {
            fields = read_member_summaries(&mut reader, &constant_pool)?;
            methods = read_member_summaries(&mut reader, &constant_pool)?;
        }

        let binary_name = internal_to_binary(constant_pool.class_name(this_class)?);
        let super_name = if super_class == 0 {
            None
        } else {
            Some(internal_to_binary(constant_pool.class_name(super_class)?))
        };

        Ok(ClassSummary {
            binary_name,
            access_flags,
            super_name,
            interfaces,
            fields,
            methods,
        })
    }
}

fn read_member_summaries(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<Vec<MemberSummary>, ClassReadError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes_count = reader.read_u2()?;
        skip_attributes(reader, attributes_count)?;
        members.push(MemberSummary {
            name: constant_pool.utf8(name_index)?.to_string(),
            descriptor: constant_pool.utf8(descriptor_index)?.to_string(),
            access_flags,
        });
    }
    Ok(members)
}

fn parse_members(reader: &mut ClassReader<'_>) -> Result<Vec<MemberInfo>, ClassReadError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes = parse_attributes(reader)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn parse_attributes(reader: &mut ClassReader<'_>) -> Result<Vec<AttributeInfo>, ClassReadError> {
    let count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()?;
        let info = reader.read_bytes(length as usize)?.to_vec();
        attributes.push(AttributeInfo { name_index, info });
    }
    Ok(attributes)
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassReadError> {
    for _ in 0..count {
        let _name_index = reader.read_u2()?;
        let length = reader.read_u4()?;
        reader.read_bytes(length as usize)?;
    }
    Ok(())
}

fn write_members(writer: &mut ClassWriter, members: &[MemberInfo]) {
    writer.write_u2(members.len() as u16);
    for member in members {
        writer.write_u2(member.access_flags);
        writer.write_u2(member.name_index);
        writer.write_u2(member.descriptor_index);
        write_attributes(writer, &member.attributes);
    }
}

fn write_attributes(writer: &mut ClassWriter, attributes: &[AttributeInfo]) {
    writer.write_u2(attributes.len() as u16);
    for attribute in attributes {
        writer.write_u2(attribute.name_index);
        writer.write_u4(attribute.info.len() as u32);
        writer.write_bytes(&attribute.info);
    }
}

struct ClassReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ClassReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ClassReader { bytes, position: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassReadError> {
        if self.read_u4()? == MAGIC {
            Ok(())
        } else {
            Err(ClassReadError::InvalidMagic)
        }
    }

    fn read_u1(&mut self) -> Result<u8, ClassReadError> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or(ClassReadError::UnexpectedEof)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u2(&mut self) -> Result<u16, ClassReadError> {
        Ok(((self.read_u1()? as u16) << 8) | self.read_u1()? as u16)
    }

    fn read_u4(&mut self) -> Result<u32, ClassReadError> {
        Ok(((self.read_u2()? as u32) << 16) | self.read_u2()? as u32)
    }

    fn read_bytes(&mut self, length: usize) -> Result<&'a [u8], ClassReadError> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(ClassReadError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or(ClassReadError::UnexpectedEof)?;
        self.position = end;
        Ok(slice)
    }
}

#[derive(Default)]
struct ClassWriter {
    bytes: Vec<u8>,
}

impl ClassWriter {
    fn write_u1(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn write_u2(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u4(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_class() -> ClassFile {
        let mut class_file = ClassFile::new("com.example.Sample", "java.lang.Object");
        class_file
            .add_field(ACC_PRIVATE | ACC_FINAL, "count", "I")
            .expect("field");
        class_file
    }

    #[test]
    fn round_trips_unmodified_bytes() {
        let bytes = sample_class().to_bytes();
        let parsed = ClassFile::parse(&bytes).expect("parse");
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn parses_names_and_fields() {
        let bytes = sample_class().to_bytes();
        let parsed = ClassFile::parse(&bytes).expect("parse");
        assert_eq!(parsed.binary_name().expect("name"), "com.example.Sample");
        assert_eq!(
            parsed.super_binary_name().expect("super").as_deref(),
            Some("java.lang.Object")
        );
        let fields = parsed.field_summaries().expect("fields");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "count");
        assert_eq!(fields[0].descriptor, "I");
    }

    #[test]
    fn adds_a_field_exactly_once() {
        let bytes = sample_class().to_bytes();
        let mut parsed = ClassFile::parse(&bytes).expect("parse");
        parsed
            .add_field(ACC_PRIVATE, "cached", "Ljava/lang/String;")
            .expect("field");
        let reparsed = ClassFile::parse(&parsed.to_bytes()).expect("reparse");
        assert_eq!(reparsed.field_summaries().expect("fields").len(), 2);

        let duplicate = parsed.add_field(ACC_PRIVATE, "cached", "J");
        assert!(matches!(
            duplicate,
            Err(ClassReadError::DuplicateField { .. })
        ));
    }

    #[test]
    fn header_parse_matches_full_parse() {
        let bytes = sample_class().to_bytes();
        let header = ClassSummary::parse_header(&bytes).expect("header");
        assert_eq!(header.binary_name, "com.example.Sample");
        assert_eq!(header.super_name.as_deref(), Some("java.lang.Object"));
        assert!(header.fields.is_empty());

        let full = ClassSummary::parse_full(&bytes).expect("full");
        assert_eq!(full.binary_name, header.binary_name);
        assert_eq!(full.fields.len(), 1);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE]),
            Err(ClassReadError::UnexpectedEof)
        ));
        assert!(matches!(
            ClassFile::parse(&[0u8; 16]),
            Err(ClassReadError::InvalidMagic)
        ));
    }

    #[test]
    fn wide_constants_keep_their_phantom_slot() {
        let mut class_file = sample_class();
        class_file
            .constant_pool
            .push(Constant::Long(42))
            .expect("long");
        class_file
            .constant_pool
            .push(Constant::Utf8("after".to_string()))
            .expect("utf8");
        let bytes = class_file.to_bytes();
        let parsed = ClassFile::parse(&bytes).expect("parse");
        assert_eq!(parsed.to_bytes(), bytes);
    }
}
