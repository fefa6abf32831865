use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use weave_classfile::{ClassFile, ACC_PRIVATE};
use weave_engine::builder::TypeBuilder;
use weave_engine::engine::Engine;
use weave_engine::error::PluginError;
use weave_engine::listener::Failing;
use weave_engine::locator::ClassFileLocator;
use weave_engine::manifest::{Manifest, MANIFEST_NAME};
use weave_engine::plugin::{Plugin, PluginFactory, Simple};
use weave_engine::source::{self, Origin, Source};
use weave_engine::target;
use weave_engine::types::TypeDescription;

struct FieldAdder;

impl Plugin for FieldAdder {
    fn name(&self) -> &str {
        "field-adder"
    }

    fn matches(&self, _type_description: &TypeDescription) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn apply(
        &self,
        builder: TypeBuilder,
        _type_description: &TypeDescription,
        _class_file_locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder, PluginError> {
        Ok(builder.define_field(ACC_PRIVATE, "woven", "Z")?)
    }
}

fn adder_factories() -> Vec<Arc<dyn PluginFactory>> {
    vec![Arc::new(Simple::of(FieldAdder))]
}

fn class_bytes(name: &str) -> Vec<u8> {
    ClassFile::new(name, "java.lang.Object").to_bytes()
}

fn write_class(root: &Path, name: &str) -> Result<()> {
    let relative = format!("{}.class", name.replace('.', "/"));
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent"))?;
    fs::write(path, class_bytes(name))?;
    Ok(())
}

#[test]
fn folder_to_jar_to_folder_round_trip() -> Result<()> {
    let workspace = tempdir()?;
    let classes = workspace.path().join("classes");
    write_class(&classes, "com.example.Main")?;
    write_class(&classes, "com.example.util.Helper")?;
    fs::create_dir_all(classes.join("META-INF"))?;
    fs::write(
        classes.join("META-INF").join("MANIFEST.MF"),
        Manifest::new().to_bytes(),
    )?;
    fs::write(classes.join("notes.txt"), b"passthrough")?;

    let jar = workspace.path().join("woven.jar");
    let summary = Engine::new().apply(
        &source::ForFolder::new(&classes),
        &target::ForJarFile::new(&jar),
        &adder_factories(),
    )?;
    assert_eq!(summary.transformed().len(), 2);
    assert!(summary.failed().is_empty());

    // The manifest must lead the written jar.
    let mut archive = zip::ZipArchive::new(fs::File::open(&jar)?)?;
    assert_eq!(archive.by_index(0)?.name(), MANIFEST_NAME);

    let unpacked = workspace.path().join("unpacked");
    fs::create_dir_all(&unpacked)?;
    let summary = Engine::new().apply(
        &source::ForJarFile::new(&jar),
        &target::ForFolder::new(&unpacked),
        &[],
    )?;
    assert!(summary.transformed().is_empty());

    let round_tripped = fs::read(unpacked.join("com/example/Main.class"))?;
    let class_file = ClassFile::parse(&round_tripped)?;
    assert_eq!(class_file.binary_name()?, "com.example.Main");
    let fields = class_file.field_summaries()?;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "woven");
    assert_eq!(fs::read(unpacked.join("notes.txt"))?, b"passthrough");
    assert_eq!(
        fs::read(unpacked.join("META-INF/MANIFEST.MF"))?,
        Manifest::new().to_bytes()
    );
    Ok(())
}

#[test]
fn jar_round_trip_preserves_stored_bytes() -> Result<()> {
    let workspace = tempdir()?;
    let first = workspace.path().join("first.jar");
    let second = workspace.path().join("second.jar");

    let in_memory = source::InMemory::of_types([(
        "com.example.Main".to_string(),
        class_bytes("com.example.Main"),
    )]);
    Engine::new().apply(
        &in_memory,
        &target::ForJarFile::new(&first),
        &adder_factories(),
    )?;

    // Copying through a second jar without plugins keeps entries intact.
    Engine::new().apply(
        &source::ForJarFile::new(&first),
        &target::ForJarFile::new(&second),
        &[],
    )?;

    let read = |path: &Path| -> Result<Vec<u8>> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path)?)?;
        let mut entry = archive.by_name("com/example/Main.class")?;
        let mut bytes = Vec::new();
        io::Read::read_to_end(&mut entry, &mut bytes)?;
        Ok(bytes)
    };
    assert_eq!(read(&first)?, read(&second)?);
    Ok(())
}

#[test]
fn apply_paths_selects_folder_or_jar_by_inspection() -> Result<()> {
    let workspace = tempdir()?;
    let classes = workspace.path().join("classes");
    write_class(&classes, "com.example.Main")?;
    let jar = workspace.path().join("out.jar");

    let summary = Engine::new().apply_paths(&classes, &jar, &adder_factories())?;
    assert_eq!(summary.transformed().len(), 1);
    assert!(jar.is_file());

    let unpacked = workspace.path().join("unpacked");
    fs::create_dir_all(&unpacked)?;
    Engine::new().apply_paths(&jar, &unpacked, &[])?;
    assert!(unpacked.join("com/example/Main.class").is_file());
    Ok(())
}

struct Tracking {
    delegate: source::InMemory,
    closed: Arc<AtomicBool>,
}

struct TrackingOrigin {
    delegate: Box<dyn Origin>,
    closed: Arc<AtomicBool>,
}

impl Source for Tracking {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        Ok(Box::new(TrackingOrigin {
            delegate: self.delegate.read()?,
            closed: self.closed.clone(),
        }))
    }
}

impl Origin for TrackingOrigin {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        self.delegate.manifest()
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        self.delegate.class_file_locator()
    }

    fn elements(&self) -> source::ElementIterator<'_> {
        self.delegate.elements()
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.delegate.close()
    }
}

#[test]
fn compound_sources_fall_back_and_close_every_child() -> Result<()> {
    // The first source carries no class files at all; the second resolves
    // the type in question.
    let first_closed = Arc::new(AtomicBool::new(false));
    let second_closed = Arc::new(AtomicBool::new(false));
    let first = Tracking {
        delegate: source::InMemory::new(BTreeMap::from([(
            "docs/readme.txt".to_string(),
            b"hello".to_vec(),
        )])),
        closed: first_closed.clone(),
    };
    let second = Tracking {
        delegate: source::InMemory::of_types([(
            "com.example.Main".to_string(),
            class_bytes("com.example.Main"),
        )]),
        closed: second_closed.clone(),
    };
    let compound = source::Compound::new(vec![Box::new(first), Box::new(second)]);
    let target = target::InMemory::new();
    let summary = Engine::new().apply(&compound, &target, &adder_factories())?;

    assert_eq!(summary.transformed().len(), 1);
    assert!(summary.unresolved().is_empty());
    assert!(first_closed.load(Ordering::SeqCst));
    assert!(second_closed.load(Ordering::SeqCst));
    assert!(target.storage().contains_key("docs/readme.txt"));
    Ok(())
}

#[test]
fn manifest_propagates_from_source_to_target() -> Result<()> {
    let mut manifest = Manifest::new();
    manifest.set_main_attribute("Implementation-Title", "weave");
    let source = source::InMemory::new(BTreeMap::from([(
        MANIFEST_NAME.to_string(),
        manifest.to_bytes(),
    )]));
    let target = target::InMemory::new();
    Engine::new().apply(&source, &target, &[])?;
    assert_eq!(
        target.storage().get(MANIFEST_NAME),
        Some(&manifest.to_bytes())
    );
    Ok(())
}

#[test]
fn parallel_and_serial_dispatch_agree_on_the_result_set() -> Result<()> {
    // Single-digit suffixes keep the map's lexicographic iteration order
    // aligned with the numeric order asserted below.
    let names: Vec<String> = (0..8).map(|index| format!("com.example.T{index}")).collect();
    let types: Vec<(String, Vec<u8>)> = names
        .iter()
        .map(|name| (name.clone(), class_bytes(name)))
        .collect();

    let serial_target = target::InMemory::new();
    let serial = Engine::new().apply(
        &source::InMemory::of_types(types.clone()),
        &serial_target,
        &adder_factories(),
    )?;
    let parallel_target = target::InMemory::new();
    let parallel = Engine::new()
        .with_parallel_transformation(4)
        .apply(
            &source::InMemory::of_types(types),
            &parallel_target,
            &adder_factories(),
        )?;

    let ordered: Vec<&str> = serial.transformed().iter().map(TypeDescription::name).collect();
    assert_eq!(ordered, names.iter().map(String::as_str).collect::<Vec<_>>());

    let mut parallel_set: Vec<&str> =
        parallel.transformed().iter().map(TypeDescription::name).collect();
    parallel_set.sort_unstable();
    let mut expected: Vec<&str> = names.iter().map(String::as_str).collect();
    expected.sort_unstable();
    assert_eq!(parallel_set, expected);
    assert_eq!(serial_target.storage(), parallel_target.storage());
    Ok(())
}

#[test]
fn fail_fast_under_parallel_dispatch_aborts_the_run() -> Result<()> {
    struct Exploding;

    impl Plugin for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn matches(&self, _type_description: &TypeDescription) -> Result<bool, PluginError> {
            Ok(true)
        }

        fn apply(
            &self,
            _builder: TypeBuilder,
            _type_description: &TypeDescription,
            _class_file_locator: &dyn ClassFileLocator,
        ) -> Result<TypeBuilder, PluginError> {
            Err("intentional failure".into())
        }
    }

    let names: Vec<(String, Vec<u8>)> = (0..8)
        .map(|index| {
            let name = format!("com.example.T{index}");
            let bytes = class_bytes(&name);
            (name, bytes)
        })
        .collect();
    let result = Engine::new()
        .with_parallel_transformation(2)
        .apply(
            &source::InMemory::of_types(names),
            &target::InMemory::new(),
            &[Arc::new(Simple::of(Exploding)) as Arc<dyn PluginFactory>],
        );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn fail_last_surfaces_every_failure_in_the_batch_error() -> Result<()> {
    struct SelectivelyExploding;

    impl Plugin for SelectivelyExploding {
        fn name(&self) -> &str {
            "selectively-exploding"
        }

        fn matches(&self, type_description: &TypeDescription) -> Result<bool, PluginError> {
            Ok(type_description.name().ends_with("Broken"))
        }

        fn apply(
            &self,
            _builder: TypeBuilder,
            _type_description: &TypeDescription,
            _class_file_locator: &dyn ClassFileLocator,
        ) -> Result<TypeBuilder, PluginError> {
            Err("intentional failure".into())
        }
    }

    let source = source::InMemory::of_types([
        ("com.example.Broken".to_string(), class_bytes("com.example.Broken")),
        ("com.example.Fine".to_string(), class_bytes("com.example.Fine")),
    ]);
    let result = Engine::new()
        .with_error_handlers(vec![Arc::new(Failing::FailLast)])
        .apply(
            &source,
            &target::InMemory::new(),
            &[Arc::new(Simple::of(SelectivelyExploding)) as Arc<dyn PluginFactory>],
        );
    match result {
        Err(weave_engine::EngineError::BatchApplication(count)) => assert_eq!(count, 1),
        other => panic!("expected a batch failure, got {other:?}"),
    }
    Ok(())
}
