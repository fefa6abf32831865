//! プラグインディスカバリ。
//!
//! ソース内の規約パス（[`PLUGIN_FILE`]）に置かれた改行区切りのテキスト
//! ファイルからプラグイン名を読み取り、登録済みファクトリへ解決する。

use crate::plugin::PluginFactory;
use crate::source::{Origin, Source};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// プラグイン定義ファイルの規約パス。1行につき1プラグイン名、空行は無視
/// される。
pub const PLUGIN_FILE: &str = "META-INF/weave/build.plugins";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("プラグイン定義ファイルをUTF-8として読み取れませんでした")]
    Encoding,
    #[error("プラグイン {0} は登録されていません")]
    UnknownPlugin(String),
    #[error("プラグイン {0} は既に登録されています")]
    DuplicatePlugin(String),
    #[error("IOエラー: {0}")]
    Io(#[from] io::Error),
}

/// プラグイン定義ファイルの内容を解析し、登場順のプラグイン名を返す。
pub fn parse_plugin_names(bytes: &[u8]) -> Result<Vec<String>, DiscoveryError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DiscoveryError::Encoding)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// 名前からプラグインファクトリへのレジストリ。
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Arc<dyn PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    /// ファクトリを登録する。同名の再登録はエラー。
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn PluginFactory>,
    ) -> Result<(), DiscoveryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(DiscoveryError::DuplicatePlugin(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// 名前のリストをファクトリへ解決する。未登録の名前は致命的エラー。
    pub fn resolve(
        &self,
        names: &[String],
    ) -> Result<Vec<Arc<dyn PluginFactory>>, DiscoveryError> {
        names
            .iter()
            .map(|name| {
                self.factories
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DiscoveryError::UnknownPlugin(name.clone()))
            })
            .collect()
    }

    /// ソースからプラグイン定義ファイルを探し、記載された名前を解決する。
    /// ファイルが存在しなければ空のリストを返す。
    pub fn discover(
        &self,
        source: &dyn Source,
    ) -> Result<Vec<Arc<dyn PluginFactory>>, DiscoveryError> {
        let origin = source.read()?;
        let mut names = Vec::new();
        for element in origin.elements() {
            let element = element?;
            if element.name() == PLUGIN_FILE {
                names = parse_plugin_names(&element.read()?)?;
                break;
            }
        }
        origin.close()?;
        debug!(count = names.len(), "discovered plugins");
        self.resolve(&names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{NoOp, Simple};
    use crate::source::InMemory;
    use std::collections::BTreeMap as Map;

    #[test]
    fn parses_names_and_skips_blank_lines() {
        let names = parse_plugin_names(b"first\n\n  second  \n\n").expect("names");
        assert_eq!(names, ["first", "second"]);
        assert!(parse_plugin_names(b"").expect("names").is_empty());
    }

    #[test]
    fn rejects_non_utf8_content() {
        assert!(matches!(
            parse_plugin_names(&[0xFF, 0xFE]),
            Err(DiscoveryError::Encoding)
        ));
    }

    #[test]
    fn registry_rejects_duplicates_and_unknown_names() {
        let mut registry = PluginRegistry::new();
        registry
            .register("noop", Arc::new(Simple::of(NoOp)))
            .expect("register");
        assert!(matches!(
            registry.register("noop", Arc::new(Simple::of(NoOp))),
            Err(DiscoveryError::DuplicatePlugin(_))
        ));
        assert!(matches!(
            registry.resolve(&["missing".to_string()]),
            Err(DiscoveryError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn discovers_plugins_from_the_conventional_path() {
        let mut registry = PluginRegistry::new();
        registry
            .register("noop", Arc::new(Simple::of(NoOp)))
            .expect("register");
        let source = InMemory::new(Map::from([(
            PLUGIN_FILE.to_string(),
            b"noop\n".to_vec(),
        )]));
        let factories = registry.discover(&source).expect("discover");
        assert_eq!(factories.len(), 1);

        let empty = InMemory::new(Map::new());
        assert!(registry.discover(&empty).expect("discover").is_empty());
    }
}
