use crate::config::types::{Language, Result, SandboxError};
use crate::judge::pipeline::LanguagePipeline;
use std::collections::BTreeMap;

/// Read-only language → pipeline table, fixed at engine start.
#[derive(Debug, Clone)]
pub struct PipelineTable {
    pipelines: BTreeMap<Language, LanguagePipeline>,
}

impl PipelineTable {
    pub fn new(pipelines: BTreeMap<Language, LanguagePipeline>) -> Self {
        Self { pipelines }
    }

    pub fn lookup(&self, language: Language) -> Result<&LanguagePipeline> {
        self.pipelines
            .get(&language)
            .ok_or_else(|| SandboxError::UnsupportedLanguage(language.id().to_string()))
    }

    /// Parse a user-supplied identifier and look it up.
    pub fn resolve(&self, identifier: &str) -> Result<&LanguagePipeline> {
        let language: Language = identifier.parse()?;
        self.lookup(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.pipelines.keys().copied()
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &LanguagePipeline> {
        self.pipelines.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets::{builtin_pipeline, builtin_pipelines};

    #[test]
    fn resolves_aliases_to_builtin_pipelines() {
        let table = PipelineTable::new(builtin_pipelines());
        assert_eq!(table.resolve("py").unwrap().language, Language::Python);
        assert_eq!(table.resolve("C++").unwrap().language, Language::Cpp);
        assert_eq!(table.resolve("node").unwrap().file_name, "main.js");
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        let table = PipelineTable::new(builtin_pipelines());
        let err = table.resolve("brainfuck").unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage(ref s) if s == "brainfuck"));
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn missing_pipeline_is_unsupported() {
        let mut pipelines = BTreeMap::new();
        pipelines.insert(Language::Python, builtin_pipeline(Language::Python));
        let table = PipelineTable::new(pipelines);

        assert!(table.lookup(Language::Python).is_ok());
        assert!(matches!(
            table.lookup(Language::Java),
            Err(SandboxError::UnsupportedLanguage(_))
        ));
        assert_eq!(table.languages().collect::<Vec<_>>(), vec![Language::Python]);
    }
}
