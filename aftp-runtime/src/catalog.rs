//! Static table of named runtimes and what each is expected to provide.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// One runtime: the capabilities it must provide and the packages that
/// install them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    pub name: String,
    /// Import names probed inside the runtime, in declaration order
    pub capabilities: Vec<String>,
    /// Package names handed to the installer scripts
    pub install_targets: Vec<String>,
}

impl RuntimeSpec {
    /// Create a spec with no capabilities
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            install_targets: Vec::new(),
        }
    }

    /// Set the capabilities, dropping duplicates
    pub fn with_capabilities<I, T>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.capabilities = dedup(capabilities);
        self
    }

    /// Set the install targets, dropping duplicates
    pub fn with_install_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.install_targets = dedup(targets);
        self
    }
}

fn dedup<I, T>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.into();
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Ordered collection of runtime specs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCatalog {
    specs: Vec<RuntimeSpec>,
}

static BUILTIN: Lazy<RuntimeCatalog> = Lazy::new(|| {
    RuntimeCatalog::new()
        .with(
            RuntimeSpec::new("core")
                .with_capabilities(["PySide6", "requests"])
                .with_install_targets(["PySide6", "requests"]),
        )
        .with(
            RuntimeSpec::new("ollama")
                .with_capabilities(["ollama", "requests"])
                .with_install_targets(["ollama", "requests"]),
        )
        .with(
            RuntimeSpec::new("llm_hf")
                .with_capabilities(["transformers", "accelerate", "safetensors"])
                .with_install_targets(["transformers", "accelerate", "safetensors"]),
        )
        .with(
            RuntimeSpec::new("image")
                .with_capabilities(["diffusers", "torch"])
                .with_install_targets(["diffusers", "torch"]),
        )
        .with(
            RuntimeSpec::new("embeddings")
                .with_capabilities(["sentence_transformers", "faiss"])
                .with_install_targets(["sentence-transformers", "faiss-cpu"]),
        )
        .with(
            RuntimeSpec::new("indexer")
                .with_capabilities(["trafilatura", "bs4", "lxml"])
                .with_install_targets(["trafilatura", "beautifulsoup4", "lxml"]),
        )
        .with(
            RuntimeSpec::new("ocr_vision")
                .with_capabilities(["pytesseract", "cv2", "PIL"])
                .with_install_targets(["pytesseract", "opencv-python-headless", "Pillow"]),
        )
        .with(
            RuntimeSpec::new("stt")
                .with_capabilities(["whisper"])
                .with_install_targets(["openai-whisper"]),
        )
        .with(
            RuntimeSpec::new("tts")
                .with_capabilities(["pyttsx3"])
                .with_install_targets(["pyttsx3"]),
        )
});

impl RuntimeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The runtimes shipped with the hub
    pub fn builtin() -> &'static RuntimeCatalog {
        &BUILTIN
    }

    /// Add a spec, replacing any spec with the same name in place
    pub fn with(mut self, spec: RuntimeSpec) -> Self {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = RuntimeCatalog::builtin();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.names().next(), Some("core"));

        let embeddings = catalog.get("embeddings").unwrap();
        assert_eq!(embeddings.capabilities, vec!["sentence_transformers", "faiss"]);
        assert_eq!(embeddings.install_targets, vec!["sentence-transformers", "faiss-cpu"]);
        assert!(!catalog.contains("ai_dev"));
    }

    #[test]
    fn test_capabilities_are_an_ordered_set() {
        let spec = RuntimeSpec::new("x").with_capabilities(["b", "a", "b"]);
        assert_eq!(spec.capabilities, vec!["b", "a"]);
    }

    #[test]
    fn test_with_replaces_same_name() {
        let catalog = RuntimeCatalog::new()
            .with(RuntimeSpec::new("a").with_capabilities(["one"]))
            .with(RuntimeSpec::new("b"))
            .with(RuntimeSpec::new("a").with_capabilities(["two"]));
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().capabilities, vec!["two"]);
    }
}
